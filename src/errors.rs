use actix_web::http::StatusCode;
use actix_web::{error::ResponseError, HttpResponse};
use log::{debug, error, warn};
use serde_json::json;
use thiserror::Error;

// Custom error handling
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// Rejected sign-in, rendered back onto the login page it came from.
    #[error("Authentication error on {page}: {message}")]
    AuthError {
        page: &'static str,
        message: String,
        patient_id: Option<i32>,
    },
    #[error("Not found: {0}")]
    NotFoundError(String),
    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn pool(e: r2d2::Error) -> Self {
        error!("Failed to get database connection: {}", e);
        ApiError::DatabaseError(e.to_string())
    }

    pub fn auth(page: &'static str, message: impl Into<String>) -> Self {
        ApiError::AuthError { page, message: message.into(), patient_id: None }
    }

    pub fn blocking(e: actix_web::error::BlockingError) -> Self {
        error!("Database operation error: {}", e);
        ApiError::DatabaseError(e.to_string())
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => ApiError::NotFoundError("Record not found".to_string()),
            other => ApiError::DatabaseError(other.to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::DatabaseError(msg) => {
                error!("\x1B[1;31mDATABASE ERROR:\x1B[0m {}", msg);
                HttpResponse::InternalServerError().json(json!({ "error": msg }))
            },
            ApiError::ValidationError(msg) => {
                warn!("\x1B[1;33mVALIDATION ERROR:\x1B[0m {}", msg);
                HttpResponse::BadRequest().json(json!({ "error": msg }))
            },
            ApiError::AuthError { page, message, patient_id } => {
                warn!("\x1B[1;33mAUTHENTICATION ERROR:\x1B[0m {} ({})", message, page);
                let mut body = json!({ "page": page, "error": message });
                if let Some(id) = patient_id {
                    body["patient_id"] = json!(id);
                }
                HttpResponse::Unauthorized().json(body)
            },
            ApiError::NotFoundError(msg) => {
                debug!("\x1B[1;36mNOT FOUND ERROR:\x1B[0m {}", msg);
                HttpResponse::NotFound().json(json!({ "error": msg }))
            },
            ApiError::InternalError(msg) => {
                error!("\x1B[1;31mINTERNAL SERVER ERROR:\x1B[0m {}", msg);
                HttpResponse::InternalServerError().json(json!({ "error": msg }))
            },
        }
    }

    fn status_code(&self) -> StatusCode {
        match *self {
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::AuthError { .. } => StatusCode::UNAUTHORIZED,
            ApiError::NotFoundError(_) => StatusCode::NOT_FOUND,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_variant() {
        assert_eq!(ApiError::auth("login_doctor", "x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotFoundError("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::ValidationError("x".into()).status_code(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn auth_error_renders_the_login_page() {
        let err = ApiError::AuthError { page: "patient_signin", message: "nope".into(), patient_id: Some(4) };
        let res = err.error_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let bytes = actix_web::body::to_bytes(res.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "page": "patient_signin", "error": "nope", "patient_id": 4 }));
    }

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        let err: ApiError = diesel::result::Error::NotFound.into();
        assert!(matches!(err, ApiError::NotFoundError(_)));
    }
}
