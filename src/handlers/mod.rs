//! HTTP handlers. Page routes answer a JSON description of the page.

use actix_web::http::header;
use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;
use serde_json::{json, Map, Value};

pub mod auth;
pub mod devices;
pub mod profiles;
pub mod qr;
pub mod records;
pub mod settings;

pub const RECENT_LIMIT: usize = 25;

pub(crate) fn redirect(location: impl AsRef<str>) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location.as_ref()))
        .finish()
}

/// `{"page": name, ...fields}`
pub(crate) fn page_body<T: Serialize>(name: &str, fields: T) -> Value {
    let mut body = match serde_json::to_value(fields) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    body.insert("page".to_string(), Value::String(name.to_string()));
    Value::Object(body)
}

pub(crate) fn page<T: Serialize>(name: &str, fields: T) -> HttpResponse {
    HttpResponse::Ok().json(page_body(name, fields))
}

#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[get("/")]
async fn home() -> impl Responder {
    page("index", json!({}))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(home)
        .configure(auth::configure)
        .configure(records::configure)
        .configure(profiles::configure)
        .configure(qr::configure)
        .configure(devices::configure)
        .configure(settings::configure);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_body_tags_the_page() {
        let body = page_body("dashboard", json!({ "q": "flu", "rows": [] }));
        assert_eq!(body["page"], "dashboard");
        assert_eq!(body["q"], "flu");
    }

    #[test]
    fn redirect_sets_location() {
        let res = redirect("/qa");
        assert_eq!(res.status(), actix_web::http::StatusCode::FOUND);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/qa");
    }
}
