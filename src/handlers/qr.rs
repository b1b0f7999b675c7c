use super::page;
use crate::db::DbPool;
use crate::errors::ApiError;
use crate::models::PatientProfile;
use crate::qr::{parse, render_base64_svg, QrPayload};
use crate::services::ProfileService;
use actix_web::{get, post, web, HttpResponse};
use log::{debug, error};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize, Debug, Default)]
pub struct VerifyQrRequest {
    pub qr_data: Option<String>,
}

fn qr_image(profile: &PatientProfile) -> Result<String, ApiError> {
    render_base64_svg(&QrPayload::for_profile(profile).to_json()).map_err(|e| {
        error!("QR generation failed for profile {}: {}", profile.id, e);
        ApiError::InternalError("Failed to generate QR code".to_string())
    })
}

#[get("/qr/{id}")]
async fn qr_page(pool: web::Data<DbPool>, path: web::Path<i32>) -> Result<HttpResponse, ApiError> {
    let profile = ProfileService::get(path.into_inner(), &pool).await?;
    let image = qr_image(&profile)?;
    Ok(page("qr_code", json!({ "qr_image": image, "patient": profile })))
}

#[get("/api/qr/{id}")]
async fn qr_json(pool: web::Data<DbPool>, path: web::Path<i32>) -> Result<HttpResponse, ApiError> {
    let profile = ProfileService::get(path.into_inner(), &pool).await?;
    let image = qr_image(&profile)?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "qr_image": image,
        "patient_id": profile.id,
        "patient_name": profile.name,
    })))
}

#[post("/api/verify-qr")]
async fn verify_qr(pool: web::Data<DbPool>, body: web::Json<VerifyQrRequest>) -> Result<HttpResponse, ApiError> {
    let data = match body.qr_data.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(data) => data,
        None => {
            return Ok(HttpResponse::BadRequest()
                .json(json!({ "status": "error", "message": "QR code data is required" })))
        },
    };

    let not_found = || {
        HttpResponse::NotFound()
            .json(json!({ "status": "error", "message": "Invalid QR code or patient not found" }))
    };

    let payload = match parse(data) {
        Ok(payload) => payload,
        Err(e) => {
            debug!("Rejected QR payload: {}", e);
            return Ok(not_found());
        },
    };

    match ProfileService::find(payload.patient_id, &pool).await? {
        Some(profile) => Ok(HttpResponse::Ok().json(json!({
            "status": "success",
            "patient_id": profile.id,
            "patient_name": profile.name,
            "profile": profile,
        }))),
        None => Ok(not_found()),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    // `/qr/scan` is registered by the auth handlers and must win over `/qr/{id}`.
    cfg.service(qr_page).service(qr_json).service(verify_qr);
}
