use super::{page, redirect};
use crate::credentials::{ADMIN_ID_KEY, ADMIN_PASSWORD_KEY, DOCTOR_ID_KEY, DOCTOR_PASSWORD_KEY};
use crate::db::DbPool;
use crate::errors::ApiError;
use crate::models::SettingsForm;
use crate::services::SettingsService;
use actix_web::{get, post, web, HttpResponse};
use log::info;
use serde_json::json;

fn filled(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Both halves of a credential pair, or nothing when either is blank.
pub fn pair<'a>(id: &'a Option<String>, password: &'a Option<String>) -> Option<(&'a str, &'a str)> {
    Some((filled(id)?, password.as_deref().filter(|p| !p.is_empty())?))
}

fn row_id(raw: &Option<String>) -> Result<Option<i32>, ApiError> {
    match filled(raw) {
        Some(raw) => raw
            .parse::<i32>()
            .map(Some)
            .map_err(|_| ApiError::ValidationError(format!("Invalid account id: {}", raw))),
        None => Ok(None),
    }
}

#[get("/settings")]
async fn settings_page(pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let admin_id = SettingsService::get(ADMIN_ID_KEY, &pool).await?;
    let doctor_id = SettingsService::get(DOCTOR_ID_KEY, &pool).await?;
    let doctors = SettingsService::list_doctors(&pool).await?;
    let hospitals = SettingsService::list_hospitals(&pool).await?;
    Ok(page("settings", json!({
        "admin_id": admin_id,
        "doctor_id": doctor_id,
        "doctors": doctors,
        "hospitals": hospitals,
    })))
}

#[post("/settings")]
async fn update_settings(pool: web::Data<DbPool>, form: web::Form<SettingsForm>) -> Result<HttpResponse, ApiError> {
    let form = form.into_inner();

    if let Some((id, password)) = pair(&form.hospital_id, &form.hospital_pw) {
        SettingsService::set_pair(ADMIN_ID_KEY, ADMIN_PASSWORD_KEY, id, password, &pool).await?;
    }
    if let Some((id, password)) = pair(&form.doctor_id, &form.doctor_pw) {
        SettingsService::set_pair(DOCTOR_ID_KEY, DOCTOR_PASSWORD_KEY, id, password, &pool).await?;
    }
    if let Some((id, password)) = pair(&form.new_doctor_id, &form.new_doctor_pw) {
        let name = filled(&form.new_doctor_name).map(str::to_string);
        SettingsService::add_doctor(id, password, name, &pool).await?;
    }
    if let Some(id) = row_id(&form.delete_doctor_id)? {
        SettingsService::delete_doctor(id, &pool).await?;
        info!("Removed doctor account {}", id);
    }
    if let Some((id, password)) = pair(&form.new_hospital_id, &form.new_hospital_pw) {
        let name = filled(&form.new_hospital_name).map(str::to_string);
        SettingsService::add_hospital(id, password, name, &pool).await?;
    }
    if let Some(id) = row_id(&form.delete_hospital_id)? {
        SettingsService::delete_hospital(id, &pool).await?;
        info!("Removed hospital account {}", id);
    }

    Ok(redirect("/settings"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(settings_page).service(update_settings);
}
