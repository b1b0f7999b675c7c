use super::{page, redirect};
use crate::db::DbPool;
use crate::errors::ApiError;
use crate::gateway::{parse_patient_id, patient_account_url};
use crate::handlers::auth::PatientIdQuery;
use crate::models::{PatientProfile, ProfileFields, ProfileVisits, SearchQuery};
use crate::services::{representative_photo, ProfileService};
use crate::session::SessionState;
use actix_web::{get, post, web, HttpResponse};
use log::{debug, info};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize, Debug)]
pub struct PhotoForm {
    #[serde(default)]
    pub filename: String,
    pub patient_id: Option<String>,
}

/// Profile whose account page is being opened. Patients always get their own.
pub fn account_target(session: &SessionState, requested: Option<&str>) -> Option<i32> {
    if session.is_staff() {
        requested.and_then(parse_patient_id)
    } else {
        session.patient_id()
    }
}

async fn account_body(
    profile: Option<PatientProfile>,
    pool: &DbPool,
) -> Result<serde_json::Value, ApiError> {
    let profile = match profile {
        Some(profile) => profile,
        None => return Ok(json!({ "patient": null, "visits": [], "representative_photo": null })),
    };
    let visits: ProfileVisits = ProfileService::visits(profile.id, pool).await?;
    let photo = representative_photo(&profile, visits.latest_photo());
    Ok(json!({
        "patient": profile,
        "visits": visits.timeline(),
        "representative_photo": photo,
    }))
}

#[get("/PatientProfiles.html")]
async fn directory(pool: web::Data<DbPool>, query: web::Query<SearchQuery>) -> Result<HttpResponse, ApiError> {
    let term = query.term();
    let profiles = ProfileService::directory(term.clone(), &pool).await?;
    let totals = ProfileService::totals(&pool).await?;
    debug!("Profile directory listed {} profiles", profiles.len());
    Ok(page("patient_profiles", json!({
        "profiles": profiles,
        "totals": totals,
        "search": term.unwrap_or_default(),
    })))
}

#[get("/PatientAccount.html")]
async fn account(
    pool: web::Data<DbPool>,
    session: SessionState,
    query: web::Query<PatientIdQuery>,
) -> Result<HttpResponse, ApiError> {
    let profile = match account_target(&session, query.patient_id.as_deref()) {
        Some(id) => ProfileService::find(id, &pool).await?,
        None => None,
    };
    let body = account_body(profile, &pool).await?;
    Ok(page("patient_account", body))
}

#[get("/patient_profile/{id}")]
async fn profile_alias(path: web::Path<i32>) -> HttpResponse {
    redirect(patient_account_url(path.into_inner()))
}

#[get("/profile/{id}", name = "profile")]
async fn profile_page(pool: web::Data<DbPool>, path: web::Path<i32>) -> Result<HttpResponse, ApiError> {
    let profile = ProfileService::get(path.into_inner(), &pool).await?;
    let body = account_body(Some(profile), &pool).await?;
    Ok(page("profile", body))
}

#[get("/doctor/create_patient")]
async fn create_patient_form() -> HttpResponse {
    page("create_patient", json!({}))
}

#[post("/doctor/create_patient")]
async fn create_patient(pool: web::Data<DbPool>, form: web::Form<ProfileFields>) -> Result<HttpResponse, ApiError> {
    let fields = form.into_inner();
    if fields.name.as_deref().map(str::trim).unwrap_or_default().is_empty() {
        return Err(ApiError::ValidationError("Patient name is required".to_string()));
    }
    let profile_id = ProfileService::create(fields, &pool).await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "success", "patient_id": profile_id })))
}

#[get("/doctor/manage_patients")]
async fn manage_patients(pool: web::Data<DbPool>, query: web::Query<SearchQuery>) -> Result<HttpResponse, ApiError> {
    let term = query.term();
    let profiles = ProfileService::directory(term.clone(), &pool).await?;
    Ok(page("manage_patients", json!({ "profiles": profiles, "search": term.unwrap_or_default() })))
}

#[get("/doctor/edit_patient/{id}")]
async fn edit_patient_form(pool: web::Data<DbPool>, path: web::Path<i32>) -> Result<HttpResponse, ApiError> {
    let profile = ProfileService::get(path.into_inner(), &pool).await?;
    Ok(page("edit_patient", json!({ "patient": profile })))
}

#[post("/doctor/edit_patient/{id}")]
async fn edit_patient(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
    form: web::Form<ProfileFields>,
) -> Result<HttpResponse, ApiError> {
    let profile_id = path.into_inner();
    ProfileService::update(profile_id, form.into_inner(), &pool).await?;
    info!("Profile {} edited", profile_id);
    Ok(redirect(patient_account_url(profile_id)))
}

#[get("/doctor/patient_visits/{id}")]
async fn patient_visits(pool: web::Data<DbPool>, path: web::Path<i32>) -> Result<HttpResponse, ApiError> {
    let profile = ProfileService::get(path.into_inner(), &pool).await?;
    let visits = ProfileService::visits(profile.id, &pool).await?;
    Ok(page("patient_visits", json!({
        "patient": profile,
        "visits": visits.timeline(),
        "current_count": visits.current.len(),
        "archived_count": visits.archived.len(),
    })))
}

#[post("/doctor/delete_profile/{id}")]
async fn delete_profile(pool: web::Data<DbPool>, path: web::Path<i32>) -> Result<HttpResponse, ApiError> {
    ProfileService::delete(path.into_inner(), &pool).await?;
    Ok(redirect("/PatientProfiles.html"))
}

#[post("/patient/photo")]
async fn set_patient_photo(
    pool: web::Data<DbPool>,
    session: SessionState,
    form: web::Form<PhotoForm>,
) -> Result<HttpResponse, ApiError> {
    let filename = form.filename.trim().to_string();
    if filename.is_empty() {
        return Err(ApiError::ValidationError("Photo filename is required".to_string()));
    }
    let profile_id = account_target(&session, form.patient_id.as_deref())
        .ok_or_else(|| ApiError::ValidationError("Patient ID is required".to_string()))?;
    ProfileService::set_photo(profile_id, filename, &pool).await?;
    Ok(redirect(patient_account_url(profile_id)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(directory)
        .service(account)
        .service(profile_alias)
        .service(profile_page)
        .service(create_patient_form)
        .service(create_patient)
        .service(manage_patients)
        .service(edit_patient_form)
        .service(edit_patient)
        .service(patient_visits)
        .service(delete_profile)
        .service(set_patient_photo);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Login, Role};

    #[test]
    fn staff_open_the_requested_account() {
        let doctor = SessionState::begin(Login::Doctor);
        assert_eq!(account_target(&doctor, Some("12")), Some(12));
        assert_eq!(account_target(&doctor, Some("x")), None);
        assert_eq!(account_target(&doctor, None), None);
    }

    #[test]
    fn patients_only_open_their_own() {
        let patient = SessionState::begin(Login::Patient(3));
        assert_eq!(account_target(&patient, Some("12")), Some(3));
        assert_eq!(account_target(&patient, None), Some(3));
        let unbound = SessionState::from_parts(Some(Role::Patient), None);
        assert_eq!(account_target(&unbound, Some("12")), None);
    }

    #[test]
    fn photo_form_defaults_blank() {
        let form: PhotoForm = serde_json::from_str(r#"{"patient_id":"4"}"#).unwrap();
        assert!(form.filename.is_empty());
        assert_eq!(form.patient_id.as_deref(), Some("4"));
    }
}
