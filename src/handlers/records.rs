//! Intake submissions, the visit dashboard, the archive store and CSV exports.

use super::{page, redirect, RECENT_LIMIT};
use crate::db::DbPool;
use crate::errors::ApiError;
use crate::events::EventBroker;
use crate::export::{self, PATIENTS_FILENAME, STORE_FILENAME};
use crate::models::{IntakeRequest, SearchQuery, VisitFields};
use crate::sensor::{fill_missing_vitals, SensorHub};
use crate::services::{PatientService, ProfileService, StoreService};
use actix_web::http::{header, StatusCode};
use actix_web::{get, post, web, HttpResponse};
use log::{debug, error, info};
use serde_json::{json, Value};

#[derive(Debug, PartialEq, Eq)]
pub enum RobotIdError {
    Missing,
    Malformed,
}

/// Profile id sent by the intake robot. Absent, null, zero and blank all count as missing.
pub fn robot_patient_id(raw: Option<&Value>) -> Result<i32, RobotIdError> {
    let value = match raw {
        None | Some(Value::Null) | Some(Value::Bool(false)) => return Err(RobotIdError::Missing),
        Some(value) => value,
    };
    match value {
        Value::Number(n) => {
            if n.as_f64() == Some(0.0) {
                return Err(RobotIdError::Missing);
            }
            n.as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .and_then(|n| i32::try_from(n).ok())
                .ok_or(RobotIdError::Malformed)
        },
        Value::String(s) if s.is_empty() => Err(RobotIdError::Missing),
        Value::String(s) => s.trim().parse::<i32>().map_err(|_| RobotIdError::Malformed),
        _ => Err(RobotIdError::Malformed),
    }
}

fn status_error(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(json!({ "status": "error", "message": message.into() }))
}

fn csv_attachment(body: Vec<u8>, filename: &str) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(body)
}

fn export_failed(e: csv::Error) -> ApiError {
    error!("CSV export failed: {}", e);
    ApiError::InternalError("Failed to build CSV export".to_string())
}

#[post("/api/patient")]
async fn submit_intake(
    pool: web::Data<DbPool>,
    hub: web::Data<SensorHub>,
    broker: web::Data<EventBroker>,
    body: web::Json<IntakeRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut visit = body.into_inner().visit;
    fill_missing_vitals(&mut visit, &hub.latest());
    debug!("Intake submission for {:?}", visit.name);

    visit.profile_id = Some(ProfileService::get_or_create(&visit, &pool).await?);
    let created = PatientService::insert(visit, &pool).await?;
    broker.publish_patient_added(created.id, created.profile_id);

    Ok(HttpResponse::Ok().json(json!({ "status": "ok", "id": created.id })))
}

#[post("/api/robot-patient")]
async fn submit_robot_intake(
    pool: web::Data<DbPool>,
    hub: web::Data<SensorHub>,
    broker: web::Data<EventBroker>,
    body: web::Json<IntakeRequest>,
) -> Result<HttpResponse, ApiError> {
    let IntakeRequest { patient_id, visit } = body.into_inner();
    let profile_id = match robot_patient_id(patient_id.as_ref()) {
        Ok(id) => id,
        Err(RobotIdError::Missing) => {
            return Ok(status_error(StatusCode::BAD_REQUEST, "Patient ID is required"))
        },
        Err(RobotIdError::Malformed) => {
            return Ok(status_error(StatusCode::BAD_REQUEST, "Invalid Patient ID format"))
        },
    };

    if ProfileService::find(profile_id, &pool).await?.is_none() {
        return Ok(status_error(
            StatusCode::NOT_FOUND,
            format!("Patient profile with ID {} not found", profile_id),
        ));
    }

    let mut visit = visit;
    visit.profile_id = Some(profile_id);
    fill_missing_vitals(&mut visit, &hub.latest());
    let created = PatientService::insert(visit, &pool).await?;
    broker.publish_patient_added(created.id, Some(profile_id));
    info!("Robot interview {} linked to profile {}", created.id, profile_id);

    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "id": created.id,
        "profile_id": profile_id,
        "message": format!("Robot interview data successfully linked to patient profile {}", profile_id)
    })))
}

#[get("/dashboard")]
async fn dashboard(pool: web::Data<DbPool>, query: web::Query<SearchQuery>) -> Result<HttpResponse, ApiError> {
    let term = query.term();
    let rows = PatientService::search(term.clone(), None, &pool).await?;
    debug!("Dashboard listed {} visits", rows.len());
    Ok(page("dashboard", json!({ "rows": rows, "q": term.unwrap_or_default() })))
}

#[get("/store")]
async fn store(pool: web::Data<DbPool>, query: web::Query<SearchQuery>) -> Result<HttpResponse, ApiError> {
    let term = query.term();
    let rows = StoreService::search(term.clone(), None, &pool).await?;
    Ok(page("store", json!({ "rows": rows, "q": term.unwrap_or_default() })))
}

#[post("/store/delete/{id}")]
async fn delete_stored(pool: web::Data<DbPool>, path: web::Path<i32>) -> Result<HttpResponse, ApiError> {
    StoreService::delete(path.into_inner(), &pool).await?;
    Ok(redirect("/store"))
}

#[get("/view/{id}")]
async fn archive_visit(
    pool: web::Data<DbPool>,
    broker: web::Data<EventBroker>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let visit_id = path.into_inner();
    match PatientService::archive(visit_id, &pool).await {
        Ok(stored_id) => {
            broker.publish_patient_archived(stored_id);
            Ok(redirect(format!("/stored/{}", stored_id)))
        },
        Err(ApiError::NotFoundError(_)) => {
            debug!("Visit {} already gone, nothing to archive", visit_id);
            Ok(redirect("/dashboard"))
        },
        Err(e) => Err(e),
    }
}

#[get("/report/{id}")]
async fn report(pool: web::Data<DbPool>, path: web::Path<i32>) -> Result<HttpResponse, ApiError> {
    let visit = PatientService::get(path.into_inner(), &pool).await?;
    Ok(page("report", json!({ "patient": visit })))
}

#[get("/stored/{id}")]
async fn stored_report(pool: web::Data<DbPool>, path: web::Path<i32>) -> Result<HttpResponse, ApiError> {
    let record = StoreService::get(path.into_inner(), &pool).await?;
    Ok(page("stored_report", json!({ "patient": record })))
}

#[get("/edit/{id}")]
async fn edit_form(pool: web::Data<DbPool>, path: web::Path<i32>) -> Result<HttpResponse, ApiError> {
    let visit = PatientService::get(path.into_inner(), &pool).await?;
    Ok(page("edit", json!({ "patient": visit })))
}

#[post("/edit/{id}")]
async fn edit_submit(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
    form: web::Form<VisitFields>,
) -> Result<HttpResponse, ApiError> {
    let visit_id = path.into_inner();
    PatientService::update(visit_id, form.into_inner(), &pool).await?;
    Ok(redirect(format!("/report/{}", visit_id)))
}

#[post("/delete/{id}")]
async fn delete_visit(pool: web::Data<DbPool>, path: web::Path<i32>) -> Result<HttpResponse, ApiError> {
    PatientService::delete(path.into_inner(), &pool).await?;
    Ok(redirect("/dashboard"))
}

#[get("/export.csv")]
async fn export_visits(pool: web::Data<DbPool>, query: web::Query<SearchQuery>) -> Result<HttpResponse, ApiError> {
    let rows = PatientService::search(query.term(), None, &pool).await?;
    let body = export::visits_csv(&rows).map_err(export_failed)?;
    info!("Exported {} visits", rows.len());
    Ok(csv_attachment(body, PATIENTS_FILENAME))
}

#[get("/store.csv")]
async fn export_store(pool: web::Data<DbPool>, query: web::Query<SearchQuery>) -> Result<HttpResponse, ApiError> {
    let rows = StoreService::search(query.term(), None, &pool).await?;
    let body = export::stored_csv(&rows).map_err(export_failed)?;
    info!("Exported {} stored records", rows.len());
    Ok(csv_attachment(body, STORE_FILENAME))
}

#[get("/api/patients/recent")]
async fn recent_visits(pool: web::Data<DbPool>, query: web::Query<SearchQuery>) -> Result<HttpResponse, ApiError> {
    let limit = query.limit_or(RECENT_LIMIT) as i64;
    let rows = PatientService::search(query.term(), Some(limit), &pool).await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[get("/api/stored/recent")]
async fn recent_stored(pool: web::Data<DbPool>, query: web::Query<SearchQuery>) -> Result<HttpResponse, ApiError> {
    let limit = query.limit_or(RECENT_LIMIT) as i64;
    let rows = StoreService::search(query.term(), Some(limit), &pool).await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[get("/api/profiles/list")]
async fn profile_list(pool: web::Data<DbPool>, query: web::Query<SearchQuery>) -> Result<HttpResponse, ApiError> {
    let profiles = ProfileService::directory(query.term(), &pool).await?;
    Ok(HttpResponse::Ok().json(profiles))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(submit_intake)
        .service(submit_robot_intake)
        .service(dashboard)
        .service(store)
        .service(delete_stored)
        .service(archive_visit)
        .service(report)
        .service(stored_report)
        .service(edit_form)
        .service(edit_submit)
        .service(delete_visit)
        .service(export_visits)
        .service(export_store)
        .service(recent_visits)
        .service(recent_stored)
        .service(profile_list);
}
