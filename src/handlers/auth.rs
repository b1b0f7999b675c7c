use super::{page, redirect};
use crate::db::DbPool;
use crate::errors::ApiError;
use crate::gateway::{self, parse_patient_id, HOSPITAL_LOGIN};
use crate::models::{DoctorLoginForm, HospitalLoginForm, PatientSigninForm};
use crate::qr;
use crate::services::AuthService;
use crate::session::{Login, SessionCodec, SessionState};
use actix_web::http::header;
use actix_web::{get, post, routes, web, HttpResponse, Responder};
use log::{debug, info};
use serde::Deserialize;
use serde_json::json;

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const INVALID_PATIENT: &str = "Invalid Username or Password";
const QR_MISMATCH: &str = "This QR belongs to a different patient. Please check and try again.";

#[derive(Deserialize, Debug, Default)]
pub struct PatientIdQuery {
    pub patient_id: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ScanQuery {
    pub patient_id: Option<String>,
    pub data: Option<String>,
}

/// Replaces the whole session with `login` and sends the user to its landing page.
fn start_session(codec: &SessionCodec, login: Login) -> Result<HttpResponse, ApiError> {
    let state = SessionState::begin(login);
    let cookie = codec.issue(&state)?;
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, gateway::landing_page(&state)))
        .cookie(cookie)
        .finish())
}

fn rejected(page_name: &'static str, message: &str) -> ApiError {
    ApiError::auth(page_name, message)
}

fn signin_rejected(message: &str, scanned: Option<i32>) -> ApiError {
    ApiError::AuthError { page: "patient_signin", message: message.to_string(), patient_id: scanned }
}

/// A scanned QR id must name the profile that just signed in.
pub fn qr_matches(scanned: Option<i32>, verified: i32) -> bool {
    scanned.map_or(true, |id| id == verified)
}

#[routes]
#[get("/hospital_login")]
#[get("/login/hospital")]
async fn hospital_login_page() -> impl Responder {
    page("login_hospital", json!({}))
}

#[routes]
#[post("/hospital_login")]
#[post("/login/hospital")]
async fn hospital_login(
    pool: web::Data<DbPool>,
    codec: web::Data<SessionCodec>,
    form: web::Form<HospitalLoginForm>,
) -> Result<HttpResponse, ApiError> {
    debug!("Hospital login attempt for: {}", form.hospital_id);
    match AuthService::hospital_login(&form.hospital_id, &form.hospital_pw, &pool).await? {
        Some(login) => {
            info!("Hospital login succeeded for {} as {:?}", form.hospital_id, login);
            start_session(&codec, login)
        },
        None => {
            debug!("Hospital login failed for: {}", form.hospital_id);
            Err(rejected("login_hospital", INVALID_CREDENTIALS))
        },
    }
}

#[routes]
#[get("/doctor_login")]
#[get("/login/doctor")]
async fn doctor_login_page() -> impl Responder {
    page("login_doctor", json!({}))
}

#[routes]
#[post("/doctor_login")]
#[post("/login/doctor")]
async fn doctor_login(
    pool: web::Data<DbPool>,
    codec: web::Data<SessionCodec>,
    form: web::Form<DoctorLoginForm>,
) -> Result<HttpResponse, ApiError> {
    debug!("Doctor login attempt for: {}", form.doctor_id);
    match AuthService::doctor_login(&form.doctor_id, &form.doctor_pw, &pool).await? {
        Some(login) => {
            info!("Doctor {} logged in", form.doctor_id);
            start_session(&codec, login)
        },
        None => {
            debug!("Doctor login failed for: {}", form.doctor_id);
            Err(rejected("login_doctor", INVALID_CREDENTIALS))
        },
    }
}

#[get("/logout")]
async fn logout() -> impl Responder {
    HttpResponse::Found()
        .insert_header((header::LOCATION, HOSPITAL_LOGIN))
        .cookie(SessionCodec::removal())
        .finish()
}

#[routes]
#[get("/PatientSignin.html")]
#[get("/patient_signin")]
async fn patient_signin_page(query: web::Query<PatientIdQuery>) -> impl Responder {
    let patient_id = query.patient_id.as_deref().and_then(parse_patient_id);
    page("patient_signin", json!({ "patient_id": patient_id }))
}

#[routes]
#[post("/patient/signin")]
#[post("/patient_signin")]
async fn patient_signin(
    pool: web::Data<DbPool>,
    codec: web::Data<SessionCodec>,
    query: web::Query<PatientIdQuery>,
    form: web::Form<PatientSigninForm>,
) -> Result<HttpResponse, ApiError> {
    // Non-numeric ids from the form or query are ignored.
    let scanned = form
        .patient_id
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .or(query.patient_id.as_deref())
        .and_then(parse_patient_id);

    let verified = match AuthService::patient_login(&form.username, &form.password, &pool).await? {
        Some(profile_id) => profile_id,
        None => {
            debug!("Patient sign-in failed for: {}", form.username);
            return Err(signin_rejected(INVALID_PATIENT, scanned));
        },
    };

    if !qr_matches(scanned, verified) {
        info!("Patient {} signed in with a QR for profile {:?}", verified, scanned);
        return Err(signin_rejected(QR_MISMATCH, scanned));
    }

    info!("Patient {} signed in", verified);
    start_session(&codec, Login::Patient(verified))
}

#[get("/qr/scan")]
async fn qr_scan(session: SessionState, query: web::Query<ScanQuery>) -> impl Responder {
    let scanned = qr::scan_id(query.patient_id.as_deref(), query.data.as_deref());
    let handoff = gateway::qr_handoff(&session, scanned);
    debug!("QR scan {:?} by {:?} -> {}", scanned, session.role(), handoff.redirect);
    if handoff.clear_session {
        HttpResponse::Found()
            .insert_header((header::LOCATION, handoff.redirect))
            .cookie(SessionCodec::removal())
            .finish()
    } else {
        redirect(handoff.redirect)
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(hospital_login_page)
        .service(hospital_login)
        .service(doctor_login_page)
        .service(doctor_login)
        .service(logout)
        .service(patient_signin_page)
        .service(patient_signin)
        .service(qr_scan);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SESSION_COOKIE;
    use actix_web::{http::StatusCode, test, App, ResponseError};

    fn codec() -> SessionCodec {
        SessionCodec::new("auth-handler-tests", 1)
    }

    #[::core::prelude::v1::test]
    fn qr_must_match_verified_profile() {
        assert!(qr_matches(None, 4));
        assert!(qr_matches(Some(4), 4));
        assert!(!qr_matches(Some(5), 4));
    }

    async fn rejection_body(err: ApiError) -> (StatusCode, serde_json::Value) {
        let res = err.error_response();
        let status = res.status();
        let bytes = actix_web::body::to_bytes(res.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn failed_staff_login_is_generic_401() {
        for page_name in ["login_hospital", "login_doctor"] {
            let (status, body) = rejection_body(rejected(page_name, INVALID_CREDENTIALS)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body, json!({ "page": page_name, "error": "Invalid credentials" }));
        }
    }

    #[actix_web::test]
    async fn qr_mismatch_keeps_scanned_id_on_signin_page() {
        let (status, body) = rejection_body(signin_rejected(QR_MISMATCH, Some(9))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["page"], "patient_signin");
        assert_eq!(body["error"], QR_MISMATCH);
        assert_eq!(body["patient_id"], 9);
    }

    #[::core::prelude::v1::test]
    fn login_replaces_session_and_lands_by_role() {
        let res = start_session(&codec(), Login::Limited).unwrap();
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/qa");
        let cookie = res.cookies().find(|c| c.name() == SESSION_COOKIE).unwrap();
        assert_eq!(codec().decode(cookie.value()), SessionState::begin(Login::Limited));
    }

    #[actix_web::test]
    async fn scan_by_other_patient_clears_session() {
        let app = test::init_service(
            App::new().app_data(web::Data::new(codec())).service(qr_scan),
        )
        .await;
        let token = codec().encode(&SessionState::begin(Login::Patient(7))).unwrap().unwrap();
        let req = test::TestRequest::get()
            .uri("/qr/scan?patient_id=9")
            .cookie(actix_web::cookie::Cookie::new(SESSION_COOKIE, token))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/patient_signin?patient_id=9");
        let removal = res.response().cookies().find(|c| c.name() == SESSION_COOKIE).unwrap();
        assert_eq!(removal.value(), "");
    }

    #[actix_web::test]
    async fn malformed_scan_goes_to_signin_page() {
        let app = test::init_service(App::new().service(qr_scan)).await;
        let req = test::TestRequest::get().uri("/qr/scan?data=%7Bbroken").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/PatientSignin.html");
    }

    #[actix_web::test]
    async fn logout_removes_cookie() {
        let app = test::init_service(App::new().service(logout)).await;
        let res = test::call_service(&app, test::TestRequest::get().uri("/logout").to_request()).await;
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/hospital_login");
        assert!(res.response().cookies().any(|c| c.name() == SESSION_COOKIE));
    }
}
