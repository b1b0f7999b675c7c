//! Access gateway.
//!
//! Every request path is classified into an [`Area`] through [`ROUTE_TABLE`],
//! then checked against the capability set of the caller's role. The decision
//! is a pure function of the request target and the session; applying it
//! (short-circuiting with a redirect) is the job of
//! [`crate::middleware::AccessGateway`].

use crate::session::{Role, SessionState};

pub const HOME: &str = "/";
pub const HOSPITAL_LOGIN: &str = "/hospital_login";
pub const DASHBOARD: &str = "/dashboard";
pub const QA_INTAKE: &str = "/qa";
pub const PATIENT_SIGNIN_PAGE: &str = "/PatientSignin.html";
pub const PATIENT_SIGNIN: &str = "/patient_signin";
pub const PATIENT_ACCOUNT: &str = "/PatientAccount.html";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Area {
    // Always public
    Health,
    Asset,
    AuthEndpoint,
    PatientSignIn,
    QrScan,
    // Login pages outside the public set
    Login,
    LoginAlias,
    // Doctor workspace
    Dashboard,
    Store,
    Export,
    RecordView,
    DoctorManagement,
    ProfileDirectory,
    Events,
    RealtimeApi,
    QrApi,
    // Shared with patients
    PatientAccount,
    QrCode,
    PhotoUpload,
    PatientPhoto,
    // QA intake station
    QaIntake,
    Camera,
    SensorApi,
    IntakeSubmission,
    QrVerify,
    // Anything else: admin only
    Unlisted,
}

impl Area {
    pub fn is_public(&self) -> bool {
        matches!(self, Area::Health | Area::Asset | Area::AuthEndpoint | Area::PatientSignIn | Area::QrScan)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Match {
    Exact,
    Prefix,
}

#[derive(Clone, Copy, Debug)]
pub struct RouteEntry {
    pub pattern: &'static str,
    pub matching: Match,
    pub area: Area,
}

impl RouteEntry {
    const fn exact(pattern: &'static str, area: Area) -> Self {
        Self { pattern, matching: Match::Exact, area }
    }

    const fn prefix(pattern: &'static str, area: Area) -> Self {
        Self { pattern, matching: Match::Prefix, area }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self.matching {
            Match::Exact => path == self.pattern,
            Match::Prefix => path.starts_with(self.pattern),
        }
    }
}

/// Ordered route table. The first matching entry classifies the path, so
/// narrower patterns sit above the broader prefixes they overlap.
pub const ROUTE_TABLE: &[RouteEntry] = &[
    RouteEntry::exact("/health", Area::Health),
    RouteEntry::prefix("/static", Area::Asset),
    RouteEntry::prefix("/uploads", Area::Asset),
    RouteEntry::exact("/login/hospital", Area::AuthEndpoint),
    RouteEntry::exact("/hospital_login", Area::AuthEndpoint),
    RouteEntry::exact("/login/doctor", Area::AuthEndpoint),
    RouteEntry::exact("/logout", Area::AuthEndpoint),
    RouteEntry::prefix("/PatientSignin", Area::PatientSignIn),
    RouteEntry::exact("/patient/signin", Area::PatientSignIn),
    RouteEntry::exact("/patient_signin", Area::PatientSignIn),
    RouteEntry::prefix("/qr/scan", Area::QrScan),
    RouteEntry::prefix("/login", Area::Login),
    RouteEntry::exact("/doctor_login", Area::LoginAlias),
    RouteEntry::prefix("/dashboard", Area::Dashboard),
    RouteEntry::prefix("/store.csv", Area::Export),
    RouteEntry::prefix("/stored/", Area::RecordView),
    RouteEntry::prefix("/store", Area::Store),
    RouteEntry::prefix("/export.csv", Area::Export),
    RouteEntry::prefix("/view/", Area::RecordView),
    RouteEntry::prefix("/doctor", Area::DoctorManagement),
    RouteEntry::prefix("/PatientProfiles.html", Area::ProfileDirectory),
    RouteEntry::prefix("/PatientAccount.html", Area::PatientAccount),
    RouteEntry::prefix("/qr/", Area::QrCode),
    RouteEntry::prefix("/api/qr/", Area::QrApi),
    RouteEntry::prefix("/events", Area::Events),
    RouteEntry::prefix("/api/patients", Area::RealtimeApi),
    RouteEntry::prefix("/api/stored", Area::RealtimeApi),
    RouteEntry::prefix("/api/profiles", Area::RealtimeApi),
    RouteEntry::prefix("/api/patient", Area::IntakeSubmission),
    RouteEntry::prefix("/api/robot-patient", Area::IntakeSubmission),
    RouteEntry::prefix("/api/sensor", Area::SensorApi),
    RouteEntry::prefix("/api/verify-qr", Area::QrVerify),
    RouteEntry::prefix("/qa", Area::QaIntake),
    RouteEntry::prefix("/camera", Area::Camera),
    RouteEntry::prefix("/take_picture", Area::Camera),
    RouteEntry::prefix("/upload_photo", Area::PhotoUpload),
    RouteEntry::prefix("/patient/photo", Area::PatientPhoto),
];

const DOCTOR_AREAS: &[Area] = &[
    Area::LoginAlias,
    Area::Dashboard,
    Area::Store,
    Area::Export,
    Area::RecordView,
    Area::DoctorManagement,
    Area::ProfileDirectory,
    Area::PatientAccount,
    Area::QrCode,
    Area::QrApi,
    Area::Events,
    Area::RealtimeApi,
];

const PATIENT_AREAS: &[Area] = &[
    Area::PatientAccount,
    Area::PatientSignIn,
    Area::QrCode,
    Area::AuthEndpoint,
    Area::PhotoUpload,
    Area::PatientPhoto,
];

const LIMITED_AREAS: &[Area] = &[
    Area::QaIntake,
    Area::Camera,
    Area::SensorApi,
    Area::IntakeSubmission,
    Area::PhotoUpload,
    Area::QrVerify,
    Area::PatientAccount,
];

const ANONYMOUS_AREAS: &[Area] = &[Area::Login, Area::LoginAlias];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grant {
    All,
    Areas(&'static [Area]),
}

impl Grant {
    pub fn permits(&self, area: Area) -> bool {
        match self {
            Grant::All => true,
            Grant::Areas(areas) => areas.contains(&area),
        }
    }
}

/// Capability set for a role; `None` is the anonymous caller.
pub fn grant_for(role: Option<Role>) -> Grant {
    match role {
        Some(Role::Admin) => Grant::All,
        Some(Role::Doctor) => Grant::Areas(DOCTOR_AREAS),
        Some(Role::Patient) => Grant::Areas(PATIENT_AREAS),
        Some(Role::Limited) => Grant::Areas(LIMITED_AREAS),
        None => Grant::Areas(ANONYMOUS_AREAS),
    }
}

pub fn classify(path: &str) -> Area {
    ROUTE_TABLE
        .iter()
        .find(|entry| entry.matches(path))
        .map(|entry| entry.area)
        .unwrap_or(Area::Unlisted)
}

/// Path plus raw query string of an incoming request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Target<'a> {
    pub path: &'a str,
    pub query: &'a str,
}

impl<'a> Target<'a> {
    pub fn new(path: &'a str, query: &'a str) -> Self {
        Self { path, query }
    }

    pub fn parse(uri: &'a str) -> Self {
        match uri.split_once('?') {
            Some((path, query)) => Self { path, query },
            None => Self { path: uri, query: "" },
        }
    }

    pub fn query_param(&self, key: &str) -> Option<&'a str> {
        self.query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn query_patient_id(&self) -> Option<i32> {
        self.query_param("patient_id").and_then(parse_patient_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect(String),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

pub fn patient_account_url(patient_id: i32) -> String {
    format!("{}?patient_id={}", PATIENT_ACCOUNT, patient_id)
}

pub fn patient_signin_url(patient_id: i32) -> String {
    format!("{}?patient_id={}", PATIENT_SIGNIN, patient_id)
}

/// Positive integer ids only; anything else reads as "no id".
pub fn parse_patient_id(raw: &str) -> Option<i32> {
    raw.trim().parse::<i32>().ok().filter(|id| *id > 0)
}

fn qr_path_id(path: &str) -> Option<i32> {
    path.strip_prefix("/qr/")
        .and_then(|rest| rest.split('/').next())
        .and_then(parse_patient_id)
}

/// Where a role lands after login, and where it is sent when it strays.
pub fn landing_page(session: &SessionState) -> String {
    match session.role() {
        Some(Role::Admin) => HOME.to_string(),
        Some(Role::Doctor) => DASHBOARD.to_string(),
        Some(Role::Limited) => QA_INTAKE.to_string(),
        Some(Role::Patient) => match session.patient_id() {
            Some(id) => patient_account_url(id),
            None => PATIENT_SIGNIN_PAGE.to_string(),
        },
        None => HOSPITAL_LOGIN.to_string(),
    }
}

// Patients only ever see their own account and QR code.
fn patient_owns_target(area: Area, target: &Target, own_id: Option<i32>) -> bool {
    match area {
        Area::PatientAccount => own_id.is_some() && target.query_patient_id() == own_id,
        Area::QrCode => own_id.is_some() && qr_path_id(target.path) == own_id,
        _ => true,
    }
}

pub fn evaluate(target: &Target, session: &SessionState) -> Decision {
    let area = classify(target.path);
    if area.is_public() {
        return Decision::Allow;
    }

    let role = session.role();
    let grant = grant_for(role);

    match role {
        Some(Role::Admin) => Decision::Allow,
        Some(Role::Patient) => {
            if grant.permits(area) && patient_owns_target(area, target, session.patient_id()) {
                Decision::Allow
            } else {
                Decision::Redirect(landing_page(session))
            }
        },
        _ => {
            if grant.permits(area) {
                Decision::Allow
            } else {
                Decision::Redirect(landing_page(session))
            }
        },
    }
}

/// Outcome of scanning a patient QR code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handoff {
    pub redirect: String,
    pub clear_session: bool,
}

pub fn qr_handoff(session: &SessionState, scanned: Option<i32>) -> Handoff {
    let scanned = match scanned.filter(|id| *id > 0) {
        Some(id) => id,
        None => {
            return Handoff { redirect: PATIENT_SIGNIN_PAGE.to_string(), clear_session: false };
        },
    };

    match session.role() {
        Some(role) if role.is_staff() => Handoff {
            redirect: patient_account_url(scanned),
            clear_session: false,
        },
        Some(_) if session.patient_id() == Some(scanned) => Handoff {
            redirect: patient_account_url(scanned),
            clear_session: false,
        },
        // Another patient's card: that session must not be reused.
        Some(_) => Handoff { redirect: patient_signin_url(scanned), clear_session: true },
        None => Handoff { redirect: patient_signin_url(scanned), clear_session: false },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Login;

    const PROBE_PATHS: &[&str] = &[
        "/",
        "/sensor",
        "/port",
        "/set_port",
        "/settings",
        "/static/css/app.css",
        "/uploads/patient_1234abcd.jpg",
        "/login/hospital",
        "/hospital_login",
        "/login/doctor",
        "/login/elsewhere",
        "/doctor_login",
        "/logout",
        "/PatientSignin.html",
        "/patient/signin",
        "/patient_signin",
        "/qr/scan",
        "/qr/scan?patient_id=3",
        "/qr/7",
        "/qr/9",
        "/qr/not-a-number",
        "/api/qr/7",
        "/dashboard",
        "/dashboard?q=flu",
        "/store",
        "/store.csv?q=flu",
        "/store/delete/4",
        "/stored/4",
        "/export.csv",
        "/view/12",
        "/report/12",
        "/edit/12",
        "/delete/12",
        "/doctor/create_patient",
        "/doctor/manage_patients",
        "/doctor/edit_patient/2",
        "/doctor/patient_visits/2",
        "/doctor/delete_profile/2",
        "/PatientProfiles.html",
        "/PatientAccount.html",
        "/PatientAccount.html?patient_id=7",
        "/PatientAccount.html?patient_id=9",
        "/PatientAccount.html?patient_id=abc",
        "/patient_profile/7",
        "/profile/7",
        "/events/patients",
        "/api/patients/recent",
        "/api/stored/recent",
        "/api/profiles/list",
        "/api/patient",
        "/api/robot-patient",
        "/api/sensor",
        "/api/sensor/history",
        "/api/verify-qr",
        "/qa",
        "/camera",
        "/camera/video_feed",
        "/camera_status",
        "/take_picture",
        "/test_photo",
        "/upload_photo",
        "/patient/photo",
        "/definitely/not/a/route",
    ];

    fn sessions() -> Vec<SessionState> {
        vec![
            SessionState::anonymous(),
            SessionState::begin(Login::Admin),
            SessionState::begin(Login::Doctor),
            SessionState::begin(Login::Limited),
            SessionState::begin(Login::Patient(7)),
            SessionState::from_parts(Some(Role::Patient), None),
        ]
    }

    fn decide(uri: &str, session: &SessionState) -> Decision {
        evaluate(&Target::parse(uri), session)
    }

    fn all_sample_uris() -> Vec<String> {
        let mut uris: Vec<String> = PROBE_PATHS.iter().map(|p| p.to_string()).collect();
        uris.extend(ROUTE_TABLE.iter().map(|entry| entry.pattern.to_string()));
        uris.extend(ROUTE_TABLE.iter().map(|entry| format!("{}extra", entry.pattern)));
        uris
    }

    #[test]
    fn anonymous_dashboard_goes_to_hospital_login() {
        assert_eq!(
            decide("/dashboard", &SessionState::anonymous()),
            Decision::Redirect("/hospital_login".to_string())
        );
    }

    #[test]
    fn doctor_may_export_store_csv() {
        let doctor = SessionState::begin(Login::Doctor);
        assert_eq!(evaluate(&Target::new("/store.csv", "q=flu"), &doctor), Decision::Allow);
    }

    #[test]
    fn limited_dashboard_goes_to_qa() {
        let limited = SessionState::begin(Login::Limited);
        assert_eq!(decide("/dashboard", &limited), Decision::Redirect("/qa".to_string()));
    }

    #[test]
    fn patient_cannot_open_another_account() {
        let patient = SessionState::begin(Login::Patient(7));
        assert_eq!(
            decide("/PatientAccount.html?patient_id=9", &patient),
            Decision::Redirect("/PatientAccount.html?patient_id=7".to_string())
        );
        assert_eq!(decide("/PatientAccount.html?patient_id=7", &patient), Decision::Allow);
    }

    #[test]
    fn patient_account_without_id_redirects_to_own() {
        let patient = SessionState::begin(Login::Patient(7));
        assert_eq!(
            decide("/PatientAccount.html", &patient),
            Decision::Redirect(patient_account_url(7))
        );
    }

    #[test]
    fn patient_qr_is_self_only() {
        let patient = SessionState::begin(Login::Patient(7));
        assert_eq!(decide("/qr/7", &patient), Decision::Allow);
        assert_eq!(decide("/qr/9", &patient), Decision::Redirect(patient_account_url(7)));
        assert_eq!(decide("/api/qr/7", &patient), Decision::Redirect(patient_account_url(7)));
    }

    #[test]
    fn unbound_patient_session_goes_to_signin() {
        let broken = SessionState::from_parts(Some(Role::Patient), None);
        assert_eq!(decide("/dashboard", &broken), Decision::Redirect(PATIENT_SIGNIN_PAGE.to_string()));
        assert_eq!(
            decide("/PatientAccount.html?patient_id=7", &broken),
            Decision::Redirect(PATIENT_SIGNIN_PAGE.to_string())
        );
    }

    #[test]
    fn public_paths_allowed_for_everyone() {
        let public = [
            "/static/app.js",
            "/uploads/x.jpg",
            "/login/hospital",
            "/hospital_login",
            "/login/doctor",
            "/logout",
            "/PatientSignin.html",
            "/patient/signin",
            "/patient_signin",
            "/qr/scan",
        ];
        for session in sessions() {
            for path in public {
                assert_eq!(decide(path, &session), Decision::Allow, "{} for {:?}", path, session);
            }
        }
    }

    #[test]
    fn anonymous_only_reaches_login_paths() {
        let anon = SessionState::anonymous();
        assert!(decide("/login/whatever", &anon).is_allow());
        assert!(decide("/doctor_login", &anon).is_allow());
        assert_eq!(decide("/qa", &anon), Decision::Redirect(HOSPITAL_LOGIN.to_string()));
        assert_eq!(decide("/", &anon), Decision::Redirect(HOSPITAL_LOGIN.to_string()));
    }

    #[test]
    fn doctor_allow_list() {
        let doctor = SessionState::begin(Login::Doctor);
        for path in [
            "/dashboard",
            "/store",
            "/stored/3",
            "/export.csv",
            "/view/3",
            "/doctor/manage_patients",
            "/doctor_login",
            "/PatientProfiles.html",
            "/PatientAccount.html?patient_id=44",
            "/qr/44",
            "/api/qr/44",
            "/events/patients",
            "/api/patients/recent",
            "/api/stored/recent",
            "/api/profiles/list",
        ] {
            assert!(decide(path, &doctor).is_allow(), "{}", path);
        }
        for path in ["/", "/settings", "/qa", "/camera", "/api/patient", "/report/3"] {
            assert_eq!(decide(path, &doctor), Decision::Redirect(DASHBOARD.to_string()), "{}", path);
        }
    }

    #[test]
    fn limited_allow_list() {
        let limited = SessionState::begin(Login::Limited);
        for path in [
            "/qa",
            "/camera",
            "/camera/video_feed",
            "/camera_status",
            "/take_picture",
            "/api/patient",
            "/api/robot-patient",
            "/api/sensor",
            "/api/sensor/history",
            "/upload_photo",
            "/api/verify-qr",
            "/PatientAccount.html?patient_id=5",
        ] {
            assert!(decide(path, &limited).is_allow(), "{}", path);
        }
        for path in ["/api/patients/recent", "/store", "/settings", "/qr/5"] {
            assert_eq!(decide(path, &limited), Decision::Redirect(QA_INTAKE.to_string()), "{}", path);
        }
    }

    #[test]
    fn admin_is_allowed_everywhere() {
        let admin = SessionState::begin(Login::Admin);
        for uri in all_sample_uris() {
            assert_eq!(decide(&uri, &admin), Decision::Allow, "{}", uri);
        }
    }

    #[test]
    fn patient_is_confined_to_own_pages() {
        let patient = SessionState::begin(Login::Patient(7));
        for uri in all_sample_uris() {
            let target = Target::parse(&uri);
            let area = classify(target.path);
            let permitted = area.is_public()
                || (PATIENT_AREAS.contains(&area) && patient_owns_target(area, &target, Some(7)));
            if !permitted {
                assert_eq!(
                    evaluate(&target, &patient),
                    Decision::Redirect("/PatientAccount.html?patient_id=7".to_string()),
                    "{}",
                    uri
                );
            }
        }
    }

    #[test]
    fn redirects_settle_within_two_hops() {
        for session in sessions() {
            for uri in all_sample_uris() {
                let mut current = uri.clone();
                let mut hops = 0;
                loop {
                    match decide(&current, &session) {
                        Decision::Allow => break,
                        Decision::Redirect(next) => {
                            hops += 1;
                            assert!(hops <= 2, "{} loops for {:?}", uri, session);
                            current = next;
                        },
                    }
                }
            }
        }
    }

    #[test]
    fn every_redirect_target_is_reachable_by_its_role() {
        for session in sessions() {
            let landing = landing_page(&session);
            assert!(decide(&landing, &session).is_allow(), "{} for {:?}", landing, session);
        }
    }

    #[test]
    fn table_patterns_classify_to_their_own_area() {
        for entry in ROUTE_TABLE {
            let area = classify(entry.pattern);
            // "/qr/scan" sits above "/qr/" and "/store.csv" above "/store": first match wins.
            assert_eq!(area, entry.area, "{}", entry.pattern);
        }
    }

    #[test]
    fn handoff_for_staff_opens_account() {
        for login in [Login::Admin, Login::Doctor, Login::Limited] {
            let handoff = qr_handoff(&SessionState::begin(login), Some(12));
            assert_eq!(handoff.redirect, patient_account_url(12));
            assert!(!handoff.clear_session);
        }
    }

    #[test]
    fn handoff_for_same_patient_opens_account() {
        let handoff = qr_handoff(&SessionState::begin(Login::Patient(12)), Some(12));
        assert_eq!(handoff, Handoff { redirect: patient_account_url(12), clear_session: false });
    }

    #[test]
    fn handoff_for_other_patient_clears_session() {
        let handoff = qr_handoff(&SessionState::begin(Login::Patient(7)), Some(9));
        assert_eq!(handoff, Handoff { redirect: "/patient_signin?patient_id=9".to_string(), clear_session: true });
    }

    #[test]
    fn handoff_for_anonymous_goes_to_signin() {
        let handoff = qr_handoff(&SessionState::anonymous(), Some(9));
        assert_eq!(handoff.redirect, patient_signin_url(9));
        assert!(!handoff.clear_session);
    }

    #[test]
    fn handoff_without_id_goes_to_signin_page() {
        for id in [None, Some(0), Some(-3)] {
            let handoff = qr_handoff(&SessionState::begin(Login::Patient(7)), id);
            assert_eq!(handoff.redirect, PATIENT_SIGNIN_PAGE);
            assert!(!handoff.clear_session);
        }
    }

    #[test]
    fn handoff_targets_are_allowed_after_transition() {
        // The scanned patient's own session reaches the account page directly.
        let after = SessionState::begin(Login::Patient(9));
        let handoff = qr_handoff(&SessionState::begin(Login::Patient(7)), Some(9));
        assert!(decide(&handoff.redirect, &SessionState::anonymous()).is_allow());
        assert!(decide(&patient_account_url(9), &after).is_allow());
    }

    #[test]
    fn patient_id_parsing() {
        assert_eq!(parse_patient_id("12"), Some(12));
        assert_eq!(parse_patient_id(" 5 "), Some(5));
        assert_eq!(parse_patient_id("0"), None);
        assert_eq!(parse_patient_id("-1"), None);
        assert_eq!(parse_patient_id("seven"), None);
        assert_eq!(Target::parse("/x?a=1&patient_id=4").query_patient_id(), Some(4));
        assert_eq!(Target::parse("/x?patient_id=").query_patient_id(), None);
    }
}
