//! Session state carried in a signed cookie.
//!
//! A session holds at most one [`Role`]. Every login builds a brand new
//! [`SessionState`] and replaces the cookie wholesale, so flags from an
//! earlier login can never survive a role change.

use crate::config::AppConfig;
use crate::errors::ApiError;
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpMessage, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

pub const SESSION_COOKIE: &str = "clinic_session";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Patient,
    Limited,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Doctor, Role::Patient, Role::Limited];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Patient => "patient",
            Role::Limited => "limited",
        }
    }

    /// Staff roles may open any patient's account.
    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::Patient)
    }
}

/// A successful credential check, ready to become a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Login {
    Admin,
    Doctor,
    Limited,
    Patient(i32),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    role: Option<Role>,
    patient_id: Option<i32>,
}

impl SessionState {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Fresh session for a verified login. Nothing from the previous session is kept.
    pub fn begin(login: Login) -> Self {
        match login {
            Login::Admin => Self { role: Some(Role::Admin), patient_id: None },
            Login::Doctor => Self { role: Some(Role::Doctor), patient_id: None },
            Login::Limited => Self { role: Some(Role::Limited), patient_id: None },
            Login::Patient(id) => Self { role: Some(Role::Patient), patient_id: Some(id) },
        }
    }

    pub(crate) fn from_parts(role: Option<Role>, patient_id: Option<i32>) -> Self {
        let patient_id = match role {
            Some(Role::Patient) => patient_id,
            _ => None,
        };
        Self { role, patient_id }
    }

    pub fn transition(&mut self, login: Login) {
        *self = Self::begin(login);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn patient_id(&self) -> Option<i32> {
        self.patient_id
    }

    pub fn is_anonymous(&self) -> bool {
        self.role.is_none()
    }

    pub fn is_staff(&self) -> bool {
        self.role.map(|r| r.is_staff()).unwrap_or(false)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<i32>,
}

/// Signs and verifies the session cookie.
#[derive(Clone)]
pub struct SessionCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_hours: i64,
}

impl SessionCodec {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_hours,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.session_secret, config.session_ttl)
    }

    pub fn encode(&self, state: &SessionState) -> Result<Option<String>, ApiError> {
        let role = match state.role {
            Some(role) => role,
            None => return Ok(None),
        };

        let now = Utc::now();
        let claims = SessionClaims {
            sub: role.as_str().to_string(),
            exp: (now + Duration::hours(self.ttl_hours)).timestamp() as usize,
            iat: now.timestamp() as usize,
            role,
            patient_id: state.patient_id,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map(Some)
            .map_err(|e| {
                error!("Failed to sign session token: {}", e);
                ApiError::InternalError("Failed to create session".to_string())
            })
    }

    /// Anything that fails verification (tampered, expired, garbage) reads as anonymous.
    pub fn decode(&self, token: &str) -> SessionState {
        match decode::<SessionClaims>(token, &self.decoding, &Validation::default()) {
            Ok(data) => SessionState::from_parts(Some(data.claims.role), data.claims.patient_id),
            Err(e) => {
                debug!("Discarding invalid session token: {}", e);
                SessionState::anonymous()
            }
        }
    }

    pub fn read(&self, msg: &HttpRequest) -> SessionState {
        msg.cookie(SESSION_COOKIE)
            .map(|c| self.decode(c.value()))
            .unwrap_or_default()
    }

    /// Cookie replacing whatever session the client held. Anonymous state yields a removal cookie.
    pub fn issue(&self, state: &SessionState) -> Result<Cookie<'static>, ApiError> {
        match self.encode(state)? {
            Some(token) => Ok(Cookie::build(SESSION_COOKIE, token)
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .max_age(CookieDuration::hours(self.ttl_hours))
                .finish()),
            None => Ok(Self::removal()),
        }
    }

    pub fn removal() -> Cookie<'static> {
        let mut cookie = Cookie::build(SESSION_COOKIE, "")
            .path("/")
            .http_only(true)
            .finish();
        cookie.make_removal();
        cookie
    }
}

impl FromRequest for SessionState {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let attached = req.extensions().get::<SessionState>().cloned();
        let state = attached
            .or_else(|| {
                req.app_data::<web::Data<SessionCodec>>()
                    .map(|codec| codec.read(req))
            })
            .unwrap_or_default();
        ready(Ok(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> SessionCodec {
        SessionCodec::new("test-secret-for-sessions", 1)
    }

    #[test]
    fn patient_session_survives_round_trip() {
        let state = SessionState::begin(Login::Patient(7));
        let token = codec().encode(&state).unwrap().unwrap();
        assert_eq!(codec().decode(&token), state);
    }

    #[test]
    fn anonymous_session_has_no_token() {
        assert!(codec().encode(&SessionState::anonymous()).unwrap().is_none());
        let cookie = codec().issue(&SessionState::anonymous()).unwrap();
        assert_eq!(cookie.value(), "");
    }

    #[test]
    fn token_signed_with_other_secret_is_anonymous() {
        let other = SessionCodec::new("a-completely-different-key", 1);
        let token = other.encode(&SessionState::begin(Login::Admin)).unwrap().unwrap();
        assert!(codec().decode(&token).is_anonymous());
    }

    #[test]
    fn expired_token_is_anonymous() {
        let past = (Utc::now() - Duration::hours(3)).timestamp() as usize;
        let claims = SessionClaims {
            sub: "doctor".to_string(),
            exp: past,
            iat: past,
            role: Role::Doctor,
            patient_id: None,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret-for-sessions"),
        )
        .unwrap();
        assert!(codec().decode(&token).is_anonymous());
    }

    #[test]
    fn garbage_token_is_anonymous() {
        assert!(codec().decode("not-a-token").is_anonymous());
    }

    #[test]
    fn staff_claims_never_carry_patient_id() {
        let state = SessionState::from_parts(Some(Role::Doctor), Some(4));
        assert_eq!(state.patient_id(), None);
    }

    #[test]
    fn transitions_keep_a_single_role() {
        let logins = [
            Login::Patient(3),
            Login::Doctor,
            Login::Patient(9),
            Login::Limited,
            Login::Admin,
            Login::Patient(1),
        ];
        let mut state = SessionState::anonymous();
        for login in logins {
            state.transition(login);
            let active = Role::ALL.iter().filter(|r| state.has_role(**r)).count();
            assert_eq!(active, 1);
            match login {
                Login::Patient(id) => assert_eq!(state.patient_id(), Some(id)),
                _ => assert_eq!(state.patient_id(), None),
            }
        }
        state.clear();
        assert!(state.is_anonymous());
        assert_eq!(state.patient_id(), None);
    }
}
