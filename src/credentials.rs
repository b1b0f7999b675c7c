//! Credential verification for staff logins.
//!
//! Hospital login checks stores in a fixed order: the admin pair wins over a
//! limited hospital account, which wins over any doctor credential.

use crate::models::Setting;
use crate::session::Login;
use bcrypt::verify;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use log::{debug, warn};

pub const ADMIN_ID_KEY: &str = "admin_id";
pub const ADMIN_PASSWORD_KEY: &str = "admin_password";
pub const DOCTOR_ID_KEY: &str = "doctor_id";
pub const DOCTOR_PASSWORD_KEY: &str = "doctor_password";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// The single admin pair kept in settings.
    AdminPair,
    /// The configured doctor pair kept in settings.
    DoctorPair,
    DoctorAccount,
    HospitalAccount,
}

pub trait CredentialStore {
    fn verify(&mut self, kind: CredentialKind, id: &str, secret: &str) -> QueryResult<bool>;
}

/// Compares a secret against a bcrypt hash. Corrupt hashes never match.
pub fn check_secret(secret: &str, hash: &str) -> bool {
    match verify(secret, hash) {
        Ok(valid) => valid,
        Err(e) => {
            warn!("Stored password hash could not be checked: {}", e);
            false
        }
    }
}

pub fn resolve_hospital_login<S: CredentialStore>(
    store: &mut S,
    id: &str,
    secret: &str,
) -> QueryResult<Option<Login>> {
    if id.is_empty() || secret.is_empty() {
        return Ok(None);
    }
    if store.verify(CredentialKind::AdminPair, id, secret)? {
        return Ok(Some(Login::Admin));
    }
    if store.verify(CredentialKind::HospitalAccount, id, secret)? {
        return Ok(Some(Login::Limited));
    }
    resolve_doctor_login(store, id, secret)
}

pub fn resolve_doctor_login<S: CredentialStore>(
    store: &mut S,
    id: &str,
    secret: &str,
) -> QueryResult<Option<Login>> {
    if id.is_empty() || secret.is_empty() {
        return Ok(None);
    }
    if store.verify(CredentialKind::DoctorAccount, id, secret)?
        || store.verify(CredentialKind::DoctorPair, id, secret)?
    {
        return Ok(Some(Login::Doctor));
    }
    debug!("No credential store accepted id {}", id);
    Ok(None)
}

/// Credential store backed by the settings, doctors and hospitals tables.
pub struct PgCredentials<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> PgCredentials<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }

    fn setting(&mut self, name: &str) -> QueryResult<Option<String>> {
        use crate::schema::settings::dsl::*;
        settings
            .filter(key.eq(name))
            .first::<Setting>(self.conn)
            .optional()
            .map(|row| row.map(|s| s.value))
    }

    fn verify_pair(&mut self, id_key: &str, password_key: &str, id: &str, secret: &str) -> QueryResult<bool> {
        let stored_id = self.setting(id_key)?;
        if stored_id.as_deref() != Some(id) {
            return Ok(false);
        }
        Ok(self.setting(password_key)?
            .map(|hash| check_secret(secret, &hash))
            .unwrap_or(false))
    }
}

impl CredentialStore for PgCredentials<'_> {
    fn verify(&mut self, kind: CredentialKind, id: &str, secret: &str) -> QueryResult<bool> {
        match kind {
            CredentialKind::AdminPair => self.verify_pair(ADMIN_ID_KEY, ADMIN_PASSWORD_KEY, id, secret),
            CredentialKind::DoctorPair => self.verify_pair(DOCTOR_ID_KEY, DOCTOR_PASSWORD_KEY, id, secret),
            CredentialKind::DoctorAccount => {
                use crate::schema::doctors::dsl::{doctor_id, doctors, password_hash};
                let hash = doctors
                    .filter(doctor_id.eq(id))
                    .select(password_hash)
                    .first::<String>(self.conn)
                    .optional()?;
                Ok(hash.map(|h| check_secret(secret, &h)).unwrap_or(false))
            },
            CredentialKind::HospitalAccount => {
                use crate::schema::hospitals::dsl::{hospital_id, hospitals, password_hash};
                let hash = hospitals
                    .filter(hospital_id.eq(id))
                    .select(password_hash)
                    .first::<String>(self.conn)
                    .optional()?;
                Ok(hash.map(|h| check_secret(secret, &h)).unwrap_or(false))
            },
        }
    }
}
