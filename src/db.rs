use crate::errors::ApiError;
use actix_web::web;
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{error, info};

// Type aliases
pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

// Database initialization SQL
pub const DB_INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS patient_profiles (
    id SERIAL PRIMARY KEY,
    name TEXT,
    dob TEXT,
    age INTEGER,
    gender TEXT,
    contact TEXT,
    address TEXT,
    emergency_name TEXT,
    emergency_relation TEXT,
    emergency_contact TEXT,
    emergency_address TEXT,
    medical_history TEXT,
    allergies TEXT,
    medications TEXT,
    prescriptions TEXT,
    test_results TEXT,
    diagnoses TEXT,
    treatment_records TEXT,
    photo TEXT,
    notes TEXT,
    username TEXT,
    patient_id_number TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS patients (
    id SERIAL PRIMARY KEY,
    profile_id INTEGER REFERENCES patient_profiles(id) ON DELETE SET NULL,
    photo TEXT,
    name TEXT,
    age INTEGER,
    gender TEXT,
    contact TEXT,
    address TEXT,
    chief_complaint TEXT,
    pain_level TEXT,
    pain_description TEXT,
    additional_symptoms TEXT,
    medical_history TEXT,
    emergency_name TEXT,
    emergency_relation TEXT,
    emergency_gender TEXT,
    emergency_contact TEXT,
    emergency_address TEXT,
    heart_rate DOUBLE PRECISION,
    spo2 DOUBLE PRECISION,
    body_temp_f DOUBLE PRECISION,
    env_temp_f DOUBLE PRECISION,
    humidity_percent DOUBLE PRECISION,
    weight_kg DOUBLE PRECISION,
    created_at TIMESTAMP NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS stored_patients (
    id SERIAL PRIMARY KEY,
    profile_id INTEGER REFERENCES patient_profiles(id) ON DELETE SET NULL,
    photo TEXT,
    name TEXT,
    age INTEGER,
    gender TEXT,
    contact TEXT,
    address TEXT,
    chief_complaint TEXT,
    pain_level TEXT,
    pain_description TEXT,
    additional_symptoms TEXT,
    medical_history TEXT,
    emergency_name TEXT,
    emergency_relation TEXT,
    emergency_gender TEXT,
    emergency_contact TEXT,
    emergency_address TEXT,
    heart_rate DOUBLE PRECISION,
    spo2 DOUBLE PRECISION,
    body_temp_f DOUBLE PRECISION,
    env_temp_f DOUBLE PRECISION,
    humidity_percent DOUBLE PRECISION,
    weight_kg DOUBLE PRECISION,
    created_at TIMESTAMP NOT NULL DEFAULT NOW(),
    archived_at TIMESTAMP NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS doctors (
    id SERIAL PRIMARY KEY,
    doctor_id TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    name TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS hospitals (
    id SERIAL PRIMARY KEY,
    hospital_id TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    name TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_patients_profile ON patients(profile_id);
CREATE INDEX IF NOT EXISTS idx_stored_patients_profile ON stored_patients(profile_id);
CREATE INDEX IF NOT EXISTS idx_profiles_username ON patient_profiles(username);
"#;

/// Creates the schema if needed and builds the connection pool.
pub fn initialize(database_url: &str) -> Result<DbPool, ApiError> {
    let mut conn = PgConnection::establish(database_url).map_err(|e| {
        error!("Failed to establish connection for schema setup: {}", e);
        ApiError::DatabaseError(e.to_string())
    })?;
    conn.batch_execute(DB_INIT_SQL).map_err(|e| {
        error!("Failed to execute database initialization script: {}", e);
        ApiError::DatabaseError(e.to_string())
    })?;
    info!("Database initialization complete.");

    let manager = ConnectionManager::<PgConnection>::new(database_url);
    r2d2::Pool::builder().build(manager).map_err(|e| {
        error!("Failed to create database connection pool: {}", e);
        ApiError::DatabaseError(e.to_string())
    })
}

/// Runs a blocking diesel operation on a pooled connection off the async executor.
pub async fn run<F, T>(pool: &DbPool, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut PgConnection) -> QueryResult<T> + Send + 'static,
    T: Send + 'static,
{
    let mut conn = pool.get().map_err(ApiError::pool)?;
    web::block(move || op(&mut conn))
        .await
        .map_err(ApiError::blocking)?
        .map_err(|e| {
            if !matches!(e, diesel::result::Error::NotFound) {
                error!("Database query failed: {}", e);
            }
            ApiError::from(e)
        })
}
