// Inserts a demo patient profile with sign-in credentials and one visit.

use diesel::prelude::*;
use log::{error, info};
use std::env;
use std::process::ExitCode;

use clinic_intake::db;
use clinic_intake::logger::setup_logger;
use clinic_intake::models::{ProfileFields, VisitFields};

const DEMO_USERNAME: &str = "buxin";
const DEMO_ID_NUMBER: &str = "7741187";

fn demo_profile() -> ProfileFields {
    ProfileFields {
        name: Some("buxin jabbi".to_string()),
        age: Some(23),
        gender: Some("Male".to_string()),
        contact: Some("+220 771 1187".to_string()),
        address: Some("Serekunda, The Gambia".to_string()),
        emergency_name: Some("Fatou Jabbi".to_string()),
        emergency_relation: Some("Mother".to_string()),
        emergency_contact: Some("+220 775 0042".to_string()),
        medical_history: Some("None reported".to_string()),
        username: Some(DEMO_USERNAME.to_string()),
        patient_id_number: Some(DEMO_ID_NUMBER.to_string()),
        ..Default::default()
    }
}

fn demo_visit(owner: i32) -> VisitFields {
    VisitFields {
        profile_id: Some(owner),
        name: Some("buxin jabbi".to_string()),
        age: Some(23),
        gender: Some("Male".to_string()),
        contact: Some("+220 771 1187".to_string()),
        chief_complaint: Some("Routine check-up".to_string()),
        pain_level: Some("0".to_string()),
        heart_rate: Some(107.0),
        spo2: Some(100.0),
        body_temp_f: Some(91.94),
        env_temp_f: Some(87.44),
        humidity_percent: Some(59.5),
        weight_kg: Some(4.483),
        ..Default::default()
    }
}

fn seed(conn: &mut PgConnection) -> QueryResult<(i32, i32)> {
    conn.transaction(|conn| {
        let fields = demo_profile();
        let existing = {
            use clinic_intake::schema::patient_profiles::dsl::*;
            patient_profiles
                .filter(username.eq(DEMO_USERNAME))
                .select(id)
                .first::<i32>(conn)
                .optional()?
        };

        let owner = {
            use clinic_intake::schema::patient_profiles::dsl::*;
            match existing {
                Some(found) => {
                    diesel::update(patient_profiles.find(found)).set(&fields).execute(conn)?;
                    found
                },
                None => diesel::insert_into(patient_profiles)
                    .values(&fields)
                    .returning(id)
                    .get_result::<i32>(conn)?,
            }
        };

        let visit = {
            use clinic_intake::schema::patients::dsl::*;
            diesel::insert_into(patients)
                .values(&demo_visit(owner))
                .returning(id)
                .get_result::<i32>(conn)?
        };
        Ok((owner, visit))
    })
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    setup_logger();

    let db_url = match env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(e) => {
            error!("DATABASE_URL must be set: {}", e);
            return ExitCode::FAILURE;
        },
    };

    let pool = match db::initialize(&db_url) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Database setup failed: {}", e);
            return ExitCode::FAILURE;
        },
    };

    let mut conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            error!("Failed to get database connection: {}", e);
            return ExitCode::FAILURE;
        },
    };

    match seed(&mut conn) {
        Ok((profile_id, visit_id)) => {
            info!(
                "Seeded patient profile {} (username {}, ID number {}) with visit {}",
                profile_id, DEMO_USERNAME, DEMO_ID_NUMBER, visit_id
            );
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!("Failed to seed demo patient: {}", e);
            ExitCode::FAILURE
        },
    }
}
