use crate::config::AppConfig;
use crate::credentials::{
    self, PgCredentials, ADMIN_ID_KEY, ADMIN_PASSWORD_KEY, DOCTOR_ID_KEY, DOCTOR_PASSWORD_KEY,
};
use crate::db::{self, DbPool};
use crate::errors::ApiError;
use crate::models::*;
use crate::session::Login;
use bcrypt::{hash, DEFAULT_COST};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use log::{debug, error, info};
use std::collections::HashMap;

/// `%term%` for ILIKE searches.
pub fn search_pattern(term: &str) -> String {
    format!("%{}%", term.trim())
}

/// The profile's own photo, else the newest visit photo.
pub fn representative_photo(profile: &PatientProfile, newest_visit_photo: Option<String>) -> Option<String> {
    profile.photo.clone().or(newest_visit_photo)
}

pub struct AuthService;

impl AuthService {
    pub fn hash_password(password: &str) -> Result<String, ApiError> {
        hash(password, DEFAULT_COST)
            .map_err(|e| {
                error!("Failed to hash password: {}", e);
                ApiError::InternalError("Failed to hash password".to_string())
            })
    }

    pub async fn hospital_login(id: &str, secret: &str, pool: &DbPool) -> Result<Option<Login>, ApiError> {
        let (id, secret) = (id.trim().to_string(), secret.to_string());
        db::run(pool, move |conn| {
            credentials::resolve_hospital_login(&mut PgCredentials::new(conn), &id, &secret)
        })
        .await
    }

    pub async fn doctor_login(id: &str, secret: &str, pool: &DbPool) -> Result<Option<Login>, ApiError> {
        let (id, secret) = (id.trim().to_string(), secret.to_string());
        db::run(pool, move |conn| {
            credentials::resolve_doctor_login(&mut PgCredentials::new(conn), &id, &secret)
        })
        .await
    }

    /// Profile id matching a patient's username and ID number.
    pub async fn patient_login(login_name: &str, id_number: &str, pool: &DbPool) -> Result<Option<i32>, ApiError> {
        let (user, number) = (login_name.trim().to_string(), id_number.trim().to_string());
        if user.is_empty() || number.is_empty() {
            return Ok(None);
        }
        db::run(pool, move |conn| {
            use crate::schema::patient_profiles::dsl::*;
            patient_profiles
                .filter(username.eq(user))
                .filter(patient_id_number.eq(number))
                .select(id)
                .first::<i32>(conn)
                .optional()
        })
        .await
    }
}

pub struct PatientService;

impl PatientService {
    pub async fn insert(visit: VisitFields, pool: &DbPool) -> Result<Visit, ApiError> {
        let created = db::run(pool, move |conn| {
            use crate::schema::patients::dsl::*;
            diesel::insert_into(patients).values(&visit).get_result::<Visit>(conn)
        })
        .await?;
        info!("Recorded visit {} (profile {:?})", created.id, created.profile_id);
        Ok(created)
    }

    /// Newest first. Matches name or complaint, or the exact age when the term is a number.
    pub async fn search(term: Option<String>, limit: Option<i64>, pool: &DbPool) -> Result<Vec<Visit>, ApiError> {
        db::run(pool, move |conn| {
            use crate::schema::patients::dsl::*;
            let mut query = patients.order(created_at.desc()).into_boxed();
            if let Some(term) = term {
                let pattern = search_pattern(&term);
                query = match term.trim().parse::<i32>() {
                    Ok(n) => query.filter(
                        name.ilike(pattern.clone()).or(chief_complaint.ilike(pattern)).or(age.eq(n)),
                    ),
                    Err(_) => query.filter(name.ilike(pattern.clone()).or(chief_complaint.ilike(pattern))),
                };
            }
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            query.load::<Visit>(conn)
        })
        .await
    }

    pub async fn get(visit_id: i32, pool: &DbPool) -> Result<Visit, ApiError> {
        db::run(pool, move |conn| {
            use crate::schema::patients::dsl::*;
            patients.find(visit_id).first::<Visit>(conn)
        })
        .await
        .map_err(|e| match e {
            ApiError::NotFoundError(_) => ApiError::NotFoundError("Patient not found".to_string()),
            other => other,
        })
    }

    pub async fn update(visit_id: i32, changes: VisitFields, pool: &DbPool) -> Result<Visit, ApiError> {
        if !changes.has_changes() {
            return Self::get(visit_id, pool).await;
        }
        let updated = db::run(pool, move |conn| {
            use crate::schema::patients::dsl::*;
            diesel::update(patients.find(visit_id)).set(&changes).get_result::<Visit>(conn)
        })
        .await
        .map_err(|e| match e {
            ApiError::NotFoundError(_) => ApiError::NotFoundError("Patient not found".to_string()),
            other => other,
        })?;
        debug!("Updated visit {}", visit_id);
        Ok(updated)
    }

    pub async fn delete(visit_id: i32, pool: &DbPool) -> Result<(), ApiError> {
        let removed = db::run(pool, move |conn| {
            use crate::schema::patients::dsl::*;
            diesel::delete(patients.find(visit_id)).execute(conn)
        })
        .await?;
        if removed == 0 {
            return Err(ApiError::NotFoundError("Patient not found".to_string()));
        }
        info!("Deleted visit {}", visit_id);
        Ok(())
    }

    /// Moves a visit into the store atomically and returns the archived row id.
    pub async fn archive(visit_id: i32, pool: &DbPool) -> Result<i32, ApiError> {
        let stored_id = db::run(pool, move |conn| {
            conn.transaction(|conn| {
                let row = diesel::sql_query(
                    "INSERT INTO stored_patients (
                        profile_id, photo, name, age, gender, contact, address, chief_complaint,
                        pain_level, pain_description, additional_symptoms, medical_history,
                        emergency_name, emergency_relation, emergency_gender, emergency_contact,
                        emergency_address, heart_rate, spo2, body_temp_f, env_temp_f,
                        humidity_percent, weight_kg, created_at
                    )
                    SELECT
                        profile_id, photo, name, age, gender, contact, address, chief_complaint,
                        pain_level, pain_description, additional_symptoms, medical_history,
                        emergency_name, emergency_relation, emergency_gender, emergency_contact,
                        emergency_address, heart_rate, spo2, body_temp_f, env_temp_f,
                        humidity_percent, weight_kg, created_at
                    FROM patients WHERE id = $1
                    RETURNING id",
                )
                .bind::<Integer, _>(visit_id)
                .get_result::<IdResult>(conn)?;

                use crate::schema::patients::dsl::*;
                diesel::delete(patients.find(visit_id)).execute(conn)?;
                Ok(row.id)
            })
        })
        .await
        .map_err(|e| match e {
            ApiError::NotFoundError(_) => ApiError::NotFoundError("Patient not found".to_string()),
            other => other,
        })?;
        info!("Archived visit {} as stored record {}", visit_id, stored_id);
        Ok(stored_id)
    }
}

pub struct StoreService;

impl StoreService {
    /// Most recently archived first.
    pub async fn search(term: Option<String>, limit: Option<i64>, pool: &DbPool) -> Result<Vec<StoredVisit>, ApiError> {
        db::run(pool, move |conn| {
            use crate::schema::stored_patients::dsl::*;
            let mut query = stored_patients.order(archived_at.desc()).into_boxed();
            if let Some(term) = term {
                let pattern = search_pattern(&term);
                query = match term.trim().parse::<i32>() {
                    Ok(n) => query.filter(
                        name.ilike(pattern.clone()).or(chief_complaint.ilike(pattern)).or(age.eq(n)),
                    ),
                    Err(_) => query.filter(name.ilike(pattern.clone()).or(chief_complaint.ilike(pattern))),
                };
            }
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            query.load::<StoredVisit>(conn)
        })
        .await
    }

    pub async fn get(stored_id: i32, pool: &DbPool) -> Result<StoredVisit, ApiError> {
        db::run(pool, move |conn| {
            use crate::schema::stored_patients::dsl::*;
            stored_patients.find(stored_id).first::<StoredVisit>(conn)
        })
        .await
        .map_err(|e| match e {
            ApiError::NotFoundError(_) => ApiError::NotFoundError("Stored record not found".to_string()),
            other => other,
        })
    }

    pub async fn delete(stored_id: i32, pool: &DbPool) -> Result<(), ApiError> {
        let removed = db::run(pool, move |conn| {
            use crate::schema::stored_patients::dsl::*;
            diesel::delete(stored_patients.find(stored_id)).execute(conn)
        })
        .await?;
        if removed == 0 {
            return Err(ApiError::NotFoundError("Stored record not found".to_string()));
        }
        info!("Deleted stored record {}", stored_id);
        Ok(())
    }
}

/// Basics copied onto an existing profile, only where the profile has none.
pub fn missing_basics(profile: &PatientProfile, visit: &VisitFields) -> ProfileFields {
    fn fill(current: &Option<String>, incoming: &Option<String>) -> Option<String> {
        match current {
            Some(_) => None,
            None => incoming.clone(),
        }
    }
    ProfileFields {
        gender: fill(&profile.gender, &visit.gender),
        address: fill(&profile.address, &visit.address),
        medical_history: fill(&profile.medical_history, &visit.medical_history),
        photo: fill(&profile.photo, &visit.photo),
        ..Default::default()
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Builds directory rows from profiles plus per-profile visit aggregates.
pub fn summarize_profiles(
    profiles: Vec<PatientProfile>,
    current: &[(Option<i32>, i64, Option<NaiveDateTime>)],
    archived: &[(Option<i32>, i64, Option<NaiveDateTime>)],
    recent_photos: &[(Option<i32>, Option<String>)],
) -> Vec<ProfileSummary> {
    let mut stats: HashMap<i32, (i64, Option<NaiveDateTime>)> = HashMap::new();
    for (owner, count, last) in current.iter().chain(archived.iter()) {
        if let Some(owner) = owner {
            let entry = stats.entry(*owner).or_insert((0, None));
            entry.0 += count;
            entry.1 = entry.1.max(*last);
        }
    }
    let mut photos: HashMap<i32, String> = HashMap::new();
    for (owner, photo) in recent_photos {
        if let (Some(owner), Some(photo)) = (owner, photo) {
            photos.entry(*owner).or_insert_with(|| photo.clone());
        }
    }

    profiles
        .into_iter()
        .map(|profile| {
            let (visit_count, last_visit) = stats.get(&profile.id).copied().unwrap_or((0, None));
            let representative_photo = representative_photo(&profile, photos.get(&profile.id).cloned());
            ProfileSummary { profile, representative_photo, visit_count, last_visit }
        })
        .collect()
}

pub struct ProfileService;

impl ProfileService {
    /// Finds the profile matching (name, contact) or creates one. Visits with
    /// neither field always get a fresh profile.
    pub async fn get_or_create(visit: &VisitFields, pool: &DbPool) -> Result<i32, ApiError> {
        let visit = visit.clone();
        db::run(pool, move |conn| {
            use crate::schema::patient_profiles::dsl::*;
            let wanted_name = non_blank(&visit.name);
            let wanted_contact = non_blank(&visit.contact);

            conn.transaction(|conn| {
                if wanted_name.is_some() || wanted_contact.is_some() {
                    let mut query = patient_profiles.order(id.asc()).into_boxed();
                    query = match &wanted_name {
                        Some(n) => query.filter(name.eq(n.clone())),
                        None => query.filter(name.is_null().or(name.eq(""))),
                    };
                    query = match &wanted_contact {
                        Some(c) => query.filter(contact.eq(c.clone())),
                        None => query.filter(contact.is_null().or(contact.eq(""))),
                    };
                    if let Some(existing) = query.first::<PatientProfile>(conn).optional()? {
                        let fill = missing_basics(&existing, &visit);
                        if !fill.is_empty() {
                            diesel::update(patient_profiles.find(existing.id)).set(&fill).execute(conn)?;
                        }
                        return Ok(existing.id);
                    }
                }

                let fresh = ProfileFields {
                    name: wanted_name.clone(),
                    contact: wanted_contact.clone(),
                    gender: visit.gender.clone(),
                    address: visit.address.clone(),
                    medical_history: visit.medical_history.clone(),
                    photo: visit.photo.clone(),
                    ..Default::default()
                };
                diesel::insert_into(patient_profiles)
                    .values(&fresh)
                    .returning(id)
                    .get_result::<i32>(conn)
            })
        })
        .await
    }

    pub async fn get(profile_id: i32, pool: &DbPool) -> Result<PatientProfile, ApiError> {
        Self::find(profile_id, pool)
            .await?
            .ok_or_else(|| ApiError::NotFoundError("Patient profile not found".to_string()))
    }

    pub async fn find(profile_id: i32, pool: &DbPool) -> Result<Option<PatientProfile>, ApiError> {
        db::run(pool, move |conn| {
            use crate::schema::patient_profiles::dsl::*;
            patient_profiles.find(profile_id).first::<PatientProfile>(conn).optional()
        })
        .await
    }

    pub async fn visits(owner: i32, pool: &DbPool) -> Result<ProfileVisits, ApiError> {
        db::run(pool, move |conn| {
            let current = {
                use crate::schema::patients::dsl::*;
                patients
                    .filter(profile_id.eq(owner))
                    .order(created_at.desc())
                    .load::<Visit>(conn)?
            };
            let archived = {
                use crate::schema::stored_patients::dsl::*;
                stored_patients
                    .filter(profile_id.eq(owner))
                    .order(archived_at.desc())
                    .load::<StoredVisit>(conn)?
            };
            Ok(ProfileVisits { current, archived })
        })
        .await
    }

    /// Profiles newest first, with visit totals. `term` matches name, contact or the exact id.
    pub async fn directory(term: Option<String>, pool: &DbPool) -> Result<Vec<ProfileSummary>, ApiError> {
        db::run(pool, move |conn| {
            use diesel::dsl::{count_star, max};

            let profiles = {
                use crate::schema::patient_profiles::dsl::*;
                let mut query = patient_profiles.order(created_at.desc()).into_boxed();
                if let Some(term) = term {
                    let pattern = search_pattern(&term);
                    query = match term.trim().parse::<i32>() {
                        Ok(n) => query.filter(name.ilike(pattern.clone()).or(contact.ilike(pattern)).or(id.eq(n).nullable())),
                        Err(_) => query.filter(name.ilike(pattern.clone()).or(contact.ilike(pattern))),
                    };
                }
                query.load::<PatientProfile>(conn)?
            };

            let (current, current_photos) = {
                use crate::schema::patients::dsl::*;
                let stats = patients
                    .filter(profile_id.is_not_null())
                    .group_by(profile_id)
                    .select((profile_id, count_star(), max(created_at)))
                    .load::<(Option<i32>, i64, Option<NaiveDateTime>)>(conn)?;
                let recent = patients
                    .filter(profile_id.is_not_null())
                    .filter(photo.is_not_null())
                    .order(created_at.desc())
                    .select((profile_id, photo))
                    .load::<(Option<i32>, Option<String>)>(conn)?;
                (stats, recent)
            };

            let (archived, archived_photos) = {
                use crate::schema::stored_patients::dsl::*;
                let stats = stored_patients
                    .filter(profile_id.is_not_null())
                    .group_by(profile_id)
                    .select((profile_id, count_star(), max(archived_at)))
                    .load::<(Option<i32>, i64, Option<NaiveDateTime>)>(conn)?;
                let recent = stored_patients
                    .filter(profile_id.is_not_null())
                    .filter(photo.is_not_null())
                    .order(archived_at.desc())
                    .select((profile_id, photo))
                    .load::<(Option<i32>, Option<String>)>(conn)?;
                (stats, recent)
            };

            let photos: Vec<_> = current_photos.into_iter().chain(archived_photos).collect();
            Ok(summarize_profiles(profiles, &current, &archived, &photos))
        })
        .await
    }

    pub async fn totals(pool: &DbPool) -> Result<DirectoryTotals, ApiError> {
        db::run(pool, move |conn| {
            use diesel::dsl::{count_distinct, count_star};
            let total_patients = {
                use crate::schema::patient_profiles::dsl::*;
                patient_profiles.select(count_star()).first::<i64>(conn)?
            };
            let (active_patients, current_visits) = {
                use crate::schema::patients::dsl::*;
                let active = patients.select(count_distinct(profile_id)).first::<i64>(conn)?;
                let visits = patients.select(count_star()).first::<i64>(conn)?;
                (active, visits)
            };
            let archived_visits = {
                use crate::schema::stored_patients::dsl::*;
                stored_patients.select(count_star()).first::<i64>(conn)?
            };
            Ok(DirectoryTotals {
                total_patients,
                active_patients,
                total_visits: current_visits + archived_visits,
            })
        })
        .await
    }

    pub async fn create(fields: ProfileFields, pool: &DbPool) -> Result<i32, ApiError> {
        let created = db::run(pool, move |conn| {
            use crate::schema::patient_profiles::dsl::*;
            diesel::insert_into(patient_profiles)
                .values(&fields)
                .returning(id)
                .get_result::<i32>(conn)
        })
        .await?;
        info!("Created patient profile {}", created);
        Ok(created)
    }

    pub async fn update(profile_id: i32, fields: ProfileFields, pool: &DbPool) -> Result<(), ApiError> {
        if fields.is_empty() {
            return Ok(());
        }
        let changed = db::run(pool, move |conn| {
            use crate::schema::patient_profiles::dsl::*;
            diesel::update(patient_profiles.find(profile_id)).set(&fields).execute(conn)
        })
        .await?;
        if changed == 0 {
            return Err(ApiError::NotFoundError("Patient profile not found".to_string()));
        }
        debug!("Updated patient profile {}", profile_id);
        Ok(())
    }

    pub async fn set_photo(profile_id: i32, filename: String, pool: &DbPool) -> Result<(), ApiError> {
        Self::update(profile_id, ProfileFields { photo: Some(filename), ..Default::default() }, pool).await
    }

    /// Deletes the profile together with its current and archived visits.
    pub async fn delete(owner: i32, pool: &DbPool) -> Result<(), ApiError> {
        let removed = db::run(pool, move |conn| {
            conn.transaction(|conn| {
                {
                    use crate::schema::patients::dsl::*;
                    diesel::delete(patients.filter(profile_id.eq(owner))).execute(conn)?;
                }
                {
                    use crate::schema::stored_patients::dsl::*;
                    diesel::delete(stored_patients.filter(profile_id.eq(owner))).execute(conn)?;
                }
                use crate::schema::patient_profiles::dsl::*;
                diesel::delete(patient_profiles.find(owner)).execute(conn)
            })
        })
        .await?;
        if removed == 0 {
            return Err(ApiError::NotFoundError("Patient profile not found".to_string()));
        }
        info!("Deleted patient profile {} and its visits", owner);
        Ok(())
    }
}

pub struct SettingsService;

impl SettingsService {
    pub async fn get(name: &str, pool: &DbPool) -> Result<Option<String>, ApiError> {
        let name = name.to_string();
        db::run(pool, move |conn| {
            use crate::schema::settings::dsl::*;
            settings.filter(key.eq(name)).select(value).first::<String>(conn).optional()
        })
        .await
    }

    pub async fn set(name: &str, new_value: &str, pool: &DbPool) -> Result<(), ApiError> {
        let row = NewSetting { key: name.to_string(), value: new_value.to_string() };
        db::run(pool, move |conn| {
            use crate::schema::settings::dsl::*;
            diesel::insert_into(settings)
                .values(&row)
                .on_conflict(key)
                .do_update()
                .set(value.eq(&row.value))
                .execute(conn)
        })
        .await?;
        Ok(())
    }

    /// Writes the configured admin and doctor pairs unless they already exist.
    pub async fn seed_default_pairs(config: &AppConfig, pool: &DbPool) -> Result<(), ApiError> {
        let rows = vec![
            NewSetting { key: ADMIN_ID_KEY.to_string(), value: config.admin_id.clone() },
            NewSetting { key: ADMIN_PASSWORD_KEY.to_string(), value: AuthService::hash_password(&config.admin_password)? },
            NewSetting { key: DOCTOR_ID_KEY.to_string(), value: config.doctor_id.clone() },
            NewSetting { key: DOCTOR_PASSWORD_KEY.to_string(), value: AuthService::hash_password(&config.doctor_password)? },
        ];
        let inserted = db::run(pool, move |conn| {
            use crate::schema::settings::dsl::*;
            diesel::insert_into(settings)
                .values(&rows)
                .on_conflict(key)
                .do_nothing()
                .execute(conn)
        })
        .await?;
        if inserted > 0 {
            info!("Seeded {} default credential settings", inserted);
        }
        Ok(())
    }

    pub async fn set_pair(id_key: &str, password_key: &str, id: &str, password: &str, pool: &DbPool) -> Result<(), ApiError> {
        let id = id.trim();
        if id.is_empty() || password.is_empty() {
            return Err(ApiError::ValidationError("ID and password are required".to_string()));
        }
        let hashed = AuthService::hash_password(password)?;
        Self::set(id_key, id, pool).await?;
        Self::set(password_key, &hashed, pool).await?;
        info!("Updated credential pair {}", id_key);
        Ok(())
    }

    pub async fn add_doctor(login_id: &str, password: &str, display_name: Option<String>, pool: &DbPool) -> Result<i32, ApiError> {
        let record = NewDoctor {
            doctor_id: login_id.trim().to_string(),
            password_hash: AuthService::hash_password(password)?,
            name: display_name,
        };
        let wanted = record.doctor_id.clone();
        let created = db::run(pool, move |conn| {
            use crate::schema::doctors::dsl::*;
            diesel::insert_into(doctors).values(&record).returning(id).get_result::<i32>(conn)
        })
        .await
        .map_err(|e| match e {
            ApiError::DatabaseError(msg) if msg.contains("unique") => {
                debug!("Attempted to add existing doctor id: {}", wanted);
                ApiError::ValidationError("Doctor ID already exists".to_string())
            },
            other => other,
        })?;
        info!("Added doctor account {}", created);
        Ok(created)
    }

    pub async fn list_doctors(pool: &DbPool) -> Result<Vec<Doctor>, ApiError> {
        db::run(pool, move |conn| {
            use crate::schema::doctors::dsl::*;
            doctors.order(created_at.desc()).load::<Doctor>(conn)
        })
        .await
    }

    pub async fn delete_doctor(row_id: i32, pool: &DbPool) -> Result<(), ApiError> {
        db::run(pool, move |conn| {
            use crate::schema::doctors::dsl::*;
            diesel::delete(doctors.find(row_id)).execute(conn)
        })
        .await?;
        Ok(())
    }

    pub async fn add_hospital(login_id: &str, password: &str, display_name: Option<String>, pool: &DbPool) -> Result<i32, ApiError> {
        let record = NewHospital {
            hospital_id: login_id.trim().to_string(),
            password_hash: AuthService::hash_password(password)?,
            name: display_name,
        };
        let wanted = record.hospital_id.clone();
        let created = db::run(pool, move |conn| {
            use crate::schema::hospitals::dsl::*;
            diesel::insert_into(hospitals).values(&record).returning(id).get_result::<i32>(conn)
        })
        .await
        .map_err(|e| match e {
            ApiError::DatabaseError(msg) if msg.contains("unique") => {
                debug!("Attempted to add existing hospital id: {}", wanted);
                ApiError::ValidationError("Hospital ID already exists".to_string())
            },
            other => other,
        })?;
        info!("Added hospital account {}", created);
        Ok(created)
    }

    pub async fn list_hospitals(pool: &DbPool) -> Result<Vec<Hospital>, ApiError> {
        db::run(pool, move |conn| {
            use crate::schema::hospitals::dsl::*;
            hospitals.order(created_at.desc()).load::<Hospital>(conn)
        })
        .await
    }

    pub async fn delete_hospital(row_id: i32, pool: &DbPool) -> Result<(), ApiError> {
        db::run(pool, move |conn| {
            use crate::schema::hospitals::dsl::*;
            diesel::delete(hospitals.find(row_id)).execute(conn)
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn profile(id: i32, photo: Option<&str>) -> PatientProfile {
        PatientProfile {
            id,
            name: Some(format!("patient {}", id)),
            dob: None,
            age: None,
            gender: None,
            contact: None,
            address: Some("12 Main St".to_string()),
            emergency_name: None,
            emergency_relation: None,
            emergency_contact: None,
            emergency_address: None,
            medical_history: None,
            allergies: None,
            medications: None,
            prescriptions: None,
            test_results: None,
            diagnoses: None,
            treatment_records: None,
            photo: photo.map(str::to_string),
            notes: None,
            username: None,
            patient_id_number: None,
            created_at: at(1),
        }
    }

    #[test]
    fn search_pattern_wraps_trimmed_term() {
        assert_eq!(search_pattern("  flu "), "%flu%");
    }

    #[test]
    fn only_missing_basics_are_filled() {
        let visit = VisitFields {
            gender: Some("F".into()),
            address: Some("elsewhere".into()),
            photo: Some("patient_ab12cd34.jpg".into()),
            ..Default::default()
        };
        let fill = missing_basics(&profile(1, None), &visit);
        assert_eq!(fill.gender.as_deref(), Some("F"));
        assert_eq!(fill.address, None);
        assert_eq!(fill.photo.as_deref(), Some("patient_ab12cd34.jpg"));
        assert!(missing_basics(&profile(1, Some("x.jpg")), &VisitFields::default()).is_empty());
    }

    #[test]
    fn directory_merges_current_and_archived_visits() {
        let profiles = vec![profile(1, None), profile(2, Some("own.jpg")), profile(3, None)];
        let current = vec![(Some(1), 2, Some(at(3)))];
        let archived = vec![(Some(1), 1, Some(at(9))), (Some(2), 4, Some(at(2)))];
        let photos = vec![(Some(1), Some("visit.jpg".to_string())), (Some(1), Some("older.jpg".to_string()))];

        let rows = summarize_profiles(profiles, &current, &archived, &photos);
        assert_eq!(rows[0].visit_count, 3);
        assert_eq!(rows[0].last_visit, Some(at(9)));
        assert_eq!(rows[0].representative_photo.as_deref(), Some("visit.jpg"));
        assert_eq!(rows[1].visit_count, 4);
        assert_eq!(rows[1].representative_photo.as_deref(), Some("own.jpg"));
        assert_eq!(rows[2].visit_count, 0);
        assert_eq!(rows[2].last_visit, None);
        assert_eq!(rows[2].representative_photo, None);
    }

    #[test]
    fn own_photo_wins_over_visit_photo() {
        let visit = Some("patient_0badc0de.jpg".to_string());
        assert_eq!(representative_photo(&profile(1, Some("own.jpg")), visit.clone()).as_deref(), Some("own.jpg"));
        assert_eq!(representative_photo(&profile(1, None), visit).as_deref(), Some("patient_0badc0de.jpg"));
        assert_eq!(representative_photo(&profile(1, None), None), None);
    }

    #[test]
    fn stored_hashes_check_with_login_secret() {
        let hashed = AuthService::hash_password("s3cret").unwrap();
        assert!(credentials::check_secret("s3cret", &hashed));
        assert!(!credentials::check_secret("wrong", &hashed));
    }
}
