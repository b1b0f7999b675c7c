use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sql_types;
use serde::{Deserialize, Deserializer, Serialize};

use crate::schema::{doctors, hospitals, patient_profiles, patients, settings};

#[derive(Queryable, Serialize, Debug, Clone)]
pub struct PatientProfile {
    pub id: i32,
    pub name: Option<String>,
    pub dob: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub emergency_name: Option<String>,
    pub emergency_relation: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_address: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
    pub medications: Option<String>,
    pub prescriptions: Option<String>,
    pub test_results: Option<String>,
    pub diagnoses: Option<String>,
    pub treatment_records: Option<String>,
    pub photo: Option<String>,
    pub notes: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub patient_id_number: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Profile columns as submitted by staff; used for both create and partial update.
#[derive(Insertable, AsChangeset, Deserialize, Debug, Clone, Default)]
#[diesel(table_name = patient_profiles)]
pub struct ProfileFields {
    pub name: Option<String>,
    pub dob: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub emergency_name: Option<String>,
    pub emergency_relation: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_address: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
    pub medications: Option<String>,
    pub prescriptions: Option<String>,
    pub test_results: Option<String>,
    pub diagnoses: Option<String>,
    pub treatment_records: Option<String>,
    pub photo: Option<String>,
    pub notes: Option<String>,
    pub username: Option<String>,
    pub patient_id_number: Option<String>,
}

impl ProfileFields {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.dob.is_none() && self.age.is_none() && self.gender.is_none()
            && self.contact.is_none() && self.address.is_none() && self.emergency_name.is_none()
            && self.emergency_relation.is_none() && self.emergency_contact.is_none()
            && self.emergency_address.is_none() && self.medical_history.is_none()
            && self.allergies.is_none() && self.medications.is_none() && self.prescriptions.is_none()
            && self.test_results.is_none() && self.diagnoses.is_none()
            && self.treatment_records.is_none() && self.photo.is_none() && self.notes.is_none()
            && self.username.is_none() && self.patient_id_number.is_none()
    }
}

/// A current (not yet archived) intake visit.
#[derive(Queryable, Serialize, Debug, Clone)]
pub struct Visit {
    pub id: i32,
    pub profile_id: Option<i32>,
    pub photo: Option<String>,
    pub name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub chief_complaint: Option<String>,
    pub pain_level: Option<String>,
    pub pain_description: Option<String>,
    pub additional_symptoms: Option<String>,
    pub medical_history: Option<String>,
    pub emergency_name: Option<String>,
    pub emergency_relation: Option<String>,
    pub emergency_gender: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_address: Option<String>,
    pub heart_rate: Option<f64>,
    pub spo2: Option<f64>,
    pub body_temp_f: Option<f64>,
    pub env_temp_f: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub weight_kg: Option<f64>,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Serialize, Debug, Clone)]
pub struct StoredVisit {
    pub id: i32,
    pub profile_id: Option<i32>,
    pub photo: Option<String>,
    pub name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub chief_complaint: Option<String>,
    pub pain_level: Option<String>,
    pub pain_description: Option<String>,
    pub additional_symptoms: Option<String>,
    pub medical_history: Option<String>,
    pub emergency_name: Option<String>,
    pub emergency_relation: Option<String>,
    pub emergency_gender: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_address: Option<String>,
    pub heart_rate: Option<f64>,
    pub spo2: Option<f64>,
    pub body_temp_f: Option<f64>,
    pub env_temp_f: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub weight_kg: Option<f64>,
    pub created_at: NaiveDateTime,
    pub archived_at: NaiveDateTime,
}

/// Visit columns; inserted by intake, applied as a partial update by the edit form.
#[derive(Insertable, AsChangeset, Deserialize, Debug, Clone, Default)]
#[diesel(table_name = patients)]
pub struct VisitFields {
    #[serde(skip)]
    pub profile_id: Option<i32>,
    pub photo: Option<String>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub age: Option<i32>,
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub contact: Option<String>,
    pub address: Option<String>,
    pub chief_complaint: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pain_level: Option<String>,
    pub pain_description: Option<String>,
    pub additional_symptoms: Option<String>,
    pub medical_history: Option<String>,
    pub emergency_name: Option<String>,
    pub emergency_relation: Option<String>,
    pub emergency_gender: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub emergency_contact: Option<String>,
    pub emergency_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub heart_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub spo2: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub body_temp_f: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub env_temp_f: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub humidity_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub weight_kg: Option<f64>,
}

impl VisitFields {
    pub fn has_changes(&self) -> bool {
        let text = [
            &self.photo, &self.name, &self.gender, &self.contact, &self.address,
            &self.chief_complaint, &self.pain_level, &self.pain_description,
            &self.additional_symptoms, &self.medical_history, &self.emergency_name,
            &self.emergency_relation, &self.emergency_gender, &self.emergency_contact,
            &self.emergency_address,
        ];
        let numbers = [
            self.heart_rate, self.spo2, self.body_temp_f,
            self.env_temp_f, self.humidity_percent, self.weight_kg,
        ];
        self.profile_id.is_some()
            || self.age.is_some()
            || text.iter().any(|v| v.is_some())
            || numbers.iter().any(|v| v.is_some())
    }
}

#[derive(Queryable, Debug, Clone)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = settings)]
pub struct NewSetting {
    pub key: String,
    pub value: String,
}

#[derive(Queryable, Serialize, Debug, Clone)]
pub struct Doctor {
    pub id: i32,
    pub doctor_id: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = doctors)]
pub struct NewDoctor {
    pub doctor_id: String,
    pub password_hash: String,
    pub name: Option<String>,
}

#[derive(Queryable, Serialize, Debug, Clone)]
pub struct Hospital {
    pub id: i32,
    pub hospital_id: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = hospitals)]
pub struct NewHospital {
    pub hospital_id: String,
    pub password_hash: String,
    pub name: Option<String>,
}

#[derive(QueryableByName, Debug)]
pub struct IdResult {
    #[diesel(sql_type = sql_types::Integer)]
    pub id: i32,
}

// Views

#[derive(Serialize, Debug)]
pub struct ProfileSummary {
    #[serde(flatten)]
    pub profile: PatientProfile,
    pub representative_photo: Option<String>,
    pub visit_count: i64,
    pub last_visit: Option<NaiveDateTime>,
}

#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryTotals {
    pub total_patients: i64,
    pub active_patients: i64,
    pub total_visits: i64,
}

#[derive(Serialize, Debug, Default)]
pub struct ProfileVisits {
    pub current: Vec<Visit>,
    pub archived: Vec<StoredVisit>,
}

#[derive(Serialize, Debug)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum VisitEntry<'a> {
    Current(&'a Visit),
    Archived(&'a StoredVisit),
}

impl VisitEntry<'_> {
    fn timestamp(&self) -> NaiveDateTime {
        match self {
            VisitEntry::Current(v) => v.created_at,
            VisitEntry::Archived(v) => v.archived_at,
        }
    }
}

impl ProfileVisits {
    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.archived.is_empty()
    }

    /// Current and archived visits merged, newest first.
    pub fn timeline(&self) -> Vec<VisitEntry<'_>> {
        let mut entries: Vec<VisitEntry<'_>> = self.current.iter().map(VisitEntry::Current)
            .chain(self.archived.iter().map(VisitEntry::Archived))
            .collect();
        entries.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        entries
    }

    /// Most recent photo across all visits.
    pub fn latest_photo(&self) -> Option<String> {
        self.timeline().into_iter().find_map(|entry| match entry {
            VisitEntry::Current(v) => v.photo.clone(),
            VisitEntry::Archived(v) => v.photo.clone(),
        })
    }
}

// DTOs

#[derive(Deserialize, Debug, Clone, Default)]
pub struct IntakeRequest {
    #[serde(default)]
    pub patient_id: Option<serde_json::Value>,
    #[serde(flatten)]
    pub visit: VisitFields,
}

#[derive(Deserialize, Debug)]
pub struct HospitalLoginForm {
    #[serde(default)]
    pub hospital_id: String,
    #[serde(default)]
    pub hospital_pw: String,
}

#[derive(Deserialize, Debug)]
pub struct DoctorLoginForm {
    #[serde(default)]
    pub doctor_id: String,
    #[serde(default)]
    pub doctor_pw: String,
}

#[derive(Deserialize, Debug)]
pub struct PatientSigninForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub patient_id: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SettingsForm {
    pub hospital_id: Option<String>,
    pub hospital_pw: Option<String>,
    pub doctor_id: Option<String>,
    pub doctor_pw: Option<String>,
    pub new_doctor_id: Option<String>,
    pub new_doctor_pw: Option<String>,
    pub new_doctor_name: Option<String>,
    pub delete_doctor_id: Option<String>,
    pub new_hospital_id: Option<String>,
    pub new_hospital_pw: Option<String>,
    pub new_hospital_name: Option<String>,
    pub delete_hospital_id: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub search: Option<String>,
    pub limit: Option<String>,
}

impl SearchQuery {
    /// Non-blank search term, whichever of `q` or `search` was sent.
    pub fn term(&self) -> Option<String> {
        self.q.as_deref()
            .or(self.search.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn limit_or(&self, default: usize) -> usize {
        self.limit.as_deref()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .unwrap_or(default)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Number(f64),
    Text(String),
    Flag(bool),
}

fn lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Lenient>, D::Error> {
    Option::<Lenient>::deserialize(deserializer)
}

/// Number or numeric string; blank and unparsable values become `None`.
pub fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(lenient(deserializer)?.and_then(|v| match v {
        Lenient::Number(n) => Some(n),
        Lenient::Text(s) => s.trim().parse::<f64>().ok(),
        Lenient::Flag(_) => None,
    }))
}

pub fn lenient_i32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
    Ok(lenient_f64(deserializer)?.map(|n| n as i32))
}

pub fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(lenient(deserializer)?.map(|v| match v {
        Lenient::Number(n) if n.fract() == 0.0 => format!("{}", n as i64),
        Lenient::Number(n) => n.to_string(),
        Lenient::Text(s) => s,
        Lenient::Flag(b) => b.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn intake_accepts_numbers_and_numeric_strings() {
        let req: IntakeRequest = serde_json::from_value(json!({
            "name": "Ada",
            "age": "34",
            "heart_rate": 72,
            "spo2": "98.5",
            "weight_kg": "",
            "pain_level": 6,
            "contact": 5550100
        }))
        .unwrap();
        assert_eq!(req.visit.name.as_deref(), Some("Ada"));
        assert_eq!(req.visit.age, Some(34));
        assert_eq!(req.visit.heart_rate, Some(72.0));
        assert_eq!(req.visit.spo2, Some(98.5));
        assert_eq!(req.visit.weight_kg, None);
        assert_eq!(req.visit.pain_level.as_deref(), Some("6"));
        assert_eq!(req.visit.contact.as_deref(), Some("5550100"));
        assert!(req.patient_id.is_none());
    }

    #[test]
    fn intake_keeps_raw_patient_id() {
        let req: IntakeRequest = serde_json::from_value(json!({ "patient_id": "12" })).unwrap();
        assert_eq!(req.patient_id, Some(json!("12")));
    }

    #[test]
    fn null_vitals_are_absent() {
        let fields: VisitFields = serde_json::from_value(json!({ "heart_rate": null })).unwrap();
        assert_eq!(fields.heart_rate, None);
        assert!(!fields.has_changes());
    }

    #[test]
    fn search_term_prefers_q_and_ignores_blank() {
        let query = SearchQuery { q: Some("  ".into()), search: None, limit: Some("5".into()) };
        assert_eq!(query.term(), None);
        assert_eq!(query.limit_or(25), 5);
        let query = SearchQuery { q: Some("flu".into()), search: Some("x".into()), limit: None };
        assert_eq!(query.term().as_deref(), Some("flu"));
        assert_eq!(query.limit_or(25), 25);
    }

    #[test]
    fn empty_profile_fields_detected() {
        assert!(ProfileFields::default().is_empty());
        let fields = ProfileFields { notes: Some("x".into()), ..Default::default() };
        assert!(!fields.is_empty());
    }
}
