use crate::models::{StoredVisit, Visit};
use chrono::NaiveDateTime;
use csv::WriterBuilder;
use log::error;

pub const VISIT_HEADERS: [&str; 23] = [
    "photo", "name", "age", "gender", "contact", "address", "chief_complaint", "pain_level",
    "pain_description", "additional_symptoms", "medical_history", "emergency_name",
    "emergency_relation", "emergency_gender", "emergency_contact", "emergency_address",
    "heart_rate", "spo2", "body_temp_f", "env_temp_f", "humidity_percent", "weight_kg",
    "created_at",
];

pub const PATIENTS_FILENAME: &str = "patients.csv";
pub const STORE_FILENAME: &str = "store.csv";

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn number<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn timestamp(value: &NaiveDateTime) -> String {
    value.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// A row in `VISIT_HEADERS` column order.
pub trait CsvRow {
    fn cells(&self) -> Vec<String>;
}

macro_rules! visit_cells {
    ($v:expr) => {
        vec![
            text(&$v.photo), text(&$v.name), number(&$v.age), text(&$v.gender),
            text(&$v.contact), text(&$v.address), text(&$v.chief_complaint),
            text(&$v.pain_level), text(&$v.pain_description), text(&$v.additional_symptoms),
            text(&$v.medical_history), text(&$v.emergency_name), text(&$v.emergency_relation),
            text(&$v.emergency_gender), text(&$v.emergency_contact), text(&$v.emergency_address),
            number(&$v.heart_rate), number(&$v.spo2), number(&$v.body_temp_f),
            number(&$v.env_temp_f), number(&$v.humidity_percent), number(&$v.weight_kg),
            timestamp(&$v.created_at),
        ]
    };
}

impl CsvRow for Visit {
    fn cells(&self) -> Vec<String> {
        visit_cells!(self)
    }
}

impl CsvRow for StoredVisit {
    fn cells(&self) -> Vec<String> {
        let mut cells = visit_cells!(self);
        cells.push(timestamp(&self.archived_at));
        cells
    }
}

/// Serializes rows under `headers`; fields are quoted only when needed.
pub fn write_csv<R: CsvRow>(headers: &[&str], rows: &[R]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row.cells())?;
    }
    writer.into_inner().map_err(|e| {
        error!("Failed to flush CSV export: {}", e);
        csv::Error::from(e.into_error())
    })
}

pub fn visits_csv(rows: &[Visit]) -> Result<Vec<u8>, csv::Error> {
    write_csv(&VISIT_HEADERS, rows)
}

pub fn stored_csv(rows: &[StoredVisit]) -> Result<Vec<u8>, csv::Error> {
    let mut headers = VISIT_HEADERS.to_vec();
    headers.push("archived_at");
    write_csv(&headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn visit() -> Visit {
        Visit {
            id: 1,
            profile_id: Some(3),
            photo: None,
            name: Some("Doe, Jane".into()),
            age: Some(41),
            gender: Some("F".into()),
            contact: None,
            address: None,
            chief_complaint: Some("says \"dizzy\"".into()),
            pain_level: Some("4".into()),
            pain_description: None,
            additional_symptoms: Some("line one\nline two".into()),
            medical_history: None,
            emergency_name: None,
            emergency_relation: None,
            emergency_gender: None,
            emergency_contact: None,
            emergency_address: None,
            heart_rate: Some(72.0),
            spo2: Some(98.5),
            body_temp_f: None,
            env_temp_f: None,
            humidity_percent: None,
            weight_kg: None,
            created_at: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(8, 5, 0).unwrap(),
        }
    }

    #[test]
    fn header_line_is_fixed() {
        let out = String::from_utf8(visits_csv(&[]).unwrap()).unwrap();
        assert_eq!(out, format!("{}\n", VISIT_HEADERS.join(",")));
    }

    #[test]
    fn quotes_only_fields_that_need_it() {
        let out = String::from_utf8(visits_csv(&[visit()]).unwrap()).unwrap();
        let body = out.split_once('\n').unwrap().1;
        assert!(body.starts_with(",\"Doe, Jane\",41,F,,,\"says \"\"dizzy\"\"\",4,,\"line one\nline two\","));
        assert!(body.contains(",72,98.5,,,,,2024-03-01 08:05:00\n"));
    }

    #[test]
    fn store_export_adds_archived_at() {
        let v = visit();
        let stored = StoredVisit {
            id: 9, profile_id: v.profile_id, photo: v.photo, name: v.name, age: v.age,
            gender: v.gender, contact: v.contact, address: v.address,
            chief_complaint: v.chief_complaint, pain_level: v.pain_level,
            pain_description: v.pain_description, additional_symptoms: v.additional_symptoms,
            medical_history: v.medical_history, emergency_name: v.emergency_name,
            emergency_relation: v.emergency_relation, emergency_gender: v.emergency_gender,
            emergency_contact: v.emergency_contact, emergency_address: v.emergency_address,
            heart_rate: v.heart_rate, spo2: v.spo2, body_temp_f: v.body_temp_f,
            env_temp_f: v.env_temp_f, humidity_percent: v.humidity_percent, weight_kg: v.weight_kg,
            created_at: v.created_at,
            archived_at: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap().and_hms_opt(10, 0, 0).unwrap(),
        };
        let out = String::from_utf8(stored_csv(&[stored]).unwrap()).unwrap();
        assert!(out.starts_with("photo,name,"));
        assert!(out.lines().next().unwrap().ends_with(",created_at,archived_at"));
        assert!(out.trim_end().ends_with("2024-03-01 08:05:00,2024-03-02 10:00:00"));
    }
}
