use crate::gateway::parse_patient_id;
use crate::models::PatientProfile;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const PAYLOAD_TYPE: &str = "patient_id";

#[derive(Debug, Error)]
pub enum QrError {
    #[error("Invalid QR code data: {0}")]
    Malformed(String),
    #[error("Invalid QR code type")]
    WrongType,
    #[error("QR code has no patient id")]
    MissingId,
    #[error("Failed to render QR code: {0}")]
    Render(String),
}

/// What a patient card's QR code encodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrPayload {
    pub patient_id: i32,
    pub name: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl QrPayload {
    pub fn for_profile(profile: &PatientProfile) -> Self {
        Self {
            patient_id: profile.id,
            name: profile.name.clone().unwrap_or_default(),
            age: profile.age,
            gender: profile.gender.clone(),
            kind: PAYLOAD_TYPE.to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"patient_id\":{},\"type\":\"{}\"}}", self.patient_id, PAYLOAD_TYPE))
    }
}

fn id_from_value(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()).filter(|n| *n > 0),
        Value::String(s) => parse_patient_id(s),
        _ => None,
    }
}

/// Accepts only `patient_id` payloads; the id may be a number or numeric string.
pub fn parse(data: &str) -> Result<QrPayload, QrError> {
    let value: Value = serde_json::from_str(data).map_err(|e| QrError::Malformed(e.to_string()))?;
    if value.get("type").and_then(Value::as_str) != Some(PAYLOAD_TYPE) {
        return Err(QrError::WrongType);
    }
    let patient_id = value.get("patient_id").and_then(id_from_value).ok_or(QrError::MissingId)?;
    Ok(QrPayload {
        patient_id,
        name: value.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        age: value.get("age").and_then(Value::as_i64).and_then(|a| i32::try_from(a).ok()),
        gender: value.get("gender").and_then(Value::as_str).map(str::to_string),
        kind: PAYLOAD_TYPE.to_string(),
    })
}

/// Patient id named by a `/qr/scan` request. An explicit `patient_id`
/// parameter wins over the `data` payload, even when it fails to parse.
pub fn scan_id(patient_id: Option<&str>, data: Option<&str>) -> Option<i32> {
    match (patient_id.filter(|p| !p.is_empty()), data.filter(|d| !d.is_empty())) {
        (Some(raw), _) => parse_patient_id(raw),
        (None, Some(payload)) => parse(payload).ok().map(|p| p.patient_id),
        (None, None) => None,
    }
}

pub fn render_svg(data: &str) -> Result<String, QrError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)
        .map_err(|e| QrError::Render(e.to_string()))?;
    Ok(code
        .render()
        .min_dimensions(240, 240)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build())
}

/// SVG QR image, base64 encoded for embedding as `data:image/svg+xml;base64,...`.
pub fn render_base64_svg(data: &str) -> Result<String, QrError> {
    Ok(STANDARD.encode(render_svg(data)?))
}
