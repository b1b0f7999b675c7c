//! Bedside hardware: the serial sensor board, the intake camera, photo
//! uploads and the realtime event stream.

use super::{page, redirect};
use crate::camera::{save_upload, mjpeg_stream, Camera, CameraError, MJPEG_BOUNDARY};
use crate::config::AppConfig;
use crate::errors::ApiError;
use crate::events::EventBroker;
use crate::sensor::{available_ports, SensorHub};
use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{get, post, web, HttpResponse, Responder};
use futures::StreamExt;
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

const PHOTO_FIELD: &str = "photo";

#[derive(Deserialize, Debug)]
pub struct PortForm {
    #[serde(default)]
    pub port: String,
}

/// `patient_<8 hex>.jpg`
pub fn upload_filename() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("patient_{}.jpg", &id[..8])
}

/// Appends an upload chunk, failing once the total passes `limit`.
pub fn append_chunk(buf: &mut Vec<u8>, chunk: &[u8], limit: usize) -> Result<(), ApiError> {
    if buf.len() + chunk.len() > limit {
        warn!("Rejected photo upload over {} bytes", limit);
        return Err(ApiError::ValidationError(format!("Photo exceeds the {} byte upload limit", limit)));
    }
    buf.extend_from_slice(chunk);
    Ok(())
}

fn camera_error(status: actix_web::http::StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(json!({ "status": "error", "message": message.into() }))
}

#[get("/sensor")]
async fn sensor_page(hub: web::Data<SensorHub>) -> impl Responder {
    page("sensor", json!({ "data": hub.latest().as_ref(), "port": hub.port() }))
}

#[get("/port")]
async fn port_page(hub: web::Data<SensorHub>) -> impl Responder {
    let ports = web::block(available_ports).await.unwrap_or_else(|e| {
        warn!("Serial port scan failed: {}", e);
        Vec::new()
    });
    page("port", json!({ "ports": ports, "selected": hub.port(), "baud_rate": hub.baud_rate() }))
}

#[post("/set_port")]
async fn set_port(hub: web::Data<SensorHub>, form: web::Form<PortForm>) -> Result<HttpResponse, ApiError> {
    if form.port.trim().is_empty() {
        return Err(ApiError::ValidationError("Port is required".to_string()));
    }
    hub.set_port(&form.port);
    Ok(redirect("/sensor"))
}

#[get("/api/sensor")]
async fn sensor_latest(hub: web::Data<SensorHub>) -> impl Responder {
    HttpResponse::Ok().json(hub.latest().as_ref())
}

#[get("/api/sensor/history")]
async fn sensor_history(hub: web::Data<SensorHub>) -> impl Responder {
    HttpResponse::Ok().json(hub.history())
}

#[get("/qa")]
async fn qa_page(hub: web::Data<SensorHub>) -> impl Responder {
    page("qa", json!({ "sensor": hub.latest().as_ref() }))
}

#[get("/camera")]
async fn camera_page(camera: web::Data<Camera>) -> impl Responder {
    page("camera", json!({ "camera": camera.status() }))
}

#[get("/camera/video_feed")]
async fn video_feed(camera: web::Data<Camera>) -> HttpResponse {
    if let Err(e) = camera.start() {
        error!("Camera start failed: {}", e);
        return camera_error(actix_web::http::StatusCode::SERVICE_UNAVAILABLE, e.to_string());
    }
    HttpResponse::Ok()
        .content_type(format!("multipart/x-mixed-replace; boundary={}", MJPEG_BOUNDARY))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(mjpeg_stream(camera.into_inner()))
}

async fn capture(camera: web::Data<Camera>) -> HttpResponse {
    use actix_web::http::StatusCode;

    if let Err(e) = camera.start() {
        error!("Camera start failed: {}", e);
        return camera_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string());
    }
    let camera = camera.into_inner();
    match web::block(move || camera.take_picture(None)).await {
        Ok(Ok(filename)) => HttpResponse::Ok().json(json!({ "status": "success", "filename": filename })),
        Ok(Err(CameraError::NoFrame)) => {
            warn!("No frame available for photo capture");
            camera_error(StatusCode::INTERNAL_SERVER_ERROR, "No frame available")
        },
        Ok(Err(e)) => {
            error!("Photo capture failed: {}", e);
            camera_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        },
        Err(e) => {
            error!("Photo capture task failed: {}", e);
            camera_error(StatusCode::INTERNAL_SERVER_ERROR, "Photo capture failed")
        },
    }
}

#[get("/take_picture")]
async fn take_picture(camera: web::Data<Camera>) -> HttpResponse {
    capture(camera).await
}

#[get("/test_photo")]
async fn test_photo(camera: web::Data<Camera>) -> HttpResponse {
    debug!("Test photo requested");
    capture(camera).await
}

#[get("/camera_status")]
async fn camera_status(camera: web::Data<Camera>) -> impl Responder {
    HttpResponse::Ok().json(camera.status())
}

#[post("/upload_photo")]
async fn upload_photo(config: web::Data<AppConfig>, mut payload: Multipart) -> Result<HttpResponse, ApiError> {
    let mut photo: Option<Vec<u8>> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| ApiError::ValidationError(format!("Invalid upload: {}", e)))?;
        let disposition = field.content_disposition();
        if disposition.get_name() != Some(PHOTO_FIELD) {
            continue;
        }
        if disposition.get_filename().map_or(true, str::is_empty) {
            return Err(ApiError::ValidationError("No photo selected".to_string()));
        }
        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| ApiError::ValidationError(format!("Invalid upload: {}", e)))?;
            append_chunk(&mut bytes, &chunk, config.max_upload_bytes)?;
        }
        photo = Some(bytes);
    }

    let bytes = photo.ok_or_else(|| ApiError::ValidationError("No photo uploaded".to_string()))?;
    let filename = upload_filename();
    let dir = config.uploads_dir.clone();
    let name = filename.clone();
    let saved = web::block(move || save_upload(&dir, &name, &bytes))
        .await
        .map_err(ApiError::blocking)?
        .map_err(|e| {
            error!("Photo save failed: {}", e);
            ApiError::InternalError("Failed to save photo".to_string())
        })?;
    info!("Photo saved: {}", saved.display());

    Ok(HttpResponse::Ok().json(json!({ "status": "success", "filename": filename })))
}

#[get("/events/patients")]
async fn patient_events(broker: web::Data<EventBroker>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(broker.subscribe())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(sensor_page)
        .service(port_page)
        .service(set_port)
        .service(sensor_latest)
        .service(sensor_history)
        .service(qa_page)
        .service(camera_page)
        .service(video_feed)
        .service(take_picture)
        .service(test_photo)
        .service(camera_status)
        .service(upload_photo)
        .service(patient_events);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SnapshotFileSource;
    use actix_web::{http::StatusCode, test, App};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[::core::prelude::v1::test]
    fn upload_names_are_short_hex() {
        let name = upload_filename();
        assert!(name.starts_with("patient_") && name.ends_with(".jpg"));
        let hex = &name["patient_".len()..name.len() - ".jpg".len()];
        assert_eq!(hex.len(), 8);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[::core::prelude::v1::test]
    fn uploads_stop_at_the_size_limit() {
        let mut buf = Vec::new();
        append_chunk(&mut buf, &[1; 6], 10).unwrap();
        append_chunk(&mut buf, &[2; 4], 10).unwrap();
        assert_eq!(buf.len(), 10);
        let err = append_chunk(&mut buf, &[3], 10).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
        assert_eq!(buf.len(), 10);
    }

    #[actix_web::test]
    async fn oversized_upload_is_rejected() {
        let dir = tempdir().unwrap();
        let config = AppConfig { uploads_dir: dir.path().to_path_buf(), max_upload_bytes: 8, ..AppConfig::default() };
        let app = test::init_service(App::new().app_data(web::Data::new(config)).service(upload_photo)).await;
        let body = "--XBOUNDARY\r\n\
            Content-Disposition: form-data; name=\"photo\"; filename=\"big.jpg\"\r\n\
            Content-Type: image/jpeg\r\n\r\n\
            0123456789abcdef\r\n\
            --XBOUNDARY--\r\n";
        let req = test::TestRequest::post()
            .uri("/upload_photo")
            .insert_header((header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY"))
            .set_payload(body)
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[actix_web::test]
    async fn sensor_endpoints_serve_latest_reading() {
        let hub = web::Data::new(SensorHub::new("/dev/null", 9600));
        hub.ingest(r#"JSON:{"temperature":36.6,"heartRate":70,"spo2":99}"#);
        let app = test::init_service(
            App::new().app_data(hub.clone()).service(sensor_latest).service(sensor_history),
        )
        .await;

        let latest: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/sensor").to_request()).await;
        assert_eq!(latest["heart_rate"], 70.0);

        let history: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/api/sensor/history").to_request(),
        )
        .await;
        assert_eq!(history["spo2"].as_array().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn set_port_redirects_to_sensor_page() {
        let hub = web::Data::new(SensorHub::new("/dev/ttyUSB0", 9600));
        let app = test::init_service(App::new().app_data(hub.clone()).service(set_port)).await;
        let req = test::TestRequest::post().uri("/set_port").set_form([("port", "/dev/ttyACM1")]).to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(hub.port(), "/dev/ttyACM1");
    }

    #[actix_web::test]
    async fn capture_without_frame_is_an_error() {
        let dir = tempdir().unwrap();
        let camera = web::Data::from(Arc::new(Camera::new(
            Arc::new(SnapshotFileSource::new(dir.path().join("missing.jpg"))),
            dir.path(),
        )));
        let app = test::init_service(App::new().app_data(camera.clone()).service(take_picture)).await;
        let res = test::call_service(&app, test::TestRequest::get().uri("/take_picture").to_request()).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        camera.stop();
    }

    #[actix_web::test]
    async fn capture_saves_current_frame() {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("latest.jpg");
        std::fs::write(&snapshot, b"jpeg").unwrap();
        let uploads = dir.path().join("uploads");
        let camera = web::Data::from(Arc::new(Camera::new(Arc::new(SnapshotFileSource::new(&snapshot)), &uploads)));
        let app = test::init_service(App::new().app_data(camera.clone()).service(test_photo)).await;

        let body: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/test_photo").to_request()).await;
        assert_eq!(body["status"], "success");
        let filename = body["filename"].as_str().unwrap();
        assert!(uploads.join(filename).exists());
        camera.stop();
    }
}
