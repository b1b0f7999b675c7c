use actix_files::Files;
use actix_web::{web, App, HttpServer};
use log::{error, info, warn};
use std::env;
use std::io;
use std::sync::Arc;

use clinic_intake::camera::{Camera, SnapshotFileSource};
use clinic_intake::config::AppConfig;
use clinic_intake::db;
use clinic_intake::events::EventBroker;
use clinic_intake::handlers;
use clinic_intake::logger::setup_logger;
use clinic_intake::middleware::{AccessGateway, RequestLogger};
use clinic_intake::sensor::{self, SensorHub};
use clinic_intake::services::SettingsService;
use clinic_intake::session::SessionCodec;

fn startup_error(context: &str, e: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", context, e);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load environment variables and initialize logger
    dotenvy::dotenv().ok();
    setup_logger();

    // Load and validate configuration
    let config = AppConfig::from_env();
    config
        .validate()
        .map_err(|e| startup_error("Invalid configuration", e))?;

    // Connecting to database
    let db_url = env::var("DATABASE_URL").map_err(|e| startup_error("DATABASE_URL must be set", e))?;
    let pool = db::initialize(&db_url).map_err(|e| startup_error("Database setup failed", e))?;

    if let Err(e) = SettingsService::seed_default_pairs(&config, &pool).await {
        warn!("Could not seed default credentials: {}", e);
    }

    std::fs::create_dir_all(&config.uploads_dir)?;

    // Background devices
    let hub = Arc::new(SensorHub::new(&config.serial_port, config.baud_rate));
    let reader = sensor::spawn_reader(hub.clone());
    let camera = Arc::new(Camera::new(
        Arc::new(SnapshotFileSource::new(&config.camera_snapshot_path)),
        &config.uploads_dir,
    ));
    let broker = EventBroker::new(config.event_queue_capacity);
    let codec = SessionCodec::from_config(&config);

    let host = config.host.clone();
    let port = config.port;
    info!("Starting HTTP server at http://{}:{}", host, port);

    let server_hub = hub.clone();
    let server_camera = camera.clone();
    let result = HttpServer::new(move || {
        App::new()
            // Gateway runs inside the request logger so redirects are logged too
            .wrap(AccessGateway::new(codec.clone()))
            .wrap(RequestLogger)
            // Register app data
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(codec.clone()))
            .app_data(web::Data::from(server_hub.clone()))
            .app_data(web::Data::from(server_camera.clone()))
            .app_data(web::Data::new(broker.clone()))
            .service(Files::new("/static", config.static_dir.clone()))
            .service(Files::new("/uploads", config.uploads_dir.clone()))
            .configure(handlers::configure)
    })
    .workers(2) // Specify number of workers
    .keep_alive(std::time::Duration::from_secs(75)) // Configure keep-alive
    .shutdown_timeout(30) // Graceful shutdown timeout in seconds
    .bind((host, port))?
    .run()
    .await;

    hub.stop();
    camera.stop();
    if let Err(e) = reader.await {
        warn!("Sensor reader ended abnormally: {}", e);
    }
    info!("Server stopped");
    result
}
