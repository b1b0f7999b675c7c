use log::warn;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::env;
use std::path::PathBuf;

const DEFAULT_ADMIN_ID: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin";
const DEFAULT_DOCTOR_ID: &str = "doctor";
const DEFAULT_DOCTOR_PASSWORD: &str = "doctor";

// Config
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub session_secret: String,
    pub session_ttl: i64, // In hours
    pub admin_id: String,
    pub admin_password: String,
    pub doctor_id: String,
    pub doctor_password: String,
    pub serial_port: String,
    pub baud_rate: u32,
    pub uploads_dir: PathBuf,
    pub static_dir: PathBuf,
    pub camera_snapshot_path: PathBuf,
    pub event_queue_capacity: usize,
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            session_secret: Self::generate_secure_secret(),
            session_ttl: 12,
            admin_id: DEFAULT_ADMIN_ID.to_string(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            doctor_id: DEFAULT_DOCTOR_ID.to_string(),
            doctor_password: DEFAULT_DOCTOR_PASSWORD.to_string(),
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            uploads_dir: PathBuf::from("uploads"),
            static_dir: PathBuf::from("static"),
            camera_snapshot_path: PathBuf::from("camera/latest.jpg"),
            event_queue_capacity: 64,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let session_secret = match env::var("SESSION_SECRET") {
            Ok(val) => val,
            Err(e) => {
                warn!("Failed to load SESSION_SECRET: {}", e);
                warn!("Using a random session secret - sessions will not survive a restart!");
                defaults.session_secret
            }
        };

        let admin_id = env_or_warn("ADMIN_ID", DEFAULT_ADMIN_ID);
        let admin_password = env_or_warn("ADMIN_PASSWORD", DEFAULT_ADMIN_PASSWORD);
        let doctor_id = env_or_warn("DOCTOR_ID", DEFAULT_DOCTOR_ID);
        let doctor_password = env_or_warn("DOCTOR_PASSWORD", DEFAULT_DOCTOR_PASSWORD);

        Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parsed_env("PORT").unwrap_or(defaults.port),
            session_secret,
            session_ttl: parsed_env("SESSION_TTL_HOURS").unwrap_or(defaults.session_ttl),
            admin_id,
            admin_password,
            doctor_id,
            doctor_password,
            serial_port: env::var("SERIAL_PORT").unwrap_or(defaults.serial_port),
            baud_rate: parsed_env("BAUD_RATE").unwrap_or(defaults.baud_rate),
            uploads_dir: env::var("UPLOADS_DIR").map(PathBuf::from).unwrap_or(defaults.uploads_dir),
            static_dir: env::var("STATIC_DIR").map(PathBuf::from).unwrap_or(defaults.static_dir),
            camera_snapshot_path: env::var("CAMERA_SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.camera_snapshot_path),
            event_queue_capacity: parsed_env("EVENT_QUEUE_CAPACITY")
                .unwrap_or(defaults.event_queue_capacity),
            max_upload_bytes: parsed_env("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.admin_password == DEFAULT_ADMIN_PASSWORD || self.doctor_password == DEFAULT_DOCTOR_PASSWORD {
            warn!("Using default staff credentials is not secure for production!");
        }

        if self.session_secret.len() < 16 {
            return Err("SESSION_SECRET must be at least 16 characters".to_string());
        }

        if self.session_ttl <= 0 {
            return Err("SESSION_TTL_HOURS must be positive".to_string());
        }

        if self.baud_rate == 0 {
            return Err("BAUD_RATE must be positive".to_string());
        }

        if self.event_queue_capacity == 0 {
            return Err("EVENT_QUEUE_CAPACITY must be positive".to_string());
        }

        if self.max_upload_bytes == 0 {
            return Err("MAX_UPLOAD_BYTES must be positive".to_string());
        }

        Ok(())
    }

    pub fn generate_secure_secret() -> String {
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    }
}

fn env_or_warn(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        warn!("{} not set, falling back to the default value", key);
        default.to_string()
    })
}

fn parsed_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_ttl() {
        let config = AppConfig { session_ttl: 0, ..AppConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_short_secret() {
        let config = AppConfig { session_secret: "short".to_string(), ..AppConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_upload_limit() {
        let config = AppConfig { max_upload_bytes: 0, ..AppConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn generated_secret_is_alphanumeric() {
        let secret = AppConfig::generate_secure_secret();
        assert_eq!(secret.len(), 32);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
