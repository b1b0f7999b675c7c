// Library root for the clinic intake service; the binaries build on these modules

pub mod camera;
pub mod config;
pub mod credentials;
pub mod db;
pub mod errors;
pub mod events;
pub mod export;
pub mod gateway;
pub mod handlers;
pub mod logger;
pub mod middleware;
pub mod models;
pub mod qr;
pub mod schema;
pub mod sensor;
pub mod services;
pub mod session;

// Re-export common types
pub use crate::config::AppConfig;
pub use crate::db::DbPool;
pub use crate::errors::ApiError;
pub use crate::session::{Role, SessionCodec, SessionState};
