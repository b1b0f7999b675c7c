use env_logger::Builder;
use log::{info, LevelFilter};
use std::io::Write;

// Colored single-line log format; RUST_LOG overrides the default level
pub fn setup_logger() {
    let mut builder = Builder::from_default_env();

    builder.format(|buf, record| {
        let level_color = match record.level() {
            log::Level::Error => "\x1B[1;31m",
            log::Level::Warn => "\x1B[1;33m",
            log::Level::Info => "\x1B[1;32m",
            log::Level::Debug => "\x1B[1;36m",
            log::Level::Trace => "\x1B[1;35m",
        };
        let reset = "\x1B[0m";

        writeln!(
            buf,
            "[{}] {}{}{} [{}:{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            level_color,
            record.level(),
            reset,
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        )
    });

    if std::env::var("RUST_LOG").is_err() {
        builder.filter(None, LevelFilter::Info);
    }

    builder.init();

    info!("Logger initialized");
}
