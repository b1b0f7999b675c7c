//! Serial sensor link.
//!
//! The bedside board prints debug text and, once per measurement, a line of
//! the form `JSON:{"temperature":36.9,"heartRate":72,...}`. A blocking reader
//! task feeds those readings into the [`SensorHub`], which handlers read.

use crate::models::VisitFields;
use chrono::Local;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

pub const HISTORY_LEN: usize = 50;
const LINE_PREFIX: &str = "JSON:";
const RETRY_DELAY: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SensorReading {
    pub temperature: f64,
    pub heart_rate: f64,
    pub spo2: f64,
    pub weight: f64,
    pub env_temperature: f64,
    pub humidity: f64,
    pub status: String,
    pub measurements: i64,
    pub timestamp: String,
}

impl Default for SensorReading {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            heart_rate: 0.0,
            spo2: 0.0,
            weight: 0.0,
            env_temperature: 0.0,
            humidity: 0.0,
            status: "normal".to_string(),
            measurements: 0,
            timestamp: clock(),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct DevicePayload {
    temperature: f64,
    heart_rate: f64,
    spo2: f64,
    weight: f64,
    env_temperature: f64,
    humidity: f64,
    status: Option<String>,
    measurements: f64,
}

#[derive(Debug)]
pub enum SerialLine {
    Reading(SensorReading),
    Debug(String),
    Malformed(serde_json::Error),
}

fn clock() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

pub fn parse_line(line: &str, timestamp: String) -> SerialLine {
    let line = line.trim();
    let Some(json) = line.strip_prefix(LINE_PREFIX) else {
        return SerialLine::Debug(line.to_string());
    };
    match serde_json::from_str::<DevicePayload>(json) {
        Ok(p) => SerialLine::Reading(SensorReading {
            temperature: p.temperature,
            heart_rate: p.heart_rate,
            spo2: p.spo2,
            weight: p.weight,
            env_temperature: p.env_temperature,
            humidity: p.humidity,
            status: p.status.unwrap_or_else(|| "normal".to_string()),
            measurements: p.measurements as i64,
            timestamp,
        }),
        Err(e) => SerialLine::Malformed(e),
    }
}

/// Last [`HISTORY_LEN`] readings, one column per channel.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SensorHistory {
    pub temperature: VecDeque<f64>,
    pub heart_rate: VecDeque<f64>,
    pub spo2: VecDeque<f64>,
    pub weight: VecDeque<f64>,
    pub env_temperature: VecDeque<f64>,
    pub humidity: VecDeque<f64>,
    pub timestamps: VecDeque<String>,
}

impl SensorHistory {
    pub fn push(&mut self, r: &SensorReading) {
        self.temperature.push_back(r.temperature);
        self.heart_rate.push_back(r.heart_rate);
        self.spo2.push_back(r.spo2);
        self.weight.push_back(r.weight);
        self.env_temperature.push_back(r.env_temperature);
        self.humidity.push_back(r.humidity);
        self.timestamps.push_back(r.timestamp.clone());

        if self.timestamps.len() > HISTORY_LEN {
            self.temperature.pop_front();
            self.heart_rate.pop_front();
            self.spo2.pop_front();
            self.weight.pop_front();
            self.env_temperature.pop_front();
            self.humidity.pop_front();
            self.timestamps.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

pub struct SensorHub {
    latest: RwLock<Arc<SensorReading>>,
    history: RwLock<SensorHistory>,
    port: RwLock<String>,
    baud_rate: u32,
    stopped: AtomicBool,
}

impl SensorHub {
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            latest: RwLock::new(Arc::new(SensorReading::default())),
            history: RwLock::new(SensorHistory::default()),
            port: RwLock::new(port.to_string()),
            baud_rate,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn latest(&self) -> Arc<SensorReading> {
        match self.latest.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn history(&self) -> SensorHistory {
        match self.history.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn publish(&self, reading: SensorReading) {
        match self.history.write() {
            Ok(mut guard) => guard.push(&reading),
            Err(poisoned) => poisoned.into_inner().push(&reading),
        }
        let snapshot = Arc::new(reading);
        match self.latest.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    pub fn port(&self) -> String {
        match self.port.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Switches the serial port; the reader reconnects on its next poll.
    pub fn set_port(&self, port: &str) {
        let port = port.trim().to_string();
        info!("Sensor port set to {}", port);
        match self.port.write() {
            Ok(mut guard) => *guard = port,
            Err(poisoned) => *poisoned.into_inner() = port,
        }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Handles one raw serial line.
    pub fn ingest(&self, line: &str) {
        match parse_line(line, clock()) {
            SerialLine::Reading(r) => {
                debug!(
                    "Sensor reading: temp={}C hr={} spo2={}% weight={}kg env={}C humidity={}%",
                    r.temperature, r.heart_rate, r.spo2, r.weight, r.env_temperature, r.humidity
                );
                self.publish(r);
            },
            SerialLine::Debug(text) => {
                if !text.is_empty() {
                    debug!("Sensor board: {}", text);
                }
            },
            SerialLine::Malformed(e) => debug!("Ignoring malformed sensor payload: {}", e),
        }
    }
}

/// Serial ports visible to the host.
pub fn available_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            warn!("Could not enumerate serial ports: {}", e);
            Vec::new()
        }
    }
}

/// Feeds lines into the hub until EOF, an I/O error, or `keep_going` returns false.
/// Read timeouts are not errors; a partial line is kept until the rest arrives.
pub fn read_lines<R: BufRead>(
    mut reader: R,
    hub: &SensorHub,
    keep_going: impl Fn() -> bool,
) -> io::Result<()> {
    let mut line = String::new();
    while keep_going() {
        match reader.read_line(&mut line) {
            Ok(0) => return Ok(()),
            Ok(_) => {
                hub.ingest(&line);
                line.clear();
            },
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {},
            Err(e) if e.kind() == io::ErrorKind::InvalidData => line.clear(),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn wait_before_retry(hub: &SensorHub, port: &str) {
    let started = Instant::now();
    while started.elapsed() < RETRY_DELAY && !hub.is_stopped() && hub.port() == port {
        std::thread::sleep(Duration::from_millis(250));
    }
}

fn run_reader(hub: Arc<SensorHub>) {
    while !hub.is_stopped() {
        let port = hub.port();
        match serialport::new(&port, hub.baud_rate()).timeout(READ_TIMEOUT).open() {
            Ok(device) => {
                info!("Connected to sensor board on {}", port);
                let still_current = || !hub.is_stopped() && hub.port() == port;
                match read_lines(BufReader::new(device), &hub, still_current) {
                    Ok(()) if hub.port() != port => info!("Sensor port changed, leaving {}", port),
                    Ok(()) => {},
                    Err(e) => {
                        error!("Sensor link on {} failed: {}", port, e);
                        wait_before_retry(&hub, &port);
                    },
                }
            },
            Err(e) => {
                warn!("Could not open sensor port {}: {}. Retrying in {:?}", port, e, RETRY_DELAY);
                wait_before_retry(&hub, &port);
            },
        }
    }
    info!("Sensor reader stopped");
}

/// Starts the background serial reader on the blocking pool.
pub fn spawn_reader(hub: Arc<SensorHub>) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || run_reader(hub))
}

fn celsius_to_fahrenheit(c: f64) -> Option<f64> {
    if c > 0.0 {
        Some(c * 9.0 / 5.0 + 32.0)
    } else {
        None
    }
}

/// Fills vitals the client left out from the latest reading. Temperatures
/// are stored in Fahrenheit and only when the sensor reported a positive value.
pub fn fill_missing_vitals(visit: &mut VisitFields, reading: &SensorReading) {
    visit.heart_rate = visit.heart_rate.or(Some(reading.heart_rate));
    visit.spo2 = visit.spo2.or(Some(reading.spo2));
    visit.humidity_percent = visit.humidity_percent.or(Some(reading.humidity));
    visit.weight_kg = visit.weight_kg.or(Some(reading.weight));
    if visit.body_temp_f.is_none() {
        visit.body_temp_f = celsius_to_fahrenheit(reading.temperature);
    }
    if visit.env_temp_f.is_none() {
        visit.env_temp_f = celsius_to_fahrenheit(reading.env_temperature);
    }
}
