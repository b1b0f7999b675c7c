//! Camera frames for intake photos.
//!
//! Frames come from a [`FrameSource`]; in production that is a JPEG snapshot
//! file kept fresh by an external capture process.

use actix_web::web::Bytes;
use chrono::Local;
use futures::Stream;
use log::{debug, info, warn};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

const FRAME_INTERVAL: Duration = Duration::from_millis(33);
const IDLE_INTERVAL: Duration = Duration::from_millis(100);
pub const MJPEG_BOUNDARY: &str = "frame";

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("Could not open camera source {0}: {1}")]
    Unavailable(String, io::Error),
    #[error("No frame available")]
    NoFrame,
    #[error("Failed to save picture: {0}")]
    Io(#[from] io::Error),
}

pub trait FrameSource: Send + Sync {
    /// Latest JPEG frame, `None` when nothing has been captured yet.
    fn grab(&self) -> io::Result<Option<Vec<u8>>>;
    fn describe(&self) -> String;
}

pub struct SnapshotFileSource {
    path: PathBuf,
}

impl SnapshotFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FrameSource for SnapshotFileSource {
    fn grab(&self) -> io::Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Debug, Serialize)]
pub struct CameraStatus {
    pub running: bool,
    pub has_frame: bool,
    pub source: String,
}

pub struct Camera {
    source: Arc<dyn FrameSource>,
    frame: RwLock<Option<Bytes>>,
    running: AtomicBool,
    uploads_dir: PathBuf,
}

impl Camera {
    pub fn new(source: Arc<dyn FrameSource>, uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            frame: RwLock::new(None),
            running: AtomicBool::new(false),
            uploads_dir: uploads_dir.into(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn frame(&self) -> Option<Bytes> {
        match self.frame.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store_frame(&self, frame: Option<Vec<u8>>) {
        if let Some(bytes) = frame {
            let bytes = Bytes::from(bytes);
            match self.frame.write() {
                Ok(mut guard) => *guard = Some(bytes),
                Err(poisoned) => *poisoned.into_inner() = Some(bytes),
            }
        }
    }

    pub fn status(&self) -> CameraStatus {
        CameraStatus {
            running: self.is_running(),
            has_frame: self.frame().is_some(),
            source: self.source.describe(),
        }
    }

    /// Grabs a first frame and starts polling the source. No-op when already running.
    pub fn start(self: &Arc<Self>) -> Result<(), CameraError> {
        if self.is_running() {
            return Ok(());
        }
        let first = self
            .source
            .grab()
            .map_err(|e| CameraError::Unavailable(self.source.describe(), e))?;
        self.store_frame(first);
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Camera started on {}", self.source.describe());

        let camera = Arc::clone(self);
        tokio::spawn(async move {
            while camera.is_running() {
                let source = camera.source.clone();
                match tokio::task::spawn_blocking(move || source.grab()).await {
                    Ok(Ok(frame)) => camera.store_frame(frame),
                    Ok(Err(e)) => warn!("Camera frame read failed: {}", e),
                    Err(e) => warn!("Camera poll task failed: {}", e),
                }
                tokio::time::sleep(FRAME_INTERVAL).await;
            }
            debug!("Camera poll loop finished");
        });
        Ok(())
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Camera stopped");
        }
    }

    /// Saves the current frame under the uploads dir and returns its file name.
    pub fn take_picture(&self, filename: Option<String>) -> Result<String, CameraError> {
        let frame = self.frame().ok_or(CameraError::NoFrame)?;
        let filename = filename
            .unwrap_or_else(|| format!("patient_{}.jpg", Local::now().format("%Y%m%d_%H%M%S")));
        save_upload(&self.uploads_dir, &filename, &frame)?;
        info!("Photo captured: {}", filename);
        Ok(filename)
    }
}

pub fn save_upload(dir: &Path, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// One multipart/x-mixed-replace part.
pub fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let mut part = Vec::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", MJPEG_BOUNDARY).as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Endless MJPEG stream of the camera's latest frames.
pub fn mjpeg_stream(camera: Arc<Camera>) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    futures::stream::unfold(camera, |camera| async move {
        loop {
            match camera.frame() {
                Some(frame) => {
                    tokio::time::sleep(FRAME_INTERVAL).await;
                    return Some((Ok(mjpeg_part(&frame)), camera));
                },
                None => tokio::time::sleep(IDLE_INTERVAL).await,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::tempdir;

    #[test]
    fn snapshot_source_reads_file_or_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latest.jpg");
        let source = SnapshotFileSource::new(&path);
        assert_eq!(source.grab().unwrap(), None);
        std::fs::write(&path, b"\xff\xd8jpeg").unwrap();
        assert_eq!(source.grab().unwrap(), Some(b"\xff\xd8jpeg".to_vec()));
    }

    #[test]
    fn no_frame_means_no_picture() {
        let dir = tempdir().unwrap();
        let camera = Camera::new(Arc::new(SnapshotFileSource::new(dir.path().join("none.jpg"))), dir.path());
        assert!(matches!(camera.take_picture(None), Err(CameraError::NoFrame)));
        assert!(!camera.status().has_frame);
    }

    #[tokio::test]
    async fn start_then_capture_writes_upload() {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("latest.jpg");
        std::fs::write(&snapshot, b"frame-bytes").unwrap();
        let uploads = dir.path().join("uploads");

        let camera = Arc::new(Camera::new(Arc::new(SnapshotFileSource::new(&snapshot)), &uploads));
        camera.start().unwrap();
        assert!(camera.is_running());

        let name = camera.take_picture(None).unwrap();
        assert!(name.starts_with("patient_") && name.ends_with(".jpg"));
        assert_eq!(std::fs::read(uploads.join(&name)).unwrap(), b"frame-bytes");

        let named = camera.take_picture(Some("patient_test.jpg".into())).unwrap();
        assert_eq!(named, "patient_test.jpg");
        camera.stop();
        assert!(!camera.is_running());
    }

    #[tokio::test]
    async fn stream_emits_multipart_frames() {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("latest.jpg");
        std::fs::write(&snapshot, b"JPEG").unwrap();
        let camera = Arc::new(Camera::new(Arc::new(SnapshotFileSource::new(&snapshot)), dir.path()));
        camera.start().unwrap();

        let mut stream = Box::pin(mjpeg_stream(camera.clone()));
        let part = stream.next().await.unwrap().unwrap();
        assert_eq!(&part[..], b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n");
        camera.stop();
    }
}
