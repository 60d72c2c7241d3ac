//! Pothole Witness
//!
//! Polls a camera, tags frames with the current GPS position, submits them to
//! a remote pothole detector at a fixed interval and keeps a local record of
//! every detection.
//!
//! # Module Structure
//!
//! - `camera`: Frame sources (synthetic `stub://`, V4L2 behind `camera-v4l2`)
//! - `gps`: LocationProvider over gpsd, serial NMEA and synthetic backends
//! - `detect`: DetectionClient contract, Landing AI client, box normalization, retry policy
//! - `record`: Detection images, JSON batch records and the daily log
//! - `session`: The capture loop and its stop signal
//! - `diagnostics`: Camera and GPS smoke tests
//! - `config`, `ui`: Process configuration and terminal feedback

pub mod camera;
pub mod config;
pub mod detect;
pub mod diagnostics;
pub mod frame;
pub mod gps;
pub mod record;
pub mod session;
pub mod ui;

pub use camera::{CameraConfig, CameraSource, CameraStats};
pub use config::{PotholeConfig, SessionSettings};
pub use detect::{
    client_from_settings, normalize_bbox, BoundingBox, Detection, DetectionClient,
    DetectorSettings, RateLimited, RawPrediction, RetryPolicy,
};
pub use frame::Frame;
pub use gps::{GpsMethod, GpsSettings, Location, LocationProvider};
pub use record::{ArtifactCounts, CaptureSettings, DetectionBatch, DetectionRecorder};
pub use session::{CaptureLoop, SessionEnd, SessionOptions, SessionSummary, StopSignal};

