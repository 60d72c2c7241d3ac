use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::{CameraConfig, DEFAULT_CAMERA_HEIGHT, DEFAULT_CAMERA_WIDTH};
use crate::detect::{DetectorSettings, RetryPolicy, DEFAULT_PREDICT_URL};
use crate::gps::{
    GpsMethod, GpsSettings, DEFAULT_BAUD_RATE, DEFAULT_GPSD_ADDR, DEFAULT_SERIAL_PORT,
};
use crate::session::SessionOptions;

const DEFAULT_CAMERA_ID: &str = "0";
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_CAPTURE_INTERVAL_SECS: f64 = 1.0;
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
const DEFAULT_OUTPUT_DIR: &str = "pothole_detections";
const DEFAULT_GPS_TIMEOUT_MS: u64 = 1000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize, Default)]
struct PotholeConfigFile {
    output_dir: Option<PathBuf>,
    camera: Option<CameraConfigFile>,
    session: Option<SessionConfigFile>,
    gps: Option<GpsConfigFile>,
    landing_ai: Option<LandingAiConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    id: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    capture_interval_secs: Option<f64>,
    confidence_threshold: Option<f64>,
    show_camera: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct GpsConfigFile {
    method: Option<String>,
    gpsd_addr: Option<String>,
    serial_port: Option<String>,
    baud_rate: Option<u32>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct LandingAiConfigFile {
    endpoint_id: Option<String>,
    api_key: Option<String>,
    predict_url: Option<String>,
    timeout_secs: Option<u64>,
}

/// Process-wide configuration, fixed at start.
#[derive(Debug, Clone)]
pub struct PotholeConfig {
    pub output_dir: PathBuf,
    pub camera: CameraConfig,
    pub session: SessionSettings,
    pub gps: GpsSettings,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Minimum time between two analyses.
    pub capture_interval: Duration,
    /// Predictions scoring below this are discarded.
    pub confidence_threshold: f64,
    /// Show the live status line while capturing.
    pub show_camera: bool,
}

impl Default for PotholeConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            camera: CameraConfig::default(),
            session: SessionSettings {
                capture_interval: Duration::from_secs_f64(DEFAULT_CAPTURE_INTERVAL_SECS),
                confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
                show_camera: true,
            },
            gps: GpsSettings::default(),
            detector: DetectorSettings::default(),
        }
    }
}

impl PotholeConfig {
    /// Defaults, then the JSON file named by `POTHOLE_CONFIG`, then environment.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("POTHOLE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PotholeConfigFile) -> Result<Self> {
        let camera = file.camera.unwrap_or_default();
        let session = file.session.unwrap_or_default();
        let gps = file.gps.unwrap_or_default();
        let landing_ai = file.landing_ai.unwrap_or_default();

        let capture_interval = seconds(
            "session.capture_interval_secs",
            session
                .capture_interval_secs
                .unwrap_or(DEFAULT_CAPTURE_INTERVAL_SECS),
        )?;
        let method = match gps.method.as_deref() {
            Some(method) => method.parse()?,
            None => GpsMethod::Auto,
        };

        Ok(Self {
            output_dir: file
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            camera: CameraConfig {
                device: camera.id.unwrap_or_else(|| DEFAULT_CAMERA_ID.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            },
            session: SessionSettings {
                capture_interval,
                confidence_threshold: session
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                show_camera: session.show_camera.unwrap_or(true),
            },
            gps: GpsSettings {
                method,
                gpsd_addr: gps
                    .gpsd_addr
                    .unwrap_or_else(|| DEFAULT_GPSD_ADDR.to_string()),
                serial_port: gps
                    .serial_port
                    .unwrap_or_else(|| DEFAULT_SERIAL_PORT.to_string()),
                baud_rate: gps.baud_rate.unwrap_or(DEFAULT_BAUD_RATE),
                timeout: Duration::from_millis(gps.timeout_ms.unwrap_or(DEFAULT_GPS_TIMEOUT_MS)),
            },
            detector: DetectorSettings {
                predict_url: landing_ai
                    .predict_url
                    .unwrap_or_else(|| DEFAULT_PREDICT_URL.to_string()),
                endpoint_id: landing_ai.endpoint_id.unwrap_or_default(),
                api_key: landing_ai.api_key.unwrap_or_default(),
                request_timeout: Duration::from_secs(
                    landing_ai
                        .timeout_secs
                        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
                ),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = env_value("POTHOLE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(id) = env_value("POTHOLE_CAMERA_ID") {
            self.camera.device = id;
        }
        if let Some(interval) = env_value("POTHOLE_CAPTURE_INTERVAL") {
            let secs: f64 = interval
                .parse()
                .map_err(|_| anyhow!("POTHOLE_CAPTURE_INTERVAL must be a number of seconds"))?;
            self.session.capture_interval = seconds("POTHOLE_CAPTURE_INTERVAL", secs)?;
        }
        if let Some(threshold) = env_value("POTHOLE_CONFIDENCE_THRESHOLD") {
            self.session.confidence_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("POTHOLE_CONFIDENCE_THRESHOLD must be a number"))?;
        }
        if let Some(show) = env_value("POTHOLE_SHOW_CAMERA") {
            self.session.show_camera = parse_bool("POTHOLE_SHOW_CAMERA", &show)?;
        }
        if let Some(method) = env_value("POTHOLE_GPS_METHOD") {
            self.gps.method = method.parse()?;
        }
        if let Some(addr) = env_value("POTHOLE_GPSD_ADDR") {
            self.gps.gpsd_addr = addr;
        }
        if let Some(port) = env_value("POTHOLE_SERIAL_PORT") {
            self.gps.serial_port = port;
        }
        if let Some(baud) = env_value("POTHOLE_BAUD_RATE") {
            self.gps.baud_rate = baud
                .parse()
                .map_err(|_| anyhow!("POTHOLE_BAUD_RATE must be an integer"))?;
        }
        if let Some(endpoint) = env_value("LANDING_AI_ENDPOINT_ID") {
            self.detector.endpoint_id = endpoint;
        }
        if let Some(key) = env_value("LANDING_AI_API_KEY") {
            self.detector.api_key = key;
        }
        if let Some(url) = env_value("LANDING_AI_PREDICT_URL") {
            self.detector.predict_url = url;
        }
        Ok(())
    }

    /// Capture-loop options derived from this configuration.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            capture_interval: self.session.capture_interval,
            confidence_threshold: self.session.confidence_threshold,
            show_status: self.session.show_camera,
            retry: RetryPolicy::default(),
            max_analyses: None,
            camera_id: self.camera.device.clone(),
        }
    }

    /// Range checks. Credentials are checked when a detection session starts,
    /// so the camera and GPS smoke tests run without them.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.session.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1] (got {})",
                threshold
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera id must not be empty"));
        }
        if self.gps.baud_rate == 0 {
            return Err(anyhow!("baud rate must be greater than zero"));
        }
        let predict_url = url::Url::parse(&self.detector.predict_url).map_err(|e| {
            anyhow!("invalid predict url {}: {}", self.detector.predict_url, e)
        })?;
        if !matches!(predict_url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "predict url must use http or https (got {})",
                predict_url.scheme()
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PotholeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn seconds(name: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| anyhow!("{} must be a non-negative number of seconds: {}", name, e))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be true or false", name)),
    }
}
