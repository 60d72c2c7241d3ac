//! Camera frame sources.
//!
//! This module provides the sources the capture loop pulls frames from:
//! - Synthetic cameras (`stub://name`) for tests and hardware-free runs
//! - USB/V4L2 devices (feature: camera-v4l2)
//!
//! A camera is opened by identifier. A bare number `N` selects `/dev/videoN`,
//! any other string is taken as a device path, and `stub://` selects the
//! synthetic source. The resolution is fixed when the source is opened.

#[cfg(feature = "camera-v4l2")]
mod normalize;
#[cfg(feature = "camera-v4l2")]
mod v4l2;

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use crate::frame::Frame;
#[cfg(feature = "camera-v4l2")]
use v4l2::DeviceCamera;

pub const DEFAULT_CAMERA_WIDTH: u32 = 640;
pub const DEFAULT_CAMERA_HEIGHT: u32 = 480;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Camera identifier: `0`, `/dev/video2`, or `stub://name`.
    pub device: String,
    /// Requested frame width.
    pub width: u32,
    /// Requested frame height.
    pub height: u32,
    /// Pacing for synthetic frames and the V4L2 capture rate. Zero disables pacing.
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "0".to_string(),
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            target_fps: 30,
        }
    }
}

impl CameraConfig {
    /// Device node the identifier refers to.
    pub fn device_path(&self) -> String {
        resolve_device_path(&self.device)
    }
}

/// Resolve a camera identifier to a device path.
pub fn resolve_device_path(device: &str) -> String {
    let trimmed = device.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        format!("/dev/video{}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "camera-v4l2")]
    Device(DeviceCamera),
}

impl CameraSource {
    /// Open the camera described by `config`.
    pub fn open(config: CameraConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!(
                "camera resolution must be non-zero (got {}x{})",
                config.width,
                config.height
            ));
        }
        let backend = if config.device.starts_with("stub://") {
            CameraBackend::Synthetic(SyntheticCamera::new(config))
        } else {
            open_device(config)?
        };
        Ok(Self { backend })
    }

    /// Capture the next frame. An error here ends the detection session.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::Device(source) => source.next_frame(),
        }
    }

    /// Active resolution after format negotiation.
    pub fn resolution(&self) -> (u32, u32) {
        match &self.backend {
            CameraBackend::Synthetic(source) => (source.config.width, source.config.height),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::Device(source) => source.resolution(),
        }
    }

    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::Device(source) => source.stats(),
        }
    }

    /// Release the device handle.
    pub fn release(self) {
        let stats = self.stats();
        log::info!(
            "camera {} released after {} frames",
            stats.device,
            stats.frames_captured
        );
    }
}

#[cfg(feature = "camera-v4l2")]
fn open_device(config: CameraConfig) -> Result<CameraBackend> {
    Ok(CameraBackend::Device(DeviceCamera::open(config)?))
}

#[cfg(not(feature = "camera-v4l2"))]
fn open_device(config: CameraConfig) -> Result<CameraBackend> {
    Err(anyhow!(
        "camera {} requires the camera-v4l2 feature (use stub:// for a synthetic camera)",
        config.device_path()
    ))
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub device: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

/// Generates a moving gradient. `stub://name?frames=N` ends the stream after N
/// frames, which the capture loop treats as a camera failure.
struct SyntheticCamera {
    config: CameraConfig,
    frame_count: u64,
    frame_limit: Option<u64>,
    last_frame_at: Option<Instant>,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        let frame_limit = parse_frame_limit(&config.device);
        log::info!(
            "camera {} opened (synthetic {}x{})",
            config.device,
            config.width,
            config.height
        );
        Self {
            config,
            frame_count: 0,
            frame_limit,
            last_frame_at: None,
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if let Some(limit) = self.frame_limit {
            if self.frame_count >= limit {
                return Err(anyhow!(
                    "synthetic camera {} exhausted after {} frames",
                    self.config.device,
                    limit
                ));
            }
        }

        if self.config.target_fps > 0 {
            let interval = Duration::from_millis((1000 / self.config.target_fps).max(1) as u64);
            if let Some(last) = self.last_frame_at {
                let elapsed = last.elapsed();
                if elapsed < interval {
                    std::thread::sleep(interval - elapsed);
                }
            }
        }

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        let pixels = self.generate_pixels();
        Frame::from_rgb(pixels, self.config.width, self.config.height)
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let shift = self.frame_count as usize;
        let mut pixels = vec![0u8; width * height * 3];
        for y in 0..height {
            for x in 0..width {
                let offset = (y * width + x) * 3;
                pixels[offset] = ((x + shift) % 256) as u8;
                pixels[offset + 1] = ((y + shift / 2) % 256) as u8;
                pixels[offset + 2] = 96;
            }
        }
        pixels
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}

fn parse_frame_limit(device: &str) -> Option<u64> {
    let (_, query) = device.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "frames")
        .and_then(|(_, value)| value.parse().ok())
}
