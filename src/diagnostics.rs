//! Hardware smoke tests behind the interactive menu.

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::camera::{CameraConfig, CameraSource, CameraStats};
use crate::gps::{GpsSettings, Location, LocationProvider};
use crate::session::StopSignal;

/// Result of a camera preview run.
#[derive(Clone, Debug)]
pub struct CameraCheck {
    pub stats: CameraStats,
    pub resolution: (u32, u32),
    pub elapsed: Duration,
}

/// Pull frames for `duration` or until stopped.
pub fn camera_preview(
    config: CameraConfig,
    duration: Duration,
    stop: &StopSignal,
) -> Result<CameraCheck> {
    let mut camera = CameraSource::open(config)?;
    let resolution = camera.resolution();
    let started = Instant::now();
    let mut outcome = Ok(());
    while started.elapsed() < duration && !stop.is_requested() {
        if let Err(err) = camera.next_frame() {
            outcome = Err(err);
            break;
        }
    }
    let check = CameraCheck {
        stats: camera.stats(),
        resolution,
        elapsed: started.elapsed(),
    };
    camera.release();
    outcome.map(|()| check)
}

/// Readings collected by [`gps_readings`].
#[derive(Clone, Debug, Default)]
pub struct GpsCheck {
    pub readings: Vec<Option<Location>>,
}

impl GpsCheck {
    pub fn successful(&self) -> usize {
        self.readings.iter().filter(|reading| reading.is_some()).count()
    }
}

/// Poll the location `count` times, `every` apart.
///
/// `on_reading` sees each poll as it happens (1-based index).
pub fn gps_readings(
    settings: &GpsSettings,
    count: usize,
    every: Duration,
    stop: &StopSignal,
    mut on_reading: impl FnMut(usize, Option<&Location>),
) -> GpsCheck {
    let mut provider = LocationProvider::initialize(settings);
    log::info!("GPS smoke test using {}", provider.method());
    let mut check = GpsCheck::default();
    for index in 1..=count {
        if stop.is_requested() {
            break;
        }
        let reading = provider.get_location();
        on_reading(index, reading.as_ref());
        check.readings.push(reading);
        if index < count && !every.is_zero() {
            std::thread::sleep(every);
        }
    }
    provider.close();
    check
}
