//! GPS acquisition.
//!
//! `LocationProvider` hides the acquisition strategy behind one query,
//! "current location or none". Three backends exist:
//! - gpsd daemon over its JSON socket protocol
//! - serial NMEA receiver (USB dongles), reading `GGA` sentences
//! - synthetic fix for hardware-free runs
//!
//! The backend is chosen once by probing in priority order
//! (daemon, serial, synthetic) and locked in for the session. Read failures
//! never escape this module: they are logged and the last known fix is served.

mod gpsd;
pub mod nmea;
mod serial;
mod synthetic;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use gpsd::GpsdClient;
use serial::SerialGps;
use synthetic::SyntheticGps;

pub const DEFAULT_GPSD_ADDR: &str = "127.0.0.1:2947";
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// One GPS reading. Immutable once returned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub timestamp: DateTime<Local>,
    pub fix_quality: u8,
    #[serde(rename = "satellites")]
    pub satellite_count: u32,
}

impl Location {
    /// `lat, lon` with six decimals, as shown on the console and in logs.
    pub fn coordinates(&self) -> String {
        format!("{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// GPS acquisition strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpsMethod {
    Auto,
    Gpsd,
    Serial,
    Mock,
}

impl GpsMethod {
    /// Backends to probe, in order, when this method is preferred.
    fn probe_order(self) -> &'static [GpsMethod] {
        match self {
            GpsMethod::Auto | GpsMethod::Gpsd => {
                &[GpsMethod::Gpsd, GpsMethod::Serial, GpsMethod::Mock]
            }
            GpsMethod::Serial => &[GpsMethod::Serial, GpsMethod::Mock],
            GpsMethod::Mock => &[GpsMethod::Mock],
        }
    }
}

impl FromStr for GpsMethod {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "auto" => Ok(GpsMethod::Auto),
            "gpsd" => Ok(GpsMethod::Gpsd),
            "serial" => Ok(GpsMethod::Serial),
            "mock" | "synthetic" => Ok(GpsMethod::Mock),
            other => Err(anyhow!(
                "unknown gps method '{}'; expected gpsd, serial, mock or auto",
                other
            )),
        }
    }
}

impl fmt::Display for GpsMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GpsMethod::Auto => "auto",
            GpsMethod::Gpsd => "gpsd",
            GpsMethod::Serial => "serial",
            GpsMethod::Mock => "mock",
        };
        f.write_str(name)
    }
}

/// GPS settings, fixed at process start.
#[derive(Clone, Debug)]
pub struct GpsSettings {
    pub method: GpsMethod,
    pub gpsd_addr: String,
    pub serial_port: String,
    pub baud_rate: u32,
    /// Connect/read timeout for the daemon and the serial device.
    pub timeout: Duration,
}

impl Default for GpsSettings {
    fn default() -> Self {
        Self {
            method: GpsMethod::Auto,
            gpsd_addr: DEFAULT_GPSD_ADDR.to_string(),
            serial_port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_secs(1),
        }
    }
}

enum GpsBackend {
    Daemon(GpsdClient),
    Serial(SerialGps),
    Synthetic(SyntheticGps),
}

impl GpsBackend {
    fn method(&self) -> GpsMethod {
        match self {
            GpsBackend::Daemon(_) => GpsMethod::Gpsd,
            GpsBackend::Serial(_) => GpsMethod::Serial,
            GpsBackend::Synthetic(_) => GpsMethod::Mock,
        }
    }

    fn read_location(&mut self) -> Result<Option<Location>> {
        match self {
            GpsBackend::Daemon(client) => client.read_location(),
            GpsBackend::Serial(device) => device.read_location(),
            GpsBackend::Synthetic(source) => Ok(Some(source.read_location())),
        }
    }
}

/// Single entry point for location queries.
pub struct LocationProvider {
    backend: GpsBackend,
    last_known: Option<Location>,
}

impl LocationProvider {
    /// Probe backends starting from `settings.method` and lock in the first usable one.
    ///
    /// Never fails: the synthetic backend is always available.
    pub fn initialize(settings: &GpsSettings) -> Self {
        let mut last_known = None;
        for method in settings.method.probe_order() {
            match probe(*method, settings) {
                Ok((backend, first_fix)) => {
                    if *method != settings.method && settings.method != GpsMethod::Auto {
                        log::warn!(
                            "GPS: {} not available, falling back to {}",
                            settings.method,
                            method
                        );
                    }
                    log::info!("GPS: using {}", describe(&backend, settings));
                    if first_fix.is_some() {
                        last_known = first_fix;
                    }
                    return Self {
                        backend,
                        last_known,
                    };
                }
                Err(err) => {
                    log::warn!("GPS: {} probe failed: {:#}", method, err);
                }
            }
        }
        log::info!("GPS: using mock coordinates");
        Self {
            backend: GpsBackend::Synthetic(SyntheticGps::new()),
            last_known,
        }
    }

    /// Backend locked in at initialization.
    pub fn method(&self) -> GpsMethod {
        self.backend.method()
    }

    /// Most recent reading, or the last successful one when this read fails.
    ///
    /// Returns `None` only while no read has ever succeeded.
    pub fn get_location(&mut self) -> Option<Location> {
        match self.backend.read_location() {
            Ok(Some(location)) => {
                self.last_known = Some(location.clone());
                Some(location)
            }
            Ok(None) => self.last_known.clone(),
            Err(err) => {
                log::warn!("GPS read error ({}): {:#}", self.method(), err);
                self.last_known.clone()
            }
        }
    }

    pub fn last_known(&self) -> Option<&Location> {
        self.last_known.as_ref()
    }

    /// Close the daemon socket or serial handle.
    pub fn close(&mut self) {
        match &mut self.backend {
            GpsBackend::Daemon(client) => client.close(),
            GpsBackend::Serial(device) => device.close(),
            GpsBackend::Synthetic(_) => {}
        }
    }
}

impl Drop for LocationProvider {
    fn drop(&mut self) {
        self.close();
    }
}

fn probe(method: GpsMethod, settings: &GpsSettings) -> Result<(GpsBackend, Option<Location>)> {
    match method {
        GpsMethod::Gpsd => {
            let mut client = GpsdClient::connect(&settings.gpsd_addr, settings.timeout)?;
            let fix = client
                .read_location()?
                .ok_or_else(|| anyhow!("gpsd at {} has no 2D fix", settings.gpsd_addr))?;
            Ok((GpsBackend::Daemon(client), Some(fix)))
        }
        GpsMethod::Serial => {
            let device =
                SerialGps::open(&settings.serial_port, settings.baud_rate, settings.timeout)?;
            Ok((GpsBackend::Serial(device), None))
        }
        GpsMethod::Mock => Ok((GpsBackend::Synthetic(SyntheticGps::new()), None)),
        GpsMethod::Auto => Err(anyhow!("auto is not a concrete gps backend")),
    }
}

fn describe(backend: &GpsBackend, settings: &GpsSettings) -> String {
    match backend {
        GpsBackend::Daemon(_) => format!("gpsd at {}", settings.gpsd_addr),
        GpsBackend::Serial(_) => format!(
            "serial GPS on {} @ {} baud",
            settings.serial_port, settings.baud_rate
        ),
        GpsBackend::Synthetic(_) => "mock GPS coordinates (for testing)".to_string(),
    }
}
