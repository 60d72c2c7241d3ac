//! gpsd client.
//!
//! Speaks the gpsd JSON protocol: enable a watcher once, then issue
//! `?POLL;` per read and take the first TPV/SKY pair of the POLL response.

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::Location;

const WATCH_COMMAND: &str = "?WATCH={\"enable\":true};\n";
const POLL_COMMAND: &str = "?POLL;\n";
/// Unrelated reports (VERSION, DEVICES, WATCH) tolerated before the POLL answer.
const MAX_REPORTS_PER_POLL: usize = 16;

pub(super) struct GpsdClient {
    addr: String,
    reader: Option<BufReader<TcpStream>>,
}

#[derive(Debug, Deserialize)]
struct Report {
    class: String,
    #[serde(default)]
    tpv: Vec<TpvReport>,
    #[serde(default)]
    sky: Vec<SkyReport>,
}

#[derive(Debug, Default, Deserialize)]
struct TpvReport {
    #[serde(default)]
    mode: u8,
    lat: Option<f64>,
    lon: Option<f64>,
    alt: Option<f64>,
    #[serde(rename = "altMSL")]
    alt_msl: Option<f64>,
    speed: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct SkyReport {
    #[serde(rename = "uSat")]
    used_count: Option<u32>,
    #[serde(default)]
    satellites: Vec<SatelliteReport>,
}

#[derive(Debug, Default, Deserialize)]
struct SatelliteReport {
    #[serde(default)]
    used: bool,
}

impl GpsdClient {
    pub(super) fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let socket_addr = addr
            .to_socket_addrs()
            .with_context(|| format!("resolve gpsd address {}", addr))?
            .next()
            .ok_or_else(|| anyhow!("gpsd address {} did not resolve", addr))?;
        let stream = TcpStream::connect_timeout(&socket_addr, timeout)
            .with_context(|| format!("connect to gpsd at {}", addr))?;
        stream
            .set_read_timeout(Some(timeout))
            .context("set gpsd read timeout")?;
        stream
            .set_write_timeout(Some(timeout))
            .context("set gpsd write timeout")?;

        let mut client = Self {
            addr: addr.to_string(),
            reader: Some(BufReader::new(stream)),
        };
        client.send(WATCH_COMMAND)?;
        Ok(client)
    }

    /// Poll the daemon. `Ok(None)` means the daemon answered without a 2D fix.
    pub(super) fn read_location(&mut self) -> Result<Option<Location>> {
        self.send(POLL_COMMAND)?;
        let report = self.read_poll()?;
        Ok(location_from_poll(&report))
    }

    pub(super) fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = reader.into_inner().shutdown(std::net::Shutdown::Both);
            log::debug!("gpsd connection to {} closed", self.addr);
        }
    }

    fn send(&mut self, command: &str) -> Result<()> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| anyhow!("gpsd connection closed"))?;
        let stream = reader.get_mut();
        stream
            .write_all(command.as_bytes())
            .with_context(|| format!("write to gpsd at {}", self.addr))?;
        stream.flush().context("flush gpsd command")?;
        Ok(())
    }

    fn read_poll(&mut self) -> Result<Report> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| anyhow!("gpsd connection closed"))?;
        for _ in 0..MAX_REPORTS_PER_POLL {
            let mut line = String::new();
            let read = reader.read_line(&mut line).context("read gpsd report")?;
            if read == 0 {
                return Err(anyhow!("gpsd closed the connection"));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Report>(trimmed) {
                Ok(report) if report.class == "POLL" => return Ok(report),
                Ok(report) => log::debug!("gpsd: skipping {} report", report.class),
                Err(err) => log::debug!("gpsd: unparseable report: {}", err),
            }
        }
        Err(anyhow!(
            "no POLL response from gpsd within {} reports",
            MAX_REPORTS_PER_POLL
        ))
    }
}

fn location_from_poll(report: &Report) -> Option<Location> {
    let tpv = report.tpv.first()?;
    if tpv.mode < 2 {
        return None;
    }
    let (latitude, longitude) = (tpv.lat?, tpv.lon?);
    let altitude = if tpv.mode >= 3 {
        tpv.alt_msl.or(tpv.alt).unwrap_or(0.0)
    } else {
        0.0
    };
    let satellite_count = report
        .sky
        .first()
        .map(|sky| {
            sky.used_count
                .unwrap_or_else(|| sky.satellites.iter().filter(|s| s.used).count() as u32)
        })
        .unwrap_or(0);

    Some(Location {
        latitude,
        longitude,
        altitude,
        speed: tpv.speed.unwrap_or(0.0),
        timestamp: Local::now(),
        fix_quality: tpv.mode,
        satellite_count,
    })
}
