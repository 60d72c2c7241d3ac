//! NMEA 0183 `GGA` sentence parsing.
//!
//! Only fix data sentences are interpreted. Any other sentence type parses
//! to `Ok(None)` so the caller can simply read the next line.

use anyhow::{anyhow, Context, Result};

/// Position data extracted from a `GGA` sentence.
#[derive(Clone, Debug, PartialEq)]
pub struct GgaFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub fix_quality: u8,
    pub satellite_count: u32,
}

/// Parse one NMEA line.
///
/// Returns `Ok(None)` for non-`GGA` sentences and for `GGA` sentences that
/// carry no fix (quality 0 or empty coordinates). Malformed `GGA` sentences
/// and checksum mismatches are errors.
pub fn parse_gga(line: &str) -> Result<Option<GgaFix>> {
    let line = line.trim();
    let body = line
        .strip_prefix('$')
        .ok_or_else(|| anyhow!("not an NMEA sentence: {:?}", line))?;

    let body = match body.split_once('*') {
        Some((body, checksum)) => {
            verify_checksum(body, checksum)?;
            body
        }
        None => body,
    };

    let fields: Vec<&str> = body.split(',').collect();
    let sentence = fields[0];
    if sentence.len() != 5 || !sentence.ends_with("GGA") {
        return Ok(None);
    }
    if fields.len() < 10 {
        return Err(anyhow!(
            "GGA sentence has {} fields, expected at least 10",
            fields.len()
        ));
    }

    let fix_quality: u8 = parse_or_zero(fields[6]).context("GGA fix quality")?;
    if fix_quality == 0 || fields[2].is_empty() || fields[4].is_empty() {
        return Ok(None);
    }

    let latitude = parse_coordinate(fields[2], fields[3], 'N', 'S').context("GGA latitude")?;
    let longitude = parse_coordinate(fields[4], fields[5], 'E', 'W').context("GGA longitude")?;
    let satellite_count: u32 = parse_or_zero(fields[7]).context("GGA satellite count")?;
    let altitude: f64 = parse_or_zero(fields[9]).context("GGA altitude")?;

    Ok(Some(GgaFix {
        latitude,
        longitude,
        altitude,
        fix_quality,
        satellite_count,
    }))
}

fn verify_checksum(body: &str, checksum: &str) -> Result<()> {
    let expected = u8::from_str_radix(checksum.trim(), 16)
        .with_context(|| format!("invalid NMEA checksum {:?}", checksum))?;
    let actual = body.bytes().fold(0u8, |acc, b| acc ^ b);
    if actual != expected {
        return Err(anyhow!(
            "NMEA checksum mismatch: expected {:02X}, computed {:02X}",
            expected,
            actual
        ));
    }
    Ok(())
}

/// `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere to signed decimal degrees.
fn parse_coordinate(value: &str, hemisphere: &str, positive: char, negative: char) -> Result<f64> {
    let raw: f64 = value
        .parse()
        .with_context(|| format!("invalid coordinate {:?}", value))?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    if !(0.0..60.0).contains(&minutes) {
        return Err(anyhow!("coordinate minutes out of range in {:?}", value));
    }
    let decimal = degrees + minutes / 60.0;
    match hemisphere.chars().next() {
        Some(c) if c == positive => Ok(decimal),
        Some(c) if c == negative => Ok(-decimal),
        _ => Err(anyhow!("invalid hemisphere {:?}", hemisphere)),
    }
}

fn parse_or_zero<T>(value: &str) -> Result<T>
where
    T: std::str::FromStr + Default,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if value.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(value.trim().parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GPGGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

    #[test]
    fn parses_reference_sentence() -> Result<()> {
        let fix = parse_gga(GPGGA)?.expect("fix");
        assert!((fix.latitude - 48.1173).abs() < 1e-4);
        assert!((fix.longitude - 11.516_666).abs() < 1e-4);
        assert_eq!(fix.altitude, 545.4);
        assert_eq!(fix.fix_quality, 1);
        assert_eq!(fix.satellite_count, 8);
        Ok(())
    }

    #[test]
    fn southern_and_western_hemispheres_are_negative() -> Result<()> {
        let fix = parse_gga("$GNGGA,010203,3340.500,S,11730.000,W,2,11,0.8,12.0,M,,M,,")?
            .expect("fix");
        assert!((fix.latitude + 33.675).abs() < 1e-6);
        assert!((fix.longitude + 117.5).abs() < 1e-6);
        assert_eq!(fix.fix_quality, 2);
        Ok(())
    }

    #[test]
    fn other_sentences_are_ignored() -> Result<()> {
        let rmc = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
        assert_eq!(parse_gga(rmc)?, None);
        Ok(())
    }

    #[test]
    fn empty_fix_is_not_a_location() -> Result<()> {
        assert_eq!(parse_gga("$GPGGA,123519,,,,,0,00,,,M,,M,,")?, None);
        Ok(())
    }

    #[test]
    fn checksum_mismatch_is_an_error() {
        let corrupted = GPGGA.replace("*47", "*48");
        assert!(parse_gga(&corrupted).is_err());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_gga("not nmea").is_err());
    }
}
