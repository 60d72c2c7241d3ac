use chrono::Local;
use rand::Rng;

use super::Location;

const BASE_LATITUDE: f64 = 39.6846;
const BASE_LONGITUDE: f64 = -127.8265;
const BASE_ALTITUDE: f64 = 90.0;
/// Maximum per-read jitter in degrees (~11 m).
const JITTER_DEGREES: f64 = 0.0001;

/// Stand-in receiver: a fixed coordinate with random jitter on every read.
pub(super) struct SyntheticGps {
    base_latitude: f64,
    base_longitude: f64,
}

impl SyntheticGps {
    pub(super) fn new() -> Self {
        Self {
            base_latitude: BASE_LATITUDE,
            base_longitude: BASE_LONGITUDE,
        }
    }

    pub(super) fn read_location(&mut self) -> Location {
        let mut rng = rand::thread_rng();
        Location {
            latitude: self.base_latitude + rng.gen_range(-JITTER_DEGREES..=JITTER_DEGREES),
            longitude: self.base_longitude + rng.gen_range(-JITTER_DEGREES..=JITTER_DEGREES),
            altitude: BASE_ALTITUDE,
            speed: 0.0,
            timestamp: Local::now(),
            fix_quality: 1,
            satellite_count: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_near_base_coordinate() {
        let mut gps = SyntheticGps::new();
        for _ in 0..100 {
            let location = gps.read_location();
            assert!((location.latitude - BASE_LATITUDE).abs() <= JITTER_DEGREES + 1e-12);
            assert!((location.longitude - BASE_LONGITUDE).abs() <= JITTER_DEGREES + 1e-12);
            assert_eq!(location.fix_quality, 1);
        }
    }
}
