use anyhow::{anyhow, Result};
use serde_json::json;
use std::path::Path;

use crate::detect::client::{DetectionClient, RawPrediction};

const DEFAULT_EVERY: u64 = 4;

/// Offline detector for demos and tests.
///
/// Reports one pothole on every `every`-th submitted frame and nothing
/// otherwise. Selected with an endpoint id of the form `stub://name?every=N`.
pub struct StubClient {
    every: u64,
    calls: u64,
}

impl StubClient {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            calls: 0,
        }
    }

    pub fn from_endpoint(endpoint: &str) -> Result<Self> {
        let every = match endpoint.split_once('?') {
            Some((_, query)) => query
                .split('&')
                .find_map(|pair| pair.strip_prefix("every="))
                .map(|value| {
                    value
                        .parse::<u64>()
                        .map_err(|_| anyhow!("invalid stub detector interval '{}'", value))
                })
                .transpose()?
                .unwrap_or(DEFAULT_EVERY),
            None => DEFAULT_EVERY,
        };
        Ok(Self::new(every))
    }
}

impl Default for StubClient {
    fn default() -> Self {
        Self::new(DEFAULT_EVERY)
    }
}

impl DetectionClient for StubClient {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn predict(&mut self, image_path: &Path) -> Result<Vec<RawPrediction>> {
        if !image_path.is_file() {
            return Err(anyhow!("frame {} does not exist", image_path.display()));
        }
        self.calls += 1;
        if self.calls % self.every != 0 {
            return Ok(vec![RawPrediction::new(0.12)]);
        }
        Ok(vec![RawPrediction::new(0.87)
            .with_label("pothole")
            .with_bbox(json!([120, 300, 260, 380]))])
    }
}
