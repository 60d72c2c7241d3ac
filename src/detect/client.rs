use anyhow::Result;
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// One prediction as returned by a detection service, before filtering.
#[derive(Clone, Debug, PartialEq)]
pub struct RawPrediction {
    /// Service score. Not guaranteed to lie in [0, 1].
    pub score: f64,
    pub label: Option<String>,
    /// Box in whatever shape the service produced.
    pub bbox: Option<Value>,
}

impl RawPrediction {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            label: None,
            bbox: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_bbox(mut self, bbox: Value) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Score clamped into [0, 1]; non-finite scores count as 0.
    pub fn confidence(&self) -> f64 {
        if self.score.is_finite() {
            self.score.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Remote detector contract: submit an image, get back ordered predictions.
///
/// Implementations signal throttling by returning an error that carries
/// [`RateLimited`]; every other error is treated as a per-frame failure.
pub trait DetectionClient {
    /// Client identifier for logs.
    fn name(&self) -> &'static str;

    /// Submit the JPEG at `image_path` and return its predictions in service order.
    fn predict(&mut self, image_path: &Path) -> Result<Vec<RawPrediction>>;
}

impl<C: DetectionClient + ?Sized> DetectionClient for Box<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn predict(&mut self, image_path: &Path) -> Result<Vec<RawPrediction>> {
        (**self).predict(image_path)
    }
}

/// The service refused the request because of request-rate limits (HTTP 429).
#[derive(Debug, Clone)]
pub struct RateLimited {
    pub service: String,
}

impl fmt::Display for RateLimited {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: 429 Too Many Requests", self.service)
    }
}

impl std::error::Error for RateLimited {}

/// True when `err` carries a [`RateLimited`] anywhere in its chain.
pub fn is_rate_limited(err: &anyhow::Error) -> bool {
    err.downcast_ref::<RateLimited>().is_some()
}
