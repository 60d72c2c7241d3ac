//! Remote pothole detection: service clients, response normalization and
//! the retry policy applied to throttled requests.

mod backends;
mod bbox;
mod client;
mod result;
mod retry;

pub use backends::{
    client_from_settings, DetectorSettings, LandingAiClient, StubClient, DEFAULT_PREDICT_URL,
};
pub use bbox::{normalize_bbox, BoundingBox};
pub use client::{is_rate_limited, DetectionClient, RateLimited, RawPrediction};
pub use result::{
    filter_by_confidence, qualifying_detections, AnalysisContext, Detection, DEFAULT_LABEL,
};
pub use retry::RetryPolicy;
