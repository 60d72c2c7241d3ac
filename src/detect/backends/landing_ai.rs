//! Landing AI hosted predictor.
//!
//! Uploads the frame as `multipart/form-data` to the predict endpoint and
//! maps the JSON response to [`RawPrediction`]s. HTTP 429 is surfaced as
//! [`RateLimited`] so the capture loop can back off.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::Duration;

use crate::detect::client::{DetectionClient, RateLimited, RawPrediction};

pub const DEFAULT_PREDICT_URL: &str = "https://predict.app.landing.ai/inference/v1/predict";
const SERVICE_NAME: &str = "landing-ai";

pub struct LandingAiClient {
    agent: ureq::Agent,
    predict_url: String,
    endpoint_id: String,
    api_key: String,
}

impl LandingAiClient {
    pub fn new(predict_url: &str, endpoint_id: &str, api_key: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            predict_url: predict_url.to_string(),
            endpoint_id: endpoint_id.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

impl DetectionClient for LandingAiClient {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn predict(&mut self, image_path: &Path) -> Result<Vec<RawPrediction>> {
        let bytes = std::fs::read(image_path)
            .with_context(|| format!("read frame {}", image_path.display()))?;
        let filename = image_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "frame.jpg".to_string());
        let boundary = format!("pothole-witness-{:016x}", rand::random::<u64>());
        let body = multipart_body(&boundary, &filename, &bytes);

        let response = self
            .agent
            .post(&self.predict_url)
            .query("endpoint_id", &self.endpoint_id)
            .set("apikey", &self.api_key)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body);

        let text = match response {
            Ok(response) => response
                .into_string()
                .context("read landing ai response body")?,
            Err(ureq::Error::Status(429, _)) => {
                return Err(anyhow::Error::new(RateLimited {
                    service: SERVICE_NAME.to_string(),
                }))
            }
            Err(ureq::Error::Status(code, response)) => {
                let detail = response.into_string().unwrap_or_default();
                return Err(anyhow!(
                    "landing ai returned HTTP {}: {}",
                    code,
                    detail.trim()
                ));
            }
            Err(err) => return Err(anyhow::Error::new(err).context("landing ai request failed")),
        };

        parse_predictions(&text)
    }
}

fn multipart_body(boundary: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 256);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: image/jpeg\r\n\r\n",
            boundary, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    backbonepredictions: Option<Map<String, Value>>,
    #[serde(default)]
    predictions: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ServicePrediction {
    #[serde(default)]
    score: f64,
    #[serde(rename = "labelName")]
    label_name: Option<String>,
    coordinates: Option<Value>,
}

impl From<ServicePrediction> for RawPrediction {
    fn from(prediction: ServicePrediction) -> Self {
        RawPrediction {
            score: prediction.score,
            label: prediction.label_name,
            bbox: prediction.coordinates.map(corner_list),
        }
    }
}

/// `{xmin, ymin, xmax, ymax}` becomes an ordered corner list; anything else
/// is passed through for the normalizer to judge.
fn corner_list(coordinates: Value) -> Value {
    let corners = ["xmin", "ymin", "xmax", "ymax"]
        .iter()
        .map(|key| coordinates.get(*key).cloned())
        .collect::<Option<Vec<Value>>>();
    match corners {
        Some(corners) => json!(corners),
        None => coordinates,
    }
}

/// Parse a predict response.
///
/// Object-detection endpoints answer with `backbonepredictions` (one entry per
/// box, service order preserved); classification endpoints answer with a
/// single `predictions` object.
pub(crate) fn parse_predictions(body: &str) -> Result<Vec<RawPrediction>> {
    let response: PredictResponse =
        serde_json::from_str(body).context("parse landing ai response")?;

    if let Some(boxes) = response.backbonepredictions.filter(|map| !map.is_empty()) {
        return boxes
            .into_iter()
            .map(|(id, value)| {
                serde_json::from_value::<ServicePrediction>(value)
                    .map(RawPrediction::from)
                    .with_context(|| format!("parse prediction {}", id))
            })
            .collect();
    }

    match response.predictions {
        Some(Value::Object(map)) if map.contains_key("score") => {
            let prediction: ServicePrediction = serde_json::from_value(Value::Object(map))
                .context("parse classification prediction")?;
            Ok(vec![prediction.into()])
        }
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(id, value)| {
                serde_json::from_value::<ServicePrediction>(value)
                    .map(RawPrediction::from)
                    .with_context(|| format!("parse prediction {}", id))
            })
            .collect(),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Err(anyhow!("unexpected predictions payload: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_detection_response_in_service_order() -> Result<()> {
        let body = r#"{
            "type": "ObjectDetectionPrediction",
            "backbonepredictions": {
                "b-2": {"score": 0.91, "labelName": "pothole", "labelIndex": 1,
                        "coordinates": {"xmin": 40, "ymin": 50, "xmax": 140, "ymax": 90}},
                "a-1": {"score": 0.35, "labelName": "pothole", "labelIndex": 1,
                        "coordinates": {"xmin": 1, "ymin": 2, "xmax": 3, "ymax": 4}}
            },
            "predictions": {"score": 0.91, "labelName": "pothole"}
        }"#;
        let predictions = parse_predictions(body)?;
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].score, 0.91);
        assert_eq!(predictions[0].label.as_deref(), Some("pothole"));
        assert_eq!(predictions[0].bbox, Some(json!([40, 50, 140, 90])));
        assert_eq!(predictions[1].score, 0.35);
        Ok(())
    }

    #[test]
    fn parses_classification_response() -> Result<()> {
        let body = r#"{"backbonepredictions": null,
                       "predictions": {"score": 0.77, "labelName": "pothole", "labelIndex": 0}}"#;
        let predictions = parse_predictions(body)?;
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].bbox, None);
        Ok(())
    }

    #[test]
    fn empty_response_has_no_predictions() -> Result<()> {
        assert!(parse_predictions(r#"{"backbonepredictions": {}}"#)?.is_empty());
        Ok(())
    }

    #[test]
    fn multipart_body_wraps_file_bytes() {
        let body = multipart_body("b0undary", "f.jpg", b"JPEG");
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with("--b0undary\r\n"));
        assert!(text.contains("name=\"file\"; filename=\"f.jpg\""));
        assert!(text.contains("\r\n\r\nJPEG\r\n--b0undary--\r\n"));
    }
}
