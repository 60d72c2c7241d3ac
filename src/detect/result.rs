use serde::{Deserialize, Serialize};

use super::bbox::{normalize_bbox, BoundingBox};
use super::client::RawPrediction;
use crate::gps::Location;

/// Label used when the service does not name the class.
pub const DEFAULT_LABEL: &str = "pothole";

/// A prediction that cleared the confidence threshold, tagged with the
/// location and analysis it came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub confidence: f64,
    pub label: String,
    pub bounding_box: Option<BoundingBox>,
    pub location: Option<Location>,
    /// Analysis timestamp (`YYYYMMDD_HHMMSS_mmm`), shared with the artifact names.
    pub timestamp: String,
    pub analysis_sequence_number: u64,
}

/// Per-analysis values stamped onto every detection of a batch.
#[derive(Clone, Debug)]
pub struct AnalysisContext {
    pub sequence: u64,
    pub timestamp: String,
    pub location: Option<Location>,
}

/// Predictions with `confidence >= threshold`, in their original order.
pub fn filter_by_confidence(
    predictions: &[RawPrediction],
    threshold: f64,
) -> impl Iterator<Item = &RawPrediction> {
    predictions
        .iter()
        .filter(move |prediction| prediction.confidence() >= threshold)
}

/// Build the qualifying detections for one analyzed frame.
///
/// Boxes that match no known shape are dropped from their detection; the
/// detection itself is kept.
pub fn qualifying_detections(
    predictions: &[RawPrediction],
    threshold: f64,
    context: &AnalysisContext,
) -> Vec<Detection> {
    filter_by_confidence(predictions, threshold)
        .map(|prediction| {
            let bounding_box = prediction.bbox.as_ref().and_then(|raw| {
                let normalized = normalize_bbox(raw);
                if normalized.is_none() {
                    log::warn!("unknown bbox format: {}", raw);
                }
                normalized
            });
            Detection {
                confidence: prediction.confidence(),
                label: prediction
                    .label
                    .clone()
                    .filter(|label| !label.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_LABEL.to_string()),
                bounding_box,
                location: context.location.clone(),
                timestamp: context.timestamp.clone(),
                analysis_sequence_number: context.sequence,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> AnalysisContext {
        AnalysisContext {
            sequence: 7,
            timestamp: "20240102_030405_678".to_string(),
            location: None,
        }
    }

    #[test]
    fn filter_keeps_exactly_the_qualifying_predictions_in_order() {
        let predictions: Vec<RawPrediction> = [0.9, 0.1, 0.5, 0.49, 0.7, 0.5]
            .into_iter()
            .map(RawPrediction::new)
            .collect();
        for threshold in [0.0, 0.3, 0.5, 0.75, 1.0] {
            let kept: Vec<f64> = filter_by_confidence(&predictions, threshold)
                .map(|p| p.score)
                .collect();
            let expected: Vec<f64> = predictions
                .iter()
                .map(|p| p.score)
                .filter(|score| *score >= threshold)
                .collect();
            assert_eq!(kept, expected, "threshold {}", threshold);
        }
    }

    #[test]
    fn detections_carry_context_and_default_label() {
        let predictions = vec![
            RawPrediction::new(0.8).with_bbox(json!([1, 2, 3, 4])),
            RawPrediction::new(0.3).with_label("crack"),
            RawPrediction::new(0.6)
                .with_label("pothole-deep")
                .with_bbox(json!("garbage")),
        ];
        let detections = qualifying_detections(&predictions, 0.5, &context());

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].label, DEFAULT_LABEL);
        assert_eq!(
            detections[0].bounding_box,
            Some(BoundingBox {
                x1: 1,
                y1: 2,
                x2: 3,
                y2: 4
            })
        );
        assert_eq!(detections[1].label, "pothole-deep");
        assert_eq!(detections[1].bounding_box, None);
        assert!(detections
            .iter()
            .all(|d| d.analysis_sequence_number == 7 && d.timestamp == "20240102_030405_678"));
    }
}
