//! Bounding-box normalization.
//!
//! Services describe boxes in several shapes. Each shape has a matcher that
//! either produces a canonical [`BoundingBox`] or declines; matchers are
//! tried in order and the first match wins. No match means "no box", never
//! an error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical corner form. Always satisfies `x1 <= x2` and `y1 <= y2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl BoundingBox {
    /// Build from corners in any order.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let (x1, x2) = (x1.trunc() as i64, x2.trunc() as i64);
        let (y1, y2) = (y1.trunc() as i64, y2.trunc() as i64);
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn width(&self) -> i64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i64 {
        self.y2 - self.y1
    }
}

type ShapeMatcher = fn(&Value) -> Option<BoundingBox>;

/// Shapes in match order.
const MATCHERS: &[(&str, ShapeMatcher)] = &[
    ("corner fields", match_corner_fields),
    ("ordered list", match_ordered_list),
    ("keyed dictionary", match_keyed_dictionary),
];

/// Normalize a service box to canonical corners.
///
/// A list of boxes is reduced to its first element. Returns `None` when no
/// shape matches.
pub fn normalize_bbox(raw: &Value) -> Option<BoundingBox> {
    let candidate = match raw {
        Value::Array(items) if matches!(items.first(), Some(Value::Array(_) | Value::Object(_))) => {
            &items[0]
        }
        other => other,
    };
    MATCHERS.iter().find_map(|(name, matcher)| {
        let matched = matcher(candidate);
        if matched.is_some() {
            log::trace!("bbox matched {} shape", name);
        }
        matched
    })
}

/// `{x1, y1, x2, y2}` with every corner present.
fn match_corner_fields(value: &Value) -> Option<BoundingBox> {
    let fields = value.as_object()?;
    let x1 = coordinate(fields.get("x1")?)?;
    let y1 = coordinate(fields.get("y1")?)?;
    let x2 = coordinate(fields.get("x2")?)?;
    let y2 = coordinate(fields.get("y2")?)?;
    Some(BoundingBox::from_corners(x1, y1, x2, y2))
}

/// `[x1, y1, x2, y2, ...]`; extra trailing elements are ignored.
fn match_ordered_list(value: &Value) -> Option<BoundingBox> {
    let items = value.as_array()?;
    if items.len() < 4 {
        return None;
    }
    let x1 = coordinate(&items[0])?;
    let y1 = coordinate(&items[1])?;
    let x2 = coordinate(&items[2])?;
    let y2 = coordinate(&items[3])?;
    Some(BoundingBox::from_corners(x1, y1, x2, y2))
}

/// Dictionary keyed by `x1..y2` or `left/top/right/bottom`, mixed freely.
/// Missing corners default to 0; at least one recognized key is required.
fn match_keyed_dictionary(value: &Value) -> Option<BoundingBox> {
    let fields = value.as_object()?;
    let x1 = keyed(fields, "x1", "left");
    let y1 = keyed(fields, "y1", "top");
    let x2 = keyed(fields, "x2", "right");
    let y2 = keyed(fields, "y2", "bottom");
    if [x1, y1, x2, y2].iter().all(Option::is_none) {
        return None;
    }
    Some(BoundingBox::from_corners(
        x1.unwrap_or(0.0),
        y1.unwrap_or(0.0),
        x2.unwrap_or(0.0),
        y2.unwrap_or(0.0),
    ))
}

fn keyed(fields: &Map<String, Value>, primary: &str, alias: &str) -> Option<f64> {
    fields
        .get(primary)
        .and_then(coordinate)
        .or_else(|| fields.get(alias).and_then(coordinate))
}

fn coordinate(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}
