//! Postprocessing Utilities
//!
//! Turns raw detector output into measure boxes.

use serde::{Deserialize, Serialize};

/// Class id the detector assigns to measures (0 is background)
pub const MEASURE_LABEL: i64 = 1;

/// A box as emitted by the detector, in corner form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    /// `[x1, y1, x2, y2]` in canvas pixels
    pub corners: [f32; 4],
    /// Confidence score
    pub score: f32,
    /// Class id
    pub label: i64,
}

/// Measure bounding box in absolute canvas pixels, top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    #[serde(rename = "w")]
    pub width: f32,
    #[serde(rename = "h")]
    pub height: f32,
}

impl Detection {
    /// Build from `[x1, y1, x2, y2]`
    pub fn from_corners([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    /// Back to `[x1, y1, x2, y2]`
    pub fn to_corners(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }
}

/// Convert raw detections, keeping the detector's ordering
///
/// With `min_confidence` unset every box passes through.
pub fn to_detections(raw: &[RawDetection], min_confidence: Option<f32>) -> Vec<Detection> {
    raw.iter()
        .filter(|d| min_confidence.is_none_or(|threshold| d.score >= threshold))
        .map(|d| Detection::from_corners(d.corners))
        .collect()
}

/// Split a flat `[N * 4]` box buffer into raw detections
///
/// Missing scores default to 1.0 and missing labels to [`MEASURE_LABEL`].
pub fn collect_raw(boxes: &[f32], scores: Option<&[f32]>, labels: Option<&[i64]>) -> Vec<RawDetection> {
    boxes
        .chunks_exact(4)
        .enumerate()
        .map(|(i, c)| RawDetection {
            corners: [c[0], c[1], c[2], c[3]],
            score: scores.and_then(|s| s.get(i).copied()).unwrap_or(1.0),
            label: labels.and_then(|l| l.get(i).copied()).unwrap_or(MEASURE_LABEL),
        })
        .collect()
}
