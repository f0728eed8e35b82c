use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::detection::{DetectError, DetectResult, MEASURE_LABEL};

/// One measure rectangle from an annotation file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasureAnnotation {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl MeasureAnnotation {
    /// `[x1, y1, x2, y2]`
    pub fn corners(&self) -> [f32; 4] {
        [
            self.left,
            self.top,
            self.left + self.width,
            self.top + self.height,
        ]
    }
}

/// Per-page annotation record
///
/// Other keys in the file (staves, stave measures) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnnotation {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub system_measures: Vec<MeasureAnnotation>,
}

impl PageAnnotation {
    pub fn from_file(path: &Path) -> DetectResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| DetectError::AnnotationError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn target(&self) -> Target {
        Target::from_measures(&self.system_measures)
    }
}

/// Ground truth for one page in detector form
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Target {
    /// `[x1, y1, x2, y2]` per measure
    pub boxes: Vec<[f32; 4]>,
    /// Class id per box, always the measure class
    pub labels: Vec<i64>,
}

impl Target {
    pub fn from_measures(measures: &[MeasureAnnotation]) -> Self {
        Self {
            boxes: measures.iter().map(MeasureAnnotation::corners).collect(),
            labels: vec![MEASURE_LABEL; measures.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}
