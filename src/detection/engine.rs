//! Measure Detection Engine
//!
//! Ties normalization, the detector and box conversion together, and keeps
//! one loaded detector per checkpoint.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageReader};
use parking_lot::Mutex;

use crate::detection::error::DetectResult;
use crate::detection::model::{DetectorOptions, MeasureDetector, OnnxDetector};
use crate::detection::postprocess::{Detection, to_detections};
use crate::detection::preprocess::normalize_dynamic;

/// Decode encoded image bytes, sniffing the container format
pub fn decode_image(bytes: &[u8]) -> DetectResult<DynamicImage> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    Ok(img)
}

/// Measure detection pipeline around one detector
#[derive(Clone)]
pub struct MeasureEngine {
    detector: Arc<dyn MeasureDetector>,
    min_confidence: Option<f32>,
}

impl MeasureEngine {
    pub fn new(detector: Arc<dyn MeasureDetector>) -> Self {
        Self {
            detector,
            min_confidence: None,
        }
    }

    /// Drop boxes scoring below `threshold`
    pub fn with_min_confidence(mut self, threshold: Option<f32>) -> Self {
        self.min_confidence = threshold;
        self
    }

    /// Find measures on a decoded page
    pub fn detect(&self, image: &DynamicImage) -> DetectResult<Vec<Detection>> {
        let normalized = normalize_dynamic(image)?;
        let raw = self.detector.predict(&normalized)?;
        Ok(to_detections(&raw, self.min_confidence))
    }

    /// Find measures on an encoded image
    pub fn detect_bytes(&self, bytes: &[u8]) -> DetectResult<Vec<Detection>> {
        self.detect(&decode_image(bytes)?)
    }
}

/// Builds a detector for a checkpoint path
pub type DetectorLoader = dyn Fn(&Path) -> DetectResult<Arc<dyn MeasureDetector>> + Send + Sync;

/// Loaded detectors keyed by checkpoint path
///
/// Each checkpoint is loaded at most once; concurrent first requests wait on
/// the same load.
pub struct CheckpointCache {
    loader: Box<DetectorLoader>,
    min_confidence: Option<f32>,
    engines: Mutex<HashMap<PathBuf, MeasureEngine>>,
}

impl CheckpointCache {
    /// Cache that loads ONNX checkpoints with the given options
    pub fn new(options: DetectorOptions, min_confidence: Option<f32>) -> Self {
        Self::with_loader(
            move |path: &Path| {
                let detector = OnnxDetector::from_file(path, options.clone())?;
                Ok(Arc::new(detector) as Arc<dyn MeasureDetector>)
            },
            min_confidence,
        )
    }

    /// Cache with a custom detector loader
    pub fn with_loader<F>(loader: F, min_confidence: Option<f32>) -> Self
    where
        F: Fn(&Path) -> DetectResult<Arc<dyn MeasureDetector>> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            min_confidence,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Engine for `checkpoint`, loading it on first use
    ///
    /// Failed loads are not cached, so a checkpoint that appears later is
    /// picked up by the next request.
    pub fn get_or_load(&self, checkpoint: &Path) -> DetectResult<MeasureEngine> {
        let mut engines = self.engines.lock();
        if let Some(engine) = engines.get(checkpoint) {
            return Ok(engine.clone());
        }

        let detector = (self.loader)(checkpoint)?;
        let engine = MeasureEngine::new(detector).with_min_confidence(self.min_confidence);
        engines.insert(checkpoint.to_path_buf(), engine.clone());
        Ok(engine)
    }

    /// Whether `checkpoint` is already loaded
    pub fn is_loaded(&self, checkpoint: &Path) -> bool {
        self.engines.lock().contains_key(checkpoint)
    }

    /// Number of loaded checkpoints
    pub fn len(&self) -> usize {
        self.engines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
