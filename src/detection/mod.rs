//! # Measure detection
//!
//! Finds measure bounding boxes on scanned sheet-music pages with a
//! fine-tuned region-proposal detector exported to ONNX.
//!
//! ```ignore
//! use measure_detector::detection::{CheckpointCache, DetectorOptions};
//!
//! let cache = CheckpointCache::new(DetectorOptions::new(), None);
//! let engine = cache.get_or_load("model.RCNN.2.onnx".as_ref())?;
//! for measure in engine.detect(&image::open("page.png")?)? {
//!     println!("{} {} {} {}", measure.x, measure.y, measure.width, measure.height);
//! }
//! ```
//!
//! ## Module Structure
//!
//! - [`preprocess`]: pads grayscale pages onto the 1200x1200 model canvas
//! - [`model`]: detector trait and the ONNX Runtime implementation
//! - [`postprocess`]: corner boxes to `(x, y, w, h)` measures
//! - [`engine`]: the full pipeline plus the per-checkpoint cache
//! - [`error`]: error types [`DetectError`]

pub mod engine;
pub mod error;
pub mod model;
pub mod postprocess;
pub mod preprocess;

pub use engine::{CheckpointCache, MeasureEngine, decode_image};
pub use error::{DetectError, DetectResult};
pub use model::{
    Device, DetectorOptions, MeasureDetector, OnnxDetector, checkpoint_epochs,
    checkpoint_file_name,
};
pub use postprocess::{Detection, MEASURE_LABEL, RawDetection};
pub use preprocess::{CANVAS_SIZE, NormalizedImage, normalize, normalize_dynamic};
