//! Measure Detection Model
//!
//! Runs the exported two-class region-proposal detector through ONNX Runtime.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor;
use parking_lot::Mutex;

use crate::detection::error::{DetectError, DetectResult};
use crate::detection::postprocess::{RawDetection, collect_raw};
use crate::detection::preprocess::{CANVAS_SIZE, NormalizedImage};

const CHECKPOINT_PREFIX: &str = "model.RCNN.";
const CHECKPOINT_EXT: &str = "onnx";

/// File name of the checkpoint written after `epochs` training epochs
pub fn checkpoint_file_name(epochs: u32) -> String {
    format!("{CHECKPOINT_PREFIX}{epochs}.{CHECKPOINT_EXT}")
}

/// Recover the epoch count embedded in a checkpoint file name
pub fn checkpoint_epochs(path: &Path) -> Option<u32> {
    path.file_name()?
        .to_str()?
        .strip_prefix(CHECKPOINT_PREFIX)?
        .strip_suffix(CHECKPOINT_EXT)?
        .strip_suffix('.')?
        .parse()
        .ok()
}

/// Compute device the detector runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    /// CUDA device by ordinal
    Cuda(i32),
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(0)),
            _ => s
                .strip_prefix("cuda:")
                .and_then(|id| id.parse().ok())
                .map(Self::Cuda)
                .ok_or_else(|| format!("unknown device '{s}' (expected cpu, cuda or cuda:<id>)")),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(id) => write!(f, "cuda:{id}"),
        }
    }
}

/// Detector options
#[derive(Debug, Clone)]
pub struct DetectorOptions {
    /// Compute device
    pub device: Device,
    /// Intra-op thread count
    pub intra_threads: usize,
    /// Name of the image input
    pub input_name: String,
    /// Name of the `[N, 4]` box output
    pub boxes_output: String,
    /// Name of the `[N]` score output
    pub scores_output: String,
    /// Name of the `[N]` label output
    pub labels_output: String,
    /// Feed `[1, 3, H, W]` instead of `[3, H, W]`
    pub batch_axis: bool,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            intra_threads: 4,
            input_name: "images".to_string(),
            boxes_output: "boxes".to_string(),
            scores_output: "scores".to_string(),
            labels_output: "labels".to_string(),
            batch_axis: false,
        }
    }
}

impl DetectorOptions {
    /// Create new detector options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set compute device
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Set intra-op thread count
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads;
        self
    }

    /// Set input tensor name
    pub fn with_input_name(mut self, name: impl Into<String>) -> Self {
        self.input_name = name.into();
        self
    }

    /// Prepend a batch axis to the input tensor
    pub fn with_batch_axis(mut self, batch_axis: bool) -> Self {
        self.batch_axis = batch_axis;
        self
    }
}

/// Anything that can find measures on a normalized page
pub trait MeasureDetector: Send + Sync {
    /// Run one page through the detector, returning boxes in detector order
    fn predict(&self, image: &NormalizedImage) -> DetectResult<Vec<RawDetection>>;
}

fn load_err(e: impl fmt::Display) -> DetectError {
    DetectError::ModelLoadError(e.to_string())
}

fn infer_err(e: impl fmt::Display) -> DetectError {
    DetectError::InferenceError(e.to_string())
}

/// Detector backed by an ONNX Runtime session
pub struct OnnxDetector {
    session: Mutex<Session>,
    options: DetectorOptions,
    path: PathBuf,
}

impl fmt::Debug for OnnxDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxDetector")
            .field("session", &"<Session>")
            .field("options", &self.options)
            .field("path", &self.path)
            .finish()
    }
}

impl OnnxDetector {
    /// Load a detector checkpoint from disk
    ///
    /// # Parameters
    /// - `model_path`: ONNX export of the fine-tuned detector
    /// - `options`: device, threading and tensor names
    pub fn from_file(model_path: impl AsRef<Path>, options: DetectorOptions) -> DetectResult<Self> {
        let path = model_path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(DetectError::CheckpointNotFound(path));
        }

        let mut builder = Session::builder()
            .map_err(load_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_err)?
            .with_intra_threads(options.intra_threads)
            .map_err(load_err)?;

        if let Device::Cuda(id) = options.device {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().with_device_id(id).build()])
                .map_err(load_err)?;
        }

        let session = builder.commit_from_file(&path).map_err(load_err)?;

        tracing::info!(
            path = %path.display(),
            device = %options.device,
            epochs = ?checkpoint_epochs(&path),
            "loaded detector checkpoint"
        );

        Ok(Self {
            session: Mutex::new(session),
            options,
            path,
        })
    }

    /// Path the checkpoint was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current detector options
    pub fn options(&self) -> &DetectorOptions {
        &self.options
    }
}

impl MeasureDetector for OnnxDetector {
    fn predict(&self, image: &NormalizedImage) -> DetectResult<Vec<RawDetection>> {
        let side = CANVAS_SIZE as usize;
        let shape: Vec<usize> = if self.options.batch_axis {
            vec![1, 3, side, side]
        } else {
            vec![3, side, side]
        };
        let (data, _offset) = image.to_model_input().into_raw_vec_and_offset();
        let input = Tensor::from_array((shape.as_slice(), data)).map_err(infer_err)?;

        // Copy outputs out while the session is held
        let (boxes, scores, labels) = {
            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![self.options.input_name.as_str() => input])
                .map_err(infer_err)?;

            let boxes = outputs
                .get(self.options.boxes_output.as_str())
                .ok_or_else(|| {
                    DetectError::InferenceError(format!(
                        "model has no '{}' output",
                        self.options.boxes_output
                    ))
                })?
                .try_extract_tensor::<f32>()
                .map_err(infer_err)?
                .1
                .to_vec();

            let scores = match outputs.get(self.options.scores_output.as_str()) {
                Some(v) => Some(v.try_extract_tensor::<f32>().map_err(infer_err)?.1.to_vec()),
                None => None,
            };
            let labels = match outputs.get(self.options.labels_output.as_str()) {
                Some(v) => Some(v.try_extract_tensor::<i64>().map_err(infer_err)?.1.to_vec()),
                None => None,
            };

            (boxes, scores, labels)
        };

        if boxes.len() % 4 != 0 {
            return Err(DetectError::InferenceError(format!(
                "box output has {} values, not a multiple of 4",
                boxes.len()
            )));
        }

        let raw = collect_raw(&boxes, scores.as_deref(), labels.as_deref());
        tracing::debug!(count = raw.len(), "detector returned boxes");
        Ok(raw)
    }
}
