//! Detection error type definitions

use std::path::PathBuf;

use thiserror::Error;

/// Detection error type
#[derive(Error, Debug)]
pub enum DetectError {
    /// Image could not be decoded
    #[error("Image decoding error: {0}")]
    ImageError(#[from] image::ImageError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Image does not fit on the fixed model canvas
    #[error("image too large: {width}x{height} exceeds {limit}x{limit}")]
    ImageTooLarge { width: u32, height: u32, limit: u32 },

    /// Image has a zero dimension or otherwise cannot be normalized
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Checkpoint file does not exist
    #[error("Checkpoint not found: {}", .0.display())]
    CheckpointNotFound(PathBuf),

    /// Model loading error
    #[error("Model loading failed: {0}")]
    ModelLoadError(String),

    /// Inference runtime error
    #[error("Inference error: {0}")]
    InferenceError(String),

    /// Annotation file could not be parsed
    #[error("Annotation error in {}: {message}", .path.display())]
    AnnotationError { path: PathBuf, message: String },
}

/// Detection result type alias
pub type DetectResult<T> = std::result::Result<T, DetectError>;
