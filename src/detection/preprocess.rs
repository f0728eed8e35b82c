//! Image Preprocessing
//!
//! Places grayscale pages on the fixed model canvas and builds the
//! detector's input tensor.

use image::{DynamicImage, GrayImage};
use ndarray::{Array3, s};

use crate::detection::error::{DetectError, DetectResult};

/// Side length of the square canvas the detector was trained on
pub const CANVAS_SIZE: u32 = 1200;

/// A grayscale page zero-padded onto the model canvas
///
/// Shape is always `(1, CANVAS_SIZE, CANVAS_SIZE)`. The source pixels occupy
/// the top-left `height x width` region as raw intensities (0.0 - 255.0).
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    tensor: Array3<f32>,
    width: u32,
    height: u32,
}

impl NormalizedImage {
    /// Width of the source image before padding
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the source image before padding
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Single-channel canvas tensor, shape `(1, CANVAS_SIZE, CANVAS_SIZE)`
    pub fn tensor(&self) -> &Array3<f32> {
        &self.tensor
    }

    /// Replicate the gray channel into an RGB-shaped `(3, H, W)` tensor
    pub fn to_model_input(&self) -> Array3<f32> {
        let side = CANVAS_SIZE as usize;
        let mut input = Array3::<f32>::zeros((3, side, side));
        let gray = self.tensor.slice(s![0, .., ..]);
        for mut channel in input.outer_iter_mut() {
            channel.assign(&gray);
        }
        input
    }
}

/// Pad a grayscale image to the model canvas
///
/// Images wider or taller than [`CANVAS_SIZE`] are rejected rather than
/// cropped.
pub fn normalize(img: &GrayImage) -> DetectResult<NormalizedImage> {
    let (width, height) = img.dimensions();

    if width == 0 || height == 0 {
        return Err(DetectError::InvalidImage(format!(
            "image has zero size ({width}x{height})"
        )));
    }
    if width > CANVAS_SIZE || height > CANVAS_SIZE {
        return Err(DetectError::ImageTooLarge {
            width,
            height,
            limit: CANVAS_SIZE,
        });
    }

    let side = CANVAS_SIZE as usize;
    let mut tensor = Array3::<f32>::zeros((1, side, side));
    for (x, y, pixel) in img.enumerate_pixels() {
        tensor[[0, y as usize, x as usize]] = pixel.0[0] as f32;
    }

    Ok(NormalizedImage {
        tensor,
        width,
        height,
    })
}

/// Convert any decoded image to grayscale and pad it to the model canvas
pub fn normalize_dynamic(img: &DynamicImage) -> DetectResult<NormalizedImage> {
    normalize(&img.to_luma8())
}
