//! Patch transforms: decoded image -> CHW float tensor.

use image::DynamicImage;
use ndarray::Array3;

use crate::error::Result;

/// CellViT inference normalization (mean 0.5, std 0.5 per channel).
pub const CELLVIT_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
pub const CELLVIT_STD: [f32; 3] = [0.5, 0.5, 0.5];

pub trait Transform {
    fn apply(&self, image: &DynamicImage) -> Result<Array3<f32>>;
}

impl<F> Transform for F
where
    F: Fn(&DynamicImage) -> Result<Array3<f32>>,
{
    fn apply(&self, image: &DynamicImage) -> Result<Array3<f32>> {
        self(image)
    }
}

/// RGB in [0, 1], shape [3, H, W]. Alpha is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToTensor;

impl Transform for ToTensor {
    fn apply(&self, image: &DynamicImage) -> Result<Array3<f32>> {
        Normalize {
            mean: [0.0; 3],
            std: [1.0; 3],
        }
        .apply(image)
    }
}

/// `ToTensor` followed by per-channel `(v - mean) / std`.
#[derive(Debug, Clone, Copy)]
pub struct Normalize {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Normalize {
    fn default() -> Self {
        Self {
            mean: CELLVIT_MEAN,
            std: CELLVIT_STD,
        }
    }
}

impl Transform for Normalize {
    fn apply(&self, image: &DynamicImage) -> Result<Array3<f32>> {
        let rgb = image.to_rgb8();
        let (w, h) = rgb.dimensions();
        let n = w as usize * h as usize;
        let mut out = vec![0.0f32; 3 * n];
        for (i, px) in rgb.pixels().enumerate() {
            for c in 0..3 {
                let v = px[c] as f32 / 255.0;
                out[c * n + i] = (v - self.mean[c]) / self.std[c];
            }
        }
        Ok(Array3::from_shape_vec((3, h as usize, w as usize), out)?)
    }
}
