//! Tensor conversion around model inference
//!
//! Input: aspect-preserving resize, centre padding on a white square canvas,
//! NCHW normalisation. Output: the mask tensor is mapped back through the same
//! scale/offset onto the original image and applied as alpha.

use super::models::{MODEL_INPUT_SIZE, NORMALIZATION_MEAN, NORMALIZATION_STD};
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage, RgbaImage};
use ndarray::Array4;

/// Padding colour of the model canvas
const PADDING: Rgb<u8> = Rgb([255, 255, 255]);

/// Mapping between original image coordinates and the model canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasTransform {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub target_size: u32,
}

impl CanvasTransform {
    /// Transform fitting `width`x`height` into a `target_size` square
    #[must_use]
    pub fn fit(width: u32, height: u32, target_size: u32) -> Self {
        let target = target_size as f32;
        let scale = (target / width.max(1) as f32).min(target / height.max(1) as f32);
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, target_size);
        Self {
            scale,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
            scaled_width,
            scaled_height,
            target_size,
        }
    }

    /// Canvas coordinate of an original pixel
    #[must_use]
    pub fn to_canvas(&self, x: u32, y: u32) -> (u32, u32) {
        let cx = ((x as f32 * self.scale).round() as u32).min(self.scaled_width - 1) + self.offset_x;
        let cy = ((y as f32 * self.scale).round() as u32).min(self.scaled_height - 1) + self.offset_y;
        (cx, cy)
    }
}

/// Build the normalized NCHW input tensor for `image`
#[must_use]
pub fn preprocess(image: &DynamicImage) -> (Array4<f32>, CanvasTransform) {
    preprocess_with_size(image, MODEL_INPUT_SIZE)
}

fn preprocess_with_size(image: &DynamicImage, target_size: u32) -> (Array4<f32>, CanvasTransform) {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let transform = CanvasTransform::fit(width, height, target_size);

    let resized = image::imageops::resize(
        &rgb,
        transform.scaled_width,
        transform.scaled_height,
        image::imageops::FilterType::Triangle,
    );

    let mut canvas: RgbImage = ImageBuffer::from_pixel(target_size, target_size, PADDING);
    image::imageops::replace(
        &mut canvas,
        &resized,
        i64::from(transform.offset_x),
        i64::from(transform.offset_y),
    );

    (canvas_to_tensor(&canvas), transform)
}

fn canvas_to_tensor(canvas: &RgbImage) -> Array4<f32> {
    let (width, height) = canvas.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    #[allow(clippy::indexing_slicing)]
    // tensor allocated with the canvas dimensions
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for c in 0..3 {
            let value = (f32::from(pixel[c]) / 255.0 - NORMALIZATION_MEAN[c]) / NORMALIZATION_STD[c];
            tensor[[0, c, y as usize, x as usize]] = value;
        }
    }

    tensor
}

/// Apply a `1x1xHxW` mask tensor to `image` as its alpha channel
///
/// The mask is min-max normalized first; a flat mask is used as-is.
#[must_use]
pub fn apply_mask(image: &DynamicImage, mask: &Array4<f32>, transform: &CanvasTransform) -> RgbaImage {
    let (min, max) = mask
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    let normalize = |v: f32| {
        if range > f32::EPSILON {
            (v - min) / range
        } else {
            v
        }
    };

    let mut rgba = image.to_rgba8();
    for (x, y, pixel) in rgba.enumerate_pixels_mut() {
        let (cx, cy) = transform.to_canvas(x, y);
        let value = mask
            .get([0, 0, cy as usize, cx as usize])
            .copied()
            .map_or(0.0, normalize);
        pixel[3] = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    rgba
}
