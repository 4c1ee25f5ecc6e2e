//! Brightness analysis on a small downsample of the input

use image::{imageops::FilterType, DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Edge length of the analysis downsample
pub const SAMPLE_SIZE: u32 = 64;

/// Channel value at or above which a corner counts as near-white
pub const NEAR_WHITE_CHANNEL: u8 = 240;

/// Minimum near-white corners for a likely white background
pub const MIN_WHITE_CORNERS: u8 = 2;

/// Average brightness above which a background can count as white
pub const WHITE_BRIGHTNESS: f32 = 200.0;

/// Brightness summary of an input image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageBrightnessSample {
    /// Mean of per-pixel channel means, 0-255
    pub average_brightness: f32,
    /// Number of near-white corners, 0-4
    pub corner_white_count: u8,
    pub is_likely_white_background: bool,
}

impl ImageBrightnessSample {
    /// Build a sample from raw measurements
    #[must_use]
    pub fn from_measurements(average_brightness: f32, corner_white_count: u8) -> Self {
        Self {
            average_brightness,
            corner_white_count,
            is_likely_white_background: corner_white_count >= MIN_WHITE_CORNERS
                && average_brightness > WHITE_BRIGHTNESS,
        }
    }
}

/// Analyze `image` from a 64x64 downsample
#[must_use]
pub fn analyze(image: &DynamicImage) -> ImageBrightnessSample {
    let small = image
        .resize_exact(SAMPLE_SIZE, SAMPLE_SIZE, FilterType::Triangle)
        .to_rgb8();
    sample_downsampled(&small)
}

fn sample_downsampled(small: &RgbImage) -> ImageBrightnessSample {
    let (w, h) = small.dimensions();
    if w == 0 || h == 0 {
        return ImageBrightnessSample::from_measurements(0.0, 0);
    }

    let total: f64 = small.pixels().map(|p| f64::from(pixel_mean(p))).sum();
    let average = (total / f64::from(w * h)) as f32;

    let corners = [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)];
    let corner_white_count = corners
        .iter()
        .filter(|&&(x, y)| {
            small
                .get_pixel(x, y)
                .0
                .iter()
                .all(|&c| c >= NEAR_WHITE_CHANNEL)
        })
        .count() as u8;

    ImageBrightnessSample::from_measurements(average, corner_white_count)
}

fn pixel_mean(p: &Rgb<u8>) -> f32 {
    (f32::from(p[0]) + f32::from(p[1]) + f32::from(p[2])) / 3.0
}
