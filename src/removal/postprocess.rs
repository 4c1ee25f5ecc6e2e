//! White-halo cleanup for cut-outs of white-background images
//!
//! Segmentation masks leave a faint fringe of the original white background
//! around the subject. Two passes clear it:
//!
//! 1. bright pixels that are only partially transparent become fully transparent;
//! 2. bright, fully opaque pixels touching a mostly transparent neighbour
//!    (3x3 neighbourhood, read from the pass-1 result) become fully transparent.

use image::{Rgba, RgbaImage};

/// Channel-mean above which a pixel counts as background white
pub const HALO_BRIGHTNESS: u16 = 240;

/// Neighbour alpha below which a pixel counts as transparent
pub const TRANSPARENT_NEIGHBOUR_ALPHA: u8 = 128;

/// Pixels cleared by each pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HaloStats {
    pub semi_transparent_cleared: usize,
    pub edge_cleared: usize,
}

impl HaloStats {
    #[must_use]
    pub fn total(&self) -> usize {
        self.semi_transparent_cleared + self.edge_cleared
    }
}

#[inline]
fn is_bright(p: &Rgba<u8>) -> bool {
    // mean > 240  <=>  sum > 720
    u16::from(p[0]) + u16::from(p[1]) + u16::from(p[2]) > HALO_BRIGHTNESS * 3
}

/// Run both cleanup passes in place
pub fn remove_white_halo(image: &mut RgbaImage) -> HaloStats {
    let mut stats = HaloStats::default();

    for pixel in image.pixels_mut() {
        let alpha = pixel[3];
        if alpha > 0 && alpha < 255 && is_bright(pixel) {
            pixel[3] = 0;
            stats.semi_transparent_cleared += 1;
        }
    }

    let (width, height) = image.dimensions();
    let snapshot: Vec<u8> = image.pixels().map(|p| p[3]).collect();
    let alpha_at = |x: u32, y: u32| -> u8 {
        snapshot
            .get((y as usize) * (width as usize) + x as usize)
            .copied()
            .unwrap_or(255)
    };

    for y in 0..height {
        for x in 0..width {
            if alpha_at(x, y) != 255 {
                continue;
            }
            let pixel = image.get_pixel(x, y);
            if !is_bright(pixel) {
                continue;
            }
            if has_transparent_neighbour(x, y, width, height, &alpha_at) {
                image.get_pixel_mut(x, y)[3] = 0;
                stats.edge_cleared += 1;
            }
        }
    }

    stats
}

fn has_transparent_neighbour<F>(x: u32, y: u32, width: u32, height: u32, alpha_at: &F) -> bool
where
    F: Fn(u32, u32) -> u8,
{
    let x0 = x.saturating_sub(1);
    let y0 = y.saturating_sub(1);
    let x1 = (x + 1).min(width - 1);
    let y1 = (y + 1).min(height - 1);

    (y0..=y1).any(|ny| {
        (x0..=x1).any(|nx| (nx, ny) != (x, y) && alpha_at(nx, ny) < TRANSPARENT_NEIGHBOUR_ALPHA)
    })
}
