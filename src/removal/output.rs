//! Output encoding for cut-out images

use super::config::OutputFormat;
use crate::error::Result;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

/// Quality at or above which PNG uses the default (smaller) compression
const PNG_FULL_QUALITY: u8 = 90;

/// Encoded image and its MIME type
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Bytes,
    pub mime_type: &'static str,
}

/// Encodes RGBA cut-outs
pub struct OutputEncoder;

impl OutputEncoder {
    /// Encode `image` in `format`
    ///
    /// PNG and WebP are lossless: quality only selects the PNG compression
    /// effort. JPEG drops the alpha channel.
    ///
    /// # Errors
    /// - Encoder failure
    pub fn encode(image: &RgbaImage, format: OutputFormat, quality: u8) -> Result<EncodedImage> {
        let (width, height) = image.dimensions();
        let mut buffer = Vec::new();

        match format {
            OutputFormat::Png => {
                let compression = if quality >= PNG_FULL_QUALITY {
                    CompressionType::Default
                } else {
                    CompressionType::Fast
                };
                PngEncoder::new_with_quality(&mut buffer, compression, FilterType::Adaptive)
                    .write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)?;
            },
            OutputFormat::WebP => {
                WebPEncoder::new_lossless(&mut buffer).write_image(
                    image.as_raw(),
                    width,
                    height,
                    ExtendedColorType::Rgba8,
                )?;
            },
            OutputFormat::Jpeg => {
                let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
                JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).write_image(
                    rgb.as_raw(),
                    width,
                    height,
                    ExtendedColorType::Rgb8,
                )?;
            },
        }

        Ok(EncodedImage {
            bytes: Bytes::from(buffer),
            mime_type: format.mime_type(),
        })
    }

    /// Whether the format keeps transparency
    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        !matches!(format, OutputFormat::Jpeg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn cutout() -> RgbaImage {
        let mut img = RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 0]));
        for y in 4..12 {
            for x in 4..12 {
                img.put_pixel(x, y, Rgba([200, 40, 40, 255]));
            }
        }
        img
    }

    #[test]
    fn test_png_keeps_alpha() {
        let encoded = OutputEncoder::encode(&cutout(), OutputFormat::Png, 100).unwrap();
        assert_eq!(encoded.mime_type, "image/png");

        let decoded = image::load_from_memory(&encoded.bytes).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0)[3], 0);
        assert_eq!(decoded.get_pixel(8, 8), &Rgba([200, 40, 40, 255]));
    }

    #[test]
    fn test_reduced_quality_png_is_lossless() {
        let img = cutout();
        let fast = OutputEncoder::encode(&img, OutputFormat::Png, 80).unwrap();
        let decoded = image::load_from_memory(&fast.bytes).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_webp_and_jpeg() {
        let webp = OutputEncoder::encode(&cutout(), OutputFormat::WebP, 100).unwrap();
        assert_eq!(image::guess_format(&webp.bytes).unwrap(), image::ImageFormat::WebP);

        let jpeg = OutputEncoder::encode(&cutout(), OutputFormat::Jpeg, 85).unwrap();
        assert_eq!(jpeg.mime_type, "image/jpeg");
        assert_eq!(image::guess_format(&jpeg.bytes).unwrap(), image::ImageFormat::Jpeg);
        assert!(!OutputEncoder::supports_transparency(OutputFormat::Jpeg));
    }
}
