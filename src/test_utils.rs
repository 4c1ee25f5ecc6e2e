//! Mock seams and image fixtures for unit tests

use crate::acquisition::{AcquisitionError, FetchedPayload, ImageFetcher};
use crate::removal::{BackgroundRemover, FailureKind, RemovalConfig, RemovalFailure};
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Noisy RGB PNG of `size`×`size`; noise keeps it from compressing small
pub fn png_fixture(size: u32) -> Vec<u8> {
    let mut state: u32 = 0x2545_F491;
    let img = RgbImage::from_fn(size, size, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xFF) as u8
        };
        Rgb([next(), next(), next()])
    });
    encode_png(DynamicImage::ImageRgb8(img))
}

/// White PNG with a dark square in the middle
pub fn white_background_png(size: u32) -> Vec<u8> {
    let (lo, hi) = (size * 3 / 8, size * 5 / 8);
    let img = RgbImage::from_fn(size, size, |x, y| {
        if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
            Rgb([30, 30, 30])
        } else {
            Rgb([255, 255, 255])
        }
    });
    encode_png(DynamicImage::ImageRgb8(img))
}

fn encode_png(img: DynamicImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

#[derive(Debug, Clone)]
enum Canned {
    Payload(FetchedPayload),
    Transport(String),
}

/// Fetcher answering from a URL → response table; unknown URLs fail to connect
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    responses: Arc<Mutex<HashMap<String, Canned>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, status: u16, content_type: Option<&str>, body: Vec<u8>) -> Self {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            Canned::Payload(FetchedPayload {
                status,
                content_type: content_type.map(str::to_string),
                bytes: Bytes::from(body),
            }),
        );
        self
    }

    pub fn fail(self, url: &str, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Canned::Transport(message.to_string()));
        self
    }

    /// URLs requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPayload, AcquisitionError> {
        self.requests.lock().unwrap().push(url.to_string());
        match self.responses.lock().unwrap().get(url).cloned() {
            Some(Canned::Payload(payload)) => Ok(payload),
            Some(Canned::Transport(message)) => Err(AcquisitionError::Transport(message)),
            None => Err(AcquisitionError::Transport(format!("connection refused: {}", url))),
        }
    }
}

/// Remover that fails a set number of times, then cuts out near-white pixels
#[derive(Debug, Clone, Default)]
pub struct MockRemover {
    failures: Option<(usize, FailureKind)>,
    calls: Arc<Mutex<Vec<RemovalConfig>>>,
}

impl MockRemover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `times` calls with `kind`
    pub fn fail_times(mut self, times: usize, kind: FailureKind) -> Self {
        self.failures = Some((times, kind));
        self
    }

    /// Configurations received, in call order
    pub fn calls(&self) -> Vec<RemovalConfig> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackgroundRemover for MockRemover {
    async fn remove(
        &self,
        image: &DynamicImage,
        config: &RemovalConfig,
    ) -> Result<RgbaImage, RemovalFailure> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(*config);
            calls.len()
        };
        if let Some((times, kind)) = self.failures {
            if attempt <= times {
                return Err(RemovalFailure::new(
                    kind,
                    format!("mock {} failure on attempt {}", kind, attempt),
                ));
            }
        }

        let mut out = image.to_rgba8();
        for px in out.pixels_mut() {
            if px[0] > 240 && px[1] > 240 && px[2] > 240 {
                px[3] = 0;
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[test]
fn test_fixtures_have_expected_shape() {
    assert!(png_fixture(64).len() > 1024);
    let white = image::load_from_memory(&white_background_png(32)).unwrap();
    assert_eq!(white.width(), 32);
    assert_eq!(white.to_rgb8().get_pixel(0, 0), &Rgb([255, 255, 255]));
    assert_eq!(white.to_rgb8().get_pixel(16, 16), &Rgb([30, 30, 30]));
}
