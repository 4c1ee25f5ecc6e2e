//! Shared fixtures and mock seams for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bannerkit::acquisition::{AcquisitionError, FetchedPayload, ImageFetcher};
use bannerkit::removal::{BackgroundRemover, FailureKind, RemovalConfig, RemovalFailure};
use bannerkit::storage::{ObjectStorage, StorageError, StoredObject};
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// PNG with a per-pixel gradient and noise, well above 1 KB for 64×64
pub fn noisy_png(size: u32) -> Vec<u8> {
    let mut seed: u32 = 0x9E37_79B9;
    let img = RgbImage::from_fn(size, size, |x, y| {
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let n = (seed >> 24) as u8;
        Rgb([(x * 4) as u8 ^ n, (y * 4) as u8, n])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}

/// White product shot: white everywhere except a dark centered square
pub fn white_product_png(size: u32) -> Vec<u8> {
    let (lo, hi) = (size / 3, size * 2 / 3);
    let img = RgbImage::from_fn(size, size, |x, y| {
        if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
            Rgb([40, 60, 90])
        } else {
            Rgb([255, 255, 255])
        }
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}

pub fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buffer, format).unwrap();
    buffer.into_inner()
}

/// Fetcher serving canned responses per URL and recording every request
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    routes: Arc<Mutex<HashMap<String, FetchedPayload>>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: &str, status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            FetchedPayload {
                status,
                content_type: content_type.map(str::to_string),
                bytes: body.into(),
            },
        );
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPayload, AcquisitionError> {
        self.log.lock().unwrap().push(url.to_string());
        self.routes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| AcquisitionError::Transport(format!("no route to {}", url)))
    }
}

/// Object store whose every write fails with a backend error
pub struct BrokenStorage;

#[async_trait]
impl ObjectStorage for BrokenStorage {
    async fn put(&self, _: &str, _: &str, _: Bytes, _: &str) -> Result<StoredObject, StorageError> {
        Err(StorageError::Backend("quota exceeded".to_string()))
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        Err(StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    async fn delete(&self, _: &str, _: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("broken://{}/{}", bucket, key)
    }
}

/// Remover following a script of per-call failures; `None` entries succeed
#[derive(Clone, Default)]
pub struct ScriptedRemover {
    script: Arc<Mutex<Vec<Option<FailureKind>>>>,
    seen: Arc<Mutex<Vec<RemovalConfig>>>,
}

impl ScriptedRemover {
    pub fn new(script: Vec<Option<FailureKind>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            seen: Arc::default(),
        }
    }

    pub fn seen(&self) -> Vec<RemovalConfig> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackgroundRemover for ScriptedRemover {
    async fn remove(&self, image: &DynamicImage, config: &RemovalConfig) -> Result<RgbaImage, RemovalFailure> {
        let call = {
            let mut seen = self.seen.lock().unwrap();
            seen.push(*config);
            seen.len() - 1
        };
        if let Some(Some(kind)) = self.script.lock().unwrap().get(call).copied() {
            return Err(RemovalFailure::new(kind, format!("scripted failure #{}", call + 1)));
        }

        // alpha from distance to white
        let mut out = image.to_rgba8();
        for px in out.pixels_mut() {
            let min = px[0].min(px[1]).min(px[2]);
            px[3] = if min >= 250 { 0 } else { 255 };
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
