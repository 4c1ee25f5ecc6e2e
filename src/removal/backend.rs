//! Background remover seam

use super::config::RemovalConfig;
use super::tiers::RemovalFailure;
use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};

/// Produces a cut-out (RGBA with transparent background) of an image
///
/// Implementations classify their own failures; the pipeline picks the
/// fallback tier from [`RemovalFailure::kind`] and never inspects messages.
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    async fn remove(
        &self,
        image: &DynamicImage,
        config: &RemovalConfig,
    ) -> Result<RgbaImage, RemovalFailure>;

    /// Short name for logs
    fn name(&self) -> &'static str {
        "remover"
    }
}
