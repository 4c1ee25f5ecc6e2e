//! Background-removal pipeline
//!
//! `Analyzing -> ConfiguringPrimary -> RunningPrimary`, then either
//! `PostProcessing -> Done`, `Done`, or down the fallback ladder
//! (`FallbackCpu -> FallbackFp16 -> FallbackQuantizedRelay ->
//! FallbackQuantizedBasic`) to `Done` or `Failed`. The primary failure's kind
//! picks the rung the ladder is entered at.

use super::analysis::{analyze, ImageBrightnessSample};
use super::backend::BackgroundRemover;
use super::config::{ComputeCapabilities, RemovalConfig};
use super::output::OutputEncoder;
use super::postprocess::remove_white_halo;
use super::registry::{ObjectUrl, ObjectUrlRegistry};
use super::tiers::{FallbackTier, PipelineState, RemovalFailure, RemovalTier};
use crate::config::RemovalLimits;
use crate::error::{BannerError, Result};
use crate::fallback::{accept_any, attempt_in_order, Outcome};
use bytes::Bytes;
use image::{DynamicImage, RgbaImage};
use std::sync::Arc;
use tracing::instrument;

/// Image handed to the pipeline
#[derive(Debug, Clone)]
pub struct InputImage {
    pub bytes: Bytes,
    pub mime_type: String,
    pub file_name: String,
}

impl InputImage {
    pub fn new<B: Into<Bytes>, M: Into<String>, N: Into<String>>(bytes: B, mime_type: M, file_name: N) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            file_name: file_name.into(),
        }
    }

    /// Read a file, guessing the MIME type from its content
    ///
    /// # Errors
    /// - File cannot be read
    pub async fn from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| BannerError::file_io_error("read input image", path, &e))?;
        let mime_type = crate::acquisition::validate::sniff_mime(&bytes)
            .unwrap_or("application/octet-stream")
            .to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(bytes, mime_type, file_name))
    }
}

/// Successful removal
#[derive(Debug, Clone)]
pub struct RemovalOutcome {
    /// Registry URL of the encoded cut-out
    pub result_url: ObjectUrl,
    pub result_bytes: Bytes,
    pub mime_type: &'static str,
    /// Input size in bytes
    pub original_size: usize,
    /// Encoded output size in bytes
    pub processed_size: usize,
    pub tier: RemovalTier,
    /// Configuration of the attempt that succeeded
    pub config: RemovalConfig,
    pub sample: ImageBrightnessSample,
    /// States visited, in order
    pub trail: Vec<PipelineState>,
    /// Failures of earlier attempts
    pub failures: Vec<RemovalFailure>,
}

/// Removes backgrounds with model/device fallbacks
#[derive(Clone)]
pub struct RemovalPipeline {
    remover: Arc<dyn BackgroundRemover>,
    capabilities: ComputeCapabilities,
    limits: RemovalLimits,
    registry: ObjectUrlRegistry,
}

impl std::fmt::Debug for RemovalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemovalPipeline")
            .field("remover", &self.remover.name())
            .field("capabilities", &self.capabilities)
            .field("limits", &self.limits)
            .field("registered", &self.registry.len())
            .finish()
    }
}

impl RemovalPipeline {
    pub fn new(
        remover: Arc<dyn BackgroundRemover>,
        capabilities: ComputeCapabilities,
        limits: RemovalLimits,
        registry: ObjectUrlRegistry,
    ) -> Self {
        Self {
            remover,
            capabilities,
            limits,
            registry,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ObjectUrlRegistry {
        &self.registry
    }

    #[must_use]
    pub fn capabilities(&self) -> ComputeCapabilities {
        self.capabilities
    }

    /// Check MIME type, emptiness and the size limit for this host
    ///
    /// # Errors
    /// - `BannerError::InvalidInput` describing the first violated rule
    pub fn validate(&self, input: &InputImage) -> Result<()> {
        if !input.mime_type.to_ascii_lowercase().starts_with("image/") {
            return Err(BannerError::invalid_input(format!(
                "'{}' is not an image (type {})",
                input.file_name, input.mime_type
            )));
        }
        if input.bytes.is_empty() {
            return Err(BannerError::invalid_input(format!(
                "'{}' is empty",
                input.file_name
            )));
        }
        let max = self.limits.max_bytes(self.capabilities.gpu_acceleration);
        if input.bytes.len() > max {
            return Err(BannerError::invalid_input(format!(
                "'{}' is {} bytes, limit is {} bytes",
                input.file_name,
                input.bytes.len(),
                max
            )));
        }
        Ok(())
    }

    /// Remove the background of `input`
    ///
    /// # Errors
    /// - `BannerError::InvalidInput` for invalid input
    /// - `BannerError::Image` when the bytes do not decode
    /// - `BannerError::RemovalExhausted` when every tier failed
    #[instrument(skip(self, input), fields(file = %input.file_name, size = input.bytes.len()))]
    pub async fn remove_background(&self, input: InputImage) -> Result<RemovalOutcome> {
        self.validate(&input)?;
        let started = instant::Instant::now();
        let mut trail = vec![PipelineState::Analyzing];

        let bytes = input.bytes.clone();
        let (image, sample) = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes).map(|img| {
                let sample = analyze(&img);
                (img, sample)
            })
        })
        .await
        .map_err(|e| BannerError::internal(format!("Analysis task failed: {}", e)))??;
        tracing::debug!(?sample, "analyzed input");

        trail.push(PipelineState::ConfiguringPrimary);
        let primary = RemovalConfig::primary(&sample, self.capabilities);

        trail.push(PipelineState::RunningPrimary);
        tracing::info!(config = %primary, "running primary removal");

        let (cutout, tier, config, failures) = match self.remover.remove(&image, &primary).await {
            Ok(mut cutout) => {
                if sample.is_likely_white_background {
                    trail.push(PipelineState::PostProcessing);
                    let (cleaned, stats) = tokio::task::spawn_blocking(move || {
                        let stats = remove_white_halo(&mut cutout);
                        (cutout, stats)
                    })
                    .await
                    .map_err(|e| BannerError::internal(format!("Post-processing task failed: {}", e)))?;
                    tracing::debug!(
                        semi_transparent = stats.semi_transparent_cleared,
                        edges = stats.edge_cleared,
                        "cleared white halo"
                    );
                    cutout = cleaned;
                }
                (cutout, RemovalTier::Primary, primary, Vec::new())
            },
            Err(failure) => {
                tracing::warn!(kind = %failure.kind, error = %failure.message, "primary removal failed");
                let entry = FallbackTier::entry_for(failure.kind);
                let (cutout, tier, config, mut failures) =
                    self.run_ladder(&image, &primary, entry, &mut trail).await?;
                failures.insert(0, failure);
                (cutout, RemovalTier::Fallback(tier), config, failures)
            },
        };

        let encoded = tokio::task::spawn_blocking(move || {
            OutputEncoder::encode(&cutout, config.output_format, config.output_quality)
        })
        .await
        .map_err(|e| BannerError::internal(format!("Encoding task failed: {}", e)))??;

        let result_url = self.registry.register(encoded.bytes.clone(), encoded.mime_type);
        trail.push(PipelineState::Done);

        tracing::info!(
            ?tier,
            original = input.bytes.len(),
            processed = encoded.bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "background removed"
        );

        Ok(RemovalOutcome {
            result_url,
            processed_size: encoded.bytes.len(),
            result_bytes: encoded.bytes,
            mime_type: encoded.mime_type,
            original_size: input.bytes.len(),
            tier,
            config,
            sample,
            trail,
            failures,
        })
    }

    async fn run_ladder(
        &self,
        image: &DynamicImage,
        primary: &RemovalConfig,
        entry: FallbackTier,
        trail: &mut Vec<PipelineState>,
    ) -> Result<(RgbaImage, FallbackTier, RemovalConfig, Vec<RemovalFailure>)> {
        let remover = &self.remover;
        let outcome = attempt_in_order(
            FallbackTier::cascade_from(entry),
            |tier| {
                trail.push(tier.state());
                let config = tier.config(primary);
                tracing::info!(%tier, %config, "trying fallback tier");
                async move {
                    remover
                        .remove(image, &config)
                        .await
                        .map(|cutout| (cutout, config))
                }
            },
            accept_any,
        )
        .await;

        for failure in outcome.failures() {
            tracing::warn!(tier = %failure.strategy, error = %failure.error, "fallback tier failed");
        }

        match outcome {
            Outcome::Succeeded {
                strategy,
                value: (cutout, config),
                failures,
            } => Ok((
                cutout,
                strategy,
                config,
                failures.into_iter().map(|f| f.error).collect(),
            )),
            Outcome::Exhausted { failures } => {
                trail.push(PipelineState::Failed);
                tracing::error!(trail = ?trail, "all removal tiers failed");
                let cause = failures
                    .last()
                    .map_or_else(|| "no fallback tier ran".to_string(), |f| f.error.to_string());
                Err(BannerError::RemovalExhausted(cause))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::removal::tiers::FailureKind;
    use crate::test_utils::{white_background_png, MockRemover};

    fn pipeline(remover: MockRemover, caps: ComputeCapabilities) -> RemovalPipeline {
        RemovalPipeline::new(
            Arc::new(remover),
            caps,
            RemovalLimits::default(),
            ObjectUrlRegistry::new(),
        )
    }

    #[test]
    fn test_validation_rules() {
        let p = pipeline(MockRemover::new(), ComputeCapabilities::cpu_only());

        let not_image = InputImage::new(vec![1u8], "application/pdf", "a.pdf");
        assert!(p.validate(&not_image).is_err());

        let empty = InputImage::new(Vec::<u8>::new(), "image/png", "a.png");
        assert!(p.validate(&empty).is_err());

        let too_big = InputImage::new(vec![0u8; 10 * 1024 * 1024 + 1], "image/png", "big.png");
        assert!(p.validate(&too_big).is_err());

        let gpu = pipeline(MockRemover::new(), ComputeCapabilities::with_gpu());
        assert!(gpu.validate(&too_big).is_ok());
    }

    #[tokio::test]
    async fn test_primary_success_on_white_runs_post_processing() {
        let remover = MockRemover::new();
        let p = pipeline(remover.clone(), ComputeCapabilities::with_gpu());
        let input = InputImage::new(white_background_png(32), "image/png", "p.png");

        let outcome = p.remove_background(input).await.unwrap();
        assert_eq!(outcome.tier, RemovalTier::Primary);
        assert_eq!(
            outcome.trail,
            vec![
                PipelineState::Analyzing,
                PipelineState::ConfiguringPrimary,
                PipelineState::RunningPrimary,
                PipelineState::PostProcessing,
                PipelineState::Done
            ]
        );
        assert_eq!(remover.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_gpu_failure_enters_at_cpu_tier() {
        let remover = MockRemover::new().fail_times(1, FailureKind::Gpu);
        let p = pipeline(remover.clone(), ComputeCapabilities::with_gpu());
        let input = InputImage::new(white_background_png(32), "image/png", "p.png");

        let outcome = p.remove_background(input).await.unwrap();
        assert_eq!(outcome.tier, RemovalTier::Fallback(FallbackTier::Cpu));
        assert_eq!(outcome.failures.len(), 1);
        // fallback tiers go straight to Done
        assert_eq!(
            &outcome.trail[2..],
            &[
                PipelineState::RunningPrimary,
                PipelineState::FallbackCpu,
                PipelineState::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_exhausted_reports_last_cause() {
        let remover = MockRemover::new().fail_times(10, FailureKind::Network);
        let p = pipeline(remover.clone(), ComputeCapabilities::cpu_only());
        let input = InputImage::new(white_background_png(16), "image/png", "p.png");

        let err = p.remove_background(input).await.unwrap_err();
        match err {
            BannerError::RemovalExhausted(cause) => assert!(cause.contains("attempt 3")),
            other => panic!("unexpected error: {other}"),
        }
        // primary + quantized-relay + quantized-basic
        assert_eq!(remover.calls().len(), 3);
        assert!(p.registry().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_input() {
        let p = pipeline(MockRemover::new(), ComputeCapabilities::cpu_only());
        let input = InputImage::new(vec![0u8; 64], "image/png", "broken.png");
        assert!(matches!(
            p.remove_background(input).await,
            Err(BannerError::Image(_))
        ));
    }
}
