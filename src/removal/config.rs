//! Removal configuration and compute capabilities

use super::analysis::ImageBrightnessSample;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Brightness above which a GPU run uses the full-precision model
pub const FULL_PRECISION_BRIGHTNESS: f32 = 180.0;

/// Quality of the primary attempt
pub const PRIMARY_QUALITY: u8 = 100;

/// Model weights variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelPrecision {
    Full,
    Fp16,
    Quantized,
}

impl fmt::Display for ModelPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "fp32"),
            Self::Fp16 => write!(f, "fp16"),
            Self::Quantized => write!(f, "quantized"),
        }
    }
}

impl std::str::FromStr for ModelPrecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" | "fp32" => Ok(Self::Full),
            "fp16" => Ok(Self::Fp16),
            "quantized" | "q8" | "int8" => Ok(Self::Quantized),
            _ => Err(format!("Unknown model precision: {}", s)),
        }
    }
}

/// Where inference runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Gpu,
    Cpu,
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

/// Whether model weights may be downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFetch {
    Network,
    /// Only use a model already in the local cache
    CacheOnly,
}

/// Encoding of the cut-out image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    WebP,
    Jpeg,
}

impl OutputFormat {
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Jpeg => "image/jpeg",
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Jpeg => "jpg",
        }
    }
}

/// Full parameter set of one removal attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalConfig {
    pub model_precision: ModelPrecision,
    pub compute_device: ComputeDevice,
    pub model_fetch: ModelFetch,
    pub output_format: OutputFormat,
    /// 0-100
    pub output_quality: u8,
}

impl RemovalConfig {
    /// Configuration of the primary attempt for an analyzed image
    ///
    /// GPU runs use the full-precision model for white or bright images and
    /// half precision otherwise; CPU runs always use half precision.
    #[must_use]
    pub fn primary(sample: &ImageBrightnessSample, capabilities: ComputeCapabilities) -> Self {
        let bright = sample.is_likely_white_background
            || sample.average_brightness > FULL_PRECISION_BRIGHTNESS;

        let (model_precision, compute_device) = match (capabilities.gpu_acceleration, bright) {
            (true, true) => (ModelPrecision::Full, ComputeDevice::Gpu),
            (true, false) => (ModelPrecision::Fp16, ComputeDevice::Gpu),
            (false, _) => (ModelPrecision::Fp16, ComputeDevice::Cpu),
        };

        Self {
            model_precision,
            compute_device,
            model_fetch: ModelFetch::Network,
            output_format: OutputFormat::Png,
            output_quality: PRIMARY_QUALITY,
        }
    }
}

impl fmt::Display for RemovalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {:?} q{}",
            self.model_precision,
            self.compute_device,
            self.output_format,
            self.output_quality
        )?;
        if self.model_fetch == ModelFetch::CacheOnly {
            write!(f, " cache-only")?;
        }
        Ok(())
    }
}

/// What the host can accelerate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeCapabilities {
    pub gpu_acceleration: bool,
}

impl ComputeCapabilities {
    #[must_use]
    pub fn cpu_only() -> Self {
        Self {
            gpu_acceleration: false,
        }
    }

    #[must_use]
    pub fn with_gpu() -> Self {
        Self {
            gpu_acceleration: true,
        }
    }

    /// Probe the inference runtime for a GPU execution provider
    #[must_use]
    pub fn detect() -> Self {
        #[cfg(feature = "onnx")]
        {
            use ort::execution_providers::{
                CUDAExecutionProvider, CoreMLExecutionProvider,
                ExecutionProvider as OrtExecutionProvider,
            };
            let cuda = OrtExecutionProvider::is_available(&CUDAExecutionProvider::default())
                .unwrap_or(false);
            let coreml = OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);
            tracing::debug!(cuda, coreml, "probed execution providers");
            Self {
                gpu_acceleration: cuda || coreml,
            }
        }
        #[cfg(not(feature = "onnx"))]
        {
            Self::cpu_only()
        }
    }
}
