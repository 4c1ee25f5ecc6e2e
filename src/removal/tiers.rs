//! Pipeline states, failure kinds and the fallback ladder

use super::config::{ComputeDevice, ModelFetch, ModelPrecision, OutputFormat, RemovalConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Output quality of the last-resort tier (faster PNG compression)
pub const REDUCED_QUALITY: u8 = 80;

/// States a removal run moves through, strictly forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Analyzing,
    ConfiguringPrimary,
    RunningPrimary,
    PostProcessing,
    FallbackCpu,
    FallbackFp16,
    FallbackQuantizedRelay,
    FallbackQuantizedBasic,
    Done,
    Failed,
}

/// Cause category of a failed removal attempt, set by the remover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// GPU or execution-provider problem
    Gpu,
    /// Allocation failure
    Memory,
    /// Model weights could not be obtained
    Network,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu => write!(f, "gpu"),
            Self::Memory => write!(f, "memory"),
            Self::Network => write!(f, "network"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Failure of a single removal attempt
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} failure: {message}")]
pub struct RemovalFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RemovalFailure {
    pub fn new<S: Into<String>>(kind: FailureKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn gpu<S: Into<String>>(message: S) -> Self {
        Self::new(FailureKind::Gpu, message)
    }

    pub fn memory<S: Into<String>>(message: S) -> Self {
        Self::new(FailureKind::Memory, message)
    }

    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::new(FailureKind::Network, message)
    }

    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::new(FailureKind::Other, message)
    }
}

/// Rung of the fallback ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTier {
    Cpu,
    Fp16,
    QuantizedRelay,
    QuantizedBasic,
}

impl FallbackTier {
    /// All tiers in cascade order
    pub const LADDER: [Self; 4] = [Self::Cpu, Self::Fp16, Self::QuantizedRelay, Self::QuantizedBasic];

    /// First tier tried after a primary failure of `kind`
    #[must_use]
    pub fn entry_for(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Gpu => Self::Cpu,
            FailureKind::Memory => Self::Fp16,
            FailureKind::Network => Self::QuantizedRelay,
            FailureKind::Other => Self::QuantizedBasic,
        }
    }

    /// `entry` and every tier after it
    #[must_use]
    pub fn cascade_from(entry: Self) -> Vec<Self> {
        Self::LADDER
            .iter()
            .copied()
            .skip_while(|tier| *tier != entry)
            .collect()
    }

    /// State recorded while this tier runs
    #[must_use]
    pub fn state(self) -> PipelineState {
        match self {
            Self::Cpu => PipelineState::FallbackCpu,
            Self::Fp16 => PipelineState::FallbackFp16,
            Self::QuantizedRelay => PipelineState::FallbackQuantizedRelay,
            Self::QuantizedBasic => PipelineState::FallbackQuantizedBasic,
        }
    }

    /// Configuration replacing the primary one for this tier
    #[must_use]
    pub fn config(self, primary: &RemovalConfig) -> RemovalConfig {
        let base = RemovalConfig {
            model_precision: primary.model_precision,
            compute_device: ComputeDevice::Cpu,
            model_fetch: ModelFetch::Network,
            output_format: OutputFormat::Png,
            output_quality: 100,
        };
        match self {
            Self::Cpu => base,
            Self::Fp16 => RemovalConfig {
                model_precision: ModelPrecision::Fp16,
                ..base
            },
            Self::QuantizedRelay => RemovalConfig {
                model_precision: ModelPrecision::Quantized,
                model_fetch: ModelFetch::CacheOnly,
                ..base
            },
            Self::QuantizedBasic => RemovalConfig {
                model_precision: ModelPrecision::Quantized,
                output_quality: REDUCED_QUALITY,
                ..base
            },
        }
    }
}

impl fmt::Display for FallbackTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Fp16 => write!(f, "fp16"),
            Self::QuantizedRelay => write!(f, "quantized-relay"),
            Self::QuantizedBasic => write!(f, "quantized-basic"),
        }
    }
}

/// Attempt that produced the result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalTier {
    Primary,
    Fallback(FallbackTier),
}

impl fmt::Display for RemovalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback(tier) => write!(f, "fallback:{}", tier),
        }
    }
}
