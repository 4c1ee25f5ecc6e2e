//! Background removal for product photos
//!
//! The [`RemovalPipeline`] analyzes the input, picks a primary configuration,
//! and falls back through cheaper model/device tiers when the primary attempt
//! fails. Results are registered in a session-scoped [`ObjectUrlRegistry`].

pub mod analysis;
mod backend;
pub mod config;
pub mod models;
#[cfg(feature = "onnx")]
mod onnx;
pub mod output;
mod pipeline;
pub mod postprocess;
#[cfg(feature = "onnx")]
pub mod preprocessing;
mod registry;
pub mod tiers;

pub use analysis::{analyze, ImageBrightnessSample};
pub use backend::BackgroundRemover;
pub use config::{
    ComputeCapabilities, ComputeDevice, ModelFetch, ModelPrecision, OutputFormat, RemovalConfig,
};
pub use models::ModelStore;
#[cfg(feature = "onnx")]
pub use onnx::OnnxRemover;
pub use output::{EncodedImage, OutputEncoder};
pub use pipeline::{InputImage, RemovalOutcome, RemovalPipeline};
pub use postprocess::{remove_white_halo, HaloStats};
pub use registry::{ObjectUrl, ObjectUrlRegistry, RegisteredBlob};
pub use tiers::{FailureKind, FallbackTier, PipelineState, RemovalFailure, RemovalTier};
