//! ONNX Runtime background remover
//!
//! Every call resolves the model file for the requested precision, builds a
//! session for the requested device and runs inference on a blocking thread.
//! Failures are classified where they happen so the pipeline can choose the
//! right fallback tier.

use super::backend::BackgroundRemover;
use super::config::{ComputeDevice, RemovalConfig};
use super::models::ModelStore;
use super::preprocessing::{apply_mask, preprocess};
use super::tiers::{FailureKind, RemovalFailure};
use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;

/// Background remover running the segmentation model through ONNX Runtime
#[derive(Debug, Clone)]
pub struct OnnxRemover {
    store: ModelStore,
}

impl OnnxRemover {
    #[must_use]
    pub fn new(store: ModelStore) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Available execution providers as `(name, available)`
    #[must_use]
    pub fn list_providers() -> Vec<(&'static str, bool)> {
        vec![
            ("CPU", true),
            (
                "CUDA",
                OrtExecutionProvider::is_available(&CUDAExecutionProvider::default())
                    .unwrap_or(false),
            ),
            (
                "CoreML",
                OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                    .unwrap_or(false),
            ),
        ]
    }
}

/// Memory exhaustion shows up only in the runtime's error text
fn classify(default: FailureKind, error: &impl std::fmt::Display) -> RemovalFailure {
    let message = error.to_string();
    let lower = message.to_ascii_lowercase();
    let kind = if lower.contains("out of memory")
        || lower.contains("failed to allocate")
        || lower.contains("bad_alloc")
    {
        FailureKind::Memory
    } else {
        default
    };
    RemovalFailure::new(kind, message)
}

fn build_session(model: &[u8], device: ComputeDevice) -> Result<Session, RemovalFailure> {
    let mut builder = Session::builder()
        .map_err(|e| classify(FailureKind::Other, &e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| classify(FailureKind::Other, &e))?;

    if device == ComputeDevice::Gpu {
        let cuda = CUDAExecutionProvider::default();
        let coreml = CoreMLExecutionProvider::default();
        let provider = if OrtExecutionProvider::is_available(&cuda).unwrap_or(false) {
            tracing::debug!("using CUDA execution provider");
            cuda.build()
        } else if OrtExecutionProvider::is_available(&coreml).unwrap_or(false) {
            tracing::debug!("using CoreML execution provider");
            CoreMLExecutionProvider::default().with_subgraphs(true).build()
        } else {
            return Err(RemovalFailure::gpu("no GPU execution provider available"));
        };
        builder = builder
            .with_execution_providers([provider])
            .map_err(|e| classify(FailureKind::Gpu, &e))?;
    }

    let default_kind = match device {
        ComputeDevice::Gpu => FailureKind::Gpu,
        ComputeDevice::Cpu => FailureKind::Other,
    };
    builder
        .commit_from_memory(model)
        .map_err(|e| classify(default_kind, &e))
}

fn run_inference(
    model_path: &Path,
    image: &DynamicImage,
    device: ComputeDevice,
) -> Result<RgbaImage, RemovalFailure> {
    let model = std::fs::read(model_path).map_err(|e| {
        RemovalFailure::other(format!("Failed to read model {}: {}", model_path.display(), e))
    })?;
    let mut session = build_session(&model, device)?;
    drop(model);

    let (input, transform) = preprocess(image);
    let input_value = Value::from_array(input).map_err(|e| classify(FailureKind::Other, &e))?;

    let started = instant::Instant::now();
    let run_kind = match device {
        ComputeDevice::Gpu => FailureKind::Gpu,
        ComputeDevice::Cpu => FailureKind::Other,
    };
    let outputs = session
        .run(ort::inputs![input_value])
        .map_err(|e| classify(run_kind, &e))?;
    tracing::debug!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        %device,
        "inference finished"
    );

    let mask = {
        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| RemovalFailure::other("No output tensors found"))?;
        let tensor = outputs
            .get(first_key)
            .ok_or_else(|| RemovalFailure::other("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| classify(FailureKind::Other, &e))?;

        let shape = tensor.shape().to_vec();
        let (h, w) = match shape.as_slice() {
            [1, 1, h, w] | [1, h, w] => (*h, *w),
            _ => {
                return Err(RemovalFailure::other(format!(
                    "Unexpected output tensor shape {:?}",
                    shape
                )))
            },
        };
        let data: Vec<f32> = tensor.iter().copied().collect();
        Array4::from_shape_vec((1, 1, h, w), data).map_err(|e| classify(FailureKind::Other, &e))?
    };

    Ok(apply_mask(image, &mask, &transform))
}

#[async_trait]
impl BackgroundRemover for OnnxRemover {
    async fn remove(
        &self,
        image: &DynamicImage,
        config: &RemovalConfig,
    ) -> Result<RgbaImage, RemovalFailure> {
        let model_path = self
            .store
            .ensure(config.model_precision, config.model_fetch)
            .await
            .map_err(|e| RemovalFailure::network(e.to_string()))?;

        let image = image.clone();
        let device = config.compute_device;
        tokio::task::spawn_blocking(move || run_inference(&model_path, &image, device))
            .await
            .map_err(|e| RemovalFailure::other(format!("Inference task failed: {}", e)))?
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}
