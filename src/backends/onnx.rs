//! ONNX Runtime backend implementation for segmentation models
//!
//! Builds an ONNX Runtime session from model bytes with the configured execution
//! provider (CPU, CUDA, CoreML). The session is created once per model load and
//! shared by every pipeline run through the provider's handle.

use crate::config::{ExecutionProvider, PipelineConfig};
use crate::error::{BgSwapError, Result};
use crate::inference::{output_to_nchw, InferenceBackend};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};
use std::sync::Mutex;

/// ONNX Runtime backend for running segmentation models
#[derive(Debug)]
pub struct OnnxBackend {
    // ort sessions need `&mut` to run; runs on the shared handle serialize here
    session: Mutex<Session>,
}

impl OnnxBackend {
    /// List all ONNX Runtime execution providers with availability status and descriptions
    ///
    /// Returns a vector of tuples containing:
    /// - Provider name (String)
    /// - Availability status (bool)
    /// - Description (String)
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!("🔍 System Hardware Analysis:");
        log::debug!("  - Platform: {os}", os = std::env::consts::OS);
        log::debug!("  - Architecture: {arch}", arch = std::env::consts::ARCH);

        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Create a session from ONNX model bytes
    ///
    /// # Errors
    /// - Session builder or provider configuration failures
    /// - Model bytes that ONNX Runtime cannot parse
    pub fn from_bytes(model_data: &[u8], config: &PipelineConfig) -> Result<Self> {
        let model_load_start = std::time::Instant::now();

        let mut session_builder = Session::builder()
            .map_err(|e| {
                BgSwapError::model_load(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgSwapError::model_load(format!("Failed to set optimization level: {e}"))
            })?;

        session_builder = match config.execution_provider {
            ExecutionProvider::Auto => {
                let mut providers = Vec::new();

                let cuda_provider = CUDAExecutionProvider::default();
                if OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false) {
                    log::info!("🚀 CUDA execution provider is available and will be used");
                    providers.push(cuda_provider.build());
                }

                let coreml_provider = CoreMLExecutionProvider::default();
                if OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false) {
                    log::info!("🍎 CoreML execution provider is available and will be used");
                    providers.push(coreml_provider.with_subgraphs(true).build());
                }

                if providers.is_empty() {
                    log::warn!("⚠️ No hardware acceleration available, falling back to CPU");
                    session_builder
                } else {
                    session_builder
                        .with_execution_providers(providers)
                        .map_err(|e| {
                            BgSwapError::model_load(format!(
                                "Failed to set auto execution providers: {e}"
                            ))
                        })?
                }
            },
            ExecutionProvider::Cpu => {
                log::info!("🎯 Active execution provider: CPU (explicitly requested)");
                session_builder
            },
            ExecutionProvider::Cuda => {
                let cuda_provider = CUDAExecutionProvider::default();
                if OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false) {
                    session_builder
                        .with_execution_providers([cuda_provider.build()])
                        .map_err(|e| {
                            BgSwapError::model_load(format!(
                                "Failed to set CUDA execution provider: {e}"
                            ))
                        })?
                } else {
                    log::warn!("⚠️ CUDA requested but not available, falling back to CPU");
                    session_builder
                }
            },
            ExecutionProvider::CoreMl => {
                let coreml_provider = CoreMLExecutionProvider::default();
                if OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false) {
                    session_builder
                        .with_execution_providers([coreml_provider.with_subgraphs(true).build()])
                        .map_err(|e| {
                            BgSwapError::model_load(format!(
                                "Failed to set CoreML execution provider: {e}"
                            ))
                        })?
                } else {
                    log::warn!("⚠️ CoreML requested but not available, falling back to CPU");
                    session_builder
                }
            },
        };

        let cores = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(8);
        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            cores
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (cores / 4).max(1)
        };

        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| BgSwapError::model_load(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| BgSwapError::model_load(format!("Failed to set inter threads: {e}")))?
            .commit_from_memory(model_data)
            .map_err(|e| {
                BgSwapError::model_load(format!("Failed to create session from model data: {e}"))
            })?;

        #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for logging display
        let size_mb = model_data.len() as f64 / (1024.0 * 1024.0);
        log::debug!("✅ ONNX Runtime session created successfully");
        log::debug!("  - Requested provider: {:?}", config.execution_provider);
        log::debug!(
            "  - Threading: {intra_threads} intra-op threads, {inter_threads} inter-op threads"
        );
        log::debug!("  - Model size: {size_mb:.2} MB");
        log::info!(
            "📊 Model loading complete: {:.0}ms",
            model_load_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl InferenceBackend for OnnxBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let inference_start = std::time::Instant::now();
        log::debug!("🚀 Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgSwapError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| BgSwapError::internal("ONNX session lock poisoned"))?;

        // Positional inputs/outputs keep us independent of tensor names
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgSwapError::inference(format!("ONNX inference failed: {e}")))?;

        let output_tensor = {
            let keys: Vec<_> = outputs.keys().collect();
            let first_key = keys
                .first()
                .ok_or_else(|| BgSwapError::inference("No output tensors found"))?;
            outputs
                .get(first_key)
                .ok_or_else(|| BgSwapError::inference("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| {
                    BgSwapError::inference(format!("Failed to extract output tensor: {e}"))
                })?
        };

        let shape = output_tensor.shape().to_vec();
        let data = output_tensor.view().to_owned().into_raw_vec_and_offset().0;
        let result = output_to_nchw(&shape, data)?;

        log::info!(
            "📊 Inference complete: {:.2}ms total",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }

    fn backend_name(&self) -> &'static str {
        "onnx"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_provider_always_listed() {
        let providers = OnnxBackend::list_providers();
        assert_eq!(providers.len(), 3);
        let (name, available, _) = &providers[0];
        assert_eq!(name, "CPU");
        assert!(*available);
    }

    #[test]
    fn test_garbage_bytes_fail_as_model_load() {
        let config = PipelineConfig::builder()
            .execution_provider(ExecutionProvider::Cpu)
            .build()
            .unwrap();
        let err = OnnxBackend::from_bytes(b"definitely not onnx", &config).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ModelLoad);
    }
}
