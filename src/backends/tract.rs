//! Tract backend implementation for segmentation models
//!
//! Tract is a pure Rust neural network inference library: no C++ runtime, no
//! FFI boundary, and it works where ONNX Runtime binaries are unavailable.

use crate::error::{BgSwapError, Result};
use crate::inference::{output_to_nchw, InferenceBackend};
use ndarray::Array4;
use tract_onnx::prelude::*;

use instant::Instant;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running segmentation models using pure Rust inference
#[derive(Debug)]
pub struct TractBackend {
    model: TractModel,
}

impl TractBackend {
    /// List Tract execution providers (CPU only)
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
    }

    /// Parse, pin the input shape to `1x3xRxR`, optimize and make runnable
    ///
    /// # Errors
    /// - Model bytes that Tract cannot parse
    /// - Graph optimization failures
    pub fn from_bytes(model_data: &[u8], resolution: u32) -> Result<Self> {
        let model_load_start = Instant::now();
        let side = resolution as usize;

        log::info!("🚀 Initializing Tract Backend");
        #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for logging display
        let size_mb = model_data.len() as f64 / (1024.0 * 1024.0);
        log::info!("📏 Model size: {size_mb:.2} MB");

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| BgSwapError::model_load(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .map_err(|e| BgSwapError::model_load(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| BgSwapError::model_load(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                BgSwapError::model_load(format!("Failed to create runnable model: {e}"))
            })?;

        log::info!(
            "✅ Tract backend initialized in {}ms",
            model_load_start.elapsed().as_millis()
        );

        Ok(Self { model })
    }
}

impl InferenceBackend for TractBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        log::debug!("🔮 Running Tract inference");
        log::debug!("  - Input tensor: {:?}", input.shape());

        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());

        let outputs = self
            .model
            .run(tvec![input_tensor.into()])
            .map_err(|e| BgSwapError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgSwapError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor.to_array_view::<f32>().map_err(|e| {
            BgSwapError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let shape = output_data.shape().to_vec();
        let output_array = output_to_nchw(&shape, output_data.iter().copied().collect())?;

        log::debug!(
            "✅ Tract inference completed in {}ms",
            inference_start.elapsed().as_millis()
        );
        log::debug!("  - Output tensor: {:?}", output_array.shape());

        Ok(output_array)
    }

    fn backend_name(&self) -> &'static str {
        "tract"
    }
}
