//! Backend implementations for different inference engines
//!
//! - ONNX Runtime backend (high performance, GPU acceleration)
//! - Tract backend (pure Rust, no external dependencies)
//! - Mock backend for tests and benchmarks

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

pub mod test_utils;

use crate::config::{BackendType, PipelineConfig};
use crate::error::{BgSwapError, Result};
use crate::inference::InferenceBackend;
use std::sync::Arc;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

/// Build the configured backend from model bytes
///
/// # Errors
/// - Backend type not compiled into this build
/// - Backend construction failures (reported as model load errors)
pub fn create_backend(
    model_data: &[u8],
    config: &PipelineConfig,
) -> Result<Arc<dyn InferenceBackend>> {
    match config.backend_type {
        #[cfg(feature = "onnx")]
        BackendType::Onnx => Ok(Arc::new(OnnxBackend::from_bytes(model_data, config)?)),
        #[cfg(feature = "tract")]
        BackendType::Tract => Ok(Arc::new(TractBackend::from_bytes(
            model_data,
            config.model_spec.resolution,
        )?)),
        #[allow(unreachable_patterns)]
        other => {
            let _ = model_data;
            Err(BgSwapError::model_load(format!(
                "Backend '{}' is not enabled in this build",
                other
            )))
        },
    }
}

/// Backends compiled into this build
#[must_use]
pub fn available_backends() -> Vec<BackendType> {
    let mut backends = Vec::new();
    #[cfg(feature = "onnx")]
    backends.push(BackendType::Onnx);
    #[cfg(feature = "tract")]
    backends.push(BackendType::Tract);
    backends
}

/// Execution providers of every compiled-in backend: `(name, available, description)`
#[must_use]
pub fn provider_diagnostics() -> Vec<(BackendType, Vec<(String, bool, String)>)> {
    available_backends()
        .into_iter()
        .map(|backend| {
            let providers = match backend {
                #[cfg(feature = "onnx")]
                BackendType::Onnx => OnnxBackend::list_providers(),
                #[cfg(feature = "tract")]
                BackendType::Tract => TractBackend::list_providers(),
                #[allow(unreachable_patterns)]
                _ => Vec::new(),
            };
            (backend, providers)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_diagnostics_cover_compiled_backends() {
        let diagnostics = provider_diagnostics();
        let backends: Vec<_> = diagnostics.iter().map(|(b, _)| *b).collect();
        assert_eq!(backends, available_backends());

        // CPU is always there as a fallback
        for (backend, providers) in &diagnostics {
            assert!(
                providers.iter().any(|(name, available, _)| name == "CPU" && *available),
                "{backend} has no CPU provider"
            );
        }
    }
}
