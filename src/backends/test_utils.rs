//! Test utilities and mock backends for testing inference functionality
//!
//! The mock implements [`InferenceBackend`] without any model file, records how
//! often it was called, and can be scripted to emit a fixed probability, a
//! malformed shape, or an error. [`MockModelLoader`] plugs it into a
//! [`ModelProvider`](crate::provider::ModelProvider).

use crate::error::{BgSwapError, Result};
use crate::inference::InferenceBackend;
use crate::models::ModelSpec;
use crate::provider::{ModelHandle, ModelLoader};
use async_trait::async_trait;
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What the mock returns from `infer`
#[derive(Debug, Clone)]
pub enum MockOutput {
    /// Every cell of a `(1, 1, R, R)` output holds this probability
    Uniform(f32),
    /// Soft-edged disc centered in the frame (1.0 center, 0.0 outside)
    Disc,
    /// Use the mean of the normalized input channels as the probability
    InputLuminance,
    /// Output of this exact NCHW shape filled with 0.5
    Shape(usize, usize, usize, usize),
    /// Fail with an inference error
    Fail(String),
}

/// Mock segmentation backend for testing
#[derive(Debug, Clone)]
pub struct MockBackend {
    output: MockOutput,
    infer_calls: Arc<AtomicUsize>,
}

impl MockBackend {
    #[must_use]
    pub fn new(output: MockOutput) -> Self {
        Self {
            output,
            infer_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Mock that reports a uniform foreground probability
    #[must_use]
    pub fn uniform(probability: f32) -> Self {
        Self::new(MockOutput::Uniform(probability))
    }

    /// Mock whose forward pass always fails
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self::new(MockOutput::Fail(message.to_string()))
    }

    /// Shared counter of `infer` calls, usable after the mock is moved into a handle
    #[must_use]
    pub fn infer_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.infer_calls)
    }

    #[must_use]
    pub fn infer_calls(&self) -> usize {
        self.infer_calls.load(Ordering::SeqCst)
    }

    fn disc(side_h: usize, side_w: usize) -> Array4<f32> {
        let center_x = side_w as f32 / 2.0;
        let center_y = side_h as f32 / 2.0;
        let radius = (side_w.min(side_h) as f32 / 3.0).max(1.0);

        Array4::from_shape_fn((1, 1, side_h, side_w), |(_, _, y, x)| {
            let dx = x as f32 - center_x;
            let dy = y as f32 - center_y;
            let distance = (dx * dx + dy * dy).sqrt();
            ((radius - distance) / radius).clamp(0.0, 1.0)
        })
    }
}

impl InferenceBackend for MockBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.infer_calls.fetch_add(1, Ordering::SeqCst);

        let &[_, channels, height, width] = input.shape() else {
            return Err(BgSwapError::inference(
                "Input tensor must be 4-dimensional (NCHW)",
            ));
        };
        if channels != 3 {
            return Err(BgSwapError::inference(format!(
                "Mock expects 3 input channels, got {}",
                channels
            )));
        }

        match &self.output {
            MockOutput::Uniform(p) => Ok(Array4::from_elem((1, 1, height, width), *p)),
            MockOutput::Disc => Ok(Self::disc(height, width)),
            MockOutput::InputLuminance => Ok(Array4::from_shape_fn(
                (1, 1, height, width),
                |(_, _, y, x)| {
                    (input[[0, 0, y, x]] + input[[0, 1, y, x]] + input[[0, 2, y, x]]) / 3.0
                },
            )),
            MockOutput::Shape(n, c, h, w) => Ok(Array4::from_elem((*n, *c, *h, *w), 0.5)),
            MockOutput::Fail(message) => Err(BgSwapError::inference(message.clone())),
        }
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

/// Loader that hands out a [`MockBackend`] without touching disk or network
#[derive(Debug)]
pub struct MockModelLoader {
    backend: MockBackend,
    spec: ModelSpec,
    delay: Duration,
    failures_remaining: AtomicUsize,
    calls: Arc<AtomicUsize>,
}

impl MockModelLoader {
    #[must_use]
    pub fn new(backend: MockBackend) -> Self {
        Self {
            backend,
            spec: ModelSpec::default(),
            delay: Duration::ZERO,
            failures_remaining: AtomicUsize::new(0),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build handles for this spec (resolution, normalization, channel)
    #[must_use]
    pub fn with_spec(mut self, spec: ModelSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Simulate a slow fetch
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the first `times` loads with a model load error
    #[must_use]
    pub fn failing_times(self, times: usize) -> Self {
        self.failures_remaining.store(times, Ordering::SeqCst);
        self
    }

    /// Shared counter of `load` calls
    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl ModelLoader for MockModelLoader {
    async fn load(&self) -> Result<ModelHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(BgSwapError::network_error(
                "Failed to download mock model",
                "connection refused",
            ));
        }

        Ok(ModelHandle::new(Arc::new(self.backend.clone()), &self.spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_output_matches_input_resolution() {
        let backend = MockBackend::uniform(0.25);
        let out = backend.infer(&Array4::zeros((1, 3, 8, 8))).unwrap();
        assert_eq!(out.shape(), &[1, 1, 8, 8]);
        assert!(out.iter().all(|&v| v == 0.25));
        assert_eq!(backend.infer_calls(), 1);
    }

    #[test]
    fn test_counter_is_shared_between_clones() {
        let backend = MockBackend::uniform(1.0);
        let counter = backend.infer_counter();
        let clone = backend.clone();
        clone.infer(&Array4::zeros((1, 3, 2, 2))).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disc_is_bright_in_center() {
        let backend = MockBackend::new(MockOutput::Disc);
        let out = backend.infer(&Array4::zeros((1, 3, 30, 30))).unwrap();
        assert!(out[[0, 0, 15, 15]] > 0.9);
        assert_eq!(out[[0, 0, 0, 0]], 0.0);
    }

    #[test]
    fn test_failures() {
        let backend = MockBackend::failing("boom");
        let err = backend.infer(&Array4::zeros((1, 3, 2, 2))).unwrap_err();
        assert!(err.to_string().contains("boom"));

        let backend = MockBackend::uniform(0.5);
        assert!(backend.infer(&Array4::zeros((1, 1, 2, 2))).is_err());
    }
}
