//! Inference backend abstraction

use crate::error::Result;
use ndarray::Array4;

/// A loaded segmentation network that can be shared across concurrent runs
///
/// Implementations are immutable once constructed; `infer` takes `&self` so a
/// single instance can serve every pipeline run in the process. Backends whose
/// runtime needs exclusive access guard it internally.
pub trait InferenceBackend: Send + Sync + std::fmt::Debug {
    /// Run the forward pass on an NCHW tensor
    ///
    /// # Errors
    /// - Input shape rejected by the model
    /// - Runtime failure inside the engine
    /// - Output tensor that cannot be converted to `f32` NCHW
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Short engine name for logging ("onnx", "tract", "mock")
    fn backend_name(&self) -> &'static str;
}

/// Reshape a dynamic output tensor into NCHW, accepting `[H, W]`, `[C, H, W]` or `[N, C, H, W]`
///
/// # Errors
/// - Output rank outside 2..=4
pub(crate) fn output_to_nchw(shape: &[usize], data: Vec<f32>) -> Result<Array4<f32>> {
    let dims = match *shape {
        [h, w] => (1, 1, h, w),
        [c, h, w] => (1, c, h, w),
        [n, c, h, w] => (n, c, h, w),
        _ => {
            return Err(crate::error::BgSwapError::inference(format!(
                "Expected 2D-4D output tensor, got {}D",
                shape.len()
            )))
        },
    };
    Array4::from_shape_vec(dims, data).map_err(|e| {
        crate::error::BgSwapError::inference(format!("Failed to reshape output tensor: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_to_nchw_ranks() {
        let out = output_to_nchw(&[2, 3], vec![0.0; 6]).unwrap();
        assert_eq!(out.shape(), &[1, 1, 2, 3]);

        let out = output_to_nchw(&[2, 2, 2], vec![0.0; 8]).unwrap();
        assert_eq!(out.shape(), &[1, 2, 2, 2]);

        let out = output_to_nchw(&[1, 1, 4, 4], vec![0.0; 16]).unwrap();
        assert_eq!(out.shape(), &[1, 1, 4, 4]);
    }

    #[test]
    fn test_output_to_nchw_rejects_bad_rank_and_length() {
        assert!(output_to_nchw(&[16], vec![0.0; 16]).is_err());
        assert!(output_to_nchw(&[2, 2], vec![0.0; 5]).is_err());
    }
}
