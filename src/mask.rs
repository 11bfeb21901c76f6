//! Mask builder: source image -> model tensor -> probability grid -> alpha mask
//!
//! The source is resampled straight to the model's square resolution (no
//! aspect-preserving padding), so the mask and the resampled source line up
//! pixel for pixel. The raw probability drives alpha directly: no smoothing,
//! thresholding or morphology, so soft edges come through as partial alpha.

use crate::error::{BgSwapError, Result};
use crate::models::Normalization;
use crate::provider::ModelHandle;
use crate::types::{AlphaMask, ProbabilityMap, SourceImage};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{s, Array4};
use tracing::{debug, instrument};

/// Source pixels at model resolution together with their alpha mask
#[derive(Debug, Clone)]
pub struct MaskedSource {
    /// Source resampled to `resolution x resolution`, RGB
    pub source: RgbImage,
    pub mask: AlphaMask,
}

/// Stateless mask construction helpers
pub struct MaskBuilder;

impl MaskBuilder {
    /// Resample to `resolution x resolution` with bilinear filtering
    ///
    /// Any alpha channel in the upload is dropped. Filtered values are clamped
    /// to the 8-bit range by the resampler.
    #[must_use]
    pub fn resample(source: &SourceImage, resolution: u32) -> RgbImage {
        let rgb = source.image().to_rgb8();
        if rgb.dimensions() == (resolution, resolution) {
            return rgb;
        }
        imageops::resize(&rgb, resolution, resolution, FilterType::Triangle)
    }

    /// Normalize to an NCHW tensor: `(v / 255 - mean) / std` per channel
    #[must_use]
    pub fn to_tensor(image: &RgbImage, normalization: &Normalization) -> Array4<f32> {
        let (width, height) = image.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor allocated with the image's own dimensions
        for (x, y, pixel) in image.enumerate_pixels() {
            for channel in 0..3 {
                tensor[[0, channel, y as usize, x as usize]] = (f32::from(pixel[channel]) / 255.0
                    - normalization.mean[channel])
                    / normalization.std[channel];
            }
        }

        tensor
    }

    /// Pick the foreground plane out of the model output
    ///
    /// # Errors
    /// - Batch size other than 1
    /// - Spatial size different from `resolution x resolution`
    /// - `foreground_channel` beyond the output's channel count
    pub fn probability_map(
        output: &Array4<f32>,
        resolution: u32,
        foreground_channel: usize,
    ) -> Result<ProbabilityMap> {
        let (batch, channels, height, width) = output.dim();
        let side = resolution as usize;

        if batch != 1 {
            return Err(BgSwapError::inference(format!(
                "Model output batch size is {}, expected 1",
                batch
            )));
        }
        if (height, width) != (side, side) {
            return Err(BgSwapError::inference(format!(
                "Model output is {}x{}, expected {}x{}",
                width, height, side, side
            )));
        }
        if foreground_channel >= channels {
            return Err(BgSwapError::inference(format!(
                "Foreground channel {} requested but model emitted {} channel(s)",
                foreground_channel, channels
            )));
        }

        let plane = output.slice(s![0, foreground_channel, .., ..]);
        ProbabilityMap::new(plane.iter().copied().collect(), (resolution, resolution))
    }

    /// Resample, run the model and derive the alpha mask
    ///
    /// # Errors
    /// - Inference errors from the backend
    /// - Output shape that does not match the model resolution
    #[instrument(skip_all, fields(backend = handle.backend_name(), resolution = handle.resolution()))]
    pub fn build(source: &SourceImage, handle: &ModelHandle) -> Result<MaskedSource> {
        let resolution = handle.resolution();
        let resampled = Self::resample(source, resolution);
        let tensor = Self::to_tensor(&resampled, &handle.normalization());

        let output = handle.infer(&tensor)?;
        debug!(output_shape = ?output.shape(), "Forward pass complete");

        let probabilities =
            Self::probability_map(&output, resolution, handle.foreground_channel())?;
        let mask = probabilities.to_alpha_mask();

        Ok(MaskedSource {
            source: resampled,
            mask,
        })
    }

    /// Alpha mask only, see [`MaskBuilder::build`]
    ///
    /// # Errors
    /// - Same as [`MaskBuilder::build`]
    pub fn build_mask(source: &SourceImage, handle: &ModelHandle) -> Result<AlphaMask> {
        Self::build(source, handle).map(|masked| masked.mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{MockBackend, MockOutput};
    use crate::error::ErrorKind;
    use crate::models::ModelSpec;
    use image::{DynamicImage, Rgb, RgbaImage};
    use std::sync::Arc;

    fn handle(output: MockOutput, resolution: u32) -> ModelHandle {
        let spec = ModelSpec {
            resolution,
            ..ModelSpec::default()
        };
        ModelHandle::new(Arc::new(MockBackend::new(output)), &spec)
    }

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> SourceImage {
        SourceImage::new(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb))),
            None,
        )
    }

    #[test]
    fn test_resample_to_model_resolution() {
        let source = solid(300, 120, [200, 10, 30]);
        let resampled = MaskBuilder::resample(&source, 64);
        assert_eq!(resampled.dimensions(), (64, 64));
        // Flat color survives bilinear filtering exactly
        assert!(resampled.pixels().all(|p| p.0 == [200, 10, 30]));
    }

    #[test]
    fn test_resample_drops_alpha() {
        let rgba = RgbaImage::from_pixel(8, 8, image::Rgba([10, 20, 30, 0]));
        let source = SourceImage::new(DynamicImage::ImageRgba8(rgba), None);
        let resampled = MaskBuilder::resample(&source, 8);
        assert_eq!(resampled.get_pixel(3, 3).0, [10, 20, 30]);
    }

    #[test]
    fn test_tensor_normalization() {
        let image = RgbImage::from_pixel(2, 2, Rgb([255, 0, 51]));
        let tensor = MaskBuilder::to_tensor(&image, &Normalization::UNIT);
        assert_eq!(tensor.shape(), &[1, 3, 2, 2]);
        assert_eq!(tensor[[0, 0, 1, 1]], 1.0);
        assert_eq!(tensor[[0, 1, 0, 0]], 0.0);
        assert!((tensor[[0, 2, 0, 1]] - 0.2).abs() < 1e-6);

        let imagenet = Normalization {
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        };
        let tensor = MaskBuilder::to_tensor(&image, &imagenet);
        assert_eq!(tensor[[0, 0, 0, 0]], 1.0);
        assert_eq!(tensor[[0, 1, 0, 0]], -1.0);
    }

    #[test]
    fn test_probability_boundaries_map_to_alpha() {
        for (p, expected) in [(0.0, 0u8), (0.5, 128), (1.0, 255)] {
            let model = handle(MockOutput::Uniform(p), 16);
            let mask = MaskBuilder::build_mask(&solid(40, 40, [1, 2, 3]), &model).unwrap();
            assert_eq!(mask.dimensions, (16, 16));
            assert!(mask.data.iter().all(|&a| a == expected), "p = {p}");
        }
    }

    #[test]
    fn test_out_of_range_probabilities_are_clamped() {
        let mask = MaskBuilder::build_mask(
            &solid(4, 4, [0, 0, 0]),
            &handle(MockOutput::Uniform(1.7), 4),
        )
        .unwrap();
        assert!(mask.data.iter().all(|&a| a == 255));

        let mask = MaskBuilder::build_mask(
            &solid(4, 4, [0, 0, 0]),
            &handle(MockOutput::Uniform(-0.3), 4),
        )
        .unwrap();
        assert!(mask.data.iter().all(|&a| a == 0));
    }

    #[test]
    fn test_multi_channel_output_uses_foreground_channel() {
        let mut output = Array4::<f32>::zeros((1, 2, 4, 4));
        output.slice_mut(s![0, 1, .., ..]).fill(1.0);

        let map = MaskBuilder::probability_map(&output, 4, 1).unwrap();
        assert!(map.values().iter().all(|&p| p == 1.0));

        let map = MaskBuilder::probability_map(&output, 4, 0).unwrap();
        assert!(map.values().iter().all(|&p| p == 0.0));

        let err = MaskBuilder::probability_map(&output, 4, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inference);
    }

    #[test]
    fn test_unexpected_output_shape_is_inference_error() {
        for output in [MockOutput::Shape(1, 1, 8, 8), MockOutput::Shape(2, 1, 16, 16)] {
            let model = handle(output, 16);
            let err = MaskBuilder::build_mask(&solid(16, 16, [0, 0, 0]), &model).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Inference);
        }
    }

    #[test]
    fn test_backend_failure_propagates() {
        let model = handle(MockOutput::Fail("input rejected".into()), 8);
        let err = MaskBuilder::build_mask(&solid(8, 8, [0, 0, 0]), &model).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inference);
        assert!(err.to_string().contains("input rejected"));
    }

    #[test]
    fn test_build_returns_aligned_source() {
        let model = handle(MockOutput::InputLuminance, 8);
        let masked = MaskBuilder::build(&solid(20, 10, [255, 255, 255]), &model).unwrap();
        assert_eq!(masked.source.dimensions(), masked.mask.dimensions);
        assert!(masked.mask.data.iter().all(|&a| a == 255));
    }
}
