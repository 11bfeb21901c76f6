//! Core types flowing through a pipeline run

use crate::config::OutputFormat;
use crate::error::{BgSwapError, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Quantize a value in the 0-255 domain to `u8`, rounding half up and clamping
#[inline]
#[must_use]
pub fn round_half_up_u8(value: f32) -> u8 {
    // NaN saturates to 0 through the cast
    (value + 0.5).floor().clamp(0.0, 255.0) as u8
}

/// Decoded upload, immutable once created
#[derive(Debug, Clone)]
pub struct SourceImage {
    image: DynamicImage,
    format: Option<ImageFormat>,
}

impl SourceImage {
    #[must_use]
    pub fn new(image: DynamicImage, format: Option<ImageFormat>) -> Self {
        Self { image, format }
    }

    #[must_use]
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Container format detected from the upload's magic bytes
    #[must_use]
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Foreground probabilities at model resolution, row-major, each in [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMap {
    data: Vec<f32>,
    dimensions: (u32, u32),
}

impl ProbabilityMap {
    /// Build from raw model output, clamping into [0, 1] (NaN becomes 0)
    ///
    /// # Errors
    /// - `data.len()` does not equal `width * height`
    pub fn new(data: Vec<f32>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(BgSwapError::inference(format!(
                "Probability map has {} cells, expected {} for {}x{}",
                data.len(),
                expected,
                dimensions.0,
                dimensions.1
            )));
        }
        let data = data
            .into_iter()
            .map(|p| if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) })
            .collect();
        Ok(Self { data, dimensions })
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// Convert each probability to `round_half_up(p * 255)`
    #[must_use]
    pub fn to_alpha_mask(&self) -> AlphaMask {
        let data = self.data.iter().map(|p| round_half_up_u8(p * 255.0)).collect();
        AlphaMask::new(data, self.dimensions)
    }
}

/// 8-bit alpha mask at model resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlphaMask {
    /// Alpha values (0-255), row-major
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl AlphaMask {
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Mask with the same alpha everywhere
    #[must_use]
    pub fn uniform(value: u8, dimensions: (u32, u32)) -> Self {
        let len = dimensions.0 as usize * dimensions.1 as usize;
        Self::new(vec![value; len], dimensions)
    }

    /// Alpha at `(x, y)`, `None` outside the mask
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        let (width, height) = self.dimensions;
        if x >= width || y >= height {
            return None;
        }
        self.data.get(y as usize * width as usize + x as usize).copied()
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let opaque_pixels = self.data.iter().filter(|&&a| a == 255).count();
        let transparent_pixels = self.data.iter().filter(|&&a| a == 0).count();
        let foreground_pixels = self.data.iter().filter(|&&a| a > 127).count();
        let foreground_ratio = if total_pixels == 0 {
            0.0
        } else {
            foreground_pixels as f32 / total_pixels as f32
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            opaque_pixels,
            transparent_pixels,
            partial_pixels: total_pixels - opaque_pixels - transparent_pixels,
            foreground_ratio,
        }
    }
}

/// Statistics about an alpha mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    /// Pixels with alpha above 127
    pub foreground_pixels: usize,
    pub opaque_pixels: usize,
    pub transparent_pixels: usize,
    /// Soft edge pixels (alpha strictly between 0 and 255)
    pub partial_pixels: usize,
    pub foreground_ratio: f32,
}

/// The two pixel buffers produced by compositing
#[derive(Debug, Clone)]
pub struct CompositeResult {
    /// Source RGB with the derived alpha, straight (not premultiplied)
    pub cutout: RgbaImage,
    /// Cutout blended over the fill color, fully opaque
    pub recomposited: RgbaImage,
}

impl CompositeResult {
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.cutout.dimensions()
    }
}

/// An encoded output artifact
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
}

impl EncodedImage {
    /// Write the encoded bytes to `path`
    ///
    /// # Errors
    /// - File system errors
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, &self.bytes)
            .map_err(|e| BgSwapError::file_io_error("write output image", path, &e))
    }

    /// `data:` URI with base64 payload, as handed to browsers for download
    #[must_use]
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Per-stage timing of one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Image decoding from bytes
    pub decode_ms: u64,
    /// Waiting for the shared model handle (0 when already loaded)
    pub model_wait_ms: u64,
    /// Resample, normalize, inference and alpha conversion
    pub mask_ms: u64,
    /// Cutout and recomposite generation
    pub composite_ms: u64,
    /// Encoding both artifacts
    pub encode_ms: u64,
    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Get timing summary for display
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Total: {}ms | Decode: {}ms | Model: {}ms | Mask: {}ms | Composite: {}ms | Encode: {}ms",
            self.total_ms,
            self.decode_ms,
            self.model_wait_ms,
            self.mask_ms,
            self.composite_ms,
            self.encode_ms
        )
    }
}

/// Result of a successful pipeline run
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Transparent-background cutout
    pub cutout: EncodedImage,
    /// Subject recomposited over the background color
    pub recomposited: EncodedImage,
    /// Resolution of both artifacts (the model resolution)
    pub dimensions: (u32, u32),
    /// Resolution of the upload before resampling
    pub source_dimensions: (u32, u32),
    /// Background color actually used
    pub background: [u8; 3],
    pub mask_statistics: MaskStatistics,
    pub timings: ProcessingTimings,
    pub completed_at: DateTime<Utc>,
}
