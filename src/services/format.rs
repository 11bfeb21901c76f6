//! Output encoding service
//!
//! Turns composited RGBA buffers into exchangeable bytes. The cutout must keep
//! its alpha losslessly (PNG or lossless WebP); the recomposite is opaque and may
//! also go to JPEG.

use crate::config::OutputFormat;
use crate::error::{BgSwapError, Result};
use crate::types::EncodedImage;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
#[cfg(feature = "webp-support")]
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

/// Service for encoding result buffers
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Encode an RGBA buffer in `format`
    ///
    /// JPEG drops the alpha channel; WebP output is always lossless.
    ///
    /// # Errors
    /// - Encoder failures
    /// - WebP requested in a build without `webp-support`
    pub fn encode(image: &RgbaImage, format: OutputFormat, jpeg_quality: u8) -> Result<EncodedImage> {
        let (width, height) = image.dimensions();
        let mut bytes = Vec::new();

        match format {
            OutputFormat::Png => PngEncoder::new(&mut bytes)
                .write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| BgSwapError::encode(format!("PNG encoding failed: {e}")))?,
            OutputFormat::Jpeg => {
                let rgb: Vec<u8> = image
                    .as_raw()
                    .chunks_exact(4)
                    .flat_map(|px| px.iter().take(3).copied())
                    .collect();
                JpegEncoder::new_with_quality(&mut bytes, jpeg_quality.clamp(1, 100))
                    .write_image(&rgb, width, height, ExtendedColorType::Rgb8)
                    .map_err(|e| BgSwapError::encode(format!("JPEG encoding failed: {e}")))?;
            },
            OutputFormat::WebP => Self::encode_webp(image, &mut bytes)?,
        }

        log::debug!(
            "Encoded {}x{} as {:?}: {} bytes",
            width,
            height,
            format,
            bytes.len()
        );
        Ok(EncodedImage { bytes, format })
    }

    /// Encode the transparent cutout, rejecting formats that would lose alpha
    ///
    /// # Errors
    /// - `format` cannot carry lossless alpha
    /// - Encoder failures
    pub fn encode_cutout(image: &RgbaImage, format: OutputFormat) -> Result<EncodedImage> {
        if !format.supports_lossless_alpha() {
            return Err(BgSwapError::validation(format!(
                "Cutout format {:?} cannot carry transparency",
                format
            )));
        }
        Self::encode(image, format, 100)
    }

    #[cfg(feature = "webp-support")]
    fn encode_webp(image: &RgbaImage, bytes: &mut Vec<u8>) -> Result<()> {
        let (width, height) = image.dimensions();
        WebPEncoder::new_lossless(bytes)
            .write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)
            .map_err(|e| BgSwapError::encode(format!("WebP encoding failed: {e}")))
    }

    #[cfg(not(feature = "webp-support"))]
    fn encode_webp(_image: &RgbaImage, _bytes: &mut Vec<u8>) -> Result<()> {
        Err(BgSwapError::encode(
            "WebP output requires the 'webp-support' feature",
        ))
    }

    /// Log a warning for formats that drop transparency
    pub fn warn_if_opaque_only(format: OutputFormat) {
        if !format.supports_lossless_alpha() {
            log::warn!(
                "Output format {:?} does not support transparency. Only the recomposited image can use it.",
                format
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba};

    fn sample() -> RgbaImage {
        RgbaImage::from_fn(6, 4, |x, y| Rgba([x as u8 * 40, y as u8 * 60, 7, (x * 40 + 10) as u8]))
    }

    #[test]
    fn test_png_preserves_alpha_exactly() {
        let image = sample();
        let encoded = OutputFormatHandler::encode(&image, OutputFormat::Png, 90).unwrap();
        assert_eq!(encoded.format, OutputFormat::Png);

        let decoded = image::load_from_memory(&encoded.bytes).unwrap().to_rgba8();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_jpeg_is_opaque_rgb() {
        let encoded = OutputFormatHandler::encode(&sample(), OutputFormat::Jpeg, 80).unwrap();
        assert_eq!(&encoded.bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&encoded.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (6, 4));
        assert!(!decoded.color().has_alpha());
    }

    #[cfg(feature = "webp-support")]
    #[test]
    fn test_webp_is_lossless() {
        let image = sample();
        let encoded = OutputFormatHandler::encode_cutout(&image, OutputFormat::WebP).unwrap();
        let decoded = image::load_from_memory(&encoded.bytes).unwrap().to_rgba8();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_cutout_rejects_jpeg() {
        let err = OutputFormatHandler::encode_cutout(&sample(), OutputFormat::Jpeg).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }
}
