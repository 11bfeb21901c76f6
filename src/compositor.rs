//! Alpha compositing of the resampled source over a solid fill
//!
//! Straight-alpha source-over in 8-bit space, no gamma handling:
//!
//! ```text
//! a            = alpha / 255
//! cutout       = (src.r, src.g, src.b, alpha)
//! recomposited = (round(src * a + bg * (1 - a)), 255)
//! ```
//!
//! Rounding is half-up ([`round_half_up_u8`]).

use crate::background::BackgroundSpec;
use crate::error::{BgSwapError, Result};
use crate::types::{round_half_up_u8, AlphaMask, CompositeResult};
use image::{RgbImage, RgbaImage};

/// Produce the cutout and the recomposite for one source/mask pair
///
/// Pure and deterministic. `alpha == 0` yields exactly the background color,
/// `alpha == 255` copies the source through.
///
/// # Errors
/// - Background that does not resolve to a color (`Validation`)
/// - Source and mask dimensions differ (`Internal`)
pub fn composite(
    source: &RgbImage,
    mask: &AlphaMask,
    background: &BackgroundSpec,
) -> Result<CompositeResult> {
    let background = background.resolve()?;
    composite_rgb(source, mask, background)
}

/// [`composite`] with an already-resolved background color
///
/// # Errors
/// - Source and mask dimensions differ
pub fn composite_rgb(
    source: &RgbImage,
    mask: &AlphaMask,
    background: [u8; 3],
) -> Result<CompositeResult> {
    let (width, height) = source.dimensions();
    if mask.dimensions != (width, height) {
        return Err(BgSwapError::stage_error(
            "compositing",
            &format!(
                "mask is {}x{} but source is {}x{}",
                mask.dimensions.0, mask.dimensions.1, width, height
            ),
            None,
        ));
    }
    let pixel_count = width as usize * height as usize;
    if mask.data.len() != pixel_count {
        return Err(BgSwapError::stage_error(
            "compositing",
            &format!(
                "mask holds {} values for {} pixels",
                mask.data.len(),
                pixel_count
            ),
            None,
        ));
    }

    let mut cutout = vec![0u8; pixel_count * 4];
    let mut recomposited = vec![0u8; pixel_count * 4];
    let bg = background.map(f32::from);

    #[allow(clippy::indexing_slicing)]
    // Safe: chunks_exact yields exactly 3 source and 4 output bytes
    for (((src, &alpha), cut), rec) in source
        .as_raw()
        .chunks_exact(3)
        .zip(&mask.data)
        .zip(cutout.chunks_exact_mut(4))
        .zip(recomposited.chunks_exact_mut(4))
    {
        cut[..3].copy_from_slice(src);
        cut[3] = alpha;

        match alpha {
            0 => rec[..3].copy_from_slice(&background),
            255 => rec[..3].copy_from_slice(src),
            _ => {
                let a = f32::from(alpha) / 255.0;
                let inv = 1.0 - a;
                for ((out, &s), &b) in rec.iter_mut().zip(src).zip(&bg) {
                    *out = round_half_up_u8(f32::from(s) * a + b * inv);
                }
            },
        }
        rec[3] = 255;
    }

    let cutout = RgbaImage::from_raw(width, height, cutout)
        .ok_or_else(|| BgSwapError::internal("Failed to assemble cutout buffer"))?;
    let recomposited = RgbaImage::from_raw(width, height, recomposited)
        .ok_or_else(|| BgSwapError::internal("Failed to assemble recomposited buffer"))?;

    Ok(CompositeResult {
        cutout,
        recomposited,
    })
}
