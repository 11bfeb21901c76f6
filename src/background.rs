//! Background color selection
//!
//! A background is either one of the fixed palette entries or an explicit
//! RGB triple. Custom colors arrive as `#RRGGBB` strings and are validated
//! before any decoding or inference work is started.

use crate::error::{BgSwapError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Fixed named background colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaletteColor {
    Red,
    Green,
    Blue,
    White,
    Black,
}

impl PaletteColor {
    /// All palette entries in display order
    pub const ALL: [PaletteColor; 5] = [
        PaletteColor::Red,
        PaletteColor::Green,
        PaletteColor::Blue,
        PaletteColor::White,
        PaletteColor::Black,
    ];

    #[must_use]
    pub fn rgb(self) -> [u8; 3] {
        match self {
            Self::Red => [255, 0, 0],
            Self::Green => [0, 255, 0],
            Self::Blue => [0, 0, 255],
            Self::White => [255, 255, 255],
            Self::Black => [0, 0, 0],
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Red => "Red",
            Self::Green => "Green",
            Self::Blue => "Blue",
            Self::White => "White",
            Self::Black => "Black",
        }
    }
}

impl std::fmt::Display for PaletteColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PaletteColor {
    type Err = BgSwapError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                BgSwapError::validation(format!(
                    "Unknown palette color '{}' (expected one of Red, Green, Blue, White, Black or Custom)",
                    s
                ))
            })
    }
}

/// Background to place beneath the cutout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackgroundSpec {
    /// Named palette entry
    Palette(PaletteColor),
    /// Explicit RGB triple (already range-checked by the type)
    Rgb([u8; 3]),
    /// Unparsed `#RRGGBB` string from the `Custom` palette entry
    Custom(String),
}

impl BackgroundSpec {
    /// Resolve a form-style selection: a palette name, or `Custom` plus a hex string
    ///
    /// # Errors
    /// - Unknown palette name
    /// - `Custom` chosen without a hex string
    pub fn from_choice(choice: &str, custom_hex: Option<&str>) -> Result<Self> {
        if choice.trim().eq_ignore_ascii_case("custom") {
            let hex = custom_hex.ok_or_else(|| {
                BgSwapError::validation("Custom background selected but no color was provided")
            })?;
            return Ok(Self::Custom(hex.to_string()));
        }
        Ok(Self::Palette(choice.parse()?))
    }

    /// Build from an untrusted integer triple, rejecting channels outside 0..=255
    ///
    /// # Errors
    /// - Any channel below 0 or above 255
    pub fn from_channels(channels: &[i64]) -> Result<Self> {
        let [r, g, b] = channels else {
            return Err(BgSwapError::validation(format!(
                "Background color must have exactly 3 channels, got {}",
                channels.len()
            )));
        };
        let mut rgb = [0u8; 3];
        for (slot, (name, value)) in rgb.iter_mut().zip([("red", r), ("green", g), ("blue", b)]) {
            *slot = u8::try_from(*value).map_err(|_| {
                BgSwapError::config_value_error(name, *value, "0-255", None)
            })?;
        }
        Ok(Self::Rgb(rgb))
    }

    /// Validate and resolve to a concrete RGB triple
    ///
    /// # Errors
    /// - Custom string that is not `#RRGGBB` hexadecimal
    pub fn resolve(&self) -> Result<[u8; 3]> {
        match self {
            Self::Palette(color) => Ok(color.rgb()),
            Self::Rgb(rgb) => Ok(*rgb),
            Self::Custom(hex) => parse_hex_color(hex),
        }
    }

    /// Short label used in output file names
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Palette(color) => color.name().to_lowercase(),
            Self::Rgb([r, g, b]) => format!("{:02x}{:02x}{:02x}", r, g, b),
            Self::Custom(hex) => hex.trim().trim_start_matches('#').to_lowercase(),
        }
    }
}

impl Default for BackgroundSpec {
    fn default() -> Self {
        Self::Palette(PaletteColor::White)
    }
}

impl FromStr for BackgroundSpec {
    type Err = BgSwapError;

    /// Accepts a palette name (`"red"`, `"White"`) or a `#RRGGBB` string
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.starts_with('#') {
            let spec = Self::Custom(trimmed.to_string());
            spec.resolve()?;
            Ok(spec)
        } else {
            Ok(Self::Palette(trimmed.parse()?))
        }
    }
}

/// Parse a `#RRGGBB` string
///
/// # Errors
/// - Missing `#`, wrong length, or non-hexadecimal digits
pub fn parse_hex_color(hex: &str) -> Result<[u8; 3]> {
    let invalid = || {
        BgSwapError::validation(format!(
            "'{}' is not a valid hex color (expected #RRGGBB)",
            hex
        ))
    };

    let digits = hex.trim().strip_prefix('#').ok_or_else(invalid)?;
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let channel = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            .ok_or_else(invalid)
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_palette_values() {
        assert_eq!(PaletteColor::Red.rgb(), [255, 0, 0]);
        assert_eq!(PaletteColor::Green.rgb(), [0, 255, 0]);
        assert_eq!(PaletteColor::Blue.rgb(), [0, 0, 255]);
        assert_eq!(PaletteColor::White.rgb(), [255, 255, 255]);
        assert_eq!(PaletteColor::Black.rgb(), [0, 0, 0]);
    }

    #[test]
    fn test_palette_parse_is_case_insensitive() {
        assert_eq!("red".parse::<PaletteColor>().unwrap(), PaletteColor::Red);
        assert_eq!(" WHITE ".parse::<PaletteColor>().unwrap(), PaletteColor::White);
        assert!("magenta".parse::<PaletteColor>().is_err());
    }

    #[test]
    fn test_hex_parsing() {
        assert_eq!(parse_hex_color("#1a2B3c").unwrap(), [0x1a, 0x2b, 0x3c]);
        assert_eq!(parse_hex_color("#000000").unwrap(), [0, 0, 0]);
        assert_eq!(parse_hex_color("#FFFFFF").unwrap(), [255, 255, 255]);
    }

    #[test]
    fn test_hex_rejections() {
        for bad in ["#ZZZZZZ", "123456", "#12345", "#1234567", "#12 456", "", "#"] {
            let err = parse_hex_color(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "input {:?}", bad);
        }
    }

    #[test]
    fn test_from_choice() {
        assert_eq!(
            BackgroundSpec::from_choice("Blue", None).unwrap(),
            BackgroundSpec::Palette(PaletteColor::Blue)
        );
        let custom = BackgroundSpec::from_choice("Custom", Some("#00ff7f")).unwrap();
        assert_eq!(custom.resolve().unwrap(), [0, 255, 127]);
        assert!(BackgroundSpec::from_choice("Custom", None).is_err());
        assert!(BackgroundSpec::from_choice("Purple", None).is_err());
    }

    #[test]
    fn test_custom_is_validated_lazily_by_resolve() {
        let spec = BackgroundSpec::from_choice("Custom", Some("#ZZZZZZ")).unwrap();
        assert_eq!(spec.resolve().unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_from_channels_range_check() {
        assert_eq!(
            BackgroundSpec::from_channels(&[1, 2, 3]).unwrap(),
            BackgroundSpec::Rgb([1, 2, 3])
        );
        assert!(BackgroundSpec::from_channels(&[256, 0, 0]).is_err());
        assert!(BackgroundSpec::from_channels(&[0, -1, 0]).is_err());
        assert!(BackgroundSpec::from_channels(&[0, 0]).is_err());
    }

    #[test]
    fn test_from_str_and_label() {
        let spec: BackgroundSpec = "#ABCDEF".parse().unwrap();
        assert_eq!(spec.label(), "abcdef");
        let spec: BackgroundSpec = "black".parse().unwrap();
        assert_eq!(spec.label(), "black");
        assert!("#GGGGGG".parse::<BackgroundSpec>().is_err());
        assert_eq!(BackgroundSpec::Rgb([255, 0, 16]).label(), "ff0010");
    }
}
