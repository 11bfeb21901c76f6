//! Model specification: where the segmentation artifact lives and how to feed it

use crate::error::{BgSwapError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default segmentation artifact (MODNet portrait matting, ONNX export)
pub const DEFAULT_MODEL_URL: &str =
    "https://huggingface.co/Xenova/modnet/resolve/main/onnx/model.onnx";

/// Default square input/output resolution of the model
pub const DEFAULT_RESOLUTION: u32 = 512;

/// Model source specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSource {
    /// Remote artifact fetched once and kept in the on-disk cache
    Url(String),
    /// Local ONNX file
    File(PathBuf),
}

impl ModelSource {
    /// Parse a CLI-style model argument: anything with a scheme is a URL
    #[must_use]
    pub fn parse(arg: &str) -> Self {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            Self::Url(arg.to_string())
        } else {
            Self::File(PathBuf::from(arg))
        }
    }

    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::Url(url) => format!("url:{}", url),
            ModelSource::File(path) => format!(
                "file:{}",
                path.file_name().unwrap_or_default().to_string_lossy()
            ),
        }
    }
}

/// Per-channel input normalization: `(v / 255 - mean) / std`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalization {
    /// Plain scaling of 8-bit values into [0, 1]
    pub const UNIT: Normalization = Normalization {
        mean: [0.0, 0.0, 0.0],
        std: [1.0, 1.0, 1.0],
    };

    /// # Errors
    /// - Zero, negative or non-finite standard deviation
    /// - Non-finite mean
    pub fn validate(&self) -> Result<()> {
        if self.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(BgSwapError::validation(format!(
                "Normalization std must be positive and finite, got {:?}",
                self.std
            )));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(BgSwapError::validation(format!(
                "Normalization mean must be finite, got {:?}",
                self.mean
            )));
        }
        Ok(())
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Self::UNIT
    }
}

/// Complete model specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub source: ModelSource,
    /// Fixed square resolution the model consumes and produces
    pub resolution: u32,
    pub normalization: Normalization,
    /// Output channel holding foreground probability when the model emits several
    pub foreground_channel: usize,
}

impl ModelSpec {
    #[must_use]
    pub fn from_source(source: ModelSource) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    /// # Errors
    /// - Zero resolution or resolution above 4096
    /// - Invalid normalization
    /// - Empty URL or path
    pub fn validate(&self) -> Result<()> {
        if self.resolution == 0 || self.resolution > 4096 {
            return Err(BgSwapError::config_value_error(
                "model resolution",
                self.resolution,
                "1-4096",
                Some(DEFAULT_RESOLUTION),
            ));
        }
        self.normalization.validate()?;
        match &self.source {
            ModelSource::Url(url) if url.trim().is_empty() => {
                Err(BgSwapError::validation("Model URL is empty"))
            },
            ModelSource::File(path) if path.as_os_str().is_empty() => {
                Err(BgSwapError::validation("Model path is empty"))
            },
            _ => Ok(()),
        }
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            source: ModelSource::Url(DEFAULT_MODEL_URL.to_string()),
            resolution: DEFAULT_RESOLUTION,
            normalization: Normalization::UNIT,
            foreground_channel: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_parse() {
        assert_eq!(
            ModelSource::parse("https://example.com/m.onnx"),
            ModelSource::Url("https://example.com/m.onnx".to_string())
        );
        assert_eq!(
            ModelSource::parse("models/m.onnx"),
            ModelSource::File(PathBuf::from("models/m.onnx"))
        );
    }

    #[test]
    fn test_display_name() {
        let src = ModelSource::File(PathBuf::from("/opt/models/seg.onnx"));
        assert_eq!(src.display_name(), "file:seg.onnx");
        let src = ModelSource::Url("https://x/y.onnx".to_string());
        assert!(src.display_name().starts_with("url:"));
    }

    #[test]
    fn test_default_spec_is_valid() {
        let spec = ModelSpec::default();
        assert_eq!(spec.resolution, 512);
        assert_eq!(spec.normalization, Normalization::UNIT);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_spec_validation_failures() {
        let mut spec = ModelSpec::default();
        spec.resolution = 0;
        assert!(spec.validate().is_err());

        let mut spec = ModelSpec::default();
        spec.normalization.std = [1.0, 0.0, 1.0];
        assert!(spec.validate().is_err());

        let spec = ModelSpec::from_source(ModelSource::Url("  ".to_string()));
        assert!(spec.validate().is_err());
    }
}
