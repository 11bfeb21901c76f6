//! Configuration types for the segmentation and compositing pipeline

use crate::error::{BgSwapError, Result};
use crate::models::{ModelSource, ModelSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the on-disk cache location
pub const CACHE_DIR_ENV: &str = "BGSWAP_CACHE_DIR";

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = BgSwapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgSwapError::validation(format!(
                "Unknown execution provider '{}' (expected auto, cpu, cuda or coreml)",
                other
            ))),
        }
    }
}

/// Inference engine used to run the segmentation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl Default for BackendType {
    fn default() -> Self {
        if cfg!(feature = "onnx") {
            Self::Onnx
        } else {
            Self::Tract
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Encoding of an output artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// JPEG (no transparency)
    Jpeg,
    /// Lossless WebP with alpha channel transparency
    WebP,
}

impl OutputFormat {
    /// Whether the format can carry partial transparency without loss
    #[must_use]
    pub fn supports_lossless_alpha(self) -> bool {
        matches!(self, Self::Png | Self::WebP)
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }
}

/// Configuration for pipeline runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Segmentation model and its input contract
    pub model_spec: ModelSpec,

    /// Inference engine
    pub backend_type: BackendType,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Encoding of the transparent cutout (must be lossless-alpha capable)
    pub cutout_format: OutputFormat,

    /// Encoding of the opaque recomposited image
    pub recomposite_format: OutputFormat,

    /// JPEG quality (0-100, only used for JPEG output)
    pub jpeg_quality: u8,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// HTTP client timeout for model downloads, in seconds
    pub download_timeout_secs: u64,

    /// Cache directory override (falls back to `BGSWAP_CACHE_DIR`, then the XDG cache dir)
    pub cache_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_spec: ModelSpec::default(),
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            cutout_format: OutputFormat::Png,
            recomposite_format: OutputFormat::Png,
            jpeg_quality: 90,
            intra_threads: 0,
            inter_threads: 0,
            download_timeout_secs: 300,
            cache_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use bgswap::{OutputFormat, PipelineConfig};
    ///
    /// let config = PipelineConfig::builder()
    ///     .recomposite_format(OutputFormat::Jpeg)
    ///     .jpeg_quality(95)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.jpeg_quality, 95);
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load a configuration from a JSON file
    ///
    /// # Errors
    /// - File cannot be read
    /// - JSON does not describe a `PipelineConfig`
    /// - The parsed configuration fails validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| BgSwapError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            BgSwapError::validation(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - JPEG quality above 100
    /// - Cutout format that cannot carry lossless alpha
    /// - Invalid model specification
    pub fn validate(&self) -> Result<()> {
        if self.jpeg_quality > 100 {
            return Err(BgSwapError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "0-100",
                Some(90),
            ));
        }

        if !self.cutout_format.supports_lossless_alpha() {
            return Err(BgSwapError::validation(format!(
                "Cutout format {:?} cannot carry transparency; use Png or WebP",
                self.cutout_format
            )));
        }

        if self.download_timeout_secs == 0 {
            return Err(BgSwapError::config_value_error(
                "download timeout (seconds)",
                self.download_timeout_secs,
                ">= 1",
                Some(300),
            ));
        }

        self.model_spec.validate()
    }

    /// Resolve the cache directory for downloaded model artifacts
    ///
    /// # Errors
    /// - No override given and the platform cache directory is unknown
    pub fn resolve_cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                BgSwapError::validation(format!(
                    "Failed to determine cache directory. Set {} environment variable.",
                    CACHE_DIR_ENV
                ))
            })?
            .join("bgswap"))
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    /// Replace only the model source, keeping resolution and normalization
    #[must_use]
    pub fn model_source(mut self, source: ModelSource) -> Self {
        self.config.model_spec.source = source;
        self
    }

    #[must_use]
    pub fn resolution(mut self, resolution: u32) -> Self {
        self.config.model_spec.resolution = resolution;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn cutout_format(mut self, format: OutputFormat) -> Self {
        self.config.cutout_format = format;
        self
    }

    #[must_use]
    pub fn recomposite_format(mut self, format: OutputFormat) -> Self {
        self.config.recomposite_format = format;
        self
    }

    /// Set JPEG quality (clamped to 100)
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.min(100);
        self
    }

    /// Set both intra and inter threads (`threads / 2` inter, minimum 1; 0 = auto)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    #[must_use]
    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule checked by [`PipelineConfig::validate`]
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cutout_format, OutputFormat::Png);
        assert_eq!(config.model_spec.resolution, 512);
    }

    #[test]
    fn test_builder_clamps_quality() {
        let config = PipelineConfig::builder().jpeg_quality(150).build().unwrap();
        assert_eq!(config.jpeg_quality, 100);
    }

    #[test]
    fn test_manual_quality_rejected() {
        let mut config = PipelineConfig::default();
        config.jpeg_quality = 101;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("JPEG quality"));
        assert!(err.to_string().contains("101"));
    }

    #[test]
    fn test_jpeg_cutout_rejected() {
        let err = PipelineConfig::builder()
            .cutout_format(OutputFormat::Jpeg)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_num_threads_split() {
        let config = PipelineConfig::builder().num_threads(8).build().unwrap();
        assert_eq!(config.intra_threads, 8);
        assert_eq!(config.inter_threads, 4);

        let config = PipelineConfig::builder().num_threads(1).build().unwrap();
        assert_eq!(config.inter_threads, 1);
    }

    #[test]
    fn test_execution_provider_parse() {
        assert_eq!("CoreML".parse::<ExecutionProvider>().unwrap(), ExecutionProvider::CoreMl);
        assert!("tpu".parse::<ExecutionProvider>().is_err());
    }

    #[test]
    fn test_explicit_cache_dir_wins() {
        let config = PipelineConfig::builder().cache_dir("/tmp/bgswap-test").build().unwrap();
        assert_eq!(
            config.resolve_cache_dir().unwrap(),
            PathBuf::from("/tmp/bgswap-test")
        );
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = PipelineConfig::builder()
            .resolution(320)
            .recomposite_format(OutputFormat::Jpeg)
            .build()
            .unwrap();
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_json_file_with_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = PipelineConfig::default();
        config.model_spec.resolution = 0;
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        assert!(PipelineConfig::from_json_file(&path).is_err());
    }
}
