//! Error types for segmentation and compositing operations

use thiserror::Error;

/// Result type alias for bgswap operations
pub type Result<T> = std::result::Result<T, BgSwapError>;

/// Error taxonomy surfaced to callers of the pipeline.
///
/// Every [`BgSwapError`] maps onto exactly one kind. The pipeline is the only
/// place that re-labels failures from lower stages, so a caller can branch on
/// the kind without inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input is not a readable image
    Decode,
    /// The segmentation model could not be loaded
    ModelLoad,
    /// The forward pass failed or returned an unexpected shape
    Inference,
    /// Malformed background specification or configuration
    Validation,
    /// Anything else (encoding, I/O, invariant violations)
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode => write!(f, "decode"),
            Self::ModelLoad => write!(f, "model-load"),
            Self::Inference => write!(f, "inference"),
            Self::Validation => write!(f, "validation"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Error types for background swapping operations
#[derive(Error, Debug)]
pub enum BgSwapError {
    /// Input bytes are empty, of an unsupported type, or corrupt
    #[error("Decode error: {0}")]
    Decode(String),

    /// Model fetch or backend construction failed
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid background specification or configuration value
    #[error("Validation error: {0}")]
    Validation(String),

    /// Output encoding failed
    #[error("Encode error: {0}")]
    Encode(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors reported by the image crate outside of decoding
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// HTTP errors while fetching a model artifact
    #[error("Network error: {0}")]
    Network(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgSwapError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new model load error
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create network error with operation context
    pub fn network_error<E: std::fmt::Display>(operation: &str, error: E) -> Self {
        Self::Network(format!("{}: {}", operation, error))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::Validation(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Internal(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }

    /// Taxonomy kind of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) => ErrorKind::Decode,
            Self::ModelLoad(_) | Self::Network(_) => ErrorKind::ModelLoad,
            Self::Inference(_) => ErrorKind::Inference,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Encode(_) | Self::Io(_) | Self::Image(_) | Self::Internal(_) => {
                ErrorKind::Internal
            },
        }
    }

    /// Whether the caller may retry after an explicit model reload
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ModelLoad
    }

    /// Short message suitable for showing to an end user
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Decode => {
                "The uploaded file could not be read as an image. Please upload a PNG, JPEG, WebP, BMP or TIFF file.".to_string()
            },
            ErrorKind::ModelLoad => {
                "The background removal model failed to load. Please try again.".to_string()
            },
            ErrorKind::Inference => {
                "The background could not be separated from this image.".to_string()
            },
            ErrorKind::Validation => format!("Invalid request: {}", self.detail()),
            ErrorKind::Internal => "Something went wrong while processing the image.".to_string(),
        }
    }

    /// Message without the variant prefix
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Decode(msg)
            | Self::ModelLoad(msg)
            | Self::Inference(msg)
            | Self::Validation(msg)
            | Self::Encode(msg)
            | Self::Network(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::Io(e) => e.to_string(),
            Self::Image(e) => e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = BgSwapError::validation("bad color");
        assert!(matches!(err, BgSwapError::Validation(_)));

        let err = BgSwapError::decode("empty input");
        assert!(matches!(err, BgSwapError::Decode(_)));
    }

    #[test]
    fn test_error_display() {
        let err = BgSwapError::validation("hex color must be 6 digits");
        assert_eq!(err.to_string(), "Validation error: hex color must be 6 digits");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(BgSwapError::decode("x").kind(), ErrorKind::Decode);
        assert_eq!(BgSwapError::model_load("x").kind(), ErrorKind::ModelLoad);
        assert_eq!(
            BgSwapError::network_error("fetch", "timeout").kind(),
            ErrorKind::ModelLoad
        );
        assert_eq!(BgSwapError::inference("x").kind(), ErrorKind::Inference);
        assert_eq!(BgSwapError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(BgSwapError::encode("x").kind(), ErrorKind::Internal);
        assert_eq!(BgSwapError::internal("x").kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_only_model_load_is_retryable() {
        assert!(BgSwapError::model_load("x").is_retryable());
        assert!(!BgSwapError::inference("x").is_retryable());
        assert!(!BgSwapError::decode("x").is_retryable());
    }

    #[test]
    fn test_user_message_for_validation_includes_detail() {
        let err = BgSwapError::validation("'#ZZZZZZ' is not a valid hex color");
        let msg = err.user_message();
        assert!(msg.contains("#ZZZZZZ"));
        assert!(!msg.contains("Validation error"));
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err =
            BgSwapError::file_io_error("read config file", Path::new("/etc/config.json"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("read config file"));
        assert!(error_string.contains("/etc/config.json"));

        let err = BgSwapError::config_value_error("jpeg_quality", 150, "0-100", Some(90));
        let error_string = err.to_string();
        assert!(error_string.contains("jpeg_quality"));
        assert!(error_string.contains("150"));
        assert!(error_string.contains("Recommended: 90"));

        let err = BgSwapError::stage_error("compositing", "size mismatch", Some("512x512"));
        let error_string = err.to_string();
        assert!(error_string.contains("compositing"));
        assert!(error_string.contains("512x512"));
    }
}
