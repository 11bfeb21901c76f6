//! Model downloading for remote segmentation artifacts
//!
//! Streams a single ONNX file over HTTP into the model cache with progress
//! reporting, SHA-256 digest recording, and atomic temp-file rename so a
//! half-written artifact is never visible as cached.

use crate::cache::{ModelCache, DIGEST_FILE};
use crate::config::PipelineConfig;
use crate::error::{BgSwapError, Result};
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Model downloader with progress reporting
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    /// Set message for progress indicator
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    /// Set length for progress indicator
    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    /// Set position for progress indicator
    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    /// Finish progress indicator with message
    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }
}

impl ModelDownloader {
    /// Create a downloader using the cache and HTTP timeout from `config`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to open the model cache
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let cache = ModelCache::from_config(config)?;
        Self::with_cache(cache, config.download_timeout_secs)
    }

    /// Create a downloader over an existing cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BgSwapError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Ensure the artifact at `url` is cached, returning its local path
    ///
    /// A cached artifact whose contents still match its recorded digest is
    /// returned without touching the network. A corrupted one is evicted and
    /// downloaded again.
    ///
    /// # Errors
    /// - Invalid URL
    /// - Network errors or non-success HTTP status
    /// - File system errors during caching
    pub async fn fetch(&self, url: &str, show_progress: bool) -> Result<PathBuf> {
        validate_model_url(url)?;

        let model_id = ModelCache::url_to_model_id(url);
        let final_path = self.cache.artifact_path(&model_id);

        if self.cache.is_cached(&model_id) {
            let recorded = self.cache.recorded_digest(&model_id);
            if verify_file_integrity(&final_path, recorded.as_deref())? {
                log::info!("Model already cached: {}", model_id);
                return Ok(final_path);
            }
            log::warn!("Cached model {} is corrupted, downloading again", model_id);
            self.cache.remove(&model_id)?;
        }

        log::info!("Downloading model from: {}", url);
        log::info!("Model ID: {}", model_id);

        let model_dir = self.cache.model_dir(&model_id);
        fs::create_dir_all(&model_dir)
            .map_err(|e| BgSwapError::file_io_error("create model directory", &model_dir, &e))?;
        let temp_path = model_dir.join(format!("{}.partial", crate::cache::ARTIFACT_FILE));

        let progress = if show_progress {
            Some(Self::create_progress_indicator())
        } else {
            None
        };

        match self.download_file(url, &temp_path, progress.as_ref()).await {
            Ok(digest) => {
                fs::rename(&temp_path, &final_path).map_err(|e| {
                    BgSwapError::file_io_error("move downloaded model to cache", &final_path, &e)
                })?;
                let digest_path = model_dir.join(DIGEST_FILE);
                fs::write(&digest_path, format!("{}\n", digest)).map_err(|e| {
                    BgSwapError::file_io_error("write model digest", &digest_path, &e)
                })?;

                if let Some(pb) = progress {
                    pb.finish_with_message(format!("✅ Downloaded {}", model_id));
                }

                log::info!("Successfully downloaded model: {} (sha256 {})", model_id, digest);
                Ok(final_path)
            },
            Err(e) => {
                if temp_path.exists() {
                    if let Err(cleanup_err) = fs::remove_file(&temp_path) {
                        log::warn!("Failed to cleanup partial download: {}", cleanup_err);
                    }
                }

                if let Some(pb) = progress {
                    pb.finish_with_message("❌ Download failed".to_string());
                }

                Err(e)
            },
        }
    }

    /// Create a progress indicator for download reporting
    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    /// Stream one file to `local_path`, returning its SHA-256 hex digest
    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<String> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgSwapError::network_error(&format!("Failed to download {}", url), e))?;

        if !response.status().is_success() {
            return Err(BgSwapError::network_error(
                &format!("Failed to download {}", url),
                format!("HTTP status {}", response.status()),
            ));
        }

        let total_size = response.content_length();
        if let (Some(pb), Some(total)) = (progress, total_size) {
            pb.set_length(total);
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| BgSwapError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| BgSwapError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| BgSwapError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;

            if let Some(pb) = progress {
                if total_size.is_some() {
                    pb.set_position(downloaded);
                } else {
                    #[allow(clippy::cast_precision_loss)] // Display only
                    pb.set_message(format!(
                        "Downloaded {:.1} MB",
                        downloaded as f64 / (1024.0 * 1024.0)
                    ));
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| BgSwapError::file_io_error("flush file", local_path, &e))?;

        if downloaded == 0 {
            return Err(BgSwapError::network_error(
                &format!("Failed to download {}", url),
                "server returned an empty body",
            ));
        }

        log::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Get the model cache for other operations
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

/// Compute the SHA-256 hex digest of a file
///
/// # Errors
/// - File cannot be read
pub fn file_sha256(path: &Path) -> Result<String> {
    let contents =
        fs::read(path).map_err(|e| BgSwapError::file_io_error("read file for digest", path, &e))?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Check a file against an expected SHA-256 digest (`None` skips the check)
///
/// # Errors
/// - File cannot be read
pub fn verify_file_integrity(path: &Path, expected_hash: Option<&str>) -> Result<bool> {
    let Some(expected) = expected_hash else {
        return Ok(true);
    };

    let actual = file_sha256(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(true)
    } else {
        log::warn!(
            "File integrity check failed for {}: expected {}, got {}",
            path.display(),
            expected,
            actual
        );
        Ok(false)
    }
}

/// Validate that a URL can be fetched as a model artifact
///
/// # Errors
/// - Empty URL or a URL without an `http(s)://` scheme
pub fn validate_model_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(BgSwapError::validation("Model URL cannot be empty"));
    }

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| {
            BgSwapError::validation(format!(
                "Unsupported URL format: {}. Expected an http(s) URL",
                url
            ))
        })?;

    if rest.split('/').next().map_or(true, str::is_empty) {
        return Err(BgSwapError::validation(format!("Model URL has no host: {}", url)));
    }

    Ok(())
}
