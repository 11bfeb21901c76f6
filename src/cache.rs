//! Model cache management for downloaded segmentation artifacts
//!
//! Each cached model lives in its own directory under `<cache>/models/<model-id>/`
//! holding `model.onnx` and a `model.onnx.sha256` digest written at download time.
//! The cache root comes from [`PipelineConfig::resolve_cache_dir`].

use crate::config::PipelineConfig;
use crate::error::{BgSwapError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the cached artifact inside a model directory
pub const ARTIFACT_FILE: &str = "model.onnx";

/// File name of the recorded SHA-256 digest
pub const DIGEST_FILE: &str = "model.onnx.sha256";

const HUGGINGFACE_PREFIX: &str = "https://huggingface.co/";

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Model identifier (derived from URL)
    pub model_id: String,
    /// Path to the cached model directory
    pub path: PathBuf,
    /// Recorded SHA-256 digest, if present
    pub sha256: Option<String>,
    /// Size of the artifact in bytes
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Open the cache configured for `config`, creating the directory if needed
    ///
    /// # Errors
    /// - Failed to determine cache directory
    /// - Failed to create cache directory
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::with_root(config.resolve_cache_dir()?)
    }

    /// Open a cache rooted at `root` (models are kept in `root/models`)
    ///
    /// # Errors
    /// - Failed to create cache directory
    pub fn with_root<P: AsRef<Path>>(root: P) -> Result<Self> {
        let cache_dir = root.as_ref().join("models");

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                BgSwapError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }

        Ok(Self { cache_dir })
    }

    /// Generate a filesystem-safe model ID from an artifact URL
    ///
    /// `HuggingFace` URLs keep the `owner--repo` prefix for readability; every ID
    /// carries a short hash of the full URL so different files never collide.
    ///
    /// # Examples
    /// ```
    /// use bgswap::cache::ModelCache;
    ///
    /// let id = ModelCache::url_to_model_id(
    ///     "https://huggingface.co/Xenova/modnet/resolve/main/onnx/model.onnx",
    /// );
    /// assert!(id.starts_with("Xenova--modnet-"));
    /// ```
    #[must_use]
    pub fn url_to_model_id(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        let short_hash = digest.get(..12).unwrap_or(&digest);

        let repo = url
            .strip_prefix(HUGGINGFACE_PREFIX)
            .map(|rest| rest.split('/').take(2).collect::<Vec<_>>())
            .filter(|parts| parts.len() == 2 && parts.iter().all(|p| !p.is_empty()));

        match repo {
            Some(parts) => format!("{}-{}", parts.join("--"), short_hash),
            None => format!("url-{}", short_hash),
        }
    }

    /// Root directory holding one subdirectory per model
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the path to a cached model directory (may not exist)
    #[must_use]
    pub fn model_dir(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(model_id)
    }

    /// Get the path of the cached artifact (may not exist)
    #[must_use]
    pub fn artifact_path(&self, model_id: &str) -> PathBuf {
        self.model_dir(model_id).join(ARTIFACT_FILE)
    }

    /// Check if a model is cached with a non-empty artifact
    #[must_use]
    pub fn is_cached(&self, model_id: &str) -> bool {
        fs::metadata(self.artifact_path(model_id)).is_ok_and(|m| m.is_file() && m.len() > 0)
    }

    /// Digest recorded when the artifact was downloaded
    #[must_use]
    pub fn recorded_digest(&self, model_id: &str) -> Option<String> {
        fs::read_to_string(self.model_dir(model_id).join(DIGEST_FILE))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Scan cache directory and return all cached models sorted by ID
    ///
    /// # Errors
    /// - Failed to read cache directory
    pub fn list(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(models);
        }

        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| BgSwapError::file_io_error("read cache directory", &self.cache_dir, &e))?;

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(model_id) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
            else {
                continue;
            };
            if !path.is_dir() || !self.is_cached(&model_id) {
                log::debug!("Skipping incomplete model directory: {}", path.display());
                continue;
            }

            let size_bytes = fs::metadata(self.artifact_path(&model_id))
                .map(|m| m.len())
                .unwrap_or(0);
            models.push(CachedModelInfo {
                sha256: self.recorded_digest(&model_id),
                model_id,
                path,
                size_bytes,
            });
        }

        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    /// Remove a single cached model, returning whether it existed
    ///
    /// # Errors
    /// - Failed to remove the model directory
    pub fn remove(&self, model_id: &str) -> Result<bool> {
        let dir = self.model_dir(model_id);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)
            .map_err(|e| BgSwapError::file_io_error("remove cached model", &dir, &e))?;
        Ok(true)
    }

    /// Clear all cached models, returning the removed IDs
    ///
    /// # Errors
    /// - Failed to read or remove cache entries
    pub fn clear(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(removed);
        }

        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| BgSwapError::file_io_error("read cache directory", &self.cache_dir, &e))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)
                    .map_err(|e| BgSwapError::file_io_error("remove model directory", &path, &e))?;
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    removed.push(name.to_string());
                }
            }
        }

        removed.sort();
        log::info!("Cleared {} cached model(s)", removed.len());
        Ok(removed)
    }
}

/// Format a byte count for display
#[must_use]
#[allow(clippy::cast_precision_loss)] // Display only
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let size = bytes as f64;
    if size >= GB {
        format!("{:.1} GB", size / GB)
    } else if size >= MB {
        format!("{:.1} MB", size / MB)
    } else if size >= KB {
        format!("{:.1} KB", size / KB)
    } else {
        format!("{} B", bytes)
    }
}
