//! Process-wide segmentation model provider
//!
//! [`ModelProvider`] is a single-slot cache around one [`ModelHandle`]. The slot
//! moves through `Empty -> Loading -> Ready | Failed`:
//!
//! - the first caller starts the load on a spawned task and parks a shared future
//!   in the slot; every concurrent caller awaits that same future, so the
//!   [`ModelLoader`] runs exactly once
//! - the spawned task settles the slot itself, so a caller dropping its future
//!   never aborts a load other callers are waiting on
//! - a failure sticks: every later caller gets the same error until
//!   [`ModelProvider::reload`] is called

use crate::backends::create_backend;
use crate::config::PipelineConfig;
use crate::download::ModelDownloader;
use crate::error::{BgSwapError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelSource, ModelSpec, Normalization};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use ndarray::Array4;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

/// A loaded segmentation network plus the input contract it was built for
///
/// Immutable once constructed and shared through `Arc` by every pipeline run.
#[derive(Debug)]
pub struct ModelHandle {
    backend: Arc<dyn InferenceBackend>,
    resolution: u32,
    normalization: Normalization,
    foreground_channel: usize,
    source: String,
    loaded_at: DateTime<Utc>,
}

impl ModelHandle {
    #[must_use]
    pub fn new(backend: Arc<dyn InferenceBackend>, spec: &ModelSpec) -> Self {
        Self {
            backend,
            resolution: spec.resolution,
            normalization: spec.normalization,
            foreground_channel: spec.foreground_channel,
            source: spec.source.display_name(),
            loaded_at: Utc::now(),
        }
    }

    /// Fixed square side length the model consumes and produces
    #[must_use]
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    #[must_use]
    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    #[must_use]
    pub fn foreground_channel(&self) -> usize {
        self.foreground_channel
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Run the forward pass
    ///
    /// # Errors
    /// - Any inference error reported by the backend
    pub fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.backend.infer(input)
    }
}

/// Fetches and builds a model handle
///
/// The provider calls `load` once per load attempt; implementations do not cache.
#[async_trait]
pub trait ModelLoader: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// - Artifact cannot be fetched or read
    /// - Backend construction fails
    async fn load(&self) -> Result<ModelHandle>;
}

/// Loader for the configured model: downloads (or reads) the artifact and
/// builds the configured inference backend
#[derive(Debug, Clone)]
pub struct RemoteModelLoader {
    config: PipelineConfig,
    show_progress: bool,
}

impl RemoteModelLoader {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            show_progress: false,
        }
    }

    /// Show a download progress bar (CLI builds only)
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    async fn read_artifact(&self) -> Result<Vec<u8>> {
        let path = match &self.config.model_spec.source {
            ModelSource::Url(url) => {
                let downloader = ModelDownloader::new(&self.config)?;
                downloader.fetch(url, self.show_progress).await?
            },
            ModelSource::File(path) => path.clone(),
        };

        tokio::fs::read(&path)
            .await
            .map_err(|e| BgSwapError::file_io_error("read model file", &path, &e))
    }
}

#[async_trait]
impl ModelLoader for RemoteModelLoader {
    #[instrument(skip(self), fields(source = %self.config.model_spec.source.display_name(), backend = %self.config.backend_type))]
    async fn load(&self) -> Result<ModelHandle> {
        let bytes = self.read_artifact().await?;
        if bytes.is_empty() {
            return Err(BgSwapError::model_load("Model artifact is empty"));
        }
        debug!(bytes = bytes.len(), "Model artifact read");

        let config = self.config.clone();
        let backend = tokio::task::spawn_blocking(move || create_backend(&bytes, &config))
            .await
            .map_err(|e| BgSwapError::model_load(format!("Backend construction panicked: {e}")))??;

        Ok(ModelHandle::new(backend, &self.config.model_spec))
    }
}

/// Observable state of the provider slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Empty,
    Loading,
    Ready,
    Failed,
}

type LoadOutcome = std::result::Result<Arc<ModelHandle>, String>;
type SharedLoad = Shared<BoxFuture<'static, LoadOutcome>>;

enum Slot {
    Empty,
    Loading { generation: u64, load: SharedLoad },
    Ready(Arc<ModelHandle>),
    Failed(String),
}

/// Single-slot, load-once cache of the segmentation model
pub struct ModelProvider {
    loader: Arc<dyn ModelLoader>,
    slot: Arc<Mutex<Slot>>,
    generation: AtomicU64,
    load_count: Arc<AtomicUsize>,
}

impl std::fmt::Debug for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelProvider")
            .field("loader", &self.loader)
            .field("state", &self.state())
            .field("load_count", &self.load_count())
            .finish()
    }
}

impl ModelProvider {
    /// Create an empty provider; nothing is loaded until the first `get_model`
    #[must_use]
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slot: Arc::new(Mutex::new(Slot::Empty)),
            generation: AtomicU64::new(0),
            load_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Provider for the model described by `config`
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(Arc::new(RemoteModelLoader::new(config.clone())))
    }

    /// Return the loaded handle, loading it on first use
    ///
    /// # Errors
    /// - `ModelLoad` when the load fails, or has failed earlier and no
    ///   `reload` has happened since
    pub async fn get_model(&self) -> Result<Arc<ModelHandle>> {
        let (generation, load) = {
            let mut slot = self.lock_slot()?;
            match &*slot {
                Slot::Ready(handle) => return Ok(Arc::clone(handle)),
                Slot::Failed(message) => return Err(BgSwapError::model_load(message.clone())),
                Slot::Loading { generation, load } => (*generation, load.clone()),
                Slot::Empty => self.start_load(&mut slot),
            }
        };

        self.await_load(generation, load).await
    }

    /// Discard a failed load and try again
    ///
    /// A loaded handle is never replaced: it is returned as is. A load
    /// already in flight is joined rather than restarted.
    ///
    /// # Errors
    /// - `ModelLoad` when the new load fails
    pub async fn reload(&self) -> Result<Arc<ModelHandle>> {
        let (generation, load) = {
            let mut slot = self.lock_slot()?;
            match &*slot {
                Slot::Ready(handle) => return Ok(Arc::clone(handle)),
                Slot::Loading { generation, load } => (*generation, load.clone()),
                Slot::Failed(_) | Slot::Empty => {
                    info!("Reloading segmentation model");
                    self.start_load(&mut slot)
                },
            }
        };

        self.await_load(generation, load).await
    }

    /// Number of times the loader has been invoked
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn state(&self) -> ProviderState {
        match self.slot.lock().as_deref() {
            Ok(Slot::Empty) => ProviderState::Empty,
            Ok(Slot::Loading { .. }) => ProviderState::Loading,
            Ok(Slot::Ready(_)) => ProviderState::Ready,
            Ok(Slot::Failed(_)) | Err(_) => ProviderState::Failed,
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state() == ProviderState::Ready
    }

    fn lock_slot(&self) -> Result<MutexGuard<'_, Slot>> {
        self.slot
            .lock()
            .map_err(|_| BgSwapError::internal("Model provider lock poisoned"))
    }

    /// Spawn the loader and park the shared outcome in the slot
    fn start_load(&self, slot: &mut Slot) -> (u64, SharedLoad) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let attempt = self.load_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, attempt, "Starting model load");

        let loader = Arc::clone(&self.loader);
        let slot_ref = Arc::clone(&self.slot);
        let task = tokio::spawn(async move {
            let started = instant::Instant::now();
            let outcome: LoadOutcome = match loader.load().await {
                Ok(handle) => {
                    info!(
                        source = handle.source(),
                        backend = handle.backend_name(),
                        resolution = handle.resolution(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Segmentation model loaded"
                    );
                    Ok(Arc::new(handle))
                },
                Err(e) => {
                    warn!(error = %e, "Segmentation model failed to load");
                    Err(e.detail())
                },
            };
            settle(&slot_ref, generation, &outcome);
            outcome
        });

        let load = async move {
            task.await
                .unwrap_or_else(|e| Err(format!("Model load task failed: {e}")))
        }
        .boxed()
        .shared();

        *slot = Slot::Loading {
            generation,
            load: load.clone(),
        };
        (generation, load)
    }

    async fn await_load(&self, generation: u64, load: SharedLoad) -> Result<Arc<ModelHandle>> {
        let outcome = load.await;
        // Covers a load task that died before settling the slot
        settle(&self.slot, generation, &outcome);
        outcome.map_err(BgSwapError::model_load)
    }
}

/// Move a `Loading` slot of `generation` to its final state
fn settle(slot: &Mutex<Slot>, generation: u64, outcome: &LoadOutcome) {
    let Ok(mut slot) = slot.lock() else {
        return;
    };
    if matches!(&*slot, Slot::Loading { generation: current, .. } if *current == generation) {
        *slot = match outcome {
            Ok(handle) => Slot::Ready(Arc::clone(handle)),
            Err(message) => Slot::Failed(message.clone()),
        };
    }
}
