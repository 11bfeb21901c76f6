#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # bgswap
//!
//! Cut the subject out of a photo with a pretrained segmentation model and
//! recomposite it over a solid background color.
//!
//! One run turns upload bytes into two artifacts: a transparent **cutout** and
//! an opaque **recomposited** image, both at the model's square resolution.
//!
//! ```text
//! bytes ─ decode ─ resample ─ tensor ─ model ─ probability map ─ alpha mask
//!                                                                  │
//!                                 cutout + recomposite ◄─ composite ┘
//! ```
//!
//! ## Features
//!
//! - **Shared model**: loaded lazily once per process, concurrent first calls
//!   coalesce onto a single load ([`ModelProvider`])
//! - **Backends**: ONNX Runtime (CUDA, `CoreML`, CPU) and Tract (pure Rust)
//! - **Backgrounds**: a fixed palette or any `#RRGGBB` color
//! - **Outputs**: PNG or lossless WebP cutout; PNG, JPEG or WebP recomposite
//! - **Model cache**: downloaded once into the XDG cache directory with a
//!   recorded SHA-256 digest
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgswap::{BackgroundSpec, PaletteColor, Pipeline, PipelineConfig};
//!
//! # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
//! let pipeline = Pipeline::new(PipelineConfig::default())?;
//! let output = pipeline
//!     .process_image(&upload, &BackgroundSpec::Palette(PaletteColor::Blue))
//!     .await?;
//! output.cutout.save("cutout.png")?;
//! output.recomposited.save("blue.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! Errors carry an [`ErrorKind`] so callers can branch without parsing
//! messages; a `ModelLoad` failure sticks until [`Pipeline::reload_model`].
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend
//! - `tract` (default): pure Rust backend
//! - `cli` (default): `bgswap` binary, progress bars, tracing subscriber setup
//! - `webp-support` (default): WebP decoding and lossless WebP output
//! - `tracing-json`, `tracing-files`: extra subscriber outputs for the CLI

pub mod background;
pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod mask;
pub mod models;
pub mod pipeline;
pub mod provider;
pub mod relay;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

pub use background::{parse_hex_color, BackgroundSpec, PaletteColor};
pub use backends::{available_backends, create_backend, provider_diagnostics};
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use compositor::{composite, composite_rgb};
pub use config::{BackendType, ExecutionProvider, OutputFormat, PipelineConfig, PipelineConfigBuilder};
pub use download::{validate_model_url, ModelDownloader};
pub use error::{BgSwapError, ErrorKind, Result};
pub use inference::InferenceBackend;
pub use mask::{MaskBuilder, MaskedSource};
pub use models::{ModelSource, ModelSpec, Normalization, DEFAULT_MODEL_URL};
pub use pipeline::{decode_image, Pipeline};
pub use provider::{ModelHandle, ModelLoader, ModelProvider, ProviderState, RemoteModelLoader};
pub use relay::{RelayForm, RelayResponse};
pub use services::{
    ConsoleProgressReporter, NoOpProgressReporter, OutputFormatHandler, ProcessingStage,
    ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use types::{
    AlphaMask, CompositeResult, EncodedImage, MaskStatistics, ProbabilityMap, ProcessOutput,
    ProcessingTimings, SourceImage,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat, TracingOutput};

/// One-shot convenience: build a pipeline for `config` and process `image_bytes`
///
/// Loads the model for this call only. Services handling more than one request
/// should keep a [`Pipeline`] (or share a [`ModelProvider`]) instead.
///
/// # Examples
/// ```rust,no_run
/// use bgswap::{process_image, BackgroundSpec, PipelineConfig};
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let background: BackgroundSpec = "#1e90ff".parse()?;
/// let output = process_image(&upload, &background, PipelineConfig::default()).await?;
/// println!("{}", output.timings.summary());
/// # Ok(())
/// # }
/// ```
pub async fn process_image(
    image_bytes: &[u8],
    background: &BackgroundSpec,
    config: PipelineConfig,
) -> Result<ProcessOutput> {
    Pipeline::new(config)?
        .process_image(image_bytes, background)
        .await
}
