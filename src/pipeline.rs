//! End-to-end pipeline: upload bytes + background -> cutout + recomposite
//!
//! Stages run strictly in order and short-circuit on the first failure:
//!
//! 1. validate the background (before any decoding or model work)
//! 2. decode the upload
//! 3. obtain the shared model handle
//! 4. build the alpha mask (blocking thread pool)
//! 5. composite
//! 6. encode both artifacts
//!
//! This module is the only place that re-labels stage failures into the
//! [`ErrorKind`](crate::error::ErrorKind) taxonomy. Either both artifacts are
//! returned or the run fails.

use crate::background::BackgroundSpec;
use crate::compositor::composite_rgb;
use crate::config::PipelineConfig;
use crate::error::{BgSwapError, ErrorKind, Result};
use crate::mask::MaskBuilder;
use crate::provider::{ModelHandle, ModelProvider};
use crate::relay::RelayResponse;
use crate::services::{
    NoOpProgressReporter, OutputFormatHandler, ProcessingStage, ProgressReporter, ProgressTracker,
};
use crate::types::{ProcessOutput, ProcessingTimings, SourceImage};
use chrono::Utc;
use image::ImageFormat;
use instant::Instant;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, instrument, warn, Instrument, Span};

/// Upload containers the pipeline decodes
pub const SUPPORTED_INPUT_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    #[cfg(feature = "webp-support")]
    ImageFormat::WebP,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
];

/// Background-swap pipeline sharing one model provider across runs
///
/// Cheap to share behind an `Arc`; every method takes `&self` and concurrent
/// runs only share the provider's read-only model handle.
pub struct Pipeline {
    config: PipelineConfig,
    provider: Arc<ModelProvider>,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline that loads the configured model on first use
    ///
    /// # Errors
    /// - Invalid configuration (`Validation`)
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let provider = Arc::new(ModelProvider::from_config(&config));
        Self::with_provider(config, provider)
    }

    /// Create a pipeline over an existing (possibly shared) provider
    ///
    /// # Errors
    /// - Invalid configuration (`Validation`)
    pub fn with_provider(config: PipelineConfig, provider: Arc<ModelProvider>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            provider,
            reporter: Arc::new(NoOpProgressReporter),
        })
    }

    /// Send stage transitions to `reporter`
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<ModelProvider> {
        &self.provider
    }

    /// Load the model ahead of the first request
    ///
    /// # Errors
    /// - `ModelLoad` when the model cannot be loaded
    pub async fn warm_up(&self) -> Result<()> {
        self.provider.get_model().await.map(|_| ())
    }

    /// Retry affordance after a `ModelLoad` failure
    ///
    /// # Errors
    /// - `ModelLoad` when the new load fails too
    pub async fn reload_model(&self) -> Result<()> {
        self.provider.reload().await.map(|_| ())
    }

    /// Run the full pipeline on an encoded upload
    ///
    /// # Errors
    /// - `Validation`: background does not resolve to a color
    /// - `Decode`: empty, unsupported or corrupt upload
    /// - `ModelLoad`: model unavailable (retry after [`Pipeline::reload_model`])
    /// - `Inference`: forward pass failed or returned an unexpected shape
    /// - `Internal`: encoding or other unexpected failures
    #[instrument(skip_all, fields(input_bytes = raw.len(), background = %background.label()))]
    pub async fn process_image(
        &self,
        raw: &[u8],
        background: &BackgroundSpec,
    ) -> Result<ProcessOutput> {
        let mut tracker = ProgressTracker::new(Arc::clone(&self.reporter));

        match self.run(raw, background, &mut tracker).await {
            Ok(output) => {
                tracker.report_completion(&output.timings);
                info!(
                    width = output.dimensions.0,
                    height = output.dimensions.1,
                    foreground_ratio = output.mask_statistics.foreground_ratio,
                    "✅ {}",
                    output.timings.summary()
                );
                Ok(output)
            },
            Err(e) => {
                tracker.report_error(&e.to_string());
                warn!(kind = %e.kind(), error = %e, "Pipeline run failed");
                Err(e)
            },
        }
    }

    /// Read an upload from an async stream, then [`Pipeline::process_image`]
    ///
    /// # Errors
    /// - `Validation` for the background, checked before reading
    /// - `Decode` when the stream cannot be read
    /// - Everything [`Pipeline::process_image`] returns
    pub async fn process_reader<R: AsyncRead + Unpin>(
        &self,
        mut reader: R,
        background: &BackgroundSpec,
    ) -> Result<ProcessOutput> {
        background
            .resolve()
            .map_err(|e| translate_error(ProcessingStage::Validation, e))?;

        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| BgSwapError::decode(format!("Failed to read from stream: {e}")))?;

        self.process_image(&buffer, background).await
    }

    /// Read an upload from disk, then [`Pipeline::process_image`]
    ///
    /// # Errors
    /// - `Validation` for the background, checked before reading
    /// - `Decode` when the file cannot be read
    /// - Everything [`Pipeline::process_image`] returns
    pub async fn process_file<P: AsRef<Path>>(
        &self,
        path: P,
        background: &BackgroundSpec,
    ) -> Result<ProcessOutput> {
        let path = path.as_ref();
        background
            .resolve()
            .map_err(|e| translate_error(ProcessingStage::Validation, e))?;

        let raw = tokio::fs::read(path).await.map_err(|e| {
            BgSwapError::decode(format!("Failed to read '{}': {}", path.display(), e))
        })?;

        self.process_image(&raw, background).await
    }

    /// Process an upload that came back through the relay
    ///
    /// `bgColor` becomes an explicit RGB background.
    ///
    /// # Errors
    /// - `Validation`: missing or out-of-range `bgColor`
    /// - `Decode`: malformed data URI
    /// - Everything [`Pipeline::process_image`] returns
    pub async fn process_relay_response(&self, response: &RelayResponse) -> Result<ProcessOutput> {
        let background = response
            .background()
            .map_err(|e| translate_error(ProcessingStage::Validation, e))?;
        let raw = response
            .image_bytes()
            .map_err(|e| translate_error(ProcessingStage::Decoding, e))?;

        self.process_image(&raw, &background).await
    }

    async fn run(
        &self,
        raw: &[u8],
        background: &BackgroundSpec,
        tracker: &mut ProgressTracker,
    ) -> Result<ProcessOutput> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        tracker.report_stage(ProcessingStage::Validation);
        let background_rgb = background
            .resolve()
            .map_err(|e| translate_error(ProcessingStage::Validation, e))?;

        tracker.report_stage(ProcessingStage::Decoding);
        let stage_start = Instant::now();
        let source = decode_image(raw).map_err(|e| translate_error(ProcessingStage::Decoding, e))?;
        let source_dimensions = source.dimensions();
        timings.decode_ms = stage_start.elapsed().as_millis() as u64;
        debug!(
            width = source_dimensions.0,
            height = source_dimensions.1,
            format = ?source.format(),
            "Decoded upload"
        );

        tracker.report_stage(ProcessingStage::ModelLoading);
        let stage_start = Instant::now();
        let handle = self
            .provider
            .get_model()
            .instrument(tracing::debug_span!("model_wait"))
            .await
            .map_err(|e| translate_error(ProcessingStage::ModelLoading, e))?;
        timings.model_wait_ms = stage_start.elapsed().as_millis() as u64;

        tracker.report_stage(ProcessingStage::MaskGeneration);
        let stage_start = Instant::now();
        let masked = build_mask_blocking(source, handle)
            .await
            .map_err(|e| translate_error(ProcessingStage::MaskGeneration, e))?;
        timings.mask_ms = stage_start.elapsed().as_millis() as u64;

        tracker.report_stage(ProcessingStage::Compositing);
        let stage_start = Instant::now();
        let composite = composite_rgb(&masked.source, &masked.mask, background_rgb)
            .map_err(|e| translate_error(ProcessingStage::Compositing, e))?;
        timings.composite_ms = stage_start.elapsed().as_millis() as u64;

        tracker.report_stage(ProcessingStage::Encoding);
        let stage_start = Instant::now();
        let cutout =
            OutputFormatHandler::encode_cutout(&composite.cutout, self.config.cutout_format)
                .map_err(|e| translate_error(ProcessingStage::Encoding, e))?;
        let recomposited = OutputFormatHandler::encode(
            &composite.recomposited,
            self.config.recomposite_format,
            self.config.jpeg_quality,
        )
        .map_err(|e| translate_error(ProcessingStage::Encoding, e))?;
        timings.encode_ms = stage_start.elapsed().as_millis() as u64;
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        Ok(ProcessOutput {
            dimensions: composite.dimensions(),
            source_dimensions,
            background: background_rgb,
            mask_statistics: masked.mask.statistics(),
            cutout,
            recomposited,
            timings,
            completed_at: Utc::now(),
        })
    }
}

/// Sniff the container from magic bytes and decode
///
/// # Errors
/// - Empty input, unknown or unsupported container, corrupt data (`Decode`)
pub fn decode_image(raw: &[u8]) -> Result<SourceImage> {
    if raw.is_empty() {
        return Err(BgSwapError::decode("Input is empty"));
    }

    let format = image::guess_format(raw)
        .map_err(|_| BgSwapError::decode("Input is not a recognized image type"))?;
    if !SUPPORTED_INPUT_FORMATS.contains(&format) {
        return Err(BgSwapError::decode(format!(
            "Unsupported image type: {:?}",
            format
        )));
    }

    let image = image::load_from_memory_with_format(raw, format)
        .map_err(|e| BgSwapError::decode(format!("Failed to decode {:?} image: {e}", format)))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(BgSwapError::decode("Image has no pixels"));
    }

    Ok(SourceImage::new(image, Some(format)))
}

async fn build_mask_blocking(
    source: SourceImage,
    handle: Arc<ModelHandle>,
) -> Result<crate::mask::MaskedSource> {
    let span = Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(|| MaskBuilder::build(&source, &handle)))
        .await
        .map_err(|e| BgSwapError::inference(format!("Mask generation task failed: {e}")))?
}

/// Map a failure raised during `stage` onto the taxonomy kind that stage owns
///
/// Errors already carrying the stage's kind pass through untouched.
fn translate_error(stage: ProcessingStage, error: BgSwapError) -> BgSwapError {
    let expected = match stage {
        ProcessingStage::Validation => ErrorKind::Validation,
        ProcessingStage::Decoding => ErrorKind::Decode,
        ProcessingStage::ModelLoading => ErrorKind::ModelLoad,
        ProcessingStage::MaskGeneration => ErrorKind::Inference,
        ProcessingStage::Compositing | ProcessingStage::Encoding | ProcessingStage::Completed => {
            return error;
        },
    };
    if error.kind() == expected {
        return error;
    }

    let detail = error.detail();
    match expected {
        ErrorKind::Validation => BgSwapError::validation(detail),
        ErrorKind::Decode => BgSwapError::decode(detail),
        ErrorKind::ModelLoad => BgSwapError::model_load(detail),
        ErrorKind::Inference => BgSwapError::inference(detail),
        ErrorKind::Internal => BgSwapError::internal(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{MockBackend, MockModelLoader};
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([9, 8, 7])));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn pipeline(backend: MockBackend) -> Pipeline {
        let provider = Arc::new(ModelProvider::new(Arc::new(MockModelLoader::new(backend))));
        Pipeline::with_provider(PipelineConfig::default(), provider).unwrap()
    }

    #[test]
    fn test_decode_image() {
        let source = decode_image(&png_bytes(3, 2)).unwrap();
        assert_eq!(source.dimensions(), (3, 2));
        assert_eq!(source.format(), Some(ImageFormat::Png));

        assert_eq!(decode_image(&[]).unwrap_err().kind(), ErrorKind::Decode);
        assert_eq!(decode_image(b"plain text").unwrap_err().kind(), ErrorKind::Decode);

        // Valid signature, truncated body
        let truncated = &png_bytes(3, 2)[..20];
        assert_eq!(decode_image(truncated).unwrap_err().kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_translate_error() {
        let err = translate_error(
            ProcessingStage::ModelLoading,
            BgSwapError::network_error("fetch", "timeout"),
        );
        assert!(matches!(err, BgSwapError::Network(_)));

        let err = translate_error(ProcessingStage::MaskGeneration, BgSwapError::internal("lock"));
        assert_eq!(err.kind(), ErrorKind::Inference);

        let err = translate_error(ProcessingStage::Encoding, BgSwapError::encode("png"));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_process_image_outputs_model_resolution() {
        let pipeline = pipeline(MockBackend::uniform(1.0));
        let output = pipeline
            .process_image(&png_bytes(40, 30), &BackgroundSpec::default())
            .await
            .unwrap();

        assert_eq!(output.dimensions, (512, 512));
        assert_eq!(output.source_dimensions, (40, 30));
        assert_eq!(output.background, [255, 255, 255]);
        assert_eq!(output.mask_statistics.opaque_pixels, 512 * 512);

        let cutout = image::load_from_memory(&output.cutout.bytes).unwrap().to_rgba8();
        assert!(cutout.pixels().all(|p| p.0 == [9, 8, 7, 255]));
    }

    #[tokio::test]
    async fn test_validation_precedes_decode() {
        let pipeline = pipeline(MockBackend::uniform(1.0));
        let err = pipeline
            .process_image(&[], &BackgroundSpec::Custom("#12345".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(pipeline.provider().load_count(), 0);
    }

    #[tokio::test]
    async fn test_process_reader() {
        let pipeline = pipeline(MockBackend::uniform(0.0));
        let bytes = png_bytes(8, 8);
        let output = pipeline
            .process_reader(bytes.as_slice(), &BackgroundSpec::Rgb([1, 2, 3]))
            .await
            .unwrap();
        let recomposited = image::load_from_memory(&output.recomposited.bytes)
            .unwrap()
            .to_rgba8();
        assert!(recomposited.pixels().all(|p| p.0 == [1, 2, 3, 255]));
    }
}
