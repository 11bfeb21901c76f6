//! Progress reporting service
//!
//! Keeps progress concerns out of the pipeline so each frontend (CLI, server,
//! tests) can decide what to do with stage transitions.

use crate::types::ProcessingTimings;
use instant::Instant;
use std::sync::Arc;

/// Stages of one pipeline run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStage {
    /// Checking the background selection
    Validation,
    /// Sniffing and decoding the upload
    Decoding,
    /// Waiting for the shared segmentation model
    ModelLoading,
    /// Resampling, inference and alpha derivation
    MaskGeneration,
    /// Building cutout and recomposite buffers
    Compositing,
    /// Encoding both artifacts
    Encoding,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Validation => "Validating background selection",
            ProcessingStage::Decoding => "Decoding input image",
            ProcessingStage::ModelLoading => "Loading segmentation model",
            ProcessingStage::MaskGeneration => "Generating alpha mask",
            ProcessingStage::Compositing => "Compositing over background",
            ProcessingStage::Encoding => "Encoding results",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Validation => 2,
            ProcessingStage::Decoding => 10,
            ProcessingStage::ModelLoading => 20,
            ProcessingStage::MaskGeneration => 70,
            ProcessingStage::Compositing => 85,
            ProcessingStage::Encoding => 95,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Trait for reporting progress during pipeline runs
///
/// One reporter is shared by every concurrent run of a pipeline, hence `&self`.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: &ProcessingTimings);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
#[derive(Debug, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs progress through `log`
#[derive(Debug)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// `verbose` adds elapsed time and a per-stage timing breakdown
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::debug!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        log::info!("✅ Background swap completed in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  📊 Detailed timings:");
            log::info!("    • Decode: {}ms", timings.decode_ms);
            log::info!("    • Model wait: {}ms", timings.model_wait_ms);
            log::info!("    • Mask: {}ms", timings.mask_ms);
            log::info!("    • Composite: {}ms", timings.composite_ms);
            log::info!("    • Encode: {}ms", timings.encode_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description().to_lowercase(), error);
    }
}

/// Per-run tracker: remembers the current stage and the run's start time
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    /// Create a new progress tracker with the specified reporter
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Create a progress tracker with no-op reporter (for testing/disabled progress)
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Arc::new(NoOpProgressReporter))
    }

    /// Report progress for a specific stage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    /// Report completion with final timings
    pub fn report_completion(&mut self, timings: &ProcessingTimings) {
        self.report_stage(ProcessingStage::Completed);
        self.reporter.report_completion(timings);
    }

    /// Report an error against the stage that was running
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::Validation);
        self.reporter.report_error(stage, error);
    }

    /// Get the elapsed time since tracking started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Get the current processing stage
    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Test progress reporter that captures reports for verification
    #[derive(Default)]
    struct TestProgressReporter {
        stages: Mutex<Vec<ProcessingStage>>,
        completions: Mutex<usize>,
        errors: Mutex<Vec<(ProcessingStage, String)>>,
    }

    impl ProgressReporter for TestProgressReporter {
        fn report_progress(&self, update: ProgressUpdate) {
            self.stages.lock().unwrap().push(update.stage);
        }

        fn report_completion(&self, _timings: &ProcessingTimings) {
            *self.completions.lock().unwrap() += 1;
        }

        fn report_error(&self, stage: ProcessingStage, error: &str) {
            self.errors.lock().unwrap().push((stage, error.to_string()));
        }
    }

    #[test]
    fn test_stage_percentages_increase() {
        let stages = [
            ProcessingStage::Validation,
            ProcessingStage::Decoding,
            ProcessingStage::ModelLoading,
            ProcessingStage::MaskGeneration,
            ProcessingStage::Compositing,
            ProcessingStage::Encoding,
            ProcessingStage::Completed,
        ];
        assert!(stages
            .windows(2)
            .all(|w| w[0].progress_percentage() < w[1].progress_percentage()));
        assert_eq!(ProcessingStage::Completed.progress_percentage(), 100);
    }

    #[test]
    fn test_progress_update_creation() {
        let update = ProgressUpdate::new(ProcessingStage::MaskGeneration, Instant::now());
        assert_eq!(update.progress, 70);
        assert_eq!(update.description, "Generating alpha mask");
        assert!(update.elapsed_ms < 100);
    }

    #[test]
    fn test_progress_tracker() {
        let reporter = Arc::new(TestProgressReporter::default());
        let mut tracker = ProgressTracker::new(reporter.clone());

        tracker.report_stage(ProcessingStage::Validation);
        tracker.report_stage(ProcessingStage::Decoding);
        tracker.report_error("not an image");
        assert_eq!(tracker.current_stage(), Some(ProcessingStage::Decoding));

        tracker.report_completion(&ProcessingTimings::default());

        assert_eq!(
            *reporter.stages.lock().unwrap(),
            vec![
                ProcessingStage::Validation,
                ProcessingStage::Decoding,
                ProcessingStage::Completed
            ]
        );
        assert_eq!(*reporter.completions.lock().unwrap(), 1);
        assert_eq!(
            reporter.errors.lock().unwrap()[0],
            (ProcessingStage::Decoding, "not an image".to_string())
        );
    }

    #[test]
    fn test_no_op_reporter_discards() {
        let mut tracker = ProgressTracker::no_op();
        tracker.report_stage(ProcessingStage::Encoding);
        tracker.report_error("ignored");
        tracker.report_completion(&ProcessingTimings::default());
    }
}
