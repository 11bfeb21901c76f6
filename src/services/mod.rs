//! Services kept apart from the pipeline's business logic

pub mod format;
pub mod progress;

pub use format::OutputFormatHandler;
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
