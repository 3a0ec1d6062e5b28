/// Trait for observing pipeline progress.
///
/// Implementations can target a CLI progress bar, structured logs, or any
/// other channel. The persisted progress value is written separately by the
/// orchestrator and is guaranteed non-decreasing.
pub trait ProgressReporter: Send + Sync {
    /// Called when a stage completes, with the checkpoint progress in [0, 1].
    fn on_stage(&self, stage: &str, progress: f64);

    /// Called on non-fatal and terminal errors.
    fn on_error(&self, stage: &str, error: &str);
}

/// A no-op progress reporter that discards all events.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn on_stage(&self, _stage: &str, _progress: f64) {}
    fn on_error(&self, _stage: &str, _error: &str) {}
}
