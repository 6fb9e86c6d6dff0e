//! Progress reporting for batch runs.
//!
//! The batch scheduler calls [`ProgressReporter::report`] once per completed
//! (trait, item) task, always from its own control flow, never concurrently.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::info;

const PROGRESS_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";
const PROGRESS_CHARS: &str = "=>-";

/// Receives batch progress updates.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, completed: usize, total: usize, message: &str);

    /// Called once when the batch ends, successfully or not.
    fn finish(&self) {}
}

/// Discards all updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _completed: usize, _total: usize, _message: &str) {}
}

/// Logs each update through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn report(&self, completed: usize, total: usize, message: &str) {
        info!(completed, total, "{message}");
    }
}

/// Terminal progress bar.
pub struct IndicatifProgress {
    bar: ProgressBar,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    /// A bar that never draws, for non-interactive output.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden()))
    }

    fn with_bar(bar: ProgressBar) -> Self {
        let style = ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars(PROGRESS_CHARS);
        bar.set_style(style);
        Self { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for IndicatifProgress {
    fn report(&self, completed: usize, total: usize, message: &str) {
        self.bar.set_length(total as u64);
        self.bar.set_position(completed as u64);
        self.bar.set_message(message.to_string());
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
