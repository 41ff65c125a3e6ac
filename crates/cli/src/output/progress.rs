//! Progress reporting for sync runs
//!
//! [`ProgressBar`] counts transferred items; [`ConsoleObserver`] connects it
//! and the per-item log lines to the transfer executor.

use std::sync::OnceLock;

use cse_core::{TransferItem, TransferObserver};

use super::{Formatter, OutputConfig};

/// Progress bar wrapper
///
/// Handles progress display based on output configuration.
/// In quiet or JSON mode, progress is suppressed.
#[derive(Debug)]
pub struct ProgressBar {
    bar: Option<indicatif::ProgressBar>,
}

impl ProgressBar {
    /// Create a new progress bar over `total` items
    pub fn new(config: &OutputConfig, total: u64) -> Self {
        let bar = if config.quiet || config.json || config.no_progress {
            None
        } else {
            let bar = indicatif::ProgressBar::new(total);
            bar.set_style(
                indicatif::ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")
                    .expect("valid template")
                    .progress_chars("#>-"),
            );
            Some(bar)
        };

        Self { bar }
    }

    /// Increment progress
    pub fn inc(&self, delta: u64) {
        if let Some(bar) = &self.bar {
            bar.inc(delta);
        }
    }

    /// Set message
    pub fn set_message(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.to_string());
        }
    }

    /// Print a line above the bar
    pub fn println(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.println(message);
        }
    }

    /// Finish and clear the progress bar
    pub fn finish_and_clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    /// Check if progress bar is visible
    pub fn is_visible(&self) -> bool {
        self.bar.is_some()
    }
}

/// Prints `Downloading: ...` / `Uploading: ...` lines and drives the bar
pub struct ConsoleObserver<'a> {
    formatter: &'a Formatter,
    bucket: String,
    bar: OnceLock<ProgressBar>,
}

impl<'a> ConsoleObserver<'a> {
    pub fn new(formatter: &'a Formatter, bucket: impl Into<String>) -> Self {
        Self {
            formatter,
            bucket: bucket.into(),
            bar: OnceLock::new(),
        }
    }

    /// Remove the bar once the run is over
    pub fn finish(&self) {
        if let Some(bar) = self.bar.get() {
            bar.finish_and_clear();
        }
    }

    fn line(&self, item: &TransferItem) -> String {
        let verb = match item {
            TransferItem::Download { .. } => "Downloading",
            TransferItem::Upload { .. } => "Uploading",
        };
        format!("{verb}: {}", item.describe(&self.bucket))
    }
}

impl TransferObserver for ConsoleObserver<'_> {
    fn started(&self, item: &TransferItem, _index: usize, total: usize) {
        let bar = self
            .bar
            .get_or_init(|| ProgressBar::new(self.formatter.config(), total as u64));
        let line = self.line(item);
        if bar.is_visible() {
            bar.println(&line);
            bar.set_message(item.key());
        } else {
            self.formatter.println(&line);
        }
    }

    fn finished(&self, item: &TransferItem, bytes: u64) {
        tracing::debug!(key = item.key(), bytes, "item transferred");
        if let Some(bar) = self.bar.get() {
            bar.inc(1);
        }
    }
}
