//! Output formatting utilities
//!
//! This module provides formatters for CLI output in both human-readable
//! and JSON formats. It also handles progress bars and colored output.

mod formatter;
mod progress;

pub use formatter::Formatter;
pub use progress::{ConsoleObserver, ProgressBar};

use cse_core::{Defaults, OutputFormat};

/// Output configuration derived from CLI flags
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Use JSON output format
    pub json: bool,
    /// Explicit `--output` choice
    pub output: Option<OutputFormat>,
    /// Disable colored output
    pub no_color: bool,
    /// Disable progress bar
    pub no_progress: bool,
    /// Suppress non-error output
    pub quiet: bool,
}

impl OutputConfig {
    /// Apply config-file defaults.
    ///
    /// `--json` or `--output` decide the format when given, so
    /// `--output human` overrides `output = "json"` in the file. Progress
    /// can only be turned off: either `--no-progress` or `progress = false`
    /// hides the bar.
    pub fn with_defaults(mut self, defaults: &Defaults) -> Self {
        let format = match (self.json, self.output) {
            (true, _) => OutputFormat::Json,
            (false, Some(format)) => format,
            (false, None) => defaults.output,
        };
        self.json = format == OutputFormat::Json;
        if !defaults.progress {
            self.no_progress = true;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_defaults() {
        let defaults = Defaults {
            output: OutputFormat::Json,
            progress: false,
            ..Default::default()
        };
        let config = OutputConfig::default().with_defaults(&defaults);
        assert!(config.json);
        assert!(config.no_progress);

        let config = OutputConfig {
            json: true,
            ..Default::default()
        }
        .with_defaults(&Defaults::default());
        assert!(config.json);
        assert!(!config.no_progress);
    }

    #[test]
    fn test_output_flag_overrides_config_json() {
        let defaults = Defaults {
            output: OutputFormat::Json,
            ..Default::default()
        };
        let config = OutputConfig {
            output: Some(OutputFormat::Human),
            ..Default::default()
        }
        .with_defaults(&defaults);
        assert!(!config.json);

        let config = OutputConfig {
            output: Some(OutputFormat::Json),
            ..Default::default()
        }
        .with_defaults(&Defaults::default());
        assert!(config.json);
    }
}
