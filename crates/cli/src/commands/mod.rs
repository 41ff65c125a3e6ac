//! CLI definition and dispatch
//!
//! A bare invocation is a sync run (`--download` or `--upload`); the only
//! subcommand generates shell completions.

use clap::{Parser, Subcommand};
use cse_core::OutputFormat;
use tokio_util::sync::CancellationToken;

use crate::exit_code::ExitCode;
use crate::output::OutputConfig;

pub mod completions;
pub mod sync;

/// csesync - client-side encrypted S3 sync
///
/// Downloads or uploads a single object or a whole prefix, encrypting with a
/// KMS-wrapped data key on upload and verifying and decrypting on download.
#[derive(Parser, Debug)]
#[command(name = "csesync")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Output format: human-readable or JSON
    #[arg(long, default_value = "false")]
    pub json: bool,

    /// Output format (human or json), overriding the config file
    #[arg(long, value_name = "FORMAT", conflicts_with = "json")]
    pub output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long, default_value = "false")]
    pub no_color: bool,

    /// Disable progress bar
    #[arg(long, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub debug: bool,

    #[command(flatten)]
    pub sync: sync::SyncArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate shell completion scripts
    Completions(completions::CompletionsArgs),
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli, cancel: CancellationToken) -> ExitCode {
    if let Some(Commands::Completions(args)) = cli.command {
        return completions::execute(args);
    }

    let output_config = OutputConfig {
        json: cli.json,
        output: cli.output,
        no_color: cli.no_color,
        no_progress: cli.no_progress,
        quiet: cli.quiet,
    };

    sync::execute(cli.sync, output_config, cancel).await
}
