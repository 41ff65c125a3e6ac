//! csesync - client-side encrypted S3 sync
//!
//! Downloads or uploads objects and prefixes, encrypting content with a
//! KMS-wrapped data key before it leaves the machine.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cse_sync::commands::{self, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // --debug overrides RUST_LOG
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current step");
            interrupt.cancel();
        }
    });

    let exit_code = commands::execute(cli, cancel).await;

    std::process::exit(exit_code.as_i32());
}
