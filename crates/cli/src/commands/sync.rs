//! sync command - Download or upload through client-side encryption
//!
//! Resolves flags and config-file defaults into a [`RunConfig`], connects to
//! S3 and KMS, and runs the [`SyncDriver`]. The driver never prints; this
//! module renders per-item lines, the dry-run plan and the final report.

use std::path::PathBuf;

use clap::Args;
use comfy_table::{ContentArrangement, Table, presets};
use cse_core::{
    Config, ConfigManager, Direction, Result, RunConfig, RunRequest, SealedStore, SyncDriver,
    SyncReport, TransferItem,
};
use cse_s3::EncryptedS3Client;
use jiff::Timestamp;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::exit_code::ExitCode;
use crate::output::{ConsoleObserver, Formatter, OutputConfig};

/// Sync arguments
#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Download from S3 to the local path
    #[arg(long)]
    pub download: bool,

    /// Upload from the local path to S3
    #[arg(long)]
    pub upload: bool,

    /// Bucket name
    #[arg(long)]
    pub bucket: Option<String>,

    /// Object key, or a prefix ending in '/'
    #[arg(long)]
    pub object_key: Option<String>,

    /// Local file or directory
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// KMS key ARN used to wrap and unwrap data keys
    #[arg(long, env = "CSE_SYNC_KMS_KEY_ARN")]
    pub kms_key_arn: Option<String>,

    /// AWS region
    #[arg(long)]
    pub region: Option<String>,

    /// Named AWS profile
    #[arg(long)]
    pub profile: Option<String>,

    /// Custom S3 endpoint (S3-compatible services)
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// Use path-style bucket addressing
    #[arg(long)]
    pub force_path_style: bool,

    /// Only show what would be transferred
    #[arg(long)]
    pub dry_run: bool,

    /// Allow several files to upload to one non-prefix key (last one wins)
    #[arg(long)]
    pub allow_key_collision: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl From<SyncArgs> for RunRequest {
    fn from(args: SyncArgs) -> Self {
        RunRequest {
            download: args.download,
            upload: args.upload,
            bucket: args.bucket,
            object_key: args.object_key,
            path: args.path,
            kms_key_arn: args.kms_key_arn,
            region: args.region,
            profile: args.profile,
            endpoint_url: args.endpoint_url,
            force_path_style: args.force_path_style,
            dry_run: args.dry_run,
            allow_key_collision: args.allow_key_collision,
        }
    }
}

#[derive(Debug, Serialize)]
struct SyncOutput<'a> {
    status: &'static str,
    direction: Direction,
    bucket: &'a str,
    object_key: &'a str,
    dry_run: bool,
    item_count: usize,
    bytes: u64,
    size_human: String,
    started_at: Timestamp,
    finished_at: Timestamp,
    elapsed_ms: i128,
    items: &'a [TransferItem],
}

/// Execute the sync command
pub async fn execute(
    args: SyncArgs,
    output_config: OutputConfig,
    cancel: CancellationToken,
) -> ExitCode {
    let file_config = match load_file_config(&args) {
        Ok(c) => c,
        Err(e) => {
            let formatter = Formatter::new(output_config);
            formatter.error(&e.to_string());
            if e.is_configuration() {
                formatter.warning("Run 'csesync --help' for usage");
            }
            return ExitCode::from(&e);
        }
    };

    let formatter = Formatter::new(output_config.with_defaults(&file_config.defaults));

    let config = match RunRequest::from(args).into_config(&file_config.defaults) {
        Ok(c) => c,
        Err(e) => {
            formatter.error(&e.to_string());
            if e.is_configuration() {
                formatter.warning("Run 'csesync --help' for usage");
            }
            return ExitCode::from(&e);
        }
    };

    let store = match EncryptedS3Client::connect(&config.connection, &config.kms_key_arn).await {
        Ok(store) => store,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::from(&e);
        }
    };

    match run(&config, &store, &formatter, cancel).await {
        Ok(_) => ExitCode::Success,
        Err(e) => {
            formatter.error(&e.to_string());
            ExitCode::from(&e)
        }
    }
}

/// Check the mode flags, then read the config file.
///
/// A bad `--download`/`--upload` combination is reported before the file is
/// touched, so a broken config never hides the usage error.
fn load_file_config(args: &SyncArgs) -> Result<Config> {
    Direction::from_flags(args.download, args.upload)?;

    let manager = match &args.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new()?,
    };
    manager.load()
}

/// Run one sync against `store` and print the outcome.
///
/// Errors are returned unprinted.
pub async fn run<S: SealedStore + ?Sized>(
    config: &RunConfig,
    store: &S,
    formatter: &Formatter,
    cancel: CancellationToken,
) -> Result<SyncReport> {
    let started_at = Timestamp::now();
    let observer = ConsoleObserver::new(formatter, config.remote.bucket.as_str());

    let mut driver = SyncDriver::new(config, store, cancel, &observer);
    let result = driver.run().await;
    observer.finish();
    let report = result?;

    print_report(&report, started_at, formatter);
    Ok(report)
}

fn print_report(report: &SyncReport, started_at: Timestamp, formatter: &Formatter) {
    let finished_at = Timestamp::now();
    let size_human = humansize::format_size(report.bytes, humansize::BINARY);

    if formatter.is_json() {
        let elapsed = finished_at.duration_since(started_at);
        formatter.json(&SyncOutput {
            status: "success",
            direction: report.direction,
            bucket: &report.bucket,
            object_key: &report.object_key,
            dry_run: report.dry_run,
            item_count: report.items.len(),
            bytes: report.bytes,
            size_human,
            started_at,
            finished_at,
            elapsed_ms: elapsed.as_millis(),
            items: &report.items,
        });
        return;
    }

    let count = report.items.len();
    let noun = if count == 1 { "item" } else { "items" };

    if report.dry_run {
        if count > 0 {
            formatter.println(&plan_table(report).to_string());
        }
        let verb = match report.direction {
            Direction::Download => "downloaded",
            Direction::Upload => "uploaded",
        };
        formatter.println(&formatter.dim(&format!("Dry run: {count} {noun} would be {verb}")));
        return;
    }

    if count == 0 {
        formatter.warning(&format!(
            "Nothing to {} for {}/{}",
            report.direction, report.bucket, report.object_key
        ));
        return;
    }

    let verb = match report.direction {
        Direction::Download => "Downloaded",
        Direction::Upload => "Uploaded",
    };
    formatter.success(&format!("{verb} {count} {noun} ({size_human})"));
}

fn plan_table(report: &SyncReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Source", "Destination"]);

    for (index, item) in report.items.iter().enumerate() {
        let remote = format!("{}/{}", report.bucket, item.key());
        let local = item.path().display().to_string();
        let (source, destination) = match item {
            TransferItem::Download { .. } => (remote, local),
            TransferItem::Upload { .. } => (local, remote),
        };
        table.add_row(vec![(index + 1).to_string(), source, destination]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use cse_core::Error;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn report(direction: Direction, dry_run: bool) -> SyncReport {
        SyncReport {
            direction,
            bucket: "b".into(),
            object_key: "reports/".into(),
            items: vec![TransferItem::Download {
                key: "reports/2024/jan.csv".into(),
                path: PathBuf::from("/out/2024/jan.csv"),
            }],
            bytes: 0,
            dry_run,
        }
    }

    #[test]
    fn test_plan_table_columns() {
        let rendered = plan_table(&report(Direction::Download, true)).to_string();
        assert!(rendered.contains("Source"));
        assert!(rendered.contains("b/reports/2024/jan.csv"));
        assert!(rendered.contains("/out/2024/jan.csv"));
    }

    #[test]
    fn test_mode_checked_before_config_file() {
        let temp = TempDir::new().unwrap();
        let broken = temp.path().join("config.toml");
        std::fs::write(&broken, "schema_version = [not toml").unwrap();

        for (download, upload) in [(true, true), (false, false)] {
            let args = SyncArgs {
                download,
                upload,
                config: Some(broken.clone()),
                ..Default::default()
            };
            let err = load_file_config(&args).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{err}");
        }

        let args = SyncArgs {
            download: true,
            config: Some(broken),
            ..Default::default()
        };
        let err = load_file_config(&args).unwrap_err();
        assert!(matches!(err, Error::TomlParse(_)), "{err}");
    }

    #[test]
    fn test_sync_args_into_request() {
        let args = SyncArgs {
            upload: true,
            bucket: Some("b".into()),
            object_key: Some("archive/".into()),
            path: Some(PathBuf::from("/data")),
            allow_key_collision: true,
            ..Default::default()
        };
        let request = RunRequest::from(args);
        assert!(request.upload);
        assert!(!request.download);
        assert_eq!(request.object_key.as_deref(), Some("archive/"));
        assert!(request.allow_key_collision);
    }
}
