//! Configuration management
//!
//! Two layers:
//! - an optional TOML file (`~/.config/cse-sync/config.toml`) holding
//!   connection defaults, loaded by [`ConfigManager`]
//! - the [`RunConfig`] for one invocation, built once from CLI values merged
//!   over those defaults and passed by reference to every component

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path::RemoteRef;

/// Current configuration schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "CSE_SYNC_CONFIG_DIR";

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version for migration support
    pub schema_version: u32,

    /// Default settings
    #[serde(default)]
    pub defaults: Defaults,
}

/// Defaults applied when the corresponding CLI flag is absent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// AWS region for S3 and KMS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Named profile from the shared AWS config files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Custom S3 endpoint (S3-compatible services)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    /// Use path-style bucket addressing
    #[serde(default)]
    pub force_path_style: bool,

    /// KMS key used to wrap data keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_arn: Option<String>,

    /// Output format used when no output flag is given
    #[serde(default)]
    pub output: OutputFormat,

    /// Show progress bars
    #[serde(default = "default_true")]
    pub progress: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            endpoint_url: None,
            force_path_style: false,
            kms_key_arn: None,
            output: OutputFormat::default(),
            progress: true,
        }
    }
}

/// How results are printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            other => Err(Error::Config(format!(
                "unknown output format '{other}' (expected 'human' or 'json')"
            ))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            defaults: Defaults::default(),
        }
    }
}

/// Configuration manager handles locating and loading the config file
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config path
    ///
    /// `CSE_SYNC_CONFIG_DIR` overrides the platform config directory.
    pub fn new() -> Result<Self> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("Could not determine config directory".into()))?
                .join("cse-sync"),
        };
        Ok(Self {
            config_path: config_dir.join("config.toml"),
        })
    }

    /// Create a ConfigManager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk
    ///
    /// A missing file yields the default configuration.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            tracing::debug!(path = %self.config_path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let config: Config = toml::from_str(&content)?;

        if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}. Please upgrade csesync.",
                config.schema_version, SCHEMA_VERSION
            )));
        }

        Ok(config)
    }
}

/// Transfer direction for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Object storage to local filesystem
    Download,
    /// Local filesystem to object storage
    Upload,
}

impl Direction {
    /// Resolve the two mutually exclusive mode flags.
    ///
    /// Exactly one must be set.
    pub fn from_flags(download: bool, upload: bool) -> Result<Self> {
        match (download, upload) {
            (true, false) => Ok(Direction::Download),
            (false, true) => Ok(Direction::Upload),
            (true, true) => Err(Error::Config(
                "--download and --upload are mutually exclusive; specify exactly one".into(),
            )),
            (false, false) => Err(Error::Config(
                "specify exactly one of --download or --upload".into(),
            )),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Download => write!(f, "download"),
            Direction::Upload => write!(f, "upload"),
        }
    }
}

/// What to do when several local files map onto one non-prefix key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Refuse the run before anything is uploaded
    #[default]
    Reject,
    /// Upload every file in walk order; the last one wins
    LastWriterWins,
}

/// How to reach S3 and KMS
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

/// Raw, unvalidated values for one run as collected from the command line
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub download: bool,
    pub upload: bool,
    pub bucket: Option<String>,
    pub object_key: Option<String>,
    pub path: Option<PathBuf>,
    pub kms_key_arn: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub dry_run: bool,
    pub allow_key_collision: bool,
}

/// Immutable, validated configuration for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub direction: Direction,
    pub remote: RemoteRef,
    pub local: PathBuf,
    pub kms_key_arn: String,
    pub connection: ConnectionOptions,
    pub collision: CollisionPolicy,
    pub dry_run: bool,
}

impl RunRequest {
    /// Validate and merge over file defaults.
    ///
    /// Every check here runs before any I/O.
    pub fn into_config(self, defaults: &Defaults) -> Result<RunConfig> {
        let direction = Direction::from_flags(self.download, self.upload)?;

        let bucket = required(self.bucket, "--bucket")?;
        let object_key = required(self.object_key, "--object-key")?;
        let local = self
            .path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| Error::Config("--path is required".into()))?;
        let kms_key_arn = required(
            self.kms_key_arn.or_else(|| defaults.kms_key_arn.clone()),
            "--kms-key-arn",
        )?;

        let endpoint_url = self.endpoint_url.or_else(|| defaults.endpoint_url.clone());
        if let Some(endpoint) = &endpoint_url {
            url::Url::parse(endpoint)?;
        }

        let collision = if self.allow_key_collision {
            CollisionPolicy::LastWriterWins
        } else {
            CollisionPolicy::Reject
        };

        Ok(RunConfig {
            direction,
            remote: RemoteRef::new(bucket, object_key),
            local,
            kms_key_arn,
            connection: ConnectionOptions {
                region: self.region.or_else(|| defaults.region.clone()),
                profile: self.profile.or_else(|| defaults.profile.clone()),
                endpoint_url,
                force_path_style: self.force_path_style || defaults.force_path_style,
            },
            collision,
            dry_run: self.dry_run,
        })
    }
}

fn required(value: Option<String>, flag: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!("{flag} is required"))),
    }
}
