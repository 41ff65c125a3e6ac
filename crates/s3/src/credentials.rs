//! MFA-protected role profiles
//!
//! The SDK profile provider cannot ask for a one-time code. A profile that
//! sets both `role_arn` and `mfa_serial` is resolved here instead: the
//! `source_profile` credentials call STS AssumeRole with a code read from a
//! [`TokenSource`], and the session credentials that come back are used for
//! S3 and KMS.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_sts::error::DisplayErrorContext;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use cse_core::{ConnectionOptions, Error, Result};

use crate::client::classify;

/// Overrides the shared config file location
pub const CONFIG_FILE_ENV: &str = "AWS_CONFIG_FILE";

/// Selects the profile when `--profile` is absent
pub const PROFILE_ENV: &str = "AWS_PROFILE";

const DEFAULT_PROFILE: &str = "default";
const PROVIDER_NAME: &str = "csesync-mfa";

/// Role settings of one profile in the shared config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleProfile {
    pub role_arn: String,
    pub mfa_serial: String,
    pub source_profile: Option<String>,
    pub region: Option<String>,
    pub role_session_name: Option<String>,
    pub external_id: Option<String>,
    pub duration_seconds: Option<i32>,
}

impl RoleProfile {
    /// Session name sent to STS, generated when the profile has none
    pub fn session_name(&self) -> String {
        match &self.role_session_name {
            Some(name) => name.clone(),
            None => format!("csesync-{}", jiff::Timestamp::now().as_second()),
        }
    }
}

/// Supplies the one-time code for an MFA device
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token_code(&self, mfa_serial: &str) -> Result<String>;
}

/// Prompts on stderr and reads the code from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinTokenSource;

#[async_trait]
impl TokenSource for StdinTokenSource {
    async fn token_code(&self, mfa_serial: &str) -> Result<String> {
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(format!("Enter MFA code for {mfa_serial}: ").as_bytes())
            .await?;
        stderr.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        check_token_code(&line)
    }
}

/// Trim and validate a typed MFA code (six digits).
pub fn check_token_code(input: &str) -> Result<String> {
    let code = input.trim();
    if code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(code.to_string())
    } else {
        Err(Error::Auth("MFA code must be six digits".into()))
    }
}

/// Profile a run uses: `--profile`, then `AWS_PROFILE`, then `default`.
pub fn selected_profile(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(PROFILE_ENV).ok().filter(|p| !p.is_empty()))
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
}

/// Location of the shared config file (`AWS_CONFIG_FILE` or `~/.aws/config`)
pub fn config_file_path() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_FILE_ENV) {
        Some(path) => Some(PathBuf::from(path)),
        None => dirs::home_dir().map(|home| home.join(".aws").join("config")),
    }
}

/// Read the role settings of `profile`, if it is an MFA role profile.
pub fn read_role_profile(profile: &str) -> Result<Option<RoleProfile>> {
    let Some(path) = config_file_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    parse_role_profile(&content, profile)
}

/// Extract the MFA role settings of `profile` from shared config text.
///
/// Returns `None` when the profile is missing or does not set both
/// `role_arn` and `mfa_serial`.
pub fn parse_role_profile(content: &str, profile: &str) -> Result<Option<RoleProfile>> {
    let Some(mut settings) = profile_section(content, profile) else {
        return Ok(None);
    };
    let (Some(role_arn), Some(mfa_serial)) =
        (settings.remove("role_arn"), settings.remove("mfa_serial"))
    else {
        return Ok(None);
    };

    let duration_seconds = settings
        .remove("duration_seconds")
        .map(|value| {
            value.parse::<i32>().map_err(|_| {
                Error::Config(format!(
                    "profile '{profile}': duration_seconds '{value}' is not a number"
                ))
            })
        })
        .transpose()?;

    Ok(Some(RoleProfile {
        role_arn,
        mfa_serial,
        source_profile: settings.remove("source_profile"),
        region: settings.remove("region"),
        role_session_name: settings.remove("role_session_name"),
        external_id: settings.remove("external_id"),
        duration_seconds,
    }))
}

/// Key/value pairs of `[profile name]` (or `[default]`).
fn profile_section(content: &str, profile: &str) -> Option<HashMap<String, String>> {
    let mut current: Option<&str> = None;
    let mut found = None::<HashMap<String, String>>;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let header = header.trim();
            let name = header
                .strip_prefix("profile ")
                .map(str::trim)
                .unwrap_or(header);
            current = Some(name);
            if name == profile {
                found.get_or_insert_with(HashMap::new);
            }
            continue;
        }
        if current != Some(profile) {
            continue;
        }
        if let (Some((key, value)), Some(section)) = (line.split_once('='), found.as_mut()) {
            section.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    found
}

/// Call STS AssumeRole with the device serial and a fresh one-time code.
pub async fn assume_role_with_mfa(
    sts: &aws_sdk_sts::Client,
    role: &RoleProfile,
    tokens: &dyn TokenSource,
) -> Result<Credentials> {
    let code = tokens.token_code(&role.mfa_serial).await?;

    let mut request = sts
        .assume_role()
        .role_arn(&role.role_arn)
        .role_session_name(role.session_name())
        .serial_number(&role.mfa_serial)
        .token_code(code);
    if let Some(seconds) = role.duration_seconds {
        request = request.duration_seconds(seconds);
    }
    if let Some(external_id) = &role.external_id {
        request = request.external_id(external_id);
    }

    let response = request.send().await.map_err(|e| {
        classify(
            &DisplayErrorContext(&e).to_string(),
            &format!("AssumeRole {}", role.role_arn),
        )
    })?;
    let session = response.credentials().ok_or_else(|| {
        Error::Auth(format!("AssumeRole {} returned no credentials", role.role_arn))
    })?;

    tracing::debug!(role = %role.role_arn, expires = %session.expiration(), "assumed role with MFA");
    Ok(Credentials::new(
        session.access_key_id(),
        session.secret_access_key(),
        Some(session.session_token().to_string()),
        SystemTime::try_from(*session.expiration()).ok(),
        PROVIDER_NAME,
    ))
}

/// Build the shared SDK config from MFA session credentials.
///
/// Region precedence: `--region`, the role profile's `region`, then whatever
/// the source profile resolves to.
pub async fn load_mfa_config(
    options: &ConnectionOptions,
    role: &RoleProfile,
    tokens: &dyn TokenSource,
) -> Result<SdkConfig> {
    let Some(source_profile) = &role.source_profile else {
        return Err(Error::Config(format!(
            "role {} sets mfa_serial but no source_profile",
            role.role_arn
        )));
    };

    let region = options.region.clone().or_else(|| role.region.clone());
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).profile_name(source_profile);
    if let Some(region) = &region {
        loader = loader.region(Region::new(region.clone()));
    }
    let source = loader.load().await;

    let sts = aws_sdk_sts::Client::new(&source);
    let credentials = assume_role_with_mfa(&sts, role, tokens).await?;

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).credentials_provider(credentials);
    if let Some(region) = region.or_else(|| source.region().map(|r| r.to_string())) {
        loader = loader.region(Region::new(region));
    }
    Ok(loader.load().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHARED_CONFIG: &str = r#"
[default]
region = us-east-1

# MFA-protected admin role
[profile admin]
role_arn = arn:aws:iam::111122223333:role/admin
mfa_serial = arn:aws:iam::444455556666:mfa/alice
source_profile = default
duration_seconds = 3600
region = eu-west-1

[profile plain-role]
role_arn = arn:aws:iam::111122223333:role/reader
source_profile = default
"#;

    struct FixedToken(&'static str);

    #[async_trait]
    impl TokenSource for FixedToken {
        async fn token_code(&self, _mfa_serial: &str) -> Result<String> {
            check_token_code(self.0)
        }
    }

    #[test]
    fn test_parse_mfa_role_profile() {
        let role = parse_role_profile(SHARED_CONFIG, "admin").unwrap().unwrap();
        assert_eq!(role.role_arn, "arn:aws:iam::111122223333:role/admin");
        assert_eq!(role.mfa_serial, "arn:aws:iam::444455556666:mfa/alice");
        assert_eq!(role.source_profile.as_deref(), Some("default"));
        assert_eq!(role.region.as_deref(), Some("eu-west-1"));
        assert_eq!(role.duration_seconds, Some(3600));
        assert!(role.external_id.is_none());
    }

    #[test]
    fn test_profiles_without_mfa_are_left_to_the_sdk() {
        assert!(parse_role_profile(SHARED_CONFIG, "plain-role").unwrap().is_none());
        assert!(parse_role_profile(SHARED_CONFIG, "default").unwrap().is_none());
        assert!(parse_role_profile(SHARED_CONFIG, "missing").unwrap().is_none());
    }

    #[test]
    fn test_bad_duration_is_config_error() {
        let content = "[profile x]\nrole_arn = r\nmfa_serial = m\nduration_seconds = soon\n";
        let err = parse_role_profile(content, "x").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_session_name() {
        let mut role = parse_role_profile(SHARED_CONFIG, "admin").unwrap().unwrap();
        assert!(role.session_name().starts_with("csesync-"));
        role.role_session_name = Some("ops".into());
        assert_eq!(role.session_name(), "ops");
    }

    #[test]
    fn test_check_token_code() {
        assert_eq!(check_token_code("123456\n").unwrap(), "123456");
        assert_eq!(check_token_code("  012345 ").unwrap(), "012345");
        assert!(matches!(check_token_code(""), Err(Error::Auth(_))));
        assert!(check_token_code("12345").is_err());
        assert!(check_token_code("12a456").is_err());
    }

    #[tokio::test]
    async fn test_token_source() {
        assert_eq!(FixedToken("654321").token_code("m").await.unwrap(), "654321");
        assert!(FixedToken("nope").token_code("m").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_source_profile_rejected_before_prompt() {
        struct NeverAsked;

        #[async_trait]
        impl TokenSource for NeverAsked {
            async fn token_code(&self, _mfa_serial: &str) -> Result<String> {
                panic!("token requested without a source profile");
            }
        }

        let content = "[profile x]\nrole_arn = r\nmfa_serial = m\n";
        let role = parse_role_profile(content, "x").unwrap().unwrap();
        let err = load_mfa_config(&ConnectionOptions::default(), &role, &NeverAsked)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_selected_profile_prefers_flag() {
        assert_eq!(selected_profile(Some("admin")), "admin");
    }
}
