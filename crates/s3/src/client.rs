//! S3 client implementation
//!
//! Wraps aws-sdk-s3 for the three raw operations the encrypted store needs:
//! paginated listing, whole-object get with user metadata, and put with
//! user metadata.

use std::collections::HashMap;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;

use cse_core::{ConnectionOptions, Error, ListPage, Result};

use crate::credentials::{
    StdinTokenSource, TokenSource, load_mfa_config, read_role_profile, selected_profile,
};

/// Maximum keys requested per listing page
pub const LIST_PAGE_SIZE: i32 = 1000;

/// Object body plus its user metadata
#[derive(Debug, Clone, Default)]
pub struct RawObject {
    pub body: Vec<u8>,
    pub metadata: HashMap<String, String>,
}

/// Load shared AWS configuration (credentials, region) for a run.
///
/// Credentials come from the default provider chain; `profile` selects a
/// named profile from the shared config files. A profile that assumes a
/// role behind MFA prompts for the one-time code on stdin.
pub async fn load_sdk_config(options: &ConnectionOptions) -> Result<SdkConfig> {
    load_sdk_config_with(options, &StdinTokenSource).await
}

/// [`load_sdk_config`] with a caller-supplied MFA code source
pub async fn load_sdk_config_with(
    options: &ConnectionOptions,
    tokens: &dyn TokenSource,
) -> Result<SdkConfig> {
    let profile = selected_profile(options.profile.as_deref());
    if let Some(role) = read_role_profile(&profile)? {
        tracing::debug!(profile = %profile, role = %role.role_arn, "profile requires MFA");
        return load_mfa_config(options, &role, tokens).await;
    }

    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(profile) = &options.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(region) = &options.region {
        loader = loader.region(Region::new(region.clone()));
    }
    Ok(loader.load().await)
}

/// S3 client wrapper
#[derive(Debug, Clone)]
pub struct S3Client {
    inner: aws_sdk_s3::Client,
}

impl S3Client {
    /// Create a new S3 client from shared config and connection options
    ///
    /// A custom endpoint applies to S3 only, never to KMS.
    pub fn new(config: &SdkConfig, options: &ConnectionOptions) -> Self {
        let mut builder =
            aws_sdk_s3::config::Builder::from(config).force_path_style(options.force_path_style);
        if let Some(endpoint) = &options.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            inner: aws_sdk_s3::Client::from_conf(builder.build()),
        }
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    /// List one page of keys under `prefix` (recursive, no delimiter)
    pub async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        let response = self
            .inner
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(LIST_PAGE_SIZE)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| classify(&DisplayErrorContext(&e).to_string(), bucket))?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();

        let next = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage { keys, next })
    }

    /// Fetch an object's bytes and user metadata
    pub async fn get_raw(&self, bucket: &str, key: &str) -> Result<RawObject> {
        let response = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(&DisplayErrorContext(&e).to_string(), &format!("{bucket}/{key}")))?;

        let metadata = response.metadata().cloned().unwrap_or_default();
        let body = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(RawObject { body, metadata })
    }

    /// Store bytes with user metadata, replacing any existing object
    pub async fn put_raw(
        &self,
        bucket: &str,
        key: &str,
        object: RawObject,
        content_type: Option<&str>,
    ) -> Result<()> {
        let mut request = self
            .inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_metadata(Some(object.metadata))
            .body(ByteStream::from(object.body));

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request
            .send()
            .await
            .map_err(|e| classify(&DisplayErrorContext(&e).to_string(), &format!("{bucket}/{key}")))?;

        Ok(())
    }
}

/// Map an SDK error message onto the error taxonomy.
pub(crate) fn classify(err_str: &str, what: &str) -> Error {
    if err_str.contains("NoSuchKey")
        || err_str.contains("NoSuchBucket")
        || err_str.contains("NotFound")
    {
        Error::NotFound(format!("{what}: {err_str}"))
    } else if err_str.contains("AccessDenied")
        || err_str.contains("InvalidAccessKeyId")
        || err_str.contains("SignatureDoesNotMatch")
        || err_str.contains("ExpiredToken")
        || err_str.contains("InvalidClientTokenId")
        || err_str.contains("credentials")
    {
        Error::Auth(format!("{what}: {err_str}"))
    } else {
        Error::Network(format!("{what}: {err_str}"))
    }
}
