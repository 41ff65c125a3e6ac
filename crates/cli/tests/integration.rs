//! Integration tests for csesync against real S3 and KMS
//!
//! These tests need AWS credentials from the default chain, an existing
//! bucket and a KMS key the credentials may use for GenerateDataKey and
//! Decrypt.
//!
//! Run with:
//! ```bash
//! export TEST_S3_BUCKET=my-test-bucket
//! export TEST_KMS_KEY_ARN=arn:aws:kms:us-east-1:111122223333:key/...
//! export TEST_AWS_REGION=us-east-1          # optional
//! cargo test -p cse-sync --features integration
//! ```
//!
//! Every test writes under a unique prefix and deletes it afterwards.

#![cfg(feature = "integration")]

use std::path::Path;
use std::process::{Command, Output};

use cse_core::ConnectionOptions;
use cse_s3::client::load_sdk_config;
use cse_s3::envelope::{CEK_ALG_AES_GCM, META_CEK_ALG, META_KEY_V2, META_WRAP_ALG};
use cse_s3::S3Client;
use tempfile::TempDir;

struct Env {
    bucket: String,
    kms_key_arn: String,
    region: Option<String>,
}

fn env() -> Option<Env> {
    Some(Env {
        bucket: std::env::var("TEST_S3_BUCKET").ok()?,
        kms_key_arn: std::env::var("TEST_KMS_KEY_ARN").ok()?,
        region: std::env::var("TEST_AWS_REGION").ok(),
    })
}

fn unique_prefix(name: &str) -> String {
    let nanos = jiff::Timestamp::now().as_nanosecond();
    format!("csesync-it/{name}-{:x}/", nanos % 0xFFFF_FFFF)
}

fn run_csesync(env: &Env, args: &[&str], config_dir: &Path) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_csesync"));
    cmd.args(["--bucket", &env.bucket, "--kms-key-arn", &env.kms_key_arn, "--no-progress"]);
    if let Some(region) = &env.region {
        cmd.args(["--region", region]);
    }
    cmd.args(args);
    cmd.env("CSE_SYNC_CONFIG_DIR", config_dir);
    cmd.output().expect("Failed to execute csesync")
}

async fn s3(env: &Env) -> S3Client {
    let options = ConnectionOptions {
        region: env.region.clone(),
        ..Default::default()
    };
    let sdk_config = load_sdk_config(&options).await.unwrap();
    S3Client::new(&sdk_config, &options)
}

async fn cleanup(env: &Env, prefix: &str) {
    let client = s3(env).await;
    let mut continuation = None;
    loop {
        let page = client
            .list_page(&env.bucket, prefix, continuation)
            .await
            .unwrap();
        for key in &page.keys {
            let _ = client
                .inner()
                .delete_object()
                .bucket(&env.bucket)
                .key(key)
                .send()
                .await;
        }
        match page.next {
            Some(next) => continuation = Some(next),
            None => break,
        }
    }
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[tokio::test]
async fn test_upload_then_download_prefix() {
    let Some(env) = env() else {
        eprintln!("Skipping: TEST_S3_BUCKET / TEST_KMS_KEY_ARN not set");
        return;
    };
    let config_dir = TempDir::new().unwrap();
    let prefix = unique_prefix("roundtrip");

    let data = TempDir::new().unwrap();
    write(&data.path().join("x.txt"), "hello");
    write(&data.path().join("sub").join("y.txt"), "world");

    let output = run_csesync(
        &env,
        &["--upload", "--object-key", &prefix, "--path", data.path().to_str().unwrap()],
        config_dir.path(),
    );
    assert!(output.status.success(), "upload failed: {}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Uploading:"));

    let out = TempDir::new().unwrap();
    let output = run_csesync(
        &env,
        &["--download", "--object-key", &prefix, "--path", out.path().to_str().unwrap()],
        config_dir.path(),
    );
    assert!(output.status.success(), "download failed: {}", String::from_utf8_lossy(&output.stderr));

    assert_eq!(std::fs::read_to_string(out.path().join("x.txt")).unwrap(), "hello");
    assert_eq!(
        std::fs::read_to_string(out.path().join("sub").join("y.txt")).unwrap(),
        "world"
    );

    cleanup(&env, &prefix).await;
}

#[tokio::test]
async fn test_stored_objects_are_encrypted() {
    let Some(env) = env() else {
        eprintln!("Skipping: TEST_S3_BUCKET / TEST_KMS_KEY_ARN not set");
        return;
    };
    let config_dir = TempDir::new().unwrap();
    let prefix = unique_prefix("sealed");

    let data = TempDir::new().unwrap();
    let file = data.path().join("secret.txt");
    write(&file, "top secret plaintext");

    let output = run_csesync(
        &env,
        &["--upload", "--object-key", &prefix, "--path", file.to_str().unwrap()],
        config_dir.path(),
    );
    assert!(output.status.success(), "upload failed: {}", String::from_utf8_lossy(&output.stderr));

    let raw = s3(&env)
        .await
        .get_raw(&env.bucket, &format!("{prefix}secret.txt"))
        .await
        .unwrap();
    assert!(raw.metadata.contains_key(META_KEY_V2));
    assert_eq!(raw.metadata[META_WRAP_ALG], "kms+context");
    assert_eq!(raw.metadata[META_CEK_ALG], CEK_ALG_AES_GCM);
    assert!(!String::from_utf8_lossy(&raw.body).contains("top secret"));

    cleanup(&env, &prefix).await;
}

#[tokio::test]
async fn test_plaintext_object_is_rejected() {
    let Some(env) = env() else {
        eprintln!("Skipping: TEST_S3_BUCKET / TEST_KMS_KEY_ARN not set");
        return;
    };
    let config_dir = TempDir::new().unwrap();
    let prefix = unique_prefix("plain");
    let key = format!("{prefix}plain.txt");

    let object = cse_s3::RawObject {
        body: b"not encrypted".to_vec(),
        metadata: Default::default(),
    };
    s3(&env)
        .await
        .put_raw(&env.bucket, &key, object, None)
        .await
        .unwrap();

    let out = TempDir::new().unwrap();
    let output = run_csesync(
        &env,
        &["--download", "--object-key", &key, "--path", out.path().to_str().unwrap()],
        config_dir.path(),
    );
    assert_eq!(output.status.code(), Some(8));
    assert!(!out.path().join("plain.txt").exists());

    cleanup(&env, &prefix).await;
}

#[tokio::test]
async fn test_json_report() {
    let Some(env) = env() else {
        eprintln!("Skipping: TEST_S3_BUCKET / TEST_KMS_KEY_ARN not set");
        return;
    };
    let config_dir = TempDir::new().unwrap();
    let prefix = unique_prefix("json");

    let data = TempDir::new().unwrap();
    write(&data.path().join("a.txt"), "a");

    let output = run_csesync(
        &env,
        &["--json", "--upload", "--object-key", &prefix, "--path", data.path().to_str().unwrap()],
        config_dir.path(),
    );
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "success");
    assert_eq!(report["direction"], "upload");
    assert_eq!(report["item_count"], 1);
    assert_eq!(report["items"][0]["key"], format!("{prefix}a.txt"));

    cleanup(&env, &prefix).await;
}

#[test]
fn test_missing_mode_exits_with_usage_error() {
    let Some(env) = env() else {
        eprintln!("Skipping: TEST_S3_BUCKET / TEST_KMS_KEY_ARN not set");
        return;
    };
    let config_dir = TempDir::new().unwrap();
    let output = run_csesync(&env, &["--object-key", "x", "--path", "/tmp"], config_dir.path());
    assert_eq!(output.status.code(), Some(2));
}
