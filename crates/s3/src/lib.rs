//! cse-s3: S3 and KMS adapter for cse-sync
//!
//! This crate provides the implementation of the SealedStore trait using
//! aws-sdk-s3 for storage and aws-sdk-kms for data keys. Profiles that
//! assume a role behind MFA go through aws-sdk-sts. It is the only crate
//! that directly depends on the AWS SDK.

pub mod client;
pub mod credentials;
pub mod envelope;
pub mod store;

pub use client::{RawObject, S3Client};
pub use credentials::{RoleProfile, StdinTokenSource, TokenSource};
pub use envelope::{DataKeyProvider, KmsKeyring};
pub use store::EncryptedS3Client;
