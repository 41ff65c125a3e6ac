//! Encrypted object store
//!
//! [`SealedStore`] over S3 with client-side envelope encryption. Listing is
//! passed through; `get` and `put` buffer one object at a time and run it
//! through [`envelope`](crate::envelope).

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use cse_core::{ByteReader, ConnectionOptions, ListPage, Result, SealedStore};

use crate::client::{S3Client, load_sdk_config};
use crate::envelope::{self, DataKeyProvider, KmsKeyring};

/// S3 client that encrypts on put and decrypts on get
pub struct EncryptedS3Client<K = KmsKeyring> {
    s3: S3Client,
    keyring: K,
}

impl EncryptedS3Client<KmsKeyring> {
    /// Build S3 and KMS clients from the default credential chain.
    pub async fn connect(options: &ConnectionOptions, kms_key_arn: &str) -> Result<Self> {
        let sdk_config = load_sdk_config(options).await?;
        tracing::debug!(
            region = ?sdk_config.region(),
            endpoint = ?options.endpoint_url,
            "AWS configuration loaded"
        );

        let s3 = S3Client::new(&sdk_config, options);
        let kms = aws_sdk_kms::Client::new(&sdk_config);
        Ok(Self::new(s3, KmsKeyring::new(kms, kms_key_arn)))
    }
}

impl<K: DataKeyProvider> EncryptedS3Client<K> {
    pub fn new(s3: S3Client, keyring: K) -> Self {
        Self { s3, keyring }
    }
}

#[async_trait]
impl<K: DataKeyProvider> SealedStore for EncryptedS3Client<K> {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        self.s3.list_page(bucket, prefix, continuation).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<ByteReader> {
        let object = self.s3.get_raw(bucket, key).await?;
        tracing::debug!(bucket, key, size = object.body.len(), "fetched encrypted object");
        let plaintext = envelope::open(&self.keyring, object).await?;
        Ok(Box::new(std::io::Cursor::new(plaintext)))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        mut body: ByteReader,
        content_type: Option<String>,
    ) -> Result<u64> {
        let mut plaintext = Vec::new();
        body.read_to_end(&mut plaintext).await?;
        let size = plaintext.len() as u64;

        let object = envelope::seal(&self.keyring, &plaintext).await?;
        self.s3
            .put_raw(bucket, key, object, content_type.as_deref())
            .await?;
        tracing::debug!(bucket, key, size, "stored encrypted object");
        Ok(size)
    }
}
