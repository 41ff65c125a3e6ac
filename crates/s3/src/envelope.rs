//! Client-side envelope encryption
//!
//! Objects are stored in the S3 Encryption Client v2 layout so that other
//! S3EC implementations can read what this tool writes and vice versa:
//!
//! - a fresh 256-bit data key per object, obtained from KMS
//!   (`GenerateDataKey`) under an encryption context
//! - the body is `AES/GCM/NoPadding` ciphertext with the 16-byte tag appended
//! - the wrapped key, IV and context travel as user metadata
//!
//! Reading refuses anything else (v1 `x-amz-key`, CBC content, `kms` wrapping
//! without a context).

use std::collections::HashMap;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use aws_sdk_kms::error::DisplayErrorContext;
use aws_sdk_kms::types::DataKeySpec;
use aws_smithy_types::Blob;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;

use cse_core::{Error, Result};

use crate::client::RawObject;

pub const META_KEY_V2: &str = "x-amz-key-v2";
pub const META_KEY_V1: &str = "x-amz-key";
pub const META_IV: &str = "x-amz-iv";
pub const META_MATDESC: &str = "x-amz-matdesc";
pub const META_WRAP_ALG: &str = "x-amz-wrap-alg";
pub const META_CEK_ALG: &str = "x-amz-cek-alg";
pub const META_TAG_LEN: &str = "x-amz-tag-len";
pub const META_PLAINTEXT_LEN: &str = "x-amz-unencrypted-content-length";

pub const WRAP_ALG_KMS_CONTEXT: &str = "kms+context";
pub const CEK_ALG_AES_GCM: &str = "AES/GCM/NoPadding";
/// Encryption context entry binding the wrapped key to the content cipher
pub const CONTEXT_CEK_ALG: &str = "aws:x-amz-cek-alg";

const TAG_LEN_BITS: &str = "128";
const IV_LEN: usize = 12;
const DATA_KEY_LEN: usize = 32;

/// A freshly generated data key in both forms
pub struct DataKey {
    pub plaintext: Vec<u8>,
    pub wrapped: Vec<u8>,
}

/// Source of data keys for envelope encryption
#[async_trait]
pub trait DataKeyProvider: Send + Sync {
    /// Generate a 256-bit data key bound to `context`
    async fn generate(&self, context: &HashMap<String, String>) -> Result<DataKey>;

    /// Unwrap a data key; fails if `context` differs from the one it was generated under
    async fn unwrap(&self, wrapped: &[u8], context: &HashMap<String, String>) -> Result<Vec<u8>>;
}

/// KMS-backed data key provider using a single customer master key
#[derive(Debug, Clone)]
pub struct KmsKeyring {
    client: aws_sdk_kms::Client,
    key_id: String,
}

impl KmsKeyring {
    pub fn new(client: aws_sdk_kms::Client, key_id: impl Into<String>) -> Self {
        Self {
            client,
            key_id: key_id.into(),
        }
    }
}

#[async_trait]
impl DataKeyProvider for KmsKeyring {
    async fn generate(&self, context: &HashMap<String, String>) -> Result<DataKey> {
        let response = self
            .client
            .generate_data_key()
            .key_id(&self.key_id)
            .key_spec(DataKeySpec::Aes256)
            .set_encryption_context(Some(context.clone()))
            .send()
            .await
            .map_err(|e| classify_kms(&DisplayErrorContext(&e).to_string(), &self.key_id))?;

        let plaintext = response
            .plaintext()
            .map(|b| b.as_ref().to_vec())
            .ok_or_else(|| Error::General("KMS returned no plaintext data key".into()))?;
        let wrapped = response
            .ciphertext_blob()
            .map(|b| b.as_ref().to_vec())
            .ok_or_else(|| Error::General("KMS returned no wrapped data key".into()))?;

        Ok(DataKey { plaintext, wrapped })
    }

    async fn unwrap(&self, wrapped: &[u8], context: &HashMap<String, String>) -> Result<Vec<u8>> {
        let response = self
            .client
            .decrypt()
            .key_id(&self.key_id)
            .ciphertext_blob(Blob::new(wrapped.to_vec()))
            .set_encryption_context(Some(context.clone()))
            .send()
            .await
            .map_err(|e| classify_kms(&DisplayErrorContext(&e).to_string(), &self.key_id))?;

        response
            .plaintext()
            .map(|b| b.as_ref().to_vec())
            .ok_or_else(|| Error::General("KMS returned no plaintext data key".into()))
    }
}

fn classify_kms(err_str: &str, key_id: &str) -> Error {
    if err_str.contains("InvalidCiphertextException")
        || err_str.contains("IncorrectKeyException")
    {
        Error::Integrity(format!("data key could not be unwrapped with {key_id}: {err_str}"))
    } else if err_str.contains("NotFoundException") {
        Error::NotFound(format!("KMS key {key_id}: {err_str}"))
    } else if err_str.contains("AccessDenied")
        || err_str.contains("DisabledException")
        || err_str.contains("credentials")
    {
        Error::Auth(format!("KMS key {key_id}: {err_str}"))
    } else {
        Error::Network(format!("KMS: {err_str}"))
    }
}

/// The encryption context written for every new object
fn default_context() -> HashMap<String, String> {
    HashMap::from([(CONTEXT_CEK_ALG.to_string(), CEK_ALG_AES_GCM.to_string())])
}

/// Encrypt `plaintext` under a new data key and build the object to store.
pub async fn seal<P: DataKeyProvider + ?Sized>(provider: &P, plaintext: &[u8]) -> Result<RawObject> {
    let context = default_context();
    let data_key = provider.generate(&context).await?;
    if data_key.plaintext.len() != DATA_KEY_LEN {
        return Err(Error::General(format!(
            "data key is {} bytes, expected {DATA_KEY_LEN}",
            data_key.plaintext.len()
        )));
    }

    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);

    let cipher = Aes256Gcm::new_from_slice(&data_key.plaintext)
        .map_err(|e| Error::General(format!("invalid data key: {e}")))?;
    let body = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| Error::General("content encryption failed".into()))?;

    let matdesc =
        serde_json::to_string(&context).map_err(|e| Error::General(e.to_string()))?;

    let metadata = HashMap::from([
        (META_KEY_V2.to_string(), STANDARD.encode(&data_key.wrapped)),
        (META_IV.to_string(), STANDARD.encode(iv)),
        (META_MATDESC.to_string(), matdesc),
        (META_WRAP_ALG.to_string(), WRAP_ALG_KMS_CONTEXT.to_string()),
        (META_CEK_ALG.to_string(), CEK_ALG_AES_GCM.to_string()),
        (META_TAG_LEN.to_string(), TAG_LEN_BITS.to_string()),
        (META_PLAINTEXT_LEN.to_string(), plaintext.len().to_string()),
    ]);

    Ok(RawObject { body, metadata })
}

/// Verify and decrypt a stored object.
///
/// Any mismatch in the envelope, the wrapped key or the GCM tag is an
/// [`Error::Integrity`]; no plaintext is returned in that case.
pub async fn open<P: DataKeyProvider + ?Sized>(provider: &P, object: RawObject) -> Result<Vec<u8>> {
    let meta = &object.metadata;

    if !meta.contains_key(META_KEY_V2) {
        return Err(if meta.contains_key(META_KEY_V1) {
            Error::Integrity("legacy v1 envelope (x-amz-key) is not supported".into())
        } else {
            Error::Integrity("object is not client-side encrypted".into())
        });
    }

    let wrap_alg = required(meta, META_WRAP_ALG)?;
    if wrap_alg != WRAP_ALG_KMS_CONTEXT {
        return Err(Error::Integrity(format!(
            "key wrapping algorithm '{wrap_alg}' is not supported"
        )));
    }
    let cek_alg = required(meta, META_CEK_ALG)?;
    if cek_alg != CEK_ALG_AES_GCM {
        return Err(Error::Integrity(format!(
            "content encryption algorithm '{cek_alg}' is not supported"
        )));
    }
    if let Some(tag_len) = meta.get(META_TAG_LEN)
        && tag_len != TAG_LEN_BITS
    {
        return Err(Error::Integrity(format!("unsupported tag length {tag_len}")));
    }

    let context: HashMap<String, String> = serde_json::from_str(required(meta, META_MATDESC)?)
        .map_err(|e| Error::Integrity(format!("malformed {META_MATDESC}: {e}")))?;
    if context.get(CONTEXT_CEK_ALG).map(String::as_str) != Some(cek_alg) {
        return Err(Error::Integrity(
            "encryption context does not match the content algorithm".into(),
        ));
    }

    let wrapped = decode(meta, META_KEY_V2)?;
    let iv = decode(meta, META_IV)?;
    if iv.len() != IV_LEN {
        return Err(Error::Integrity(format!("IV is {} bytes, expected {IV_LEN}", iv.len())));
    }

    let data_key = provider.unwrap(&wrapped, &context).await?;
    let cipher = Aes256Gcm::new_from_slice(&data_key)
        .map_err(|_| Error::Integrity("unwrapped data key has the wrong length".into()))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), object.body.as_slice())
        .map_err(|_| Error::Integrity("authentication tag mismatch".into()))?;

    if let Some(expected) = meta.get(META_PLAINTEXT_LEN)
        && expected.parse::<usize>().ok() != Some(plaintext.len())
    {
        return Err(Error::Integrity(format!(
            "decrypted length {} does not match recorded length {expected}",
            plaintext.len()
        )));
    }

    Ok(plaintext)
}

fn required<'a>(meta: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    meta.get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::Integrity(format!("missing {name} metadata")))
}

fn decode(meta: &HashMap<String, String>, name: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(required(meta, name)?)
        .map_err(|e| Error::Integrity(format!("malformed {name}: {e}")))
}
