//! SealedStore trait definition
//!
//! The storage backend as seen by the sync engine: list keys under a prefix,
//! read an object's plaintext, write plaintext to a key. Encryption on write
//! and decryption with integrity checking on read happen behind this trait,
//! so the engine never sees ciphertext or key material.

use std::future::Future;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Plaintext byte stream handed across the confidentiality boundary
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// One page of a prefix listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Object keys on this page, in backend order
    pub keys: Vec<String>,

    /// Token for the next page; `None` when the listing is exhausted
    pub next: Option<String>,
}

/// Object storage with client-side confidentiality
///
/// Implemented by the S3 adapter and mocked in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SealedStore: Send + Sync {
    /// List object keys starting with `prefix`, recursively.
    ///
    /// `continuation` is the `next` token of the previous page.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage>;

    /// Fetch and decrypt an object.
    ///
    /// Fails with [`Error::Integrity`] if the payload does not authenticate.
    async fn get(&self, bucket: &str, key: &str) -> Result<ByteReader>;

    /// Encrypt and store `body` at `key`, replacing any existing object.
    ///
    /// Returns the number of plaintext bytes consumed.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: ByteReader,
        content_type: Option<String>,
    ) -> Result<u64>;
}

/// Race `fut` against the run's cancellation token.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancellable_passes_result_through() {
        let cancel = CancellationToken::new();
        let value = cancellable(&cancel, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancellable_aborts_pending_future() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> = cancellable(&cancel, std::future::pending()).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_list_page_default_is_last() {
        let page = ListPage::default();
        assert!(page.keys.is_empty());
        assert!(page.next.is_none());
    }
}
