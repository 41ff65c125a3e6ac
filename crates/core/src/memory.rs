//! In-memory [`SealedStore`] for tests
//!
//! Objects are kept as plaintext in a map. Listing pages through keys in
//! lexical order, `page_size` at a time, so pagination is exercised too.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use crate::error::{Error, Result};
use crate::traits::{ByteReader, ListPage, SealedStore};

#[derive(Debug)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    page_size: usize,
}

impl MemoryStore {
    /// Creates a new, empty `MemoryStore`.
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    /// Creates an empty store whose listings return at most `page_size` keys per page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Stores an object directly.
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.lock()
            .insert((bucket.to_string(), key.to_string()), data.into());
    }

    /// Returns a copy of an object's contents.
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// All keys in `bucket`, in lexical order.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), Vec<u8>>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SealedStore for MemoryStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        let matching: Vec<String> = self
            .keys(bucket)
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| continuation.as_deref().is_none_or(|after| k.as_str() > after))
            .collect();

        let next = (matching.len() > self.page_size).then(|| matching[self.page_size - 1].clone());
        let keys = matching.into_iter().take(self.page_size).collect();
        Ok(ListPage { keys, next })
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<ByteReader> {
        let data = self
            .object(bucket, key)
            .ok_or_else(|| Error::NotFound(format!("{bucket}/{key}")))?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        mut body: ByteReader,
        _content_type: Option<String>,
    ) -> Result<u64> {
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;
        let len = data.len() as u64;
        self.insert(bucket, key, data);
        Ok(len)
    }
}
