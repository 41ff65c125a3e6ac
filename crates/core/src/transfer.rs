//! Transfer execution
//!
//! Moves mapped items one at a time through the [`SealedStore`]. Each item
//! owns its file handle and stream for exactly the duration of that item.
//! The first failure stops the run; items already transferred stay where
//! they are.

use std::path::Path;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::mapping::TransferItem;
use crate::traits::{SealedStore, cancellable};

/// Receives per-item progress from a run
///
/// The core never prints; the CLI implements this to show progress.
pub trait TransferObserver: Send + Sync {
    /// Mapping is complete and `items` are about to be transferred
    fn planned(&self, _items: &[TransferItem]) {}

    /// Item `index` (zero-based) of `total` is starting
    fn started(&self, _item: &TransferItem, _index: usize, _total: usize) {}

    /// Item finished after moving `bytes` of plaintext
    fn finished(&self, _item: &TransferItem, _bytes: u64) {}
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {}

/// Executes transfer items sequentially against one bucket
pub struct TransferExecutor<'a, S: SealedStore + ?Sized> {
    store: &'a S,
    bucket: &'a str,
    cancel: &'a CancellationToken,
    observer: &'a dyn TransferObserver,
}

impl<'a, S: SealedStore + ?Sized> TransferExecutor<'a, S> {
    pub fn new(
        store: &'a S,
        bucket: &'a str,
        cancel: &'a CancellationToken,
        observer: &'a dyn TransferObserver,
    ) -> Self {
        Self {
            store,
            bucket,
            cancel,
            observer,
        }
    }

    /// Transfer every item in order, stopping at the first error.
    ///
    /// `on_item` is invoked with the index of each item before it starts.
    /// Returns the total number of plaintext bytes moved.
    pub async fn run(
        &self,
        items: &[TransferItem],
        mut on_item: impl FnMut(usize),
    ) -> Result<u64> {
        let total = items.len();
        let mut bytes = 0;

        for (index, item) in items.iter().enumerate() {
            on_item(index);
            self.observer.started(item, index, total);

            let moved = self
                .transfer(item)
                .await
                .map_err(|e| e.context(item.describe(self.bucket)))?;

            tracing::debug!(item = %item.describe(self.bucket), bytes = moved, "transferred");
            self.observer.finished(item, moved);
            bytes += moved;
        }

        Ok(bytes)
    }

    /// Transfer a single item
    pub async fn transfer(&self, item: &TransferItem) -> Result<u64> {
        match item {
            TransferItem::Download { key, path } => self.download(key, path).await,
            TransferItem::Upload { path, key } => self.upload(path, key).await,
        }
    }

    async fn download(&self, key: &str, path: &Path) -> Result<u64> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut body = cancellable(self.cancel, self.store.get(self.bucket, key)).await?;
        let mut file = tokio::fs::File::create(path).await?;

        let copied = cancellable(self.cancel, async {
            let n = tokio::io::copy(&mut body, &mut file).await?;
            file.flush().await?;
            Ok::<_, Error>(n)
        })
        .await;

        drop(file);
        if copied.is_err() {
            // A half-written file is not a transferred item.
            if let Err(e) = tokio::fs::remove_file(path).await {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove partial file");
            }
        }
        copied
    }

    async fn upload(&self, path: &Path, key: &str) -> Result<u64> {
        let file = tokio::fs::File::open(path).await?;
        let content_type = mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string());

        cancellable(
            self.cancel,
            self.store
                .put(self.bucket, key, Box::new(file), content_type),
        )
        .await
    }
}
