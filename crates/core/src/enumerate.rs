//! Namespace enumeration
//!
//! Produces the member set that [`crate::mapping`] maps: object keys under
//! a prefix for downloads, non-directory entries of a local tree for
//! uploads.

use std::path::{Path, PathBuf};

use futures::{Stream, TryStreamExt};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::path::{RemoteRef, is_prefix};
use crate::traits::{SealedStore, cancellable};

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Lazily list every key under `prefix`, following continuation tokens
/// until the backend reports the last page.
///
/// Restarting means calling this again; no state is kept between calls.
pub fn list_keys<'a, S>(
    store: &'a S,
    bucket: &'a str,
    prefix: &'a str,
    cancel: &'a CancellationToken,
) -> impl Stream<Item = Result<String>> + 'a
where
    S: SealedStore + ?Sized,
{
    futures::stream::try_unfold(Cursor::Start, move |cursor| async move {
        let token = match cursor {
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
            Cursor::Done => return Ok(None),
        };
        let page = cancellable(cancel, store.list_page(bucket, prefix, token)).await?;
        tracing::debug!(prefix, keys = page.keys.len(), more = page.next.is_some(), "listed page");
        let next = match page.next {
            Some(token) => Cursor::Next(token),
            None => Cursor::Done,
        };
        let keys = futures::stream::iter(page.keys.into_iter().map(Ok::<String, Error>));
        Ok::<_, Error>(Some((keys, next)))
    })
    .try_flatten()
}

/// Member keys of a download request.
///
/// A prefix is listed in full; folder-marker keys (ending in `/`) are not
/// objects to download and are dropped. A single key is its own member set
/// and causes no listing call.
pub async fn list_members<S>(
    store: &S,
    remote: &RemoteRef,
    cancel: &CancellationToken,
) -> Result<Vec<String>>
where
    S: SealedStore + ?Sized,
{
    if !remote.is_prefix() {
        return Ok(vec![remote.key.clone()]);
    }

    let keys: Vec<String> = list_keys(store, &remote.bucket, &remote.key, cancel)
        .try_collect()
        .await?;

    Ok(keys
        .into_iter()
        .filter(|key| {
            if is_prefix(key) {
                tracing::debug!(key = %key, "skipping folder marker");
                false
            } else {
                true
            }
        })
        .collect())
}

/// Every non-directory entry under `base`, in file-name order.
///
/// `base` may be a single file, in which case it is the only entry.
/// Symlinks are not followed; the first traversal error aborts the walk.
pub fn walk_local(base: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(base).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        files.push(entry.into_path());
    }
    tracing::debug!(base = %base.display(), files = files.len(), "walked local tree");
    Ok(files)
}
