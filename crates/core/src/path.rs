//! Remote and local references
//!
//! A remote reference is a bucket plus a key. A key ending in `/` names a
//! prefix (a virtual folder holding zero or more objects); any other key
//! names exactly one object. Local references are classified by asking the
//! filesystem, never by their spelling.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};

/// Separator used in object keys, independent of the host OS
pub const KEY_SEPARATOR: char = '/';

/// A bucket/key location in object storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteRef {
    /// Bucket name
    pub bucket: String,
    /// Object key or key prefix
    pub key: String,
}

impl RemoteRef {
    /// Create a new RemoteRef
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Whether the key denotes a prefix rather than a single object
    pub fn is_prefix(&self) -> bool {
        is_prefix(&self.key)
    }
}

impl std::fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Kind of a local path as reported by the filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalKind {
    File,
    Directory,
    Missing,
}

/// A local filesystem location and its discovered kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRef {
    pub path: PathBuf,
    pub kind: LocalKind,
}

impl LocalRef {
    /// Query the filesystem for the kind of `path`.
    ///
    /// Symlinks are followed. A path that does not exist is reported as
    /// [`LocalKind::Missing`]; any other metadata failure is an error.
    pub fn discover(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let kind = match std::fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => LocalKind::Directory,
            Ok(_) => LocalKind::File,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LocalKind::Missing,
            Err(e) => {
                return Err(Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("{}: {e}", path.display()),
                )));
            }
        };
        Ok(Self { path, kind })
    }

    pub fn is_dir(&self) -> bool {
        self.kind == LocalKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == LocalKind::File
    }
}

/// Whether `key` denotes a prefix
pub fn is_prefix(key: &str) -> bool {
    key.ends_with(KEY_SEPARATOR)
}

/// Final segment of an object key (`a/b/c.txt` -> `c.txt`)
pub fn key_basename(key: &str) -> &str {
    key.rsplit(KEY_SEPARATOR).next().unwrap_or(key)
}

/// Join a relative key onto a prefix with exactly one separator between them.
///
/// Only the slashes at the seam are collapsed. A prefix made of slashes
/// alone (`/`) is kept as a single leading `/`, so uploads to `/` land on
/// keys that a download of `/` lists again.
pub fn join_key(prefix: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches(KEY_SEPARATOR);
    if prefix.is_empty() {
        return relative.to_string();
    }
    let base = prefix.trim_end_matches(KEY_SEPARATOR);
    format!("{base}{KEY_SEPARATOR}{relative}")
}

/// Render a relative local path as an object key fragment.
///
/// Components are joined with `/` whatever the host separator is. Only
/// normal components are accepted; `..`, roots and drive prefixes cannot be
/// expressed as a key. A component that is not valid UTF-8 is rejected
/// rather than replaced, so two distinct files never share a key.
pub fn path_to_key(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    Error::InvalidPath(format!(
                        "'{}' is not valid UTF-8 and cannot be used as an object key",
                        relative.display()
                    ))
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            _ => {
                return Err(Error::InvalidPath(format!(
                    "'{}' cannot be used as an object key",
                    relative.display()
                )));
            }
        }
    }
    Ok(parts.join("/"))
}

/// Append the `/`-separated segments of `relative_key` to `base`.
///
/// Empty segments are skipped. A `..` or `.` segment is rejected so a listed
/// key can never resolve outside `base`.
pub fn key_to_path(base: &Path, relative_key: &str) -> Result<PathBuf> {
    let mut path = base.to_path_buf();
    for segment in relative_key.split(KEY_SEPARATOR) {
        match segment {
            "" => {}
            "." | ".." => {
                return Err(Error::InvalidPath(format!(
                    "key segment '{segment}' in '{relative_key}' escapes {}",
                    base.display()
                )));
            }
            _ => path.push(segment),
        }
    }
    Ok(path)
}
