//! Key/path mapping
//!
//! Pure functions turning an enumerated member set into concrete transfer
//! items. No filesystem or network access happens here.
//!
//! Download:
//! - prefix key, or more than one member: each member keeps its position
//!   under the prefix (`reports/2024/jan.csv` under `reports/` lands at
//!   `<base>/2024/jan.csv`)
//! - single non-prefix key: the object lands at `<base>/<basename(key)>`
//!
//! Upload:
//! - prefix key: each walked file keeps its position relative to the base
//!   path; a base path that is itself a file contributes its file name
//! - non-prefix key: every walked file maps to the key verbatim

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::path::{is_prefix, join_key, key_basename, key_to_path, path_to_key};

/// A resolved (source, destination) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "direction", rename_all = "lowercase")]
pub enum TransferItem {
    /// Object `key` is written to local `path`
    Download { key: String, path: PathBuf },
    /// Local `path` is written to object `key`
    Upload { path: PathBuf, key: String },
}

impl TransferItem {
    /// Object key involved in this item
    pub fn key(&self) -> &str {
        match self {
            TransferItem::Download { key, .. } | TransferItem::Upload { key, .. } => key,
        }
    }

    /// Local path involved in this item
    pub fn path(&self) -> &Path {
        match self {
            TransferItem::Download { path, .. } | TransferItem::Upload { path, .. } => path,
        }
    }

    /// Human-readable `source → destination` for a given bucket
    pub fn describe(&self, bucket: &str) -> String {
        match self {
            TransferItem::Download { key, path } => {
                format!("{bucket}/{key} → {}", path.display())
            }
            TransferItem::Upload { path, key } => {
                format!("{} → {bucket}/{key}", path.display())
            }
        }
    }
}

/// Map listed member keys to local destination paths.
///
/// `members` holds the single key itself for a non-prefix request.
pub fn map_download(
    object_key: &str,
    local_base: &Path,
    members: &[String],
) -> Result<Vec<TransferItem>> {
    let keep_structure = is_prefix(object_key) || members.len() > 1;

    members
        .iter()
        .map(|key| {
            let path = if keep_structure {
                let relative = key.strip_prefix(object_key).unwrap_or(key);
                key_to_path(local_base, relative)?
            } else {
                key_to_path(local_base, key_basename(key))?
            };
            if path == local_base {
                return Err(Error::InvalidPath(format!(
                    "key '{key}' does not name a file under '{object_key}'"
                )));
            }
            Ok(TransferItem::Download {
                key: key.clone(),
                path,
            })
        })
        .collect()
}

/// Map walked local files to destination object keys.
///
/// `files` are the non-directory entries found under `local_base`; when
/// `local_base` is itself a file it is the only entry.
pub fn map_upload(
    object_key: &str,
    local_base: &Path,
    files: &[PathBuf],
) -> Result<Vec<TransferItem>> {
    files
        .iter()
        .map(|file| {
            let key = if is_prefix(object_key) {
                let relative = relative_key(local_base, file)?;
                join_key(object_key, &relative)
            } else {
                object_key.to_string()
            };
            Ok(TransferItem::Upload {
                path: file.clone(),
                key,
            })
        })
        .collect()
}

/// Position of `file` under `base` as a `/`-separated key fragment.
fn relative_key(base: &Path, file: &Path) -> Result<String> {
    let relative = file.strip_prefix(base).map_err(|_| {
        Error::InvalidPath(format!(
            "'{}' is not under '{}'",
            file.display(),
            base.display()
        ))
    })?;

    let relative = path_to_key(relative)?;
    if !relative.is_empty() {
        return Ok(relative);
    }

    // The base path is the file itself.
    let name = file
        .file_name()
        .ok_or_else(|| Error::InvalidPath(format!("'{}' has no file name", file.display())))?;
    path_to_key(Path::new(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(items: &[TransferItem]) -> Vec<&str> {
        items.iter().map(TransferItem::key).collect()
    }

    fn paths(items: &[TransferItem]) -> Vec<&Path> {
        items.iter().map(TransferItem::path).collect()
    }

    #[test]
    fn test_download_single_key_uses_basename() {
        let base = Path::new("/out");
        for key in ["single.bin", "a/single.bin", "a/b/c/d/single.bin"] {
            let items = map_download(key, base, &[key.to_string()]).unwrap();
            assert_eq!(paths(&items), vec![base.join("single.bin").as_path()]);
            assert_eq!(keys(&items), vec![key]);
        }
    }

    #[test]
    fn test_download_prefix_keeps_structure() {
        let base = Path::new("/out");
        let members = vec![
            "reports/2024/jan.csv".to_string(),
            "reports/2024/feb.csv".to_string(),
        ];
        let items = map_download("reports/", base, &members).unwrap();
        assert_eq!(
            paths(&items),
            vec![
                base.join("2024").join("jan.csv").as_path(),
                base.join("2024").join("feb.csv").as_path(),
            ]
        );
    }

    #[test]
    fn test_download_prefix_members_a_and_b_c() {
        let base = Path::new("base");
        let members = vec!["p/a".to_string(), "p/b/c".to_string()];
        let items = map_download("p/", base, &members).unwrap();
        assert_eq!(
            paths(&items),
            vec![
                base.join("a").as_path(),
                base.join("b").join("c").as_path()
            ]
        );
    }

    #[test]
    fn test_download_multiple_members_without_slash_keep_structure() {
        let base = Path::new("out");
        let members = vec!["logs-a.txt".to_string(), "logs-b/1.txt".to_string()];
        let items = map_download("logs-", base, &members).unwrap();
        assert_eq!(
            paths(&items),
            vec![
                base.join("a.txt").as_path(),
                base.join("b").join("1.txt").as_path()
            ]
        );
    }

    #[test]
    fn test_download_empty_listing() {
        let items = map_download("empty/", Path::new("/out"), &[]).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_download_rejects_escaping_key() {
        let members = vec!["reports/../../etc/passwd".to_string()];
        let result = map_download("reports/", Path::new("/out"), &members);
        assert!(matches!(result, Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_download_rejects_key_equal_to_prefix() {
        let members = vec!["reports/".to_string()];
        let result = map_download("reports/", Path::new("/out"), &members);
        assert!(matches!(result, Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_upload_prefix_directory() {
        let base = Path::new("/data");
        let files = vec![base.join("x.txt"), base.join("sub").join("y.txt")];
        let items = map_upload("archive/", base, &files).unwrap();
        assert_eq!(keys(&items), vec!["archive/x.txt", "archive/sub/y.txt"]);
    }

    #[test]
    fn test_upload_prefix_a_and_b_c() {
        let base = Path::new("tree");
        let files = vec![base.join("a"), base.join("b").join("c")];
        let items = map_upload("p/", base, &files).unwrap();
        assert_eq!(keys(&items), vec!["p/a", "p/b/c"]);
    }

    #[test]
    fn test_upload_prefix_single_file_uses_basename() {
        let base = Path::new("/data/report.pdf");
        let items = map_upload("archive/", base, &[base.to_path_buf()]).unwrap();
        assert_eq!(keys(&items), vec!["archive/report.pdf"]);
    }

    #[test]
    fn test_upload_single_key_verbatim() {
        let base = Path::new("/data/report.pdf");
        let items = map_upload("docs/final.pdf", base, &[base.to_path_buf()]).unwrap();
        assert_eq!(keys(&items), vec!["docs/final.pdf"]);
    }

    #[test]
    fn test_upload_single_key_many_files_all_map_to_key() {
        let base = Path::new("/data");
        let files = vec![base.join("x.txt"), base.join("y.txt")];
        let items = map_upload("one.txt", base, &files).unwrap();
        assert_eq!(keys(&items), vec!["one.txt", "one.txt"]);
    }

    #[test]
    fn test_upload_file_outside_base_rejected() {
        let result = map_upload(
            "archive/",
            Path::new("/data"),
            &[PathBuf::from("/elsewhere/x.txt")],
        );
        assert!(matches!(result, Err(Error::InvalidPath(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_upload_non_utf8_names_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let base = Path::new("/data");
        let files = vec![
            base.join(OsStr::from_bytes(b"r\xfe.txt")),
            base.join(OsStr::from_bytes(b"r\xff.txt")),
        ];
        let result = map_upload("archive/", base, &files);
        assert!(matches!(result, Err(Error::InvalidPath(_))));

        let result = map_upload("archive/", &files[0], &files[..1]);
        assert!(matches!(result, Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_root_slash_prefix_maps_both_ways() {
        let base = Path::new("/data");
        let files = vec![base.join("x.txt"), base.join("sub").join("y.txt")];
        let items = map_upload("/", base, &files).unwrap();
        assert_eq!(keys(&items), vec!["/x.txt", "/sub/y.txt"]);

        let members = vec!["/x.txt".to_string(), "/sub/y.txt".to_string()];
        let items = map_download("/", Path::new("/out"), &members).unwrap();
        assert_eq!(
            paths(&items),
            vec![
                Path::new("/out/x.txt"),
                Path::new("/out").join("sub").join("y.txt").as_path()
            ]
        );
    }

    #[test]
    fn test_describe() {
        let item = TransferItem::Download {
            key: "reports/jan.csv".into(),
            path: PathBuf::from("out/jan.csv"),
        };
        assert_eq!(item.describe("b"), "b/reports/jan.csv → out/jan.csv");

        let item = TransferItem::Upload {
            path: PathBuf::from("data/x.txt"),
            key: "archive/x.txt".into(),
        };
        assert_eq!(item.describe("b"), "data/x.txt → b/archive/x.txt");
    }
}
