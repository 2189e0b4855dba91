//! Storage resolution and access.
//!
//! This module maps a user-facing path or URI to a backend and exposes the
//! handful of operations the dataset layer needs:
//!
//! - [`StorageLocation`] parses `/local/path`, `file://`, `s3://` and `gs://`
//!   strings, rejecting unknown schemes.
//! - [`Storage`] wraps an `opendal::Operator` rooted at a location and offers
//!   existence checks, single-segment globbing, directory listing, and
//!   whole-object read/write.
//!
//! Backend options (credentials, region, endpoint, ...) are passed through
//! verbatim from [`StorageOptions`]; this module never interprets them. No
//! operation is retried: a backend failure is surfaced once as
//! [`StorageError::Backend`].

mod error;
pub mod layout;
mod location;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use log::debug;
use opendal::{Operator, Scheme, services::Fs};
use snafu::{Backtrace, prelude::*};
use tokio::fs;

pub use error::*;
pub use location::StorageLocation;

use crate::config::StorageOptions;

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

fn remote_error(path: &str, e: opendal::Error) -> StorageError {
    let path = path.to_string();
    let kind = e.kind();
    let source = BackendError::Remote(e);
    if kind == opendal::ErrorKind::NotFound {
        StorageError::NotFound {
            path,
            source,
            backtrace: Backtrace::capture(),
        }
    } else {
        StorageError::Backend {
            path,
            source,
            backtrace: Backtrace::capture(),
        }
    }
}

/// Canonical absolute path of an existing local directory.
///
/// Missing paths and non-directories are both reported as `NotFound`.
async fn existing_local_dir(root: &Path) -> StorageResult<PathBuf> {
    let path_str = root.display().to_string();

    let meta = match fs::metadata(root).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(BackendError::Local(e)).context(NotFoundSnafu { path: path_str });
        }
        Err(e) => return Err(BackendError::Local(e)).context(BackendSnafu { path: path_str }),
    };

    if !meta.is_dir() {
        let synthetic = io::Error::other("not a directory");
        return Err(BackendError::Local(synthetic)).context(NotFoundSnafu { path: path_str });
    }

    fs::canonicalize(root)
        .await
        .map_err(BackendError::Local)
        .context(BackendSnafu { path: path_str })
}

fn local_operator(root: &Path) -> StorageResult<Operator> {
    let root_str = root.to_string_lossy();
    let mut builder = Fs::default();
    builder.root(&root_str);
    Operator::new(builder)
        .map(|op| op.finish())
        .map_err(|e| remote_error(&root_str, e))
}

fn bucket_operator(
    scheme: Scheme,
    bucket: &str,
    prefix: &str,
    options: &StorageOptions,
) -> StorageResult<Operator> {
    let mut map: HashMap<String, String> = options
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    map.insert("bucket".to_string(), bucket.to_string());
    map.insert("root".to_string(), format!("/{prefix}"));

    Operator::via_map(scheme, map).map_err(|e| remote_error(&format!("{scheme}://{bucket}/{prefix}"), e))
}

/// Match `name` against a pattern with `*` (any run) and `?` (any one char).
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();

    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            // Let the last `*` swallow one more character and retry.
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

fn list_path(rel_dir: &str) -> String {
    let trimmed = rel_dir.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// A connected storage handle rooted at a [`StorageLocation`].
///
/// All paths passed to its methods are relative to that root and use `/`
/// separators.
#[derive(Debug, Clone)]
pub struct Storage {
    location: StorageLocation,
    op: Operator,
}

impl Storage {
    /// Connect to `location`, creating a local root directory if needed.
    ///
    /// Used for write paths; readers should prefer [`Storage::connect_existing`].
    pub async fn connect(location: StorageLocation, options: &StorageOptions) -> StorageResult<Self> {
        let op = match &location {
            StorageLocation::Local(root) => {
                fs::create_dir_all(root)
                    .await
                    .map_err(BackendError::Local)
                    .context(BackendSnafu {
                        path: root.display().to_string(),
                    })?;
                let abs = existing_local_dir(root).await?;
                local_operator(&abs)?
            }
            StorageLocation::S3 { bucket, prefix } => {
                bucket_operator(Scheme::S3, bucket, prefix, options)?
            }
            StorageLocation::Gcs { bucket, prefix } => {
                bucket_operator(Scheme::Gcs, bucket, prefix, options)?
            }
        };
        Ok(Storage { location, op })
    }

    /// Connect to a location that must already exist.
    ///
    /// A local root must be an existing directory; an object-store prefix
    /// must contain at least one object. Otherwise `StorageError::NotFound`.
    pub async fn connect_existing(
        location: StorageLocation,
        options: &StorageOptions,
    ) -> StorageResult<Self> {
        match &location {
            StorageLocation::Local(root) => {
                let abs = existing_local_dir(root).await?;
                let op = local_operator(&abs)?;
                Ok(Storage { location, op })
            }
            StorageLocation::S3 { .. } | StorageLocation::Gcs { .. } => {
                let storage = Storage::connect(location, options).await?;
                if !storage.root_exists().await? {
                    let synthetic = io::Error::new(io::ErrorKind::NotFound, "empty prefix");
                    return Err(BackendError::Local(synthetic)).context(NotFoundSnafu {
                        path: storage.location.to_string(),
                    });
                }
                Ok(storage)
            }
        }
    }

    /// The location this handle is rooted at.
    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Human-readable path of `rel` under the root, for messages.
    pub fn display_path(&self, rel: &str) -> String {
        let base = self.location.to_string();
        let rel = rel.trim_start_matches('/');
        if rel.is_empty() {
            base
        } else if base.ends_with('/') {
            format!("{base}{rel}")
        } else {
            format!("{base}/{rel}")
        }
    }

    /// Whether the root itself exists.
    ///
    /// Local roots must be directories; object-store prefixes exist once at
    /// least one object lives under them.
    pub async fn root_exists(&self) -> StorageResult<bool> {
        match &self.location {
            StorageLocation::Local(root) => match fs::metadata(root).await {
                Ok(meta) => Ok(meta.is_dir()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(BackendError::Local(e)).context(BackendSnafu {
                    path: root.display().to_string(),
                }),
            },
            StorageLocation::S3 { .. } | StorageLocation::Gcs { .. } => {
                let entries = self
                    .op
                    .list("/")
                    .await
                    .map_err(|e| remote_error(&self.location.to_string(), e))?;
                Ok(!entries.is_empty())
            }
        }
    }

    /// Whether a file or directory exists at `rel`.
    pub async fn exists(&self, rel: &str) -> StorageResult<bool> {
        self.op
            .is_exist(rel)
            .await
            .map_err(|e| remote_error(&self.display_path(rel), e))
    }

    /// Expand `pattern` into the sorted list of matching file paths.
    ///
    /// Wildcards (`*`, `?`) are only honored in the final path segment, for
    /// example `documents/*.parquet`. A missing directory expands to nothing.
    pub async fn glob(&self, pattern: &str) -> StorageResult<Vec<String>> {
        let (dir, file_pattern) = pattern.rsplit_once('/').unwrap_or(("", pattern));
        ensure!(
            !dir.contains(['*', '?']),
            InvalidLocationSnafu {
                spec: pattern.to_string(),
                reason: "wildcards are only supported in the last path segment".to_string(),
            }
        );

        let listed = list_path(dir);
        let entries = match self.op.list(&listed).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(remote_error(&self.display_path(&listed), e)),
        };

        let mut matches: Vec<String> = entries
            .iter()
            .filter(|entry| !entry.path().ends_with('/'))
            .filter(|entry| wildcard_match(file_pattern, entry.name()))
            .map(|entry| entry.path().trim_start_matches('/').to_string())
            .collect();
        matches.sort();

        debug!(
            "glob {} matched {} file(s)",
            self.display_path(pattern),
            matches.len()
        );
        Ok(matches)
    }

    /// Names of the immediate child directories of `rel_dir`, sorted.
    pub async fn list_dirs(&self, rel_dir: &str) -> StorageResult<Vec<String>> {
        let listed = list_path(rel_dir);
        let entries = self
            .op
            .list(&listed)
            .await
            .map_err(|e| remote_error(&self.display_path(&listed), e))?;

        let mut dirs: Vec<String> = entries
            .iter()
            .filter(|entry| entry.path().ends_with('/') && entry.path() != listed)
            .map(|entry| entry.name().trim_end_matches('/').to_string())
            .filter(|name| !name.is_empty())
            .collect();
        dirs.sort();
        dirs.dedup();
        Ok(dirs)
    }

    /// Read the whole object at `rel`.
    pub async fn read(&self, rel: &str) -> StorageResult<Bytes> {
        let data = self
            .op
            .read(rel)
            .await
            .map_err(|e| remote_error(&self.display_path(rel), e))?;
        Ok(Bytes::from(data.to_vec()))
    }

    /// Read the object at `rel` as UTF-8 text.
    pub async fn read_to_string(&self, rel: &str) -> StorageResult<String> {
        let bytes = self.read(rel).await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            let synthetic = io::Error::new(io::ErrorKind::InvalidData, e);
            StorageError::Backend {
                path: self.display_path(rel),
                source: BackendError::Local(synthetic),
                backtrace: Backtrace::capture(),
            }
        })
    }

    /// Write `contents` to `rel`, replacing any existing object.
    ///
    /// Parent directories are created by the backend as needed.
    pub async fn write(&self, rel: &str, contents: Vec<u8>) -> StorageResult<()> {
        debug!("writing {} byte(s) to {}", contents.len(), self.display_path(rel));
        self.op
            .write(rel, contents)
            .await
            .map_err(|e| remote_error(&self.display_path(rel), e))?;
        Ok(())
    }

    /// Delete the object at `rel`. Deleting a missing object succeeds.
    pub async fn delete(&self, rel: &str) -> StorageResult<()> {
        debug!("deleting {}", self.display_path(rel));
        self.op
            .delete(rel)
            .await
            .map_err(|e| remote_error(&self.display_path(rel), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn wildcard_matching() {
        assert!(wildcard_match("*.parquet", "part-00000.parquet"));
        assert!(wildcard_match("part-?????.parquet", "part-00001.parquet"));
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("a*b*c", "aXXbYYc"));
        assert!(!wildcard_match("*.parquet", "part.parquet.tmp"));
        assert!(!wildcard_match("*.parquet", "metadata.json"));
        assert!(!wildcard_match("?", ""));
    }

    #[tokio::test]
    async fn connect_existing_fails_for_missing_root() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StorageLocation::local(tmp.path().join("missing"));

        let err = Storage::connect_existing(location, &StorageOptions::new())
            .await
            .expect_err("missing root should fail");
        assert!(matches!(err, StorageError::NotFound { .. }));
        assert!(!tmp.path().join("missing").exists());
        Ok(())
    }

    #[tokio::test]
    async fn connect_existing_rejects_plain_file() -> TestResult {
        let tmp = TempDir::new()?;
        let file = tmp.path().join("file.txt");
        tokio::fs::write(&file, b"x").await?;

        let err = Storage::connect_existing(StorageLocation::local(&file), &StorageOptions::new())
            .await
            .expect_err("a file is not a dataset root");
        assert!(matches!(err, StorageError::NotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn root_exists_tracks_local_directory() -> TestResult {
        let tmp = TempDir::new()?;
        let root = tmp.path().join("ds");
        let storage = Storage::connect(StorageLocation::local(&root), &StorageOptions::new()).await?;
        assert!(storage.root_exists().await?);

        tokio::fs::remove_dir(&root).await?;
        assert!(!storage.root_exists().await?);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn root_exists_surfaces_io_errors_other_than_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let parent = tmp.path().join("parent");
        let storage =
            Storage::connect(StorageLocation::local(parent.join("ds")), &StorageOptions::new()).await?;

        // A regular file where a directory is expected: stat fails with
        // ENOTDIR rather than ENOENT.
        tokio::fs::remove_dir_all(&parent).await?;
        tokio::fs::write(&parent, b"plain file").await?;

        let err = storage.root_exists().await.expect_err("parent is a file");
        assert!(matches!(err, StorageError::Backend { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_objects_and_ignores_missing_ones() -> TestResult {
        let tmp = TempDir::new()?;
        let storage = Storage::connect(StorageLocation::local(tmp.path()), &StorageOptions::new()).await?;
        storage.write("documents/part-00001.parquet", b"stale".to_vec()).await?;

        storage.delete("documents/part-00001.parquet").await?;
        assert!(!tmp.path().join("documents/part-00001.parquet").exists());
        storage.delete("documents/part-00001.parquet").await?;
        Ok(())
    }

    #[tokio::test]
    async fn write_then_read_roundtrip_creates_parents() -> TestResult {
        let tmp = TempDir::new()?;
        let storage =
            Storage::connect(StorageLocation::local(tmp.path().join("ds")), &StorageOptions::new())
                .await?;

        storage.write("nested/dir/file.txt", b"hello".to_vec()).await?;

        assert!(tmp.path().join("ds/nested/dir/file.txt").exists());
        assert_eq!(storage.read_to_string("nested/dir/file.txt").await?, "hello");
        assert!(storage.exists("nested/dir/file.txt").await?);
        assert!(!storage.exists("nested/dir/other.txt").await?);
        Ok(())
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let storage =
            Storage::connect_existing(StorageLocation::local(tmp.path()), &StorageOptions::new())
                .await?;

        let err = storage
            .read("metadata.json")
            .await
            .expect_err("missing file should fail");
        assert!(matches!(err, StorageError::NotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn glob_returns_sorted_matches_only() -> TestResult {
        let tmp = TempDir::new()?;
        let docs = tmp.path().join("documents");
        tokio::fs::create_dir_all(&docs).await?;
        for name in ["b.parquet", "a.parquet", "notes.txt"] {
            tokio::fs::write(docs.join(name), b"x").await?;
        }

        let storage =
            Storage::connect_existing(StorageLocation::local(tmp.path()), &StorageOptions::new())
                .await?;

        let files = storage.glob("documents/*.parquet").await?;
        assert_eq!(files, vec!["documents/a.parquet", "documents/b.parquet"]);

        let none = storage.glob("queries/*.parquet").await?;
        assert!(none.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn glob_rejects_wildcards_in_directories() -> TestResult {
        let tmp = TempDir::new()?;
        let storage =
            Storage::connect_existing(StorageLocation::local(tmp.path()), &StorageOptions::new())
                .await?;

        let err = storage
            .glob("*/part.parquet")
            .await
            .expect_err("directory wildcards are unsupported");
        assert!(matches!(err, StorageError::InvalidLocation { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn list_dirs_returns_child_directories() -> TestResult {
        let tmp = TempDir::new()?;
        tokio::fs::create_dir_all(tmp.path().join("quora")).await?;
        tokio::fs::create_dir_all(tmp.path().join("msmarco")).await?;
        tokio::fs::write(tmp.path().join("README"), b"x").await?;

        let storage =
            Storage::connect_existing(StorageLocation::local(tmp.path()), &StorageOptions::new())
                .await?;

        assert_eq!(storage.list_dirs("").await?, vec!["msmarco", "quora"]);
        Ok(())
    }
}
