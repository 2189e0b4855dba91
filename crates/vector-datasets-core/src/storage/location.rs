use std::fmt;
use std::path::PathBuf;

use snafu::prelude::*;

use crate::storage::{InvalidLocationSnafu, StorageResult, UnsupportedSchemeSnafu};

/// Where a dataset (or catalog) lives.
///
/// Parsed from a user-facing string: a plain filesystem path or `file://`
/// URI maps to [`StorageLocation::Local`], `s3://bucket/prefix` to
/// [`StorageLocation::S3`] and `gs://bucket/prefix` to [`StorageLocation::Gcs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// A directory on the local filesystem.
    Local(PathBuf),
    /// A prefix inside an S3 bucket.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Key prefix without leading or trailing `/` (empty for the bucket root).
        prefix: String,
    },
    /// A prefix inside a Google Cloud Storage bucket.
    Gcs {
        /// Bucket name.
        bucket: String,
        /// Object prefix without leading or trailing `/` (empty for the bucket root).
        prefix: String,
    },
}

fn split_bucket(spec: &str, rest: &str) -> StorageResult<(String, String)> {
    let rest = rest.trim_end_matches('/');
    let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
    ensure!(
        !bucket.is_empty(),
        InvalidLocationSnafu {
            spec: spec.to_string(),
            reason: "missing bucket name".to_string(),
        }
    );
    Ok((bucket.to_string(), prefix.trim_matches('/').to_string()))
}

/// A scheme is at least two characters so `C:\data` style paths stay local.
fn looks_like_scheme(candidate: &str) -> bool {
    candidate.len() > 1
        && candidate.starts_with(|c: char| c.is_ascii_alphabetic())
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn join_prefix(prefix: &str, child: &str) -> String {
    let child = child.trim_matches('/');
    match (prefix.is_empty(), child.is_empty()) {
        (_, true) => prefix.to_string(),
        (true, false) => child.to_string(),
        (false, false) => format!("{prefix}/{child}"),
    }
}

impl StorageLocation {
    /// Creates a new `StorageLocation` for a local filesystem path.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        StorageLocation::Local(root.into())
    }

    /// Parse a user-facing path or URI.
    ///
    /// Fails with `UnsupportedScheme` for schemes other than `file`, `s3`,
    /// `s3a`, `gs` and `gcs`, and with `InvalidLocation` for empty input or
    /// bucket URIs without a bucket.
    pub fn parse(spec: &str) -> StorageResult<Self> {
        let trimmed = spec.trim();
        ensure!(
            !trimmed.is_empty(),
            InvalidLocationSnafu {
                spec: spec.to_string(),
                reason: "location is empty".to_string(),
            }
        );

        let Some((scheme, rest)) = trimmed
            .split_once("://")
            .filter(|(scheme, _)| looks_like_scheme(scheme))
        else {
            return Ok(StorageLocation::Local(PathBuf::from(trimmed)));
        };

        match scheme.to_ascii_lowercase().as_str() {
            "file" => Ok(StorageLocation::Local(PathBuf::from(rest))),
            "s3" | "s3a" => {
                let (bucket, prefix) = split_bucket(trimmed, rest)?;
                Ok(StorageLocation::S3 { bucket, prefix })
            }
            "gs" | "gcs" => {
                let (bucket, prefix) = split_bucket(trimmed, rest)?;
                Ok(StorageLocation::Gcs { bucket, prefix })
            }
            _ => UnsupportedSchemeSnafu {
                scheme: scheme.to_string(),
                spec: trimmed.to_string(),
            }
            .fail(),
        }
    }

    /// Location of a child directory.
    pub fn join(&self, child: &str) -> Self {
        match self {
            StorageLocation::Local(root) => {
                StorageLocation::Local(root.join(child.trim_matches('/')))
            }
            StorageLocation::S3 { bucket, prefix } => StorageLocation::S3 {
                bucket: bucket.clone(),
                prefix: join_prefix(prefix, child),
            },
            StorageLocation::Gcs { bucket, prefix } => StorageLocation::Gcs {
                bucket: bucket.clone(),
                prefix: join_prefix(prefix, child),
            },
        }
    }

    /// Last path segment, i.e. the directory name of the location.
    ///
    /// Returns `None` for a bucket root or a path without a final component.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            StorageLocation::Local(root) => root.file_name().and_then(|n| n.to_str()),
            StorageLocation::S3 { prefix, .. } | StorageLocation::Gcs { prefix, .. } => {
                prefix.rsplit('/').next().filter(|s| !s.is_empty())
            }
        }
    }

    /// URI scheme for display and logging (`file`, `s3`, `gs`).
    pub fn scheme(&self) -> &'static str {
        match self {
            StorageLocation::Local(_) => "file",
            StorageLocation::S3 { .. } => "s3",
            StorageLocation::Gcs { .. } => "gs",
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageLocation::Local(root) => write!(f, "{}", root.display()),
            StorageLocation::S3 { bucket, prefix } | StorageLocation::Gcs { bucket, prefix } => {
                write!(f, "{}://{bucket}", self.scheme())?;
                if !prefix.is_empty() {
                    write!(f, "/{prefix}")?;
                }
                Ok(())
            }
        }
    }
}
