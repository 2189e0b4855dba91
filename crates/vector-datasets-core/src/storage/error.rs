use std::{error::Error, fmt, io};

use snafu::{Backtrace, prelude::*};

/// Errors produced by a concrete storage backend.
///
/// Local existence checks go through `tokio::fs` directly; everything else is
/// served by an `opendal` operator. Both are wrapped here so higher layers can
/// map them into [`StorageError`] variants with path context.
#[derive(Debug)]
pub enum BackendError {
    /// A local filesystem I/O error.
    Local(io::Error),
    /// An error reported by the `opendal` operator (local, S3 or GCS).
    Remote(opendal::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
            BackendError::Remote(e) => write!(f, "object store error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
            BackendError::Remote(e) => Some(e),
        }
    }
}

/// Errors that can occur while resolving or accessing storage.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The location uses a URI scheme no backend is registered for.
    #[snafu(display("Unsupported storage scheme {scheme:?} in {spec:?} (expected s3://, gs:// or a local path)"))]
    UnsupportedScheme {
        /// The scheme as written by the caller.
        scheme: String,
        /// The full location string.
        spec: String,
    },

    /// The location string could not be interpreted.
    #[snafu(display("Invalid storage location {spec:?}: {reason}"))]
    InvalidLocation {
        /// The full location string.
        spec: String,
        /// Why the location was rejected.
        reason: String,
    },

    /// The specified path was not found.
    #[snafu(display("Path not found: {path}"))]
    NotFound {
        /// The path that was not found.
        path: String,
        /// Underlying backend error that caused the failure.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// Any other backend failure.
    #[snafu(display("Storage error at {path}: {source}"))]
    Backend {
        /// The path where the error occurred.
        path: String,
        /// Underlying backend error with backend-specific details.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}
