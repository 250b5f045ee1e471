//! Typed failures for the scan, aggregation, fetch and decompress stages.
//!
//! The CLI folds these into `anyhow` with context; the library keeps them
//! typed so callers can tell a per-file failure from a fatal one.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanErrorKind {
    NotFound,
    PermissionDenied,
    Io,
}

impl ScanErrorKind {
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::Io => "io",
        }
    }
}

impl std::fmt::Display for ScanErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single file could not be scanned to the end.
#[derive(Error, Debug)]
#[error("scan {kind} for {path}: {source}")]
pub struct ScanError {
    pub kind: ScanErrorKind,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl ScanError {
    pub fn open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            kind: ScanErrorKind::from_io(&source),
            path: path.into(),
            source,
        }
    }

    /// Read failures after a successful open are always `Io`.
    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            kind: ScanErrorKind::Io,
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum AggregateError {
    /// Nothing to iterate; fatal for the whole aggregation.
    #[error("log directory unreadable: {path}: {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to build scan worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Reserved for remote backends; the local store never times out.
    #[error("fetch timed out: {bucket}/{key}")]
    Timeout { bucket: String, key: String },

    #[error("fetch io error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum DecompressError {
    #[error("corrupt gzip stream in {path}: {source}")]
    CorruptStream {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("decompress io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
