//! Error types for index construction and retrieval.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for simstring operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the index writer, the index reader and the query engine.
///
/// Nothing is retried internally: every failure propagates from the call that
/// triggered it.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad n-gram length, unknown measure, malformed threshold or a width
    /// mismatch between an index and the caller.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O failure while creating or writing an index.
    #[error("failed to write {}: {source}", path.display())]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O failure while opening or reading an index.
    #[error("failed to read {}: {source}", path.display())]
    StorageRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The index exists but its files are truncated or inconsistent.
    #[error("corrupt index file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Insert or finalize called on an index that was already finalized.
    #[error("the index has been finalized and no longer accepts changes")]
    Sealed,

    /// Insert or finalize called after an earlier write failed; the staged
    /// data is incomplete and will not be published.
    #[error("an earlier write failed; the index can no longer be finalized")]
    Aborted,
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub(crate) fn write(path: &Path, source: io::Error) -> Self {
        Self::StorageWrite {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn read(path: &Path, source: io::Error) -> Self {
        Self::StorageRead {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// True for the failures that come from reading an existing index.
    pub fn is_read_error(&self) -> bool {
        matches!(self, Self::StorageRead { .. } | Self::Corrupt { .. })
    }
}

/// Attach a path to an `io::Result`, producing a write or read error.
pub(crate) trait IoContext<T> {
    fn write_ctx(self, path: &Path) -> Result<T>;
    fn read_ctx(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn write_ctx(self, path: &Path) -> Result<T> {
        self.map_err(|e| Error::write(path, e))
    }

    fn read_ctx(self, path: &Path) -> Result<T> {
        self.map_err(|e| Error::read(path, e))
    }
}
