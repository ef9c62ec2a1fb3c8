use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Generic I/O error (open, write, rename, ...).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot exists but cannot be decoded. Fatal at startup.
    #[error("Corrupt snapshot {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Records could not be serialized.
    #[error("Failed to encode snapshot {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    /// An update tried to move a record onto a key another entity holds.
    #[error("{collection}: key {key} is already taken")]
    KeyConflict {
        collection: &'static str,
        key: String,
    },

    /// A blocking save or load task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// Whether this error means on-disk state is unusable, as opposed to
    /// a transient I/O problem.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::Corrupt { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
