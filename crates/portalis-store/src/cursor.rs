//! Persistence of the Matrix sync token ("next batch").
//!
//! The token changes on nearly every sync response and can be recovered by a
//! full resync, so it is kept as plain text and overwritten in place rather
//! than going through the snapshot machinery.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::Result;

/// Opaque position in the inbound event stream. Empty means "sync from the
/// beginning".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SyncToken(String);

impl SyncToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the bridge has to replay the stream from scratch.
    pub fn needs_full_resync(&self) -> bool {
        self.is_empty()
    }
}

impl From<String> for SyncToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for SyncToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl std::fmt::Display for SyncToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read the token stored at `path`. A missing or non UTF-8 file yields the
/// empty token.
pub fn load(path: &Path) -> Result<SyncToken> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No sync token on disk, full resync required");
            return Ok(SyncToken::default());
        }
        Err(e) => return Err(e.into()),
    };

    match String::from_utf8(bytes) {
        Ok(token) => {
            debug!(path = %path.display(), "Loaded sync token");
            Ok(SyncToken(token))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Sync token is not valid UTF-8, full resync required");
            Ok(SyncToken::default())
        }
    }
}

/// Overwrite the token stored at `path`.
pub fn save(path: &Path, token: &SyncToken) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(token.as_str().as_bytes())?;
    Ok(())
}
