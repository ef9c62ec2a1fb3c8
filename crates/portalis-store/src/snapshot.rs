//! Atomic whole-collection snapshots.
//!
//! A snapshot file is a 5-byte header (`PSNP` magic and a format version)
//! followed by a zstd stream holding the bincode encoding of the record
//! sequence. Writes go to a `.tmp` sibling which is fsynced and then renamed
//! over the destination, so a failed save never touches the previous file.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

const SNAPSHOT_MAGIC: &[u8; 4] = b"PSNP";
const SNAPSHOT_VERSION: u8 = 1;
const ZSTD_LEVEL: i32 = 3;

/// Write `records` to `path`, replacing any previous snapshot atomically.
pub fn save<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    save_with(path, records, |from, to| fs::rename(from, to))
}

/// Like [`save`], with the final rename supplied by the caller.
pub(crate) fn save_with<T, F>(path: &Path, records: &[T], commit: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&Path, &Path) -> io::Result<()>,
{
    let tmp_path = tmp_path(path);

    let result = write_tmp(&tmp_path, path, records)
        .and_then(|()| commit(&tmp_path, path).map_err(StoreError::from));

    if let Err(e) = result {
        if let Err(cleanup) = fs::remove_file(&tmp_path) {
            if cleanup.kind() != io::ErrorKind::NotFound {
                warn!(path = %tmp_path.display(), error = %cleanup, "Failed to remove temp snapshot");
            }
        }
        return Err(e);
    }

    // Persist the rename itself. Best effort, not every filesystem allows it.
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    debug!(path = %path.display(), records = records.len(), "Snapshot written");
    Ok(())
}

/// Read the snapshot at `path`. A missing file is an empty collection.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No snapshot on disk");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };
    let mut reader = BufReader::new(file);

    let mut header = [0u8; 5];
    reader
        .read_exact(&mut header)
        .map_err(|e| corrupt(path, format!("truncated header: {e}")))?;
    if &header[..4] != SNAPSHOT_MAGIC {
        return Err(corrupt(path, "not a snapshot file".to_string()));
    }
    if header[4] != SNAPSHOT_VERSION {
        return Err(corrupt(
            path,
            format!("unsupported format version {}", header[4]),
        ));
    }

    let decoder = zstd::Decoder::with_buffer(reader)?;
    let records: Vec<T> =
        bincode::deserialize_from(decoder).map_err(|e| corrupt(path, e.to_string()))?;

    debug!(path = %path.display(), records = records.len(), "Snapshot read");
    Ok(records)
}

fn write_tmp<T: Serialize>(tmp_path: &Path, path: &Path, records: &[T]) -> Result<()> {
    let file = open_private(tmp_path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(SNAPSHOT_MAGIC)?;
    writer.write_all(&[SNAPSHOT_VERSION])?;

    let mut encoder = zstd::Encoder::new(writer, ZSTD_LEVEL)?;
    bincode::serialize_into(&mut encoder, records).map_err(|source| StoreError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = encoder.finish()?;
    writer.flush()?;

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

fn open_private(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn corrupt(path: &Path, reason: String) -> StoreError {
    StoreError::Corrupt {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: u32,
        name: String,
        tag: Option<String>,
    }

    fn rows(n: u32) -> Vec<Row> {
        (0..n)
            .map(|id| Row {
                id,
                name: format!("row-{id}"),
                tag: (id % 3 == 0).then(|| "three".to_string()),
            })
            .collect()
    }

    #[test]
    fn test_round_trip_sizes() {
        let dir = TempDir::new().unwrap();
        for n in [0, 1, 1000] {
            let path = dir.path().join(format!("rows-{n}.snap"));
            let data = rows(n);
            save(&path, &data).unwrap();
            let loaded: Vec<Row> = load(&path).unwrap();
            assert_eq!(loaded, data);
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let loaded: Vec<Row> = load(&dir.path().join("absent.snap")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_save_replaces_previous() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.snap");
        save(&path, &rows(10)).unwrap();
        save(&path, &rows(2)).unwrap();
        let loaded: Vec<Row> = load(&path).unwrap();
        assert_eq!(loaded, rows(2));
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_failed_rename_keeps_destination() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.snap");
        save(&path, &rows(5)).unwrap();
        let before = fs::read(&path).unwrap();

        let err = save_with(&path, &rows(50), |_, _| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "rename refused"))
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));

        assert_eq!(fs::read(&path).unwrap(), before);
        let loaded: Vec<Row> = load(&path).unwrap();
        assert_eq!(loaded, rows(5));
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_failed_open_keeps_destination() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.snap");
        save(&path, &rows(3)).unwrap();
        // A directory where the temp file should go makes the open fail.
        fs::create_dir(tmp_path(&path)).unwrap();

        assert!(save(&path, &rows(30)).is_err());
        let loaded: Vec<Row> = load(&path).unwrap();
        assert_eq!(loaded, rows(3));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.snap");
        fs::write(&path, b"definitely not a snapshot").unwrap();
        let err = load::<Row>(&path).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.snap");
        save(&path, &rows(200)).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        let err = load::<Row>(&path).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_empty_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.snap");
        fs::write(&path, b"").unwrap();
        assert!(load::<Row>(&path).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_empty_identifier_is_corrupt() {
        use portalis_shared::MatrixUserId;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids.snap");
        save(&path, &["@alice:hs".to_string(), String::new()]).unwrap();

        let err = load::<MatrixUserId>(&path).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[cfg(unix)]
    #[test]
    fn test_snapshot_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.snap");
        save(&path, &rows(1)).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
