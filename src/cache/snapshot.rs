//! Snapshot persistence for the response cache
//!
//! At orderly shutdown the unexpired entries are written to a single JSON file;
//! at startup that file seeds a fresh cache. Entries carry absolute wall-clock
//! expiries, so anything that lapsed while the process was down reads as a miss.

use super::store::{Cache, CacheEntry};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Bumped whenever the on-disk layout changes
const SNAPSHOT_VERSION: u32 = 1;

/// Errors that can occur while saving or loading a snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Reading, writing, or renaming the snapshot file failed
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot could not be encoded or decoded
    #[error("Snapshot format error: {0}")]
    Format(#[from] serde_json::Error),

    /// The file was written by an incompatible version
    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

/// On-disk layout
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile<V> {
    version: u32,
    saved_at: DateTime<Utc>,
    entries: HashMap<String, CacheEntry<V>>,
}

/// Writes every unexpired entry of `cache` to `path`, replacing any previous snapshot
///
/// The file is written next to `path` first and renamed into place, so a failed
/// save leaves the previous snapshot untouched. Returns the number of entries written.
pub fn save_snapshot<V>(cache: &Cache<V>, path: &Path) -> Result<usize, SnapshotError>
where
    V: Clone + Serialize,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = SnapshotFile {
        version: SNAPSHOT_VERSION,
        saved_at: Utc::now(),
        entries: cache.items(),
    };
    let count = file.entries.len();
    let bytes = serde_json::to_vec(&file)?;

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;

    Ok(count)
}

/// Reads a snapshot from `path` into a new cache
pub fn load_snapshot<V>(path: &Path) -> Result<Cache<V>, SnapshotError>
where
    V: DeserializeOwned,
{
    let bytes = fs::read(path)?;
    let file: SnapshotFile<V> = serde_json::from_slice(&bytes)?;
    if file.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(file.version));
    }
    Ok(Cache::from_entries(file.entries))
}

/// Loads the snapshot at `path`, falling back to an empty cache
///
/// A missing or unreadable snapshot is not fatal: it is logged and the process
/// starts cold.
pub fn load_or_empty<V>(path: &Path) -> Cache<V>
where
    V: DeserializeOwned,
{
    match load_snapshot(path) {
        Ok(cache) => {
            tracing::info!(path = %path.display(), entries = cache.len(), "loaded cache snapshot");
            cache
        }
        Err(SnapshotError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no cache snapshot, starting cold");
            Cache::new()
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), "failed to load cache snapshot: {}", err);
            Cache::new()
        }
    }
}
