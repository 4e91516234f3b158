//! Versioned snapshot persistence
//!
//! Each engine owns one [`SnapshotStore`] pointing at a JSON file. A
//! snapshot carries a format version, the config fields the learned state
//! depends on, the learned parameters, aggregate statistics, a SHA-256
//! checksum of the parameters, and a save timestamp.
//!
//! Writes go to a temporary file in the same directory and are renamed
//! over the previous snapshot, so a crash mid-write leaves the last good
//! snapshot in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Current snapshot format version
pub const FORMAT_VERSION: &str = "1.0.0";

/// On-disk snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedModel<C, P, S> {
    /// Format version; only the major component must match on load
    pub version: String,
    /// Config fields the learned parameters depend on
    pub config: C,
    /// Learned parameters
    pub parameters: P,
    /// Aggregate statistics
    pub stats: S,
    /// Hex SHA-256 of the serialized parameters
    pub checksum: String,
    /// When the snapshot was taken
    pub saved_at: DateTime<Utc>,
}

impl<C, P: Serialize, S> PersistedModel<C, P, S> {
    /// Build a snapshot stamped with the current version and time
    pub fn new(config: C, parameters: P, stats: S) -> Result<Self> {
        let checksum = checksum(&parameters)?;
        Ok(Self {
            version: FORMAT_VERSION.to_string(),
            config,
            parameters,
            stats,
            checksum,
            saved_at: Utc::now(),
        })
    }

    /// Check version compatibility and parameter integrity
    pub fn validate(&self) -> Result<()> {
        if major(&self.version) != major(FORMAT_VERSION) {
            return Err(Error::VersionMismatch {
                found: self.version.clone(),
                expected: FORMAT_VERSION.to_string(),
            });
        }
        let well_formed =
            self.checksum.len() == 64 && self.checksum.bytes().all(|b| b.is_ascii_hexdigit());
        if !well_formed {
            return Err(Error::CorruptSnapshot(format!(
                "checksum is not a SHA-256 hex digest: {:?}",
                short(&self.checksum)
            )));
        }
        let actual = checksum(&self.parameters)?;
        if actual != self.checksum {
            return Err(Error::CorruptSnapshot(format!(
                "checksum mismatch (stored {}, computed {})",
                short(&self.checksum),
                short(&actual)
            )));
        }
        Ok(())
    }
}

fn checksum<P: Serialize>(parameters: &P) -> Result<String> {
    let bytes = serde_json::to_vec(parameters)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or_default()
}

fn short(digest: &str) -> String {
    digest.chars().take(12).collect()
}

/// File-backed snapshot store
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    /// Generation of the last snapshot written; guards write ordering
    written: Mutex<u64>,
    temp_seq: AtomicU64,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: Mutex::new(0),
            temp_seq: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a snapshot atomically
    ///
    /// `generation` must increase with every snapshot an engine produces;
    /// a snapshot older than the last one written is skipped, which keeps
    /// out-of-order autosaves from rolling the file back.
    pub async fn save<T: Serialize>(&self, snapshot: &T, generation: u64) -> Result<bool> {
        let mut written = self.written.lock().await;
        if generation < *written {
            debug!(
                path = %self.path.display(),
                generation,
                latest = *written,
                "Skipping stale snapshot"
            );
            return Ok(false);
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let temp = self.temp_path();
        if let Err(e) = tokio::fs::write(&temp, &bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        *written = generation;
        info!(
            path = %self.path.display(),
            bytes = bytes.len(),
            generation,
            "Saved snapshot"
        );
        Ok(true)
    }

    /// Read and validate a snapshot
    pub async fn load<C, P, S>(&self) -> Result<PersistedModel<C, P, S>>
    where
        C: DeserializeOwned,
        P: Serialize + DeserializeOwned,
        S: DeserializeOwned,
    {
        let bytes = tokio::fs::read(&self.path).await?;
        let snapshot: PersistedModel<C, P, S> = serde_json::from_slice(&bytes)?;
        snapshot.validate()?;
        debug!(
            path = %self.path.display(),
            version = %snapshot.version,
            saved_at = %snapshot.saved_at,
            "Read snapshot"
        );
        Ok(snapshot)
    }

    /// Fire-and-forget save on the current tokio runtime
    ///
    /// Failures are logged at `warn`. Without a runtime the save is skipped,
    /// since the learning path never blocks on file I/O.
    pub fn spawn_save<T>(self: &Arc<Self>, snapshot: T, generation: u64)
    where
        T: Serialize + Send + Sync + 'static,
    {
        let store = Arc::clone(self);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.save(&snapshot, generation).await {
                        warn!(
                            path = %store.path.display(),
                            error = %e,
                            code = e.code(),
                            "Autosave failed; continuing in memory"
                        );
                    }
                });
            }
            Err(_) => debug!(
                path = %self.path.display(),
                "No async runtime available; autosave skipped"
            ),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        self.path
            .with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Params {
        weights: Vec<Vec<f64>>,
    }

    type Snapshot = PersistedModel<String, Params, u64>;

    fn snapshot(value: f64) -> Snapshot {
        PersistedModel::new(
            "cfg".to_string(),
            Params {
                weights: vec![vec![value, 0.1 + 0.2], vec![-1e-300, 12345.678]],
            },
            7,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/dir/model.json"));

        assert!(store.save(&snapshot(0.5), 1).await.unwrap());
        let loaded: Snapshot = store.load().await.unwrap();
        assert_eq!(loaded.parameters, snapshot(0.5).parameters);
        assert_eq!(loaded.stats, 7);
        assert_eq!(loaded.version, FORMAT_VERSION);

        // No temp files left behind
        let leftovers = std::fs::read_dir(dir.path().join("nested/dir"))
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("absent.json"));
        let err = store.load::<String, Params, u64>().await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_persistence());
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("model.json"));
        let mut snap = snapshot(1.0);
        snap.version = "2.0.0".to_string();
        store.save(&snap, 1).await.unwrap();

        let err = store.load::<String, Params, u64>().await.unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_minor_version_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("model.json"));
        let mut snap = snapshot(1.0);
        snap.version = "1.4.2".to_string();
        store.save(&snap, 1).await.unwrap();
        assert!(store.load::<String, Params, u64>().await.is_ok());
    }

    #[tokio::test]
    async fn test_tampered_parameters_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("model.json"));
        let mut snap = snapshot(1.0);
        snap.parameters.weights[0][0] = 2.0;
        store.save(&snap, 1).await.unwrap();

        let err = store.load::<String, Params, u64>().await.unwrap_err();
        assert!(matches!(err, Error::CorruptSnapshot(_)));
    }

    #[tokio::test]
    async fn test_non_hex_checksum_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("model.json"));
        let mut snap = snapshot(1.0);
        snap.checksum = "aéééééééééééééé".to_string();
        store.save(&snap, 1).await.unwrap();

        let err = store.load::<String, Params, u64>().await.unwrap_err();
        assert!(matches!(err, Error::CorruptSnapshot(_)));
    }

    #[test]
    fn test_short_digest_respects_char_boundaries() {
        assert_eq!(short("aéééééééééééééé"), "aééééééééééé");
        assert_eq!(short("abc"), "abc");
    }

    #[tokio::test]
    async fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();
        let store = SnapshotStore::new(&path);
        let err = store.load::<String, Params, u64>().await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[tokio::test]
    async fn test_stale_generation_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("model.json"));
        assert!(store.save(&snapshot(3.0), 5).await.unwrap());
        assert!(!store.save(&snapshot(1.0), 4).await.unwrap());

        let loaded: Snapshot = store.load().await.unwrap();
        assert_eq!(loaded.parameters.weights[0][0], 3.0);
    }
}
