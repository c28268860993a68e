//! Single-slot persistence of the aggregate state.
//!
//! One record under one well-known key; every save overwrites the previous record.

use crate::aggregate::Snapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// The stored record: aggregate state plus the operator's pause flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub snapshot: Snapshot,
    pub paused: bool,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("state record could not be (de)serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replace the stored record.
    async fn save(&self, state: &PersistedState) -> Result<(), StoreError>;

    /// Stored record, or `None` if nothing was saved yet.
    async fn load(&self) -> Result<Option<PersistedState>, StoreError>;
}

/// JSON file `<dir>/<key>.json`, replaced through a temp file and rename.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
    key: String,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            key: key.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.key))
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json.tmp", self.key))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(state)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, self.path()).await?;
        tracing::trace!(path = %self.path().display(), "state saved");
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        let path = self.path();
        if !exists(&path).await? {
            return Ok(None);
        }
        let bytes = tokio::fs::read(&path).await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

async fn exists(path: &Path) -> Result<bool, std::io::Error> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// In-process store; keeps the last saved record and counts saves.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<PersistedState>>,
    saves: Mutex<u64>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves so far.
    pub fn saves(&self) -> u64 {
        *self.saves.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn stored(&self) -> Option<PersistedState> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(state.clone());
        *self.saves.lock().unwrap_or_else(|p| p.into_inner()) += 1;
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        Ok(self.stored())
    }
}
