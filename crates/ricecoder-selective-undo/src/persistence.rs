//! Export and restore of file histories
//!
//! A snapshot stores only the raw events of a file. Segments and conflicts
//! are derived state, so restoring replays the events into a fresh history.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::history::{FileHistory, HistoryManager};
use crate::models::{EditEvent, FileKey};

const SNAPSHOT_VERSION: u32 = 1;

/// Serializable event log of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    /// Format version
    pub version: u32,
    /// File the events belong to
    pub file_key: FileKey,
    /// When the snapshot was taken
    pub exported_at: DateTime<Utc>,
    /// Events in arrival order
    pub events: Vec<EditEvent>,
}

impl HistorySnapshot {
    /// Snapshot of `events` for `file_key`
    pub fn new(file_key: FileKey, events: Vec<EditEvent>) -> Self {
        HistorySnapshot {
            version: SNAPSHOT_VERSION,
            file_key,
            exported_at: Utc::now(),
            events,
        }
    }

    /// Snapshot of a file history
    pub fn from_history(history: &FileHistory) -> Self {
        Self::new(history.key().clone(), history.events())
    }

    /// Snapshot of the history `manager` keeps for `file_key`
    pub fn capture(manager: &HistoryManager, file_key: &FileKey) -> Result<Self> {
        manager.with_history(file_key, Self::from_history)
    }

    /// Rebuild the history by replaying the events
    pub fn to_history(&self) -> Result<FileHistory> {
        FileHistory::replay(self.file_key.clone(), self.events.iter().cloned())
    }

    /// Replay into `manager`, replacing any history it has for the file
    pub fn restore(&self, manager: &HistoryManager) -> Result<()> {
        manager.install_history(self.to_history()?)?;
        info!(
            "Restored {} events into {}",
            self.events.len(),
            self.file_key
        );
        Ok(())
    }

    /// Pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse JSON produced by [`HistorySnapshot::to_json`]
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the snapshot as JSON to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?)?;
        debug!("Saved history snapshot to {:?}", path);
        Ok(())
    }

    /// Read a snapshot written by [`HistorySnapshot::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let snapshot = Self::from_json(&fs::read_to_string(path)?)?;
        debug!("Loaded history snapshot from {:?}", path);
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SelectiveUndoError;
    use crate::models::OperationId;
    use tempfile::TempDir;

    fn key() -> FileKey {
        FileKey::new("proj", "/src/Main.java")
    }

    fn manager() -> HistoryManager {
        let manager = HistoryManager::new();
        manager
            .record_edit(&key(), EditEvent::insert(OperationId::new(1, 1), 0, "hello"))
            .unwrap();
        manager
            .record_edit(&key(), EditEvent::delete(OperationId::new(1, 2), 0, "he"))
            .unwrap();
        manager
    }

    #[test]
    fn test_json_round_trip() {
        let snapshot = HistorySnapshot::capture(&manager(), &key()).unwrap();
        let parsed = HistorySnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(parsed, snapshot);
        assert_eq!(parsed.events.len(), 2);
    }

    #[test]
    fn test_restore_rebuilds_conflicts() {
        let snapshot = HistorySnapshot::capture(&manager(), &key()).unwrap();
        let fresh = HistoryManager::new();
        snapshot.restore(&fresh).unwrap();

        assert_eq!(fresh.query(&key()).unwrap().len(), 2);
        assert_eq!(
            fresh.get_conflicts(OperationId::new(1, 1)).unwrap(),
            vec![OperationId::new(1, 2)]
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let snapshot = HistorySnapshot::capture(&manager(), &key()).unwrap();
        snapshot.save(&path).unwrap();
        assert_eq!(HistorySnapshot::load(&path).unwrap(), snapshot);
    }

    #[test]
    fn test_corrupted_snapshot_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ invalid json }").unwrap();
        let result = HistorySnapshot::load(&path);
        assert!(matches!(result, Err(SelectiveUndoError::Serialization(_))));
    }

    #[test]
    fn test_capture_unknown_file() {
        let result = HistorySnapshot::capture(&HistoryManager::new(), &key());
        assert!(matches!(result, Err(SelectiveUndoError::FileNotFound(_))));
    }
}
