//! Local persistence of the active session's identity.
//!
//! One snapshot per client, written on every state-advancing event and read
//! back at startup. Snapshots older than the TTL are treated as absent and
//! removed on read.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use veil_common::Role;

/// Snapshots expire after one hour.
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_millis(3_600_000);

pub const SNAPSHOT_FILE_NAME: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub role: Role,
    pub company_name: String,
    pub committed: bool,
    pub result_revealed: bool,
    pub saved_at_epoch_millis: i64,
}

impl SessionSnapshot {
    pub fn age_millis(&self, now_millis: i64) -> i64 {
        now_millis - self.saved_at_epoch_millis
    }

    pub fn is_expired(&self, now_millis: i64, ttl: Duration) -> bool {
        self.age_millis(now_millis) >= ttl.as_millis() as i64
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Storage for the single active-session snapshot.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<()>;

    /// Read the snapshot as of `now_millis`, discarding it if expired.
    fn load_at(&self, now_millis: i64) -> Result<Option<SessionSnapshot>>;

    fn clear(&self) -> Result<()>;

    fn load(&self) -> Result<Option<SessionSnapshot>> {
        self.load_at(now_millis())
    }
}

/// JSON file store, e.g. `~/.local/share/veil/session.json`.
pub struct FileSnapshotStore {
    path: PathBuf,
    ttl: Duration,
}

impl FileSnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            ttl: DEFAULT_SNAPSHOT_TTL,
        }
    }

    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(SNAPSHOT_FILE_NAME))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        let json =
            serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;

        // Write-then-rename so a crash never leaves a half-written snapshot.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).context("Failed to write snapshot")?;
        fs::rename(&tmp, &self.path).context("Failed to move snapshot into place")?;
        tracing::debug!(session_id = %snapshot.session_id, path = %self.path.display(), "snapshot saved");
        Ok(())
    }

    fn load_at(&self, now_millis: i64) -> Result<Option<SessionSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).context("Failed to read snapshot")?;
        let snapshot: SessionSnapshot = match serde_json::from_str(&content) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable snapshot");
                self.clear()?;
                return Ok(None);
            }
        };

        if snapshot.is_expired(now_millis, self.ttl) {
            tracing::info!(
                session_id = %snapshot.session_id,
                age_ms = snapshot.age_millis(now_millis),
                "snapshot expired"
            );
            self.clear()?;
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).context("Failed to remove snapshot")?;
        }
        Ok(())
    }
}

/// In-process store. Nothing survives the process.
#[derive(Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<SessionSnapshot>>,
    ttl: Option<Duration>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// The raw stored value, ignoring TTL.
    pub fn peek(&self) -> Option<SessionSnapshot> {
        self.slot.lock().map(|s| s.clone()).unwrap_or(None)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("snapshot lock poisoned"))?;
        *slot = Some(snapshot.clone());
        Ok(())
    }

    fn load_at(&self, now_millis: i64) -> Result<Option<SessionSnapshot>> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("snapshot lock poisoned"))?;
        let ttl = self.ttl.unwrap_or(DEFAULT_SNAPSHOT_TTL);
        if slot.as_ref().is_some_and(|s| s.is_expired(now_millis, ttl)) {
            *slot = None;
        }
        Ok(slot.clone())
    }

    fn clear(&self) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("snapshot lock poisoned"))?;
        *slot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn snapshot(saved_at: i64) -> SessionSnapshot {
        SessionSnapshot {
            session_id: "abc123".into(),
            role: Role::Initiator,
            company_name: "Acme".into(),
            committed: true,
            result_revealed: false,
            saved_at_epoch_millis: saved_at,
        }
    }

    fn make_store() -> (FileSnapshotStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (FileSnapshotStore::in_dir(dir.path()), dir)
    }

    #[test]
    fn test_empty_store_returns_none() {
        let (store, _dir) = make_store();
        assert!(store.load_at(0).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_within_ttl() {
        let (store, _dir) = make_store();
        store.save(&snapshot(1_000)).unwrap();
        let loaded = store.load_at(1_000 + 3_599_999).unwrap().unwrap();
        assert_eq!(loaded, snapshot(1_000));
    }

    #[test]
    fn test_expired_snapshot_is_discarded_and_removed() {
        let (store, _dir) = make_store();
        store.save(&snapshot(1_000)).unwrap();
        assert!(store.load_at(1_000 + 3_600_000).unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_custom_ttl() {
        let dir = tempdir().unwrap();
        let store =
            FileSnapshotStore::in_dir(dir.path()).with_ttl(Duration::from_secs(10));
        store.save(&snapshot(0)).unwrap();
        assert!(store.load_at(9_999).unwrap().is_some());
        assert!(store.load_at(10_000).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_snapshot_is_discarded() {
        let (store, _dir) = make_store();
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load_at(0).unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_snapshot_survives_store_recreation() {
        let dir = tempdir().unwrap();
        {
            let store = FileSnapshotStore::in_dir(dir.path());
            store.save(&snapshot(5_000)).unwrap();
        }
        {
            let store = FileSnapshotStore::in_dir(dir.path());
            assert_eq!(store.load_at(6_000).unwrap(), Some(snapshot(5_000)));
        }
    }

    #[test]
    fn test_clear_removes_file() {
        let (store, _dir) = make_store();
        store.save(&snapshot(0)).unwrap();
        store.clear().unwrap();
        assert!(store.load_at(1).unwrap().is_none());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn test_persisted_layout_field_names() {
        let json = serde_json::to_value(snapshot(42)).unwrap();
        for key in [
            "session_id",
            "role",
            "company_name",
            "committed",
            "result_revealed",
            "saved_at_epoch_millis",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["role"], "company_a");
    }

    #[test]
    fn test_memory_store_honours_ttl() {
        let store = MemorySnapshotStore::new().with_ttl(Duration::from_millis(100));
        store.save(&snapshot(0)).unwrap();
        assert!(store.load_at(99).unwrap().is_some());
        assert!(store.load_at(100).unwrap().is_none());
        assert!(store.peek().is_none());
    }
}
