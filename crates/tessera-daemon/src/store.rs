//! Snapshot persistence.
//!
//! The whole host state is written as one JSON document after every
//! committed mutation. Writes go to a sibling temp file that is renamed
//! over the snapshot, so a crash leaves either the old or the new state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tessera_ledger::{InMemoryBook, Ledger, LedgerError};
use tessera_types::Tick;
use tracing::{debug, info};

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot format error: {0}")]
    Format(#[from] serde_json::Error),
    #[error("snapshot rejected: {0}")]
    Invalid(#[from] LedgerError),
}

/// Persisted host state.
#[derive(Debug, Clone, Deserialize)]
pub struct HostSnapshot {
    /// Host clock at the time of the write.
    pub tick: Tick,
    pub ledger: Ledger,
    pub book: InMemoryBook,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    tick: Tick,
    ledger: &'a Ledger,
    book: &'a InMemoryBook,
}

/// JSON snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, or `None` if no file exists yet.
    pub fn load(&self) -> Result<Option<HostSnapshot>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let snapshot: HostSnapshot = serde_json::from_str(&content)?;
        snapshot.ledger.check_invariants()?;
        info!(
            path = ?self.path,
            tick = snapshot.tick,
            escrow = snapshot.ledger.escrow(),
            "snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    /// Atomically replace the snapshot.
    pub fn save(&self, tick: Tick, ledger: &Ledger, book: &InMemoryBook) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&SnapshotRef { tick, ledger, book })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = ?self.path, tick, "snapshot written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_ledger::{CallContext, LedgerConfig};
    use tessera_types::Identity;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tessera-store-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = scratch_dir("missing");
        let store = SnapshotStore::new(dir.join("ledger.json"));
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn test_save_load_preserves_state() {
        let dir = scratch_dir("roundtrip");
        let store = SnapshotStore::new(dir.join("ledger.json"));

        let mut ledger = Ledger::new(LedgerConfig::default()).expect("ledger");
        let partner = Identity::derive("partner");
        ledger
            .become_partner(&CallContext::new(partner, 2), partner, "Shop")
            .expect("register");
        assert_eq!(ledger.drain_events().len(), 1);
        let book = InMemoryBook::new();

        store.save(4, &ledger, &book).expect("save");
        let loaded = store.load().expect("load").expect("present");
        assert_eq!(loaded.tick, 4);
        assert_eq!(loaded.ledger, ledger);
        assert_eq!(loaded.book, book);
        assert!(!dir.join("ledger.json.tmp").exists());
    }

    #[test]
    fn test_garbage_rejected() {
        let dir = scratch_dir("garbage");
        let path = dir.join("ledger.json");
        std::fs::write(&path, b"{not json").expect("write");
        let store = SnapshotStore::new(path);
        assert!(matches!(store.load(), Err(StoreError::Format(_))));
    }
}
