//! Durable blob stores for state snapshots.
//!
//! The container treats persistence as an opaque slot: write the latest
//! serialized snapshot, read it back on the next run. [`RedbBlobStore`] keeps
//! the slot in a redb file (or an in-memory redb for tests);
//! [`MemoryBlobStore`] is a plain in-process slot.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::{SNAPSHOTS, STATE_KEY};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Opaque save/load of a serialized snapshot at a fixed location.
pub trait BlobStore: Send + Sync {
    /// Read the latest snapshot, or `None` if nothing was ever written.
    fn read(&self) -> StateResult<Option<Vec<u8>>>;

    /// Replace the stored snapshot.
    fn write(&self, bytes: &[u8]) -> StateResult<()>;

    /// Drop the stored snapshot. Returns true if one existed.
    fn clear(&self) -> StateResult<bool>;
}

// ── redb ───────────────────────────────────────────────────────────

/// Snapshot slot backed by redb.
#[derive(Clone)]
pub struct RedbBlobStore {
    db: Arc<Database>,
}

impl RedbBlobStore {
    /// Open (or create) the snapshot database at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(map_err!(Open))?;
        }
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "snapshot store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory snapshot database (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory snapshot store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

impl BlobStore for RedbBlobStore {
    fn read(&self) -> StateResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        let bytes = table
            .get(STATE_KEY)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_vec());
        Ok(bytes)
    }

    fn write(&self, bytes: &[u8]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
            table.insert(STATE_KEY, bytes).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(bytes = bytes.len(), "snapshot stored");
        Ok(())
    }

    fn clear(&self) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
            existed = table.remove(STATE_KEY).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(existed, "snapshot cleared");
        Ok(existed)
    }
}

// ── In-process ─────────────────────────────────────────────────────

/// Snapshot slot held in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    slot: Mutex<Option<Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-loaded with raw bytes.
    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            slot: Mutex::new(Some(bytes.into())),
        }
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self) -> StateResult<Option<Vec<u8>>> {
        Ok(self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn write(&self, bytes: &[u8]) -> StateResult<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes.to_vec());
        Ok(())
    }

    fn clear(&self) -> StateResult<bool> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some())
    }
}
