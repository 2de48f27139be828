//! Persistence adapter seam and reference backends
//!
//! The editor talks to storage through a single object-safe trait: one full
//! load at initialization, one batch write per successful operation.
//! Atomicity and ordering of the batch are the adapter's concern; the editor
//! assumes neither and never retries.
//!
//! Two reference backends ship with the crate: `MemoryStorage` (used heavily
//! by the test suites, with change-set recording and failure injection) and
//! `FileStorage` (a single JSON document rewritten synchronously per batch).

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::area::{Area, AreaId};
use crate::draft::DraftShape;
use crate::history::ChangeSet;

/// Error type for storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Everything a backend returns at load time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// Every persisted (real) area.
    pub areas: Vec<Area>,
    /// Optionally persisted scratchpad drafts, keyed by draft id.
    #[serde(default)]
    pub drafts: Vec<(String, DraftShape)>,
}

/// Persistence seam used by the editor.
///
/// `load_all` is called once during initialization; `batch_write` at most
/// once per edit operation, after all in-memory mutation has completed.
pub trait StorageAdapter: Send + Sync {
    /// Return the full persisted catalog.
    fn load_all(&self) -> StorageResult<CatalogSnapshot>;

    /// Durably apply one change set.
    fn batch_write(&self, change_set: &ChangeSet) -> StorageResult<()>;
}

impl<T: StorageAdapter + ?Sized> StorageAdapter for Arc<T> {
    fn load_all(&self) -> StorageResult<CatalogSnapshot> {
        (**self).load_all()
    }

    fn batch_write(&self, change_set: &ChangeSet) -> StorageResult<()> {
        (**self).batch_write(change_set)
    }
}

/// In-memory backend.
///
/// Records every change set it receives and can be armed to fail the next
/// write, which the scenario and property suites use to observe the
/// editor's storage behavior.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    areas: BTreeMap<AreaId, Area>,
    drafts: Vec<(String, DraftShape)>,
    writes: Vec<ChangeSet>,
    fail_next_write: bool,
}

impl MemoryStorage {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-seeded with areas.
    pub fn with_areas(areas: Vec<Area>) -> Self {
        Self::with_snapshot(CatalogSnapshot {
            areas,
            drafts: Vec::new(),
        })
    }

    /// Create a backend pre-seeded with a full snapshot.
    pub fn with_snapshot(snapshot: CatalogSnapshot) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                areas: snapshot
                    .areas
                    .into_iter()
                    .map(|a| (a.id.clone(), a))
                    .collect(),
                drafts: snapshot.drafts,
                ..MemoryInner::default()
            }),
        }
    }

    /// Arm the backend to fail its next `batch_write`.
    pub fn fail_next_write(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_next_write = true;
        }
    }

    /// Every change set received so far, in order.
    pub fn writes(&self) -> Vec<ChangeSet> {
        self.inner
            .lock()
            .map(|inner| inner.writes.clone())
            .unwrap_or_default()
    }

    /// Number of `batch_write` calls received.
    pub fn write_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.writes.len())
            .unwrap_or(0)
    }

    /// Current persisted areas, in id order.
    pub fn areas(&self) -> Vec<Area> {
        self.inner
            .lock()
            .map(|inner| inner.areas.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl StorageAdapter for MemoryStorage {
    fn load_all(&self) -> StorageResult<CatalogSnapshot> {
        let inner = self
            .inner
            .lock()
            .map_err(|e| StorageError::Backend(format!("mutex poisoned: {e:?}")))?;
        Ok(CatalogSnapshot {
            areas: inner.areas.values().cloned().collect(),
            drafts: inner.drafts.clone(),
        })
    }

    fn batch_write(&self, change_set: &ChangeSet) -> StorageResult<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| StorageError::Backend(format!("mutex poisoned: {e:?}")))?;
        if inner.fail_next_write {
            inner.fail_next_write = false;
            return Err(StorageError::Backend("injected write failure".to_owned()));
        }
        for area in &change_set.created {
            inner.areas.insert(area.id.clone(), area.clone());
        }
        for id in &change_set.deleted {
            inner.areas.remove(id);
        }
        for area in &change_set.modified {
            inner.areas.insert(area.id.clone(), area.clone());
        }
        inner.writes.push(change_set.clone());
        Ok(())
    }
}

/// File-backed backend: one JSON document holding the id → area map.
///
/// The document is read fully at construction; every batch mutates the
/// in-memory map and rewrites the file synchronously.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    inner: Mutex<BTreeMap<AreaId, Area>>,
}

impl FileStorage {
    /// Open (or create) the backing document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| StorageError::Io(format!("failed to create '{parent:?}': {e}")))?;
        }

        let mut map = BTreeMap::new();
        if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| StorageError::Io(format!("failed to read catalog file: {e}")))?;
            if !raw.trim().is_empty() {
                map = serde_json::from_str(&raw)
                    .map_err(|e| StorageError::Json(format!("failed to parse catalog: {e}")))?;
            }
        }

        Ok(Self {
            path,
            inner: Mutex::new(map),
        })
    }

    fn flush_locked(&self, map: &BTreeMap<AreaId, Area>) -> StorageResult<()> {
        let raw = serde_json::to_string_pretty(map).map_err(|e| StorageError::Json(e.to_string()))?;
        fs::write(&self.path, raw).map_err(|e| StorageError::Io(format!("write failed: {e}")))
    }
}

impl StorageAdapter for FileStorage {
    fn load_all(&self) -> StorageResult<CatalogSnapshot> {
        let map = self
            .inner
            .lock()
            .map_err(|e| StorageError::Backend(format!("mutex poisoned: {e:?}")))?;
        Ok(CatalogSnapshot {
            areas: map.values().cloned().collect(),
            drafts: Vec::new(),
        })
    }

    fn batch_write(&self, change_set: &ChangeSet) -> StorageResult<()> {
        let mut map = self
            .inner
            .lock()
            .map_err(|e| StorageError::Backend(format!("mutex poisoned: {e:?}")))?;
        for area in &change_set.created {
            map.insert(area.id.clone(), area.clone());
        }
        for id in &change_set.deleted {
            map.remove(id);
        }
        for area in &change_set.modified {
            map.insert(area.id.clone(), area.clone());
        }
        self.flush_locked(&map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::AreaGeometry;
    use geo::{Coord, LineString, Polygon};

    fn create_area(id: &str) -> Area {
        let square = Polygon::new(
            LineString::new(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 1.0, y: 0.0 },
                Coord { x: 1.0, y: 1.0 },
                Coord { x: 0.0, y: 1.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![],
        );
        Area::new(AreaId::new(id), "city", None, AreaGeometry::Polygon(square))
    }

    fn create_change_set() -> ChangeSet {
        ChangeSet {
            created: vec![create_area("a-1")],
            deleted: Vec::new(),
            modified: Vec::new(),
        }
    }

    #[test]
    fn test_memory_roundtrip() {
        let storage = MemoryStorage::new();
        storage.batch_write(&create_change_set()).unwrap();
        assert_eq!(storage.write_count(), 1);

        let snapshot = storage.load_all().unwrap();
        assert_eq!(snapshot.areas.len(), 1);
        assert_eq!(snapshot.areas[0].id.as_str(), "a-1");

        storage
            .batch_write(&ChangeSet {
                deleted: vec![AreaId::new("a-1")],
                ..ChangeSet::default()
            })
            .unwrap();
        assert!(storage.load_all().unwrap().areas.is_empty());
    }

    #[test]
    fn test_memory_failure_injection() {
        let storage = MemoryStorage::new();
        storage.fail_next_write();
        assert!(storage.batch_write(&create_change_set()).is_err());
        // The failure is one-shot and the failed batch left no trace.
        assert_eq!(storage.write_count(), 0);
        assert!(storage.load_all().unwrap().areas.is_empty());
        storage.batch_write(&create_change_set()).unwrap();
        assert_eq!(storage.write_count(), 1);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let storage = FileStorage::new(&path).unwrap();
        storage.batch_write(&create_change_set()).unwrap();

        // A fresh handle over the same file sees the write.
        let reopened = FileStorage::new(&path).unwrap();
        let snapshot = reopened.load_all().unwrap();
        assert_eq!(snapshot.areas.len(), 1);
        assert_eq!(snapshot.areas[0].id.as_str(), "a-1");
    }

    #[test]
    fn test_file_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let storage = FileStorage::new(&path).unwrap();
        assert!(storage.load_all().unwrap().areas.is_empty());
    }
}
