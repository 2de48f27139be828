//! History entries, change sets, and the bounded undo/redo stacks
//!
//! Every successful edit operation produces exactly one [`HistoryEntry`]:
//! full snapshots of everything it created, deleted, and modified. The entry
//! serves two masters - the undo machinery replays it in either direction,
//! and a [`ChangeSet`] (the storage-facing delta) is projected from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::area::{Area, AreaId};

/// Before/after snapshot pair of one modified area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiedPair {
    pub before: Area,
    pub after: Area,
}

/// Self-contained record of one operation, enabling undo/redo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Areas the operation created (full snapshots).
    pub created: Vec<Area>,
    /// Areas the operation deleted (full snapshots).
    pub deleted: Vec<Area>,
    /// Areas the operation modified, as before/after pairs.
    pub modified: Vec<ModifiedPair>,
}

impl HistoryEntry {
    /// Whether the entry records no change at all.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }
}

/// The delta handed to the persistence adapter after an operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Newly created areas (full records).
    pub created: Vec<Area>,
    /// Identifiers of removed areas.
    pub deleted: Vec<AreaId>,
    /// After-images of modified areas.
    pub modified: Vec<Area>,
}

impl ChangeSet {
    /// Project the forward delta of an entry (normal operations, redo).
    ///
    /// An area modified more than once in one entry (an ancestor shared by
    /// several propagation walks) appears once, at its final after-image.
    pub fn forward(entry: &HistoryEntry) -> Self {
        let mut modified: BTreeMap<AreaId, Area> = BTreeMap::new();
        for pair in &entry.modified {
            modified.insert(pair.after.id.clone(), pair.after.clone());
        }
        Self {
            created: entry.created.clone(),
            deleted: entry.deleted.iter().map(|a| a.id.clone()).collect(),
            modified: modified.into_values().collect(),
        }
    }

    /// Project the reverse delta of an entry (undo): creations become
    /// deletions, deletions become creations, modifications roll back to
    /// their before-images. Reverse application replays pairs backwards, so
    /// a repeated id settles on its earliest before-image.
    pub fn reverse(entry: &HistoryEntry) -> Self {
        let mut modified: BTreeMap<AreaId, Area> = BTreeMap::new();
        for pair in &entry.modified {
            modified
                .entry(pair.before.id.clone())
                .or_insert_with(|| pair.before.clone());
        }
        Self {
            created: entry.deleted.clone(),
            deleted: entry.created.iter().map(|a| a.id.clone()).collect(),
            modified: modified.into_values().collect(),
        }
    }

    /// Whether the change set carries nothing.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }
}

/// Bounded undo stack plus parallel redo stack.
///
/// Recording a new entry clears the redo stack; when the undo stack exceeds
/// the bound, the oldest entry is dropped and its information is lost
/// permanently.
#[derive(Debug)]
pub struct History {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    max_steps: usize,
}

impl History {
    /// Create an empty history with the given bound.
    pub fn new(max_steps: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            max_steps,
        }
    }

    /// Record a fresh entry: push to undo, clear redo, trim the oldest.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.redo.clear();
        self.undo.push(entry);
        if self.undo.len() > self.max_steps {
            self.undo.remove(0);
        }
    }

    /// Pop the most recent entry for undoing.
    pub fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.undo.pop()
    }

    /// Park an undone entry on the redo stack.
    pub fn push_redo(&mut self, entry: HistoryEntry) {
        self.redo.push(entry);
    }

    /// Pop the most recently undone entry for redoing.
    pub fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.redo.pop()
    }

    /// Return a redone entry to the undo stack without touching redo.
    ///
    /// Entries only move between the two stacks here, so the bound cannot be
    /// exceeded.
    pub fn restore(&mut self, entry: HistoryEntry) {
        self.undo.push(entry);
    }

    /// Whether an undo step is available.
    #[inline]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Whether a redo step is available.
    #[inline]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Depth of the undo stack.
    #[inline]
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Depth of the redo stack.
    #[inline]
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }
}
