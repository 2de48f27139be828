//! Scratchpad for in-progress draft shapes
//!
//! A convenience store for free-hand vertex entry: drafts are parked here by
//! id between editing sessions. Orthogonal to the edit operations, which
//! accept draft values only - never scratchpad ids.

use std::collections::BTreeMap;

use crate::draft::DraftShape;
use crate::{EditorError, Result};

/// In-memory draft store, seeded from the persistence adapter at load.
#[derive(Debug, Default, Clone)]
pub struct DraftScratchpad {
    drafts: BTreeMap<String, DraftShape>,
    next_id: u64,
}

impl DraftScratchpad {
    /// Create an empty scratchpad.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with persisted entries.
    pub(crate) fn seed(&mut self, entries: Vec<(String, DraftShape)>) {
        self.drafts = entries.into_iter().collect();
    }

    /// Store a draft under `id`, or under a fresh generated id when `None`.
    /// Returns the id the draft now lives under.
    pub fn save(&mut self, id: Option<&str>, draft: DraftShape) -> String {
        let id = match id {
            Some(id) => id.to_owned(),
            None => loop {
                self.next_id += 1;
                let candidate = format!("draft-{}", self.next_id);
                if !self.drafts.contains_key(&candidate) {
                    break candidate;
                }
            },
        };
        self.drafts.insert(id.clone(), draft);
        id
    }

    /// Look up a draft by id.
    pub fn get(&self, id: &str) -> Option<DraftShape> {
        self.drafts.get(id).cloned()
    }

    /// All drafts in id order.
    pub fn list(&self) -> Vec<(String, DraftShape)> {
        self.drafts
            .iter()
            .map(|(id, draft)| (id.clone(), draft.clone()))
            .collect()
    }

    /// Remove a draft; a missing id signals [`EditorError::DraftNotFound`].
    pub fn delete(&mut self, id: &str) -> Result<()> {
        self.drafts
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| EditorError::DraftNotFound { id: id.to_owned() })
    }

    /// Number of stored drafts.
    #[inline]
    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    /// Whether the scratchpad is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}
