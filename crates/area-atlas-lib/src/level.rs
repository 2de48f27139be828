//! Static level taxonomy for the area hierarchy
//!
//! Levels form a linear chain (country → prefecture → city → …): each level
//! names at most one parent, and each key appears as a parent of at most one
//! other level. The chain is validated once at construction and never changes
//! afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{EditorError, Result};

/// A single rung of the level chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaLevel {
    /// Unique key referenced by [`Area::level_key`](crate::Area).
    pub key: String,
    /// Display name.
    pub name: String,
    /// Key of the parent level, or `None` for the root level.
    pub parent_level_key: Option<String>,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AreaLevel {
    /// Create a level under the given parent key (`None` for the root).
    pub fn new(key: impl Into<String>, name: impl Into<String>, parent: Option<&str>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            parent_level_key: parent.map(str::to_owned),
            description: None,
        }
    }
}

/// Validated, immutable index over the declared level chain.
#[derive(Debug, Clone)]
pub struct LevelStore {
    /// Levels in declaration order.
    levels: Vec<AreaLevel>,
    /// key → index into `levels`.
    by_key: HashMap<String, usize>,
    /// parent key → index of the level declaring it as parent.
    child_of: HashMap<String, usize>,
    /// Index of the single root level, if any level was declared.
    root: Option<usize>,
}

impl LevelStore {
    /// Validate the declared level list and build the index.
    ///
    /// Rules: all keys distinct; every referenced parent key exists; the
    /// parent chain is acyclic; any key (including "no parent") is claimed as
    /// parent by at most one level. Violations signal
    /// [`EditorError::InvalidLevelConfig`] naming the offense.
    pub fn new(levels: Vec<AreaLevel>) -> Result<Self> {
        let mut by_key = HashMap::with_capacity(levels.len());
        for (i, level) in levels.iter().enumerate() {
            if by_key.insert(level.key.clone(), i).is_some() {
                return Err(EditorError::invalid_level_config(format!(
                    "duplicate level key '{}'",
                    level.key
                )));
            }
        }

        let mut child_of: HashMap<String, usize> = HashMap::new();
        let mut root = None;
        for (i, level) in levels.iter().enumerate() {
            match &level.parent_level_key {
                Some(parent) => {
                    if !by_key.contains_key(parent) {
                        return Err(EditorError::invalid_level_config(format!(
                            "level '{}' references unknown parent '{}'",
                            level.key, parent
                        )));
                    }
                    if child_of.insert(parent.clone(), i).is_some() {
                        return Err(EditorError::invalid_level_config(format!(
                            "level '{parent}' is claimed as parent by more than one level"
                        )));
                    }
                }
                None => {
                    if root.replace(i).is_some() {
                        return Err(EditorError::invalid_level_config(
                            "more than one root level declared".to_owned(),
                        ));
                    }
                }
            }
        }

        // Walk the parent chain from every level; revisiting a key means the
        // chain loops back on itself.
        for level in &levels {
            let mut seen = vec![level.key.as_str()];
            let mut cursor = level.parent_level_key.as_deref();
            while let Some(key) = cursor {
                if seen.contains(&key) {
                    return Err(EditorError::invalid_level_config(format!(
                        "cycle through level '{key}'"
                    )));
                }
                seen.push(key);
                cursor = levels[by_key[key]].parent_level_key.as_deref();
            }
        }

        Ok(Self {
            levels,
            by_key,
            child_of,
            root,
        })
    }

    /// Look up a level by key.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&AreaLevel> {
        self.by_key.get(key).map(|&i| &self.levels[i])
    }

    /// The level whose `parent_level_key` equals `key`, if any.
    #[inline]
    pub fn get_child_of(&self, key: &str) -> Option<&AreaLevel> {
        self.child_of.get(key).map(|&i| &self.levels[i])
    }

    /// Whether `key` names the last rung of the chain.
    ///
    /// Unknown keys are not leaves.
    #[inline]
    pub fn is_leaf(&self, key: &str) -> bool {
        self.by_key.contains_key(key) && !self.child_of.contains_key(key)
    }

    /// The single root level (the one with no parent), if declared.
    #[inline]
    pub fn root(&self) -> Option<&AreaLevel> {
        self.root.map(|i| &self.levels[i])
    }

    /// All levels in declaration order, as a defensive copy.
    pub fn all(&self) -> Vec<AreaLevel> {
        self.levels.clone()
    }

    /// Number of declared levels.
    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether no level was declared.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
