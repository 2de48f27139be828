//! In-memory area catalog with implicit-child projection
//!
//! The store owns every explicit area, indexed by id, plus two secondary
//! indexes (`parent → children`, `level → areas`) maintained on every write.
//! Implicit children - the virtual single child of a childless non-leaf area -
//! are synthesized on demand in `get`/`get_children` and never stored.
//!
//! Ordered maps keep iteration (and therefore change-set and history order)
//! deterministic.

use std::collections::{BTreeMap, BTreeSet};

use crate::area::{Area, AreaId};
use crate::level::LevelStore;

/// Owner of all explicit areas and their secondary indexes.
#[derive(Debug, Default, Clone)]
pub struct AreaStore {
    /// Primary map: id → area.
    areas: BTreeMap<AreaId, Area>,
    /// parent id → explicit child ids.
    by_parent: BTreeMap<AreaId, BTreeSet<AreaId>>,
    /// level key → area ids at that level.
    by_level: BTreeMap<String, BTreeSet<AreaId>>,
}

impl AreaStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of explicit areas.
    #[inline]
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    /// Whether the store holds no explicit areas.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Whether `id` names a stored (explicit) area.
    #[inline]
    pub fn contains(&self, id: &AreaId) -> bool {
        self.areas.contains_key(id)
    }

    /// Look up an explicit area without implicit synthesis.
    pub fn get_explicit(&self, id: &AreaId) -> Option<&Area> {
        self.areas.get(id)
    }

    /// Resolve an id to an area, synthesizing implicit records.
    ///
    /// A real id resolves directly. An `implicit:<parent>:<level>` id
    /// resolves only when the parent resolves, `<level>` is the child level
    /// of the parent's level, and the parent has no explicit children.
    pub fn get(&self, id: &AreaId, levels: &LevelStore) -> Option<Area> {
        if let Some(area) = self.areas.get(id) {
            return Some(area.clone());
        }
        let (parent_id, level_key) = id.implicit_parts()?;
        let parent = self.get(&parent_id, levels)?;
        let child_level = levels.get_child_of(&parent.level_key)?;
        if child_level.key != level_key || !self.explicit_child_ids(&parent_id).is_empty() {
            return None;
        }
        Some(Self::synthesize_implicit(&parent, &level_key))
    }

    /// Children of `parent_id`: the explicit children when there are any,
    /// otherwise the single synthesized implicit child (or nothing at the
    /// leaf level).
    pub fn get_children(&self, parent_id: &AreaId, levels: &LevelStore) -> Vec<Area> {
        let explicit = self.explicit_children(parent_id);
        if !explicit.is_empty() {
            return explicit;
        }
        let Some(parent) = self.get(parent_id, levels) else {
            return Vec::new();
        };
        match levels.get_child_of(&parent.level_key) {
            Some(child_level) => vec![Self::synthesize_implicit(&parent, &child_level.key)],
            None => Vec::new(),
        }
    }

    /// Explicit children of `parent_id`, in id order.
    pub fn explicit_children(&self, parent_id: &AreaId) -> Vec<Area> {
        self.explicit_child_ids(parent_id)
            .iter()
            .filter_map(|id| self.areas.get(id).cloned())
            .collect()
    }

    /// Whether `id` has at least one explicit child.
    pub fn has_explicit_children(&self, id: &AreaId) -> bool {
        !self.explicit_child_ids(id).is_empty()
    }

    /// All areas with no parent.
    pub fn get_roots(&self) -> Vec<Area> {
        self.areas
            .values()
            .filter(|a| a.parent_id.is_none())
            .cloned()
            .collect()
    }

    /// Every explicit area.
    pub fn get_all(&self) -> Vec<Area> {
        self.areas.values().cloned().collect()
    }

    /// Every explicit area at the given level.
    pub fn get_by_level(&self, level_key: &str) -> Vec<Area> {
        self.by_level
            .get(level_key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.areas.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert a new area, maintaining both secondary indexes.
    pub fn add(&mut self, area: Area) {
        self.upsert(area);
    }

    /// Replace a stored area, maintaining both secondary indexes.
    pub fn update(&mut self, area: Area) {
        self.upsert(area);
    }

    fn upsert(&mut self, area: Area) {
        debug_assert!(!area.implicit, "implicit areas are never stored");
        let old_slots = self
            .areas
            .get(&area.id)
            .map(|old| (old.parent_id.clone(), old.level_key.clone()));
        if let Some((old_parent, old_level)) = old_slots {
            self.unindex(&area.id, old_parent.as_ref(), &old_level);
        }
        if let Some(parent) = &area.parent_id {
            self.by_parent
                .entry(parent.clone())
                .or_default()
                .insert(area.id.clone());
        }
        self.by_level
            .entry(area.level_key.clone())
            .or_default()
            .insert(area.id.clone());
        self.areas.insert(area.id.clone(), area);
    }

    /// Remove an area. Removing a missing id is a no-op.
    pub fn delete(&mut self, id: &AreaId) {
        let Some(area) = self.areas.remove(id) else {
            return;
        };
        self.unindex(id, area.parent_id.as_ref(), &area.level_key);
    }

    fn unindex(&mut self, id: &AreaId, parent: Option<&AreaId>, level_key: &str) {
        if let Some(parent) = parent
            && let Some(children) = self.by_parent.get_mut(parent)
        {
            children.remove(id);
            if children.is_empty() {
                self.by_parent.remove(parent);
            }
        }
        if let Some(ids) = self.by_level.get_mut(level_key) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_level.remove(level_key);
            }
        }
    }

    fn explicit_child_ids(&self, parent_id: &AreaId) -> BTreeSet<AreaId> {
        self.by_parent.get(parent_id).cloned().unwrap_or_default()
    }

    fn synthesize_implicit(parent: &Area, child_level_key: &str) -> Area {
        Area {
            id: AreaId::implicit(&parent.id, child_level_key),
            display_name: String::new(),
            level_key: child_level_key.to_owned(),
            parent_id: Some(parent.id.clone()),
            geometry: parent.geometry.clone(),
            metadata: None,
            created_at: parent.created_at,
            updated_at: parent.updated_at,
            implicit: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::AreaGeometry;
    use crate::level::AreaLevel;
    use geo::{Coord, LineString, Polygon};

    fn create_levels() -> LevelStore {
        LevelStore::new(vec![
            AreaLevel::new("prefecture", "Prefecture", None),
            AreaLevel::new("city", "City", Some("prefecture")),
            AreaLevel::new("block", "Block", Some("city")),
        ])
        .unwrap()
    }

    fn create_area(id: &str, level: &str, parent: Option<&str>) -> Area {
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
        Area::new(
            AreaId::new(id),
            level,
            parent.map(AreaId::new),
            AreaGeometry::Polygon(square),
        )
    }

    #[test]
    fn test_add_get_delete() {
        let levels = create_levels();
        let mut store = AreaStore::new();
        store.add(create_area("p1", "prefecture", None));
        assert_eq!(store.len(), 1);
        assert!(store.contains(&AreaId::new("p1")));
        assert!(store.get(&AreaId::new("p1"), &levels).is_some());

        store.delete(&AreaId::new("p1"));
        assert!(store.is_empty());
        // Deleting again is a no-op.
        store.delete(&AreaId::new("p1"));
    }

    #[test]
    fn test_implicit_child_synthesis() {
        let levels = create_levels();
        let mut store = AreaStore::new();
        store.add(create_area("p1", "prefecture", None));

        let children = store.get_children(&AreaId::new("p1"), &levels);
        assert_eq!(children.len(), 1);
        let implicit = &children[0];
        assert!(implicit.implicit);
        assert_eq!(implicit.level_key, "city");
        assert_eq!(implicit.id.as_str(), "implicit:p1:city");
        assert_eq!(implicit.parent_id, Some(AreaId::new("p1")));
        assert!(implicit.display_name.is_empty());

        // The deterministic id resolves to an equal record.
        let by_id = store.get(&implicit.id, &levels).unwrap();
        assert_eq!(&by_id, implicit);
    }

    #[test]
    fn test_implicit_suppressed_by_explicit_child() {
        let levels = create_levels();
        let mut store = AreaStore::new();
        store.add(create_area("p1", "prefecture", None));
        store.add(create_area("c1", "city", Some("p1")));

        let children = store.get_children(&AreaId::new("p1"), &levels);
        assert_eq!(children.len(), 1);
        assert!(!children[0].implicit);
        assert_eq!(children[0].id, AreaId::new("c1"));

        // The implicit id no longer resolves.
        assert!(
            store
                .get(&AreaId::new("implicit:p1:city"), &levels)
                .is_none()
        );
    }

    #[test]
    fn test_implicit_wrong_level_does_not_resolve() {
        let levels = create_levels();
        let mut store = AreaStore::new();
        store.add(create_area("p1", "prefecture", None));
        assert!(
            store
                .get(&AreaId::new("implicit:p1:block"), &levels)
                .is_none()
        );
        assert!(
            store
                .get(&AreaId::new("implicit:p9:city"), &levels)
                .is_none()
        );
    }

    #[test]
    fn test_nested_implicit_chain() {
        let levels = create_levels();
        let mut store = AreaStore::new();
        store.add(create_area("p1", "prefecture", None));

        let city = store.get_children(&AreaId::new("p1"), &levels).remove(0);
        let blocks = store.get_children(&city.id, &levels);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].level_key, "block");
        assert!(blocks[0].implicit);
        assert_eq!(blocks[0].id.as_str(), "implicit:implicit:p1:city:block");

        // Leaf level has no children at all.
        assert!(store.get_children(&blocks[0].id, &levels).is_empty());
    }

    #[test]
    fn test_leaf_parent_has_no_children() {
        let levels = create_levels();
        let mut store = AreaStore::new();
        store.add(create_area("p1", "prefecture", None));
        store.add(create_area("c1", "city", Some("p1")));
        store.add(create_area("b1", "block", Some("c1")));
        assert!(store.get_children(&AreaId::new("b1"), &levels).is_empty());
    }

    #[test]
    fn test_indexes_follow_updates() {
        let levels = create_levels();
        let mut store = AreaStore::new();
        store.add(create_area("p1", "prefecture", None));
        store.add(create_area("p2", "prefecture", None));
        store.add(create_area("c1", "city", Some("p1")));

        assert_eq!(store.get_by_level("city").len(), 1);
        assert_eq!(store.get_roots().len(), 2);

        // Move c1 under p2; the parent index must follow.
        let mut moved = store.get(&AreaId::new("c1"), &levels).unwrap();
        moved.parent_id = Some(AreaId::new("p2"));
        store.update(moved);

        assert!(store.explicit_children(&AreaId::new("p1")).is_empty());
        assert_eq!(store.explicit_children(&AreaId::new("p2")).len(), 1);
        assert!(store.has_explicit_children(&AreaId::new("p2")));
    }

    #[test]
    fn test_get_all_sorted_by_id() {
        let mut store = AreaStore::new();
        store.add(create_area("b", "prefecture", None));
        store.add(create_area("a", "prefecture", None));
        let all = store.get_all();
        assert_eq!(all[0].id, AreaId::new("a"));
        assert_eq!(all[1].id, AreaId::new("b"));
    }
}
