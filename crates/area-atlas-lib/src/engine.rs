//! The transactional edit engine and public editor surface
//!
//! Every operation follows the same shape: preconditions are checked against
//! the level and area stores before any mutation, geometry work runs through
//! the kernel wrapper, the store is mutated, ancestor geometries are
//! propagated, one history entry is recorded (clearing redo, trimming the
//! oldest past the bound), and the resulting change set is dispatched to the
//! persistence adapter exactly once. A storage failure surfaces to the caller
//! without rolling back memory; `undo` is the recovery tool.

use std::collections::{BTreeSet, VecDeque};

use geo::Coord;

use crate::area::{Area, AreaGeometry, AreaId};
use crate::draft::{self, DraftShape, DraftViolation, LatLng};
use crate::geometry::{self, DEFAULT_EPSILON};
use crate::history::{ChangeSet, History, HistoryEntry, ModifiedPair};
use crate::level::{AreaLevel, LevelStore};
use crate::propagate::propagate_from;
use crate::scratchpad::DraftScratchpad;
use crate::storage::StorageAdapter;
use crate::store::AreaStore;
use crate::{EditorError, Result};

/// Editor construction parameters.
#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// Undo-stack bound; the oldest entry is dropped past it.
    pub max_undo_steps: usize,
    /// Vertex-equality tolerance in degrees.
    pub epsilon: f64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_undo_steps: 100,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// One item of a `bulk_create` batch.
#[derive(Debug, Clone)]
pub struct NewAreaSpec {
    pub draft: DraftShape,
    pub display_name: String,
    pub level_key: String,
    pub parent_id: Option<AreaId>,
}

/// The transactional editor over one in-memory catalog.
///
/// Single logical owner, no internal synchronization: each operation runs to
/// completion against in-memory state, with the one outbound adapter call as
/// its final step.
pub struct AreaEditor {
    storage: Box<dyn StorageAdapter>,
    levels: LevelStore,
    store: AreaStore,
    history: History,
    scratchpad: DraftScratchpad,
    config: EditorConfig,
    initialized: bool,
    next_area_id: u64,
}

impl std::fmt::Debug for AreaEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AreaEditor")
            .field("levels", &self.levels)
            .field("store", &self.store)
            .field("history", &self.history)
            .field("scratchpad", &self.scratchpad)
            .field("config", &self.config)
            .field("initialized", &self.initialized)
            .field("next_area_id", &self.next_area_id)
            .finish()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl AreaEditor {
    /// Create an editor over the given adapter and level taxonomy.
    ///
    /// Validates the taxonomy immediately; the catalog itself is not loaded
    /// until [`initialize`](Self::initialize).
    pub fn new(
        storage: Box<dyn StorageAdapter>,
        levels: Vec<AreaLevel>,
        config: EditorConfig,
    ) -> Result<Self> {
        let levels = LevelStore::new(levels)?;
        let max_undo_steps = config.max_undo_steps;
        Ok(Self {
            storage,
            levels,
            store: AreaStore::new(),
            history: History::new(max_undo_steps),
            scratchpad: DraftScratchpad::new(),
            config,
            initialized: false,
            next_area_id: 0,
        })
    }

    /// Load the full catalog from the adapter and arm the editor.
    ///
    /// Checks referential integrity of the loaded data: unique real ids,
    /// resolvable level keys, resolvable parent ids. Violations surface as
    /// [`EditorError::DataIntegrity`].
    pub fn initialize(&mut self) -> Result<()> {
        let snapshot = self.storage.load_all()?;

        let mut ids: BTreeSet<AreaId> = BTreeSet::new();
        for area in &snapshot.areas {
            if area.implicit || area.id.is_implicit() {
                return Err(EditorError::data_integrity(format!(
                    "implicit record '{}' in storage",
                    area.id
                )));
            }
            if !ids.insert(area.id.clone()) {
                return Err(EditorError::data_integrity(format!(
                    "duplicate area id '{}'",
                    area.id
                )));
            }
            if self.levels.get(&area.level_key).is_none() {
                return Err(EditorError::data_integrity(format!(
                    "area '{}' references unknown level '{}'",
                    area.id, area.level_key
                )));
            }
        }
        for area in &snapshot.areas {
            if let Some(parent) = &area.parent_id
                && !ids.contains(parent)
            {
                return Err(EditorError::data_integrity(format!(
                    "area '{}' references missing parent '{}'",
                    area.id, parent
                )));
            }
        }

        let mut store = AreaStore::new();
        for area in snapshot.areas {
            store.add(area);
        }
        self.store = store;
        self.scratchpad.seed(snapshot.drafts);
        self.history = History::new(self.config.max_undo_steps);
        self.initialized = true;
        tracing::debug!(areas = self.store.len(), "catalog loaded");
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has completed.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The active configuration.
    #[inline]
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Edit operations
    // ------------------------------------------------------------------

    /// Materialize a closed draft as a new area.
    ///
    /// The level must exist; a parent is required exactly when the level is
    /// not the root of the chain, and must sit at the level's parent level.
    pub fn save_as_area(
        &mut self,
        draft: &DraftShape,
        name: &str,
        level_key: &str,
        parent_id: Option<&AreaId>,
    ) -> Result<Area> {
        self.ensure_initialized()?;
        let geometry = self.draft_geometry(draft)?;
        let level = self.require_level(level_key)?;
        self.check_parent_level(&level, parent_id)?;

        let id = self.allocate_id();
        let mut area = Area::new(id, level_key, parent_id.cloned(), geometry);
        area.display_name = name.to_owned();
        self.store.add(area.clone());
        let pairs = propagate_from(&mut self.store, area.parent_id.as_ref());

        self.commit(HistoryEntry {
            created: vec![area.clone()],
            deleted: Vec::new(),
            modified: pairs,
        })?;
        tracing::debug!(id = %area.id, level = level_key, "saved area");
        Ok(area)
    }

    /// Create a batch of areas atomically.
    ///
    /// Fail-fast: every item is validated against all `save_as_area` rules
    /// before anything mutates; any failure aborts the whole batch with no
    /// store change and no adapter call. The returned list is parallel to
    /// the input; one undo reverses the entire batch.
    pub fn bulk_create(&mut self, items: &[NewAreaSpec]) -> Result<Vec<Area>> {
        self.ensure_initialized()?;

        let mut geometries = Vec::with_capacity(items.len());
        for item in items {
            let geometry = self.draft_geometry(&item.draft)?;
            let level = self.require_level(&item.level_key)?;
            self.check_parent_level(&level, item.parent_id.as_ref())?;
            geometries.push(geometry);
        }

        let mut created = Vec::with_capacity(items.len());
        let mut parents: Vec<AreaId> = Vec::new();
        for (item, geometry) in items.iter().zip(geometries) {
            let id = self.allocate_id();
            let mut area = Area::new(id, &item.level_key, item.parent_id.clone(), geometry);
            area.display_name = item.display_name.clone();
            self.store.add(area.clone());
            if let Some(parent) = &area.parent_id
                && !parents.contains(parent)
            {
                parents.push(parent.clone());
            }
            created.push(area);
        }

        let mut pairs = Vec::new();
        for parent in &parents {
            pairs.extend(propagate_from(&mut self.store, Some(parent)));
        }

        self.commit(HistoryEntry {
            created: created.clone(),
            deleted: Vec::new(),
            modified: pairs,
        })?;
        tracing::debug!(count = created.len(), "bulk-created areas");
        Ok(created)
    }

    /// Replace the geometry of a childless area from a closed draft.
    pub fn update_area_geometry(&mut self, area_id: &AreaId, draft: &DraftShape) -> Result<Area> {
        self.ensure_initialized()?;
        let area = self.require_real(area_id)?;
        self.ensure_no_children(&area)?;
        let geometry = self.draft_geometry(draft)?;

        let before = area.clone();
        let mut after = area;
        after.geometry = geometry;
        after.touch();
        self.store.update(after.clone());

        let mut pairs = vec![ModifiedPair {
            before,
            after: after.clone(),
        }];
        pairs.extend(propagate_from(&mut self.store, after.parent_id.as_ref()));

        self.commit(HistoryEntry {
            created: Vec::new(),
            deleted: Vec::new(),
            modified: pairs,
        })?;
        Ok(after)
    }

    /// Delete an area; with `cascade`, its whole explicit subtree.
    ///
    /// Without `cascade` the target must have no explicit children. Returns
    /// the removed areas (target first, then descendants in breadth-first
    /// order).
    pub fn delete_area(&mut self, area_id: &AreaId, cascade: bool) -> Result<Vec<Area>> {
        self.ensure_initialized()?;
        let area = self.require_real(area_id)?;

        let doomed = if cascade {
            self.collect_subtree(&area)
        } else {
            self.ensure_no_children(&area)?;
            vec![area.clone()]
        };

        for victim in &doomed {
            self.store.delete(&victim.id);
        }
        let pairs = propagate_from(&mut self.store, area.parent_id.as_ref());

        self.commit(HistoryEntry {
            created: Vec::new(),
            deleted: doomed.clone(),
            modified: pairs,
        })?;
        tracing::debug!(id = %area.id, removed = doomed.len(), "deleted area");
        Ok(doomed)
    }

    /// Replace an area's display name. Geometry is untouched, so no
    /// propagation runs.
    pub fn rename_area(&mut self, area_id: &AreaId, name: &str) -> Result<Area> {
        self.ensure_initialized()?;
        let area = self.require_real(area_id)?;

        let before = area.clone();
        let mut after = area;
        after.display_name = name.to_owned();
        after.touch();
        self.store.update(after.clone());

        self.commit(HistoryEntry {
            created: Vec::new(),
            deleted: Vec::new(),
            modified: vec![ModifiedPair {
                before,
                after: after.clone(),
            }],
        })?;
        Ok(after)
    }

    /// Move an area under a new parent (or to the root slot).
    ///
    /// The old parent must keep at least one other explicit child, and the
    /// new parent must not be a descendant of the moved area. Ancestor
    /// geometries are deliberately not recomputed on either chain: the
    /// operation trusts the caller to reparent an area whose footprint
    /// already matches its destination.
    pub fn reparent_area(&mut self, area_id: &AreaId, new_parent_id: Option<&AreaId>) -> Result<Area> {
        self.ensure_initialized()?;
        let area = self.require_real(area_id)?;
        let level = self.require_level(&area.level_key)?;
        self.check_parent_level(&level, new_parent_id)?;

        if let Some(old_parent) = &area.parent_id
            && new_parent_id != Some(old_parent)
            && self.store.explicit_children(old_parent).len() <= 1
        {
            return Err(EditorError::ParentWouldBeEmpty {
                id: area.id.to_string(),
            });
        }

        if let Some(new_parent) = new_parent_id
            && self.is_in_subtree(&area.id, new_parent)
        {
            return Err(EditorError::CircularReference {
                id: area.id.to_string(),
            });
        }

        let before = area.clone();
        let mut after = area;
        after.parent_id = new_parent_id.cloned();
        after.touch();
        self.store.update(after.clone());

        self.commit(HistoryEntry {
            created: Vec::new(),
            deleted: Vec::new(),
            modified: vec![ModifiedPair {
                before,
                after: after.clone(),
            }],
        })?;
        Ok(after)
    }

    /// Absorb a sibling: the survivor takes the union of both geometries and
    /// the other area is deleted.
    ///
    /// Both must be childless siblings at the same level. Ancestor
    /// propagation is skipped - the parent's union is unchanged by
    /// associativity.
    pub fn merge_area(&mut self, area_id: &AreaId, other_area_id: &AreaId) -> Result<Area> {
        self.ensure_initialized()?;
        let survivor = self.require_real(area_id)?;
        let other = self.require_real(other_area_id)?;

        if survivor.id == other.id {
            return Err(EditorError::invalid_geometry(
                "cannot merge an area with itself",
            ));
        }
        if survivor.parent_id != other.parent_id {
            return Err(EditorError::level_mismatch(format!(
                "areas '{}' and '{}' are not siblings",
                survivor.id, other.id
            )));
        }
        if survivor.level_key != other.level_key {
            return Err(EditorError::level_mismatch(format!(
                "areas '{}' and '{}' are not at the same level",
                survivor.id, other.id
            )));
        }
        self.ensure_no_children(&survivor)?;
        self.ensure_no_children(&other)?;

        let union = survivor.geometry.to_multi();
        let union = geometry::union_all([union, other.geometry.to_multi()]);
        let before = survivor.clone();
        let mut after = survivor;
        after.geometry = AreaGeometry::from_union(union);
        after.touch();
        self.store.update(after.clone());
        self.store.delete(&other.id);

        self.commit(HistoryEntry {
            created: Vec::new(),
            deleted: vec![other],
            modified: vec![ModifiedPair {
                before,
                after: after.clone(),
            }],
        })?;
        Ok(after)
    }

    /// Move one exterior-ring vertex of a childless area, dragging every
    /// coinciding vertex on any ring of any sibling along with it.
    ///
    /// Shared corners are identified purely by coordinate coincidence within
    /// the configured epsilon - there is no separate topology graph. The
    /// search is restricted to siblings; higher levels are reached through
    /// ancestor propagation instead.
    pub fn shared_edge_move(
        &mut self,
        area_id: &AreaId,
        vertex_index: usize,
        new_lat: f64,
        new_lng: f64,
    ) -> Result<Vec<Area>> {
        self.ensure_initialized()?;
        let area = self.require_real(area_id)?;
        self.ensure_no_children(&area)?;

        let target = geometry::exterior_vertex(&area.geometry, vertex_index)
            .ok_or_else(|| EditorError::invalid_geometry("area has no exterior ring"))?;
        let replacement = Coord {
            x: new_lng,
            y: new_lat,
        };

        let siblings: Vec<Area> = self
            .store
            .get_all()
            .into_iter()
            .filter(|candidate| candidate.parent_id == area.parent_id)
            .collect();

        let mut pairs = Vec::new();
        let mut touched = Vec::new();
        for sibling in siblings {
            let Some(rewritten) = geometry::rewrite_matching_vertices(
                &sibling.geometry,
                target,
                replacement,
                self.config.epsilon,
            ) else {
                continue;
            };
            let before = sibling.clone();
            let mut after = sibling;
            after.geometry = rewritten;
            after.touch();
            self.store.update(after.clone());
            touched.push(after.clone());
            pairs.push(ModifiedPair { before, after });
        }

        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        pairs.extend(propagate_from(&mut self.store, area.parent_id.as_ref()));

        self.commit(HistoryEntry {
            created: Vec::new(),
            deleted: Vec::new(),
            modified: pairs,
        })?;
        tracing::debug!(id = %area.id, moved = touched.len(), "shared-edge move");
        Ok(touched)
    }

    /// Cut a childless area into new children along an open polyline.
    ///
    /// The target may be an implicit area, which resolves to its real parent;
    /// the pieces become children of that parent at its child level. A cut
    /// that does not split the target is a no-op returning an empty list - no
    /// history entry, no adapter call.
    pub fn split_as_children(&mut self, area_id: &AreaId, cut: &DraftShape) -> Result<Vec<Area>> {
        self.ensure_initialized()?;

        let target = if area_id.is_implicit() {
            let implicit = self
                .store
                .get(area_id, &self.levels)
                .ok_or_else(|| EditorError::area_not_found(area_id))?;
            let parent_id = implicit
                .parent_id
                .ok_or_else(|| EditorError::area_not_found(area_id))?;
            self.require_real(&parent_id)?
        } else {
            self.require_real(area_id)?
        };

        self.ensure_no_children(&target)?;
        let child_level = self
            .levels
            .get_child_of(&target.level_key)
            .ok_or_else(|| EditorError::NoChildLevel {
                key: target.level_key.clone(),
            })?
            .clone();

        let line = self.open_cut_line(cut)?;
        let pieces = geometry::split_by_polyline(&target.geometry.to_multi(), &line);
        if pieces.len() < 2 {
            tracing::warn!(id = %target.id, "cut line did not split the area");
            return Ok(Vec::new());
        }

        let mut children = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let id = self.allocate_id();
            let child = Area::new(
                id,
                &child_level.key,
                Some(target.id.clone()),
                AreaGeometry::Polygon(piece),
            );
            self.store.add(child.clone());
            children.push(child);
        }
        let pairs = propagate_from(&mut self.store, Some(&target.id));

        self.commit(HistoryEntry {
            created: children.clone(),
            deleted: Vec::new(),
            modified: pairs,
        })?;
        tracing::debug!(id = %target.id, pieces = children.len(), "split into children");
        Ok(children)
    }

    /// Cut a childless area along an open polyline, replacing it by the
    /// pieces as its own siblings.
    ///
    /// The pieces take the target's level and parent; the target is deleted.
    /// A cut that does not split the target is a no-op returning an empty
    /// list.
    pub fn split_replace(&mut self, area_id: &AreaId, cut: &DraftShape) -> Result<Vec<Area>> {
        self.ensure_initialized()?;
        let target = self.require_real(area_id)?;
        self.ensure_no_children(&target)?;

        let line = self.open_cut_line(cut)?;
        let pieces = geometry::split_by_polyline(&target.geometry.to_multi(), &line);
        if pieces.len() < 2 {
            tracing::warn!(id = %target.id, "cut line did not split the area");
            return Ok(Vec::new());
        }

        self.store.delete(&target.id);
        let mut replacements = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let id = self.allocate_id();
            let replacement = Area::new(
                id,
                &target.level_key,
                target.parent_id.clone(),
                AreaGeometry::Polygon(piece),
            );
            self.store.add(replacement.clone());
            replacements.push(replacement);
        }
        let pairs = propagate_from(&mut self.store, target.parent_id.as_ref());

        self.commit(HistoryEntry {
            created: replacements.clone(),
            deleted: vec![target],
            modified: pairs,
        })?;
        Ok(replacements)
    }

    /// Carve an inner region out of a childless area, materializing the
    /// remainder and the carved region as its two first children.
    ///
    /// The loop must describe a region covered by the parent's geometry;
    /// returns `(outer, inner)`.
    pub fn carve_inner_child(
        &mut self,
        parent_area_id: &AreaId,
        loop_points: &[LatLng],
    ) -> Result<(Area, Area)> {
        self.ensure_initialized()?;
        let parent = self.require_real(parent_area_id)?;
        self.ensure_no_children(&parent)?;

        let loop_points = geometry::dedup_latlng(loop_points, self.config.epsilon);
        if loop_points.len() < 3 {
            return Err(EditorError::invalid_geometry(
                "carve loop needs at least three distinct points",
            ));
        }
        let child_level = self
            .levels
            .get_child_of(&parent.level_key)
            .ok_or_else(|| EditorError::NoChildLevel {
                key: parent.level_key.clone(),
            })?
            .clone();

        let inner_polygon = geometry::polygon_from_latlng(&loop_points);
        let inner_multi = geo::MultiPolygon::new(vec![inner_polygon.clone()]);
        let parent_multi = parent.geometry.to_multi();
        if !geometry::covered_by(&inner_multi, &parent_multi) {
            return Err(EditorError::invalid_geometry(
                "carve loop must lie within the parent area",
            ));
        }
        let outer_multi = geometry::subtract(&parent_multi, &inner_multi);
        if outer_multi.0.is_empty() {
            return Err(EditorError::invalid_geometry(
                "carve loop covers the entire parent area",
            ));
        }

        let outer_id = self.allocate_id();
        let outer = Area::new(
            outer_id,
            &child_level.key,
            Some(parent.id.clone()),
            AreaGeometry::from_union(outer_multi),
        );
        self.store.add(outer.clone());
        let inner_id = self.allocate_id();
        let inner = Area::new(
            inner_id,
            &child_level.key,
            Some(parent.id.clone()),
            AreaGeometry::Polygon(inner_polygon),
        );
        self.store.add(inner.clone());

        let pairs = propagate_from(&mut self.store, Some(&parent.id));

        self.commit(HistoryEntry {
            created: vec![outer.clone(), inner.clone()],
            deleted: Vec::new(),
            modified: pairs,
        })?;
        Ok((outer, inner))
    }

    /// Punch a hole into a childless area: the area keeps its id as the
    /// surrounding donut, and the hole becomes a new sibling.
    ///
    /// Returns `(donut, inner)`.
    pub fn punch_hole(
        &mut self,
        area_id: &AreaId,
        hole_points: &[LatLng],
    ) -> Result<(Area, Area)> {
        self.ensure_initialized()?;
        let area = self.require_real(area_id)?;
        self.ensure_no_children(&area)?;

        let hole_points = geometry::dedup_latlng(hole_points, self.config.epsilon);
        if hole_points.len() < 3 {
            return Err(EditorError::invalid_geometry(
                "hole needs at least three distinct points",
            ));
        }

        let inner_polygon = geometry::polygon_from_latlng(&hole_points);
        let inner_multi = geo::MultiPolygon::new(vec![inner_polygon.clone()]);
        let donut_multi = geometry::subtract(&area.geometry.to_multi(), &inner_multi);
        if donut_multi.0.is_empty() {
            return Err(EditorError::invalid_geometry(
                "hole consumes the entire area",
            ));
        }

        let before = area.clone();
        let mut donut = area;
        donut.geometry = AreaGeometry::from_union(donut_multi);
        donut.touch();
        self.store.update(donut.clone());

        let inner_id = self.allocate_id();
        let inner = Area::new(
            inner_id,
            &donut.level_key,
            donut.parent_id.clone(),
            AreaGeometry::Polygon(inner_polygon),
        );
        self.store.add(inner.clone());

        let mut pairs = vec![ModifiedPair {
            before,
            after: donut.clone(),
        }];
        pairs.extend(propagate_from(&mut self.store, donut.parent_id.as_ref()));

        self.commit(HistoryEntry {
            created: vec![inner.clone()],
            deleted: Vec::new(),
            modified: pairs,
        })?;
        Ok((donut, inner))
    }

    /// Grow an area by a new child drawn outside its current footprint.
    ///
    /// The outer path (closed implicitly) becomes a child at the child level
    /// and the parent's geometry expands to the union. When the parent had no
    /// explicit children, its implicit child is first materialized as a twin
    /// covering the pre-union geometry, so the parent genuinely equals
    /// twin ∪ outer afterwards. Returns the created children.
    pub fn expand_with_child(
        &mut self,
        parent_area_id: &AreaId,
        outer_path: &[LatLng],
    ) -> Result<Vec<Area>> {
        self.ensure_initialized()?;
        let parent = self.require_real(parent_area_id)?;
        let child_level = self
            .levels
            .get_child_of(&parent.level_key)
            .ok_or_else(|| EditorError::NoChildLevel {
                key: parent.level_key.clone(),
            })?
            .clone();

        if outer_path.len() < 2 {
            return Err(EditorError::invalid_geometry(
                "outer path needs at least two points",
            ));
        }
        let outer_geometry = AreaGeometry::Polygon(geometry::polygon_from_latlng(outer_path));
        if outer_geometry.unsigned_area() <= 0.0 {
            return Err(EditorError::invalid_geometry(
                "outer path encloses no area",
            ));
        }

        let mut created = Vec::new();
        if !self.store.has_explicit_children(&parent.id) {
            let twin_id = self.allocate_id();
            let twin = Area::new(
                twin_id,
                &child_level.key,
                Some(parent.id.clone()),
                parent.geometry.clone(),
            );
            self.store.add(twin.clone());
            created.push(twin);
        }
        let child_id = self.allocate_id();
        let child = Area::new(
            child_id,
            &child_level.key,
            Some(parent.id.clone()),
            outer_geometry,
        );
        self.store.add(child.clone());
        created.push(child);

        let pairs = propagate_from(&mut self.store, Some(&parent.id));

        self.commit(HistoryEntry {
            created: created.clone(),
            deleted: Vec::new(),
            modified: pairs,
        })?;
        Ok(created)
    }

    // ------------------------------------------------------------------
    // Undo / redo
    // ------------------------------------------------------------------

    /// Reverse the most recent operation.
    ///
    /// Applies the entry backwards to the store, parks it on the redo stack,
    /// and dispatches the reverse change set. An empty undo stack returns an
    /// empty list and mutates nothing.
    pub fn undo(&mut self) -> Result<Vec<Area>> {
        self.ensure_initialized()?;
        let Some(entry) = self.history.pop_undo() else {
            return Ok(Vec::new());
        };

        for area in &entry.created {
            self.store.delete(&area.id);
        }
        for area in &entry.deleted {
            self.store.add(area.clone());
        }
        for pair in entry.modified.iter().rev() {
            self.store.update(pair.before.clone());
        }

        let change_set = ChangeSet::reverse(&entry);
        let affected = self.current_states(
            entry
                .deleted
                .iter()
                .map(|a| a.id.clone())
                .chain(entry.modified.iter().map(|p| p.before.id.clone())),
        );
        self.history.push_redo(entry);
        self.storage.batch_write(&change_set)?;
        tracing::debug!("undid one operation");
        Ok(affected)
    }

    /// Re-apply the most recently undone operation.
    ///
    /// An empty redo stack returns an empty list and mutates nothing.
    pub fn redo(&mut self) -> Result<Vec<Area>> {
        self.ensure_initialized()?;
        let Some(entry) = self.history.pop_redo() else {
            return Ok(Vec::new());
        };

        for area in &entry.created {
            self.store.add(area.clone());
        }
        for area in &entry.deleted {
            self.store.delete(&area.id);
        }
        for pair in &entry.modified {
            self.store.update(pair.after.clone());
        }

        let change_set = ChangeSet::forward(&entry);
        let affected = self.current_states(
            entry
                .created
                .iter()
                .map(|a| a.id.clone())
                .chain(entry.modified.iter().map(|p| p.after.id.clone())),
        );
        self.history.restore(entry);
        self.storage.batch_write(&change_set)?;
        tracing::debug!("redid one operation");
        Ok(affected)
    }

    /// Whether an undo step is available.
    #[inline]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Whether a redo step is available.
    #[inline]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ------------------------------------------------------------------
    // Queries (never failing; neutral values for absent lookups)
    // ------------------------------------------------------------------

    /// Resolve an area id, synthesizing implicit records.
    pub fn get_area(&self, id: &AreaId) -> Option<Area> {
        if !self.initialized {
            return None;
        }
        self.store.get(id, &self.levels)
    }

    /// Children of an area: explicit ones, or the synthesized implicit child.
    pub fn get_children(&self, parent_id: &AreaId) -> Vec<Area> {
        if !self.initialized {
            return Vec::new();
        }
        self.store.get_children(parent_id, &self.levels)
    }

    /// All areas with no parent.
    pub fn get_roots(&self) -> Vec<Area> {
        if !self.initialized {
            return Vec::new();
        }
        self.store.get_roots()
    }

    /// Every real (non-implicit) area.
    pub fn get_all_areas(&self) -> Vec<Area> {
        if !self.initialized {
            return Vec::new();
        }
        self.store.get_all()
    }

    /// Every real area at the given level.
    pub fn get_areas_by_level(&self, level_key: &str) -> Vec<Area> {
        if !self.initialized {
            return Vec::new();
        }
        self.store.get_by_level(level_key)
    }

    /// All declared levels in declaration order.
    pub fn get_all_levels(&self) -> Vec<AreaLevel> {
        self.levels.all()
    }

    /// Look up a level by key.
    pub fn get_level(&self, key: &str) -> Option<AreaLevel> {
        self.levels.get(key).cloned()
    }

    /// Validate a draft without touching any state.
    pub fn validate_draft(&self, draft: &DraftShape) -> Vec<DraftViolation> {
        draft::validate(draft)
    }

    // ------------------------------------------------------------------
    // Draft scratchpad
    // ------------------------------------------------------------------

    /// Park a draft in the scratchpad; returns the id it lives under.
    pub fn save_draft(&mut self, id: Option<&str>, draft: DraftShape) -> Result<String> {
        self.ensure_initialized()?;
        Ok(self.scratchpad.save(id, draft))
    }

    /// Look up a scratchpad draft.
    pub fn get_draft(&self, id: &str) -> Option<DraftShape> {
        if !self.initialized {
            return None;
        }
        self.scratchpad.get(id)
    }

    /// All scratchpad drafts in id order.
    pub fn list_drafts(&self) -> Vec<(String, DraftShape)> {
        if !self.initialized {
            return Vec::new();
        }
        self.scratchpad.list()
    }

    /// Remove a scratchpad draft.
    pub fn delete_draft(&mut self, id: &str) -> Result<()> {
        self.ensure_initialized()?;
        self.scratchpad.delete(id)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(EditorError::NotInitialized)
        }
    }

    fn require_real(&self, id: &AreaId) -> Result<Area> {
        self.store
            .get_explicit(id)
            .cloned()
            .ok_or_else(|| EditorError::area_not_found(id))
    }

    fn require_level(&self, key: &str) -> Result<AreaLevel> {
        self.levels
            .get(key)
            .cloned()
            .ok_or_else(|| EditorError::AreaLevelNotFound {
                key: key.to_owned(),
            })
    }

    fn ensure_no_children(&self, area: &Area) -> Result<()> {
        if self.store.has_explicit_children(&area.id) {
            Err(EditorError::AreaHasChildren {
                id: area.id.to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Check the parent/level pairing of a prospective area placement.
    fn check_parent_level(&self, level: &AreaLevel, parent_id: Option<&AreaId>) -> Result<()> {
        match (&level.parent_level_key, parent_id) {
            (Some(expected), Some(parent_id)) => {
                let parent = self.require_real(parent_id)?;
                if &parent.level_key != expected {
                    return Err(EditorError::level_mismatch(format!(
                        "parent '{}' is at level '{}', expected '{}'",
                        parent_id, parent.level_key, expected
                    )));
                }
                Ok(())
            }
            (Some(expected), None) => Err(EditorError::level_mismatch(format!(
                "level '{}' requires a parent at level '{expected}'",
                level.key
            ))),
            (None, Some(parent_id)) => Err(EditorError::level_mismatch(format!(
                "root level '{}' cannot sit under parent '{parent_id}'",
                level.key
            ))),
            (None, None) => Ok(()),
        }
    }

    /// Closed-draft validation and materialization.
    fn draft_geometry(&self, draft: &DraftShape) -> Result<AreaGeometry> {
        if !draft.closed {
            return Err(EditorError::DraftNotClosed);
        }
        let violations = draft::validate(draft);
        if !violations.is_empty() {
            let codes: Vec<&str> = violations.iter().map(DraftViolation::code).collect();
            return Err(EditorError::invalid_geometry(codes.join(", ")));
        }
        Ok(AreaGeometry::Polygon(geometry::polygon_from_latlng(
            &draft.points,
        )))
    }

    /// Open-cut validation and whisker removal.
    fn open_cut_line(&self, cut: &DraftShape) -> Result<Vec<Coord<f64>>> {
        if cut.closed {
            return Err(EditorError::invalid_geometry(
                "cut draft must be an open polyline",
            ));
        }
        let violations = draft::validate(cut);
        if !violations.is_empty() {
            let codes: Vec<&str> = violations.iter().map(DraftViolation::code).collect();
            return Err(EditorError::invalid_geometry(codes.join(", ")));
        }
        let coords = geometry::coords_from_latlng(&cut.points);
        let cleaned = geometry::strip_whiskers(&coords, self.config.epsilon);
        if cleaned.len() < 2 {
            return Err(EditorError::invalid_geometry(
                "cut line collapsed during whisker removal",
            ));
        }
        Ok(cleaned)
    }

    /// The area plus every descendant reachable through explicit children,
    /// in breadth-first order.
    fn collect_subtree(&self, root: &Area) -> Vec<Area> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([root.clone()]);
        while let Some(area) = queue.pop_front() {
            queue.extend(self.store.explicit_children(&area.id));
            out.push(area);
        }
        out
    }

    /// Whether `candidate` lies in the explicit subtree rooted at `root`
    /// (including `root` itself).
    fn is_in_subtree(&self, root: &AreaId, candidate: &AreaId) -> bool {
        let mut queue = VecDeque::from([root.clone()]);
        let mut visited = BTreeSet::new();
        while let Some(id) = queue.pop_front() {
            if &id == candidate {
                return true;
            }
            if visited.insert(id.clone()) {
                for child in self.store.explicit_children(&id) {
                    queue.push_back(child.id);
                }
            }
        }
        false
    }

    fn allocate_id(&mut self) -> AreaId {
        loop {
            self.next_area_id += 1;
            let candidate = AreaId::new(format!("area-{}", self.next_area_id));
            if !self.store.contains(&candidate) {
                return candidate;
            }
        }
    }

    fn current_states(&self, ids: impl IntoIterator<Item = AreaId>) -> Vec<Area> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for id in ids {
            if seen.insert(id.clone())
                && let Some(area) = self.store.get_explicit(&id)
            {
                out.push(area.clone());
            }
        }
        out
    }

    /// Operation epilogue: record the entry (clearing redo, trimming the
    /// oldest), then dispatch the forward change set once. A storage failure
    /// propagates without rolling back memory.
    fn commit(&mut self, entry: HistoryEntry) -> Result<()> {
        let change_set = ChangeSet::forward(&entry);
        self.history.record(entry);
        self.storage.batch_write(&change_set)?;
        Ok(())
    }
}
