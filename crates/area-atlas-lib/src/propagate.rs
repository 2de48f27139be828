//! Ancestor geometry propagation
//!
//! After any leaf geometry change, every ancestor's geometry must be brought
//! back to the union of its explicit children. The walk starts at the changed
//! area's parent and follows `parent_id` to the root, emitting a before/after
//! pair per rebuilt ancestor; the pairs extend the operation's history entry
//! and change set.

use crate::area::{AreaGeometry, AreaId};
use crate::geometry;
use crate::history::ModifiedPair;
use crate::store::AreaStore;

/// Rebuild ancestor geometries upward from `start`, returning the emitted
/// before/after pairs in visit order (nearest ancestor first).
///
/// An ancestor with no explicit children (e.g. right after a deletion) keeps
/// its geometry and the walk continues above it.
pub(crate) fn propagate_from(store: &mut AreaStore, start: Option<&AreaId>) -> Vec<ModifiedPair> {
    let mut pairs = Vec::new();
    let mut cursor = start.cloned();
    while let Some(id) = cursor {
        let Some(ancestor) = store.get_explicit(&id).cloned() else {
            tracing::warn!(ancestor = %id, "propagation hit a dangling parent id");
            break;
        };
        let children = store.explicit_children(&id);
        if !children.is_empty() {
            let union = geometry::union_all(children.iter().map(|c| c.geometry.to_multi()));
            let before = ancestor.clone();
            let mut after = ancestor.clone();
            after.geometry = AreaGeometry::from_union(union);
            after.touch();
            store.update(after.clone());
            pairs.push(ModifiedPair { before, after });
        }
        cursor = ancestor.parent_id;
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::{Area, AreaGeometry, AreaId};
    use geo::{Coord, LineString, Polygon};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> AreaGeometry {
        AreaGeometry::Polygon(Polygon::new(
            LineString::new(vec![
                Coord { x: x0, y: y0 },
                Coord { x: x1, y: y0 },
                Coord { x: x1, y: y1 },
                Coord { x: x0, y: y1 },
                Coord { x: x0, y: y0 },
            ]),
            vec![],
        ))
    }

    fn create_area(id: &str, level: &str, parent: Option<&str>, geometry: AreaGeometry) -> Area {
        Area::new(AreaId::new(id), level, parent.map(AreaId::new), geometry)
    }

    #[test]
    fn test_propagates_to_root() {
        let mut store = AreaStore::new();
        store.add(create_area("c", "country", None, square(0.0, 0.0, 9.0, 9.0)));
        store.add(create_area(
            "p",
            "prefecture",
            Some("c"),
            square(0.0, 0.0, 9.0, 9.0),
        ));
        store.add(create_area(
            "x",
            "city",
            Some("p"),
            square(0.0, 0.0, 2.0, 1.0),
        ));

        let pairs = propagate_from(&mut store, Some(&AreaId::new("p")));
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].after.id.as_str(), "p");
        assert_eq!(pairs[1].after.id.as_str(), "c");

        // Both ancestors collapsed onto the single leaf's footprint.
        let p = store.get_explicit(&AreaId::new("p")).unwrap();
        assert!((p.geometry.unsigned_area() - 2.0).abs() < 1e-9);
        let c = store.get_explicit(&AreaId::new("c")).unwrap();
        assert!((c.geometry.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_childless_ancestor_is_skipped() {
        let mut store = AreaStore::new();
        store.add(create_area("c", "country", None, square(0.0, 0.0, 4.0, 4.0)));
        store.add(create_area(
            "p",
            "prefecture",
            Some("c"),
            square(0.0, 0.0, 3.0, 3.0),
        ));

        // "p" has no explicit children: its geometry must survive while the
        // walk continues to "c" (which re-unions over its child "p").
        let pairs = propagate_from(&mut store, Some(&AreaId::new("p")));
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].after.id.as_str(), "c");
        let p = store.get_explicit(&AreaId::new("p")).unwrap();
        assert!((p.geometry.unsigned_area() - 9.0).abs() < 1e-9);
        let c = store.get_explicit(&AreaId::new("c")).unwrap();
        assert!((c.geometry.unsigned_area() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_start_is_noop() {
        let mut store = AreaStore::new();
        assert!(propagate_from(&mut store, None).is_empty());
    }

    #[test]
    fn test_disjoint_children_union_to_multipolygon() {
        let mut store = AreaStore::new();
        store.add(create_area("p", "prefecture", None, square(0.0, 0.0, 9.0, 9.0)));
        store.add(create_area(
            "a",
            "city",
            Some("p"),
            square(0.0, 0.0, 1.0, 1.0),
        ));
        store.add(create_area(
            "b",
            "city",
            Some("p"),
            square(5.0, 5.0, 6.0, 6.0),
        ));

        propagate_from(&mut store, Some(&AreaId::new("p")));
        let p = store.get_explicit(&AreaId::new("p")).unwrap();
        assert!(!p.geometry.is_single_polygon());
        assert!((p.geometry.unsigned_area() - 2.0).abs() < 1e-9);
    }
}
