//! Draft shapes and the pure draft validator
//!
//! A [`DraftShape`] is a transient lat/lng vertex sequence (open polyline or
//! closed ring) handed to edit operations by value. Validation is purely
//! geometric - no kernel involvement - and reports every violated rule rather
//! than stopping at the first.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::DEFAULT_EPSILON;

/// A WGS84 vertex in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Create a vertex.
    #[inline]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// An ordered lat/lng vertex sequence plus a closed flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftShape {
    /// Vertices in drawing order.
    pub points: Vec<LatLng>,
    /// Whether the sequence describes a ring (true) or a polyline (false).
    pub closed: bool,
}

impl DraftShape {
    /// An open polyline draft.
    pub fn open(points: Vec<LatLng>) -> Self {
        Self {
            points,
            closed: false,
        }
    }

    /// A closed ring draft.
    pub fn closed(points: Vec<LatLng>) -> Self {
        Self {
            points,
            closed: true,
        }
    }

    /// Number of vertices.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the draft has no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Validation rule violated by a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DraftViolation {
    /// Closed with fewer than 3 distinct vertices, or open with fewer than 2.
    TooFewVertices,
    /// Closed and the signed area of the ring is below 1e-14 squared degrees.
    ZeroArea,
    /// Closed and two non-adjacent edges properly cross.
    SelfIntersection,
}

impl DraftViolation {
    /// Stable violation code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::TooFewVertices => "TOO_FEW_VERTICES",
            Self::ZeroArea => "ZERO_AREA",
            Self::SelfIntersection => "SELF_INTERSECTION",
        }
    }
}

impl fmt::Display for DraftViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Signed area threshold below which a closed draft is degenerate.
pub const ZERO_AREA_THRESHOLD: f64 = 1e-14;

/// Validate a draft, returning every violated rule in table order.
///
/// Open drafts can only ever produce [`DraftViolation::TooFewVertices`].
pub fn validate(draft: &DraftShape) -> Vec<DraftViolation> {
    let mut violations = Vec::new();
    let points = effective_ring(&draft.points, draft.closed);
    let distinct = distinct_count(&points);

    if draft.closed {
        if distinct < 3 {
            violations.push(DraftViolation::TooFewVertices);
        }
        if signed_area(&points).abs() < ZERO_AREA_THRESHOLD {
            violations.push(DraftViolation::ZeroArea);
        }
        if has_self_intersection(&points) {
            violations.push(DraftViolation::SelfIntersection);
        }
    } else if distinct < 2 {
        violations.push(DraftViolation::TooFewVertices);
    }

    violations
}

/// Drop an explicit closing duplicate so ring math sees each vertex once.
fn effective_ring(points: &[LatLng], closed: bool) -> Vec<LatLng> {
    let mut pts = points.to_vec();
    if closed && pts.len() >= 2 && coincident(pts[0], pts[pts.len() - 1]) {
        pts.pop();
    }
    pts
}

#[inline]
fn coincident(a: LatLng, b: LatLng) -> bool {
    (a.lat - b.lat).hypot(a.lng - b.lng) <= DEFAULT_EPSILON
}

/// Number of pairwise-distinct vertices (within the default epsilon).
fn distinct_count(points: &[LatLng]) -> usize {
    let mut distinct: Vec<LatLng> = Vec::new();
    for &p in points {
        if !distinct.iter().any(|&q| coincident(p, q)) {
            distinct.push(p);
        }
    }
    distinct.len()
}

/// Shoelace signed area of the vertex sequence (x = lng, y = lat), in
/// squared degrees. Positive for counter-clockwise order.
pub(crate) fn signed_area(points: &[LatLng]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        sum += a.lng * b.lat - b.lng * a.lat;
    }
    sum / 2.0
}

/// Orientation of the turn a→b→c: 1 counter-clockwise, -1 clockwise,
/// 0 collinear.
fn orientation(a: LatLng, b: LatLng, c: LatLng) -> i8 {
    let cross = (b.lng - a.lng) * (c.lat - a.lat) - (b.lat - a.lat) * (c.lng - a.lng);
    if cross > 0.0 {
        1
    } else if cross < 0.0 {
        -1
    } else {
        0
    }
}

/// Whether segments ab and cd properly cross.
///
/// The 4-orientation cross-product test: a proper crossing requires strict
/// straddling on both segments. Collinear overlaps count as degenerate
/// in-line contact, not as intersections.
pub(crate) fn segments_properly_cross(a: LatLng, b: LatLng, c: LatLng, d: LatLng) -> bool {
    let o1 = orientation(a, b, c);
    let o2 = orientation(a, b, d);
    let o3 = orientation(c, d, a);
    let o4 = orientation(c, d, b);
    o1 != 0 && o2 != 0 && o3 != 0 && o4 != 0 && o1 != o2 && o3 != o4
}

/// Whether any pair of non-adjacent ring edges properly cross.
///
/// Edges are taken from the implicitly-closed ring; the pair sharing the
/// wrap-around vertex counts as adjacent.
fn has_self_intersection(points: &[LatLng]) -> bool {
    let n = points.len();
    if n < 4 {
        return false;
    }
    for i in 0..n {
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let (a, b) = (points[i], points[(i + 1) % n]);
            let (c, d) = (points[j], points[(j + 1) % n]);
            if segments_properly_cross(a, b, c, d) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_square(closed: bool) -> DraftShape {
        let points = vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 1.0),
            LatLng::new(1.0, 1.0),
            LatLng::new(1.0, 0.0),
        ];
        DraftShape {
            points,
            closed,
        }
    }

    #[test]
    fn test_valid_square() {
        assert!(validate(&create_square(true)).is_empty());
    }

    #[test]
    fn test_explicitly_closed_ring_is_valid() {
        let mut draft = create_square(true);
        draft.points.push(LatLng::new(0.0, 0.0));
        assert!(validate(&draft).is_empty());
    }

    #[test]
    fn test_too_few_vertices_closed() {
        let draft = DraftShape::closed(vec![LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0)]);
        let violations = validate(&draft);
        assert!(violations.contains(&DraftViolation::TooFewVertices));
        assert!(violations.contains(&DraftViolation::ZeroArea));
    }

    #[test]
    fn test_too_few_vertices_open() {
        let draft = DraftShape::open(vec![LatLng::new(0.0, 0.0)]);
        assert_eq!(validate(&draft), vec![DraftViolation::TooFewVertices]);
    }

    #[test]
    fn test_open_drafts_skip_ring_rules() {
        // A polyline that doubles back over itself is still a valid cut input.
        let draft = DraftShape::open(vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 2.0),
            LatLng::new(1.0, 1.0),
            LatLng::new(-1.0, 1.0),
        ]);
        assert!(validate(&draft).is_empty());
    }

    #[test]
    fn test_duplicate_run_counts_once() {
        let draft = DraftShape::closed(vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 1.0),
            LatLng::new(1.0, 0.5),
        ]);
        assert!(validate(&draft).is_empty());
    }

    #[test]
    fn test_zero_area() {
        let draft = DraftShape::closed(vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(1.0, 1.0),
            LatLng::new(2.0, 2.0),
        ]);
        let violations = validate(&draft);
        assert!(violations.contains(&DraftViolation::ZeroArea));
    }

    #[test]
    fn test_bowtie_self_intersects() {
        // Asymmetric bowtie: nonzero signed area, so only the crossing fires.
        let draft = DraftShape::closed(vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(4.0, 4.0),
            LatLng::new(4.0, 0.0),
            LatLng::new(0.0, 2.0),
        ]);
        let violations = validate(&draft);
        assert_eq!(violations, vec![DraftViolation::SelfIntersection]);
    }

    #[test]
    fn test_adjacent_edge_touch_is_not_intersection() {
        // Adjacent edges always share an endpoint; that touch must not count.
        assert!(validate(&create_square(true)).is_empty());
    }

    #[test]
    fn test_proper_cross_primitive() {
        let a = LatLng::new(0.0, 0.0);
        let b = LatLng::new(1.0, 1.0);
        let c = LatLng::new(1.0, 0.0);
        let d = LatLng::new(0.0, 1.0);
        assert!(segments_properly_cross(a, b, c, d));

        // Collinear overlap is degenerate in-line contact.
        let e = LatLng::new(2.0, 2.0);
        assert!(!segments_properly_cross(a, b, b, e));

        // Endpoint touch without straddling.
        assert!(!segments_properly_cross(a, b, b, c));
    }

    #[test]
    fn test_signed_area_orientation() {
        // lng/lat order chosen counter-clockwise in the x=lng, y=lat plane.
        let ccw = vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 1.0),
            LatLng::new(1.0, 1.0),
            LatLng::new(1.0, 0.0),
        ];
        assert!(signed_area(&ccw) > 0.0);
        let cw: Vec<LatLng> = ccw.into_iter().rev().collect();
        assert!(signed_area(&cw) < 0.0);
    }

    #[test]
    fn test_violation_codes() {
        assert_eq!(DraftViolation::TooFewVertices.code(), "TOO_FEW_VERTICES");
        assert_eq!(DraftViolation::ZeroArea.to_string(), "ZERO_AREA");
        assert_eq!(
            DraftViolation::SelfIntersection.code(),
            "SELF_INTERSECTION"
        );
    }
}
