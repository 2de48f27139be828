//! Geometry helpers over the 2D polygon kernel
//!
//! Everything that touches the [`geo`] kernel lives here: ring normal form,
//! child unions, the chord-extension split used by the cut operations, whisker
//! removal for hand-drawn cut lines, and the epsilon vertex tests that
//! identify shared corners across sibling rings. Coordinates are WGS84 degrees
//! treated as planar (`x` = lng, `y` = lat).

use geo::{
    Area as GeoArea, BooleanOps, BoundingRect, Coord, LineString, MultiPolygon, Polygon, Winding,
};

use crate::area::AreaGeometry;
use crate::draft::LatLng;

/// Default coordinate-equality tolerance in degrees (≈1 mm at the equator).
///
/// Governs vertex-coincidence tests only, never kernel results.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Pieces below this planar area (squared degrees) are kernel noise.
const MIN_PIECE_AREA: f64 = 1e-12;

/// Area tolerance for coverage and equality checks against kernel output.
const COVERAGE_TOLERANCE: f64 = 1e-9;

/// Unit-dot threshold under which two adjacent cut edges count as a
/// backtrack (the polyline reverses onto itself).
const BACKTRACK_DOT: f64 = -0.99;

/// Convert lat/lng vertices to planar kernel coordinates.
pub(crate) fn coords_from_latlng(points: &[LatLng]) -> Vec<Coord<f64>> {
    points
        .iter()
        .map(|p| Coord { x: p.lng, y: p.lat })
        .collect()
}

/// Whether two coordinates coincide within `epsilon`.
#[inline]
pub(crate) fn coords_close(a: Coord<f64>, b: Coord<f64>, epsilon: f64) -> bool {
    (a.x - b.x).hypot(a.y - b.y) <= epsilon
}

/// Drop consecutive coincident vertices (within `epsilon`), keeping the first
/// of each run.
pub(crate) fn collapse_coincident(points: &[Coord<f64>], epsilon: f64) -> Vec<Coord<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(points.len());
    for &p in points {
        if out.last().is_none_or(|&q| !coords_close(p, q, epsilon)) {
            out.push(p);
        }
    }
    out
}

/// Drop consecutive coincident lat/lng vertices and an explicit closing
/// duplicate, keeping drawing order.
pub(crate) fn dedup_latlng(points: &[LatLng], epsilon: f64) -> Vec<LatLng> {
    let coords = coords_from_latlng(points);
    let mut collapsed = collapse_coincident(&coords, epsilon);
    if collapsed.len() >= 2 && coords_close(collapsed[0], *collapsed.last().unwrap(), epsilon) {
        collapsed.pop();
    }
    collapsed
        .into_iter()
        .map(|c| LatLng::new(c.y, c.x))
        .collect()
}

/// Bring a polygon to ring normal form: rings closed, exterior CCW,
/// interiors CW.
pub(crate) fn normalize_rings(polygon: &mut Polygon<f64>) {
    polygon.exterior_mut(|ring| {
        ring.close();
        ring.make_ccw_winding();
    });
    polygon.interiors_mut(|rings| {
        for ring in rings {
            ring.close();
            ring.make_cw_winding();
        }
    });
}

/// Materialize a normalized polygon from lat/lng vertices (closed
/// implicitly, no holes).
pub fn polygon_from_latlng(points: &[LatLng]) -> Polygon<f64> {
    let mut polygon = Polygon::new(LineString::new(coords_from_latlng(points)), vec![]);
    normalize_rings(&mut polygon);
    polygon
}

/// Union a sequence of geometries into one normalized multi-polygon.
///
/// An empty sequence yields an empty multi-polygon.
pub fn union_all(geometries: impl IntoIterator<Item = MultiPolygon<f64>>) -> MultiPolygon<f64> {
    let mut iter = geometries.into_iter();
    let Some(first) = iter.next() else {
        return MultiPolygon::new(Vec::new());
    };
    iter.fold(first, |acc, next| acc.union(&next))
}

/// Whether two geometries cover the same region, up to kernel tolerance
/// (symmetric difference below [`COVERAGE_TOLERANCE`]).
pub fn approx_same(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> bool {
    a.xor(b).unsigned_area() <= COVERAGE_TOLERANCE
}

/// Whether `inner` lies entirely within `outer`, up to kernel tolerance.
pub(crate) fn covered_by(inner: &MultiPolygon<f64>, outer: &MultiPolygon<f64>) -> bool {
    inner.difference(outer).unsigned_area() <= COVERAGE_TOLERANCE
}

/// Kernel difference `a − b`.
pub(crate) fn subtract(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    a.difference(b)
}

/// Strip whiskers from a hand-drawn cut polyline.
///
/// Collapses coincident runs, then repeatedly removes any interior vertex
/// whose adjacent edge vectors reverse direction (unit dot below
/// [`BACKTRACK_DOT`]), until stable. This is the documented angular
/// approximation of true whisker trimming: adequate for hand-drawn cuts, not
/// an exact line/polygon intersection trim.
pub(crate) fn strip_whiskers(points: &[Coord<f64>], epsilon: f64) -> Vec<Coord<f64>> {
    let mut pts = collapse_coincident(points, epsilon);
    loop {
        let before = pts.len();
        let mut i = 1;
        while i + 1 < pts.len() {
            if is_backtrack(pts[i - 1], pts[i], pts[i + 1]) {
                pts.remove(i);
            } else {
                i += 1;
            }
        }
        pts = collapse_coincident(&pts, epsilon);
        if pts.len() == before {
            return pts;
        }
    }
}

fn is_backtrack(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>) -> bool {
    let (ux, uy) = (b.x - a.x, b.y - a.y);
    let (vx, vy) = (c.x - b.x, c.y - b.y);
    let lu = ux.hypot(uy);
    let lv = vx.hypot(vy);
    if lu == 0.0 || lv == 0.0 {
        return false;
    }
    (ux * vx + uy * vy) / (lu * lv) < BACKTRACK_DOT
}

/// Split a geometry along an open polyline.
///
/// The polyline is extended at both ends into a long chord, two bounded
/// half-plane polygons are constructed on either side of it, and each is
/// intersected with the target. Every non-degenerate polygon of either
/// intersection is one piece. Fewer than two pieces means the line did not
/// cut the target.
pub(crate) fn split_by_polyline(
    target: &MultiPolygon<f64>,
    line: &[Coord<f64>],
) -> Vec<Polygon<f64>> {
    if line.len() < 2 {
        return Vec::new();
    }
    let Some(rect) = target.bounding_rect() else {
        return Vec::new();
    };

    // Reach comfortably past everything involved.
    let mut min = rect.min();
    let mut max = rect.max();
    for c in line {
        min.x = min.x.min(c.x);
        min.y = min.y.min(c.y);
        max.x = max.x.max(c.x);
        max.y = max.y.max(c.y);
    }
    let reach = (max.x - min.x).hypot(max.y - min.y) * 4.0 + 1.0;

    let first = line[0];
    let last = line[line.len() - 1];
    let head = unit(first.x - line[1].x, first.y - line[1].y);
    let tail = unit(
        last.x - line[line.len() - 2].x,
        last.y - line[line.len() - 2].y,
    );
    let start = Coord {
        x: first.x + head.x * reach,
        y: first.y + head.y * reach,
    };
    let end = Coord {
        x: last.x + tail.x * reach,
        y: last.y + tail.y * reach,
    };

    let mut spine = Vec::with_capacity(line.len() + 2);
    spine.push(start);
    spine.extend_from_slice(line);
    spine.push(end);

    // Left normal of the overall chord direction.
    let dir = unit(end.x - start.x, end.y - start.y);
    let normal = Coord {
        x: -dir.y,
        y: dir.x,
    };

    let mut pieces = Vec::new();
    for side in [1.0, -1.0] {
        let half = half_plane(&spine, normal, side * reach);
        for mut polygon in target.intersection(&half) {
            if polygon.unsigned_area() > MIN_PIECE_AREA {
                normalize_rings(&mut polygon);
                pieces.push(polygon);
            }
        }
    }
    pieces
}

/// Bounded polygon covering one side of the spine polyline.
fn half_plane(spine: &[Coord<f64>], normal: Coord<f64>, offset: f64) -> Polygon<f64> {
    let mut coords = spine.to_vec();
    let first = spine[0];
    let last = spine[spine.len() - 1];
    coords.push(Coord {
        x: last.x + normal.x * offset,
        y: last.y + normal.y * offset,
    });
    coords.push(Coord {
        x: first.x + normal.x * offset,
        y: first.y + normal.y * offset,
    });
    let mut polygon = Polygon::new(LineString::new(coords), vec![]);
    normalize_rings(&mut polygon);
    polygon
}

fn unit(x: f64, y: f64) -> Coord<f64> {
    let len = x.hypot(y);
    if len == 0.0 {
        Coord { x: 0.0, y: 0.0 }
    } else {
        Coord {
            x: x / len,
            y: y / len,
        }
    }
}

/// The vertex at `index` on the first exterior ring, indexing modulo the ring
/// length with the closing vertex excluded.
pub(crate) fn exterior_vertex(geometry: &AreaGeometry, index: usize) -> Option<Coord<f64>> {
    let polygon = geometry.polygons().first()?;
    let coords = &polygon.exterior().0;
    if coords.len() < 2 {
        return None;
    }
    let effective = coords.len() - 1;
    Some(coords[index % effective])
}

/// Rewrite every ring vertex (exterior and interior) coinciding with `target`
/// to `replacement`. Returns the rewritten geometry, or `None` when no vertex
/// matched. Ring order and winding are preserved; a matched closing vertex is
/// rewritten together with its opening twin, so rings stay closed.
pub(crate) fn rewrite_matching_vertices(
    geometry: &AreaGeometry,
    target: Coord<f64>,
    replacement: Coord<f64>,
    epsilon: f64,
) -> Option<AreaGeometry> {
    let mut changed = false;
    let rewrite_ring = |ring: &LineString<f64>, changed: &mut bool| {
        let coords = ring
            .0
            .iter()
            .map(|&c| {
                if coords_close(c, target, epsilon) {
                    *changed = true;
                    replacement
                } else {
                    c
                }
            })
            .collect();
        LineString::new(coords)
    };

    let rewrite_polygon = |polygon: &Polygon<f64>, changed: &mut bool| {
        let exterior = rewrite_ring(polygon.exterior(), changed);
        let interiors = polygon
            .interiors()
            .iter()
            .map(|ring| rewrite_ring(ring, changed))
            .collect();
        Polygon::new(exterior, interiors)
    };

    let rewritten = match geometry {
        AreaGeometry::Polygon(p) => AreaGeometry::Polygon(rewrite_polygon(p, &mut changed)),
        AreaGeometry::MultiPolygon(mp) => AreaGeometry::MultiPolygon(MultiPolygon::new(
            mp.0.iter().map(|p| rewrite_polygon(p, &mut changed)).collect(),
        )),
    };
    changed.then_some(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_square(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::new(vec![
                Coord { x: x0, y: y0 },
                Coord { x: x1, y: y0 },
                Coord { x: x1, y: y1 },
                Coord { x: x0, y: y1 },
                Coord { x: x0, y: y0 },
            ]),
            vec![],
        )
    }

    #[test]
    fn test_polygon_from_latlng_normal_form() {
        // Clockwise input comes out counter-clockwise and closed.
        let polygon = polygon_from_latlng(&[
            LatLng::new(0.0, 0.0),
            LatLng::new(1.0, 0.0),
            LatLng::new(1.0, 1.0),
            LatLng::new(0.0, 1.0),
        ]);
        let exterior = polygon.exterior();
        assert!(exterior.is_closed());
        assert!(exterior.is_ccw());
        assert!((polygon.unsigned_area() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_union_all_merges_adjacent() {
        let a = MultiPolygon::new(vec![create_square(0.0, 0.0, 1.0, 1.0)]);
        let b = MultiPolygon::new(vec![create_square(1.0, 0.0, 2.0, 1.0)]);
        let union = union_all([a, b]);
        assert_eq!(union.0.len(), 1);
        assert!((union.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_union_all_keeps_disjoint_parts() {
        let a = MultiPolygon::new(vec![create_square(0.0, 0.0, 1.0, 1.0)]);
        let b = MultiPolygon::new(vec![create_square(5.0, 5.0, 6.0, 6.0)]);
        let union = union_all([a, b]);
        assert_eq!(union.0.len(), 2);
    }

    #[test]
    fn test_union_all_empty() {
        assert!(union_all(std::iter::empty()).0.is_empty());
    }

    #[test]
    fn test_approx_same_and_coverage() {
        let square = MultiPolygon::new(vec![create_square(0.0, 0.0, 2.0, 2.0)]);
        let inner = MultiPolygon::new(vec![create_square(0.5, 0.5, 1.5, 1.5)]);
        assert!(approx_same(&square, &square.clone()));
        assert!(!approx_same(&square, &inner));
        assert!(covered_by(&inner, &square));
        assert!(!covered_by(&square, &inner));
    }

    #[test]
    fn test_collapse_coincident_runs() {
        let pts = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 1.0, y: 1e-12 },
            Coord { x: 2.0, y: 0.0 },
        ];
        let collapsed = collapse_coincident(&pts, DEFAULT_EPSILON);
        assert_eq!(collapsed.len(), 3);
    }

    #[test]
    fn test_strip_whiskers_removes_backtrack() {
        // The polyline runs out to x=3 and doubles straight back to x=2.
        let pts = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 3.0, y: 0.0 },
            Coord { x: 2.0, y: 0.0 },
            Coord { x: 2.0, y: 2.0 },
        ];
        let cleaned = strip_whiskers(&pts, DEFAULT_EPSILON);
        assert_eq!(cleaned.len(), 3);
        assert!(cleaned.iter().all(|c| c.x <= 3.0));
        assert!(!cleaned.contains(&Coord { x: 3.0, y: 0.0 }));
    }

    #[test]
    fn test_strip_whiskers_keeps_clean_line() {
        let pts = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.1 },
            Coord { x: 2.0, y: 0.0 },
        ];
        assert_eq!(strip_whiskers(&pts, DEFAULT_EPSILON).len(), 3);
    }

    #[test]
    fn test_split_square_in_half() {
        let target = MultiPolygon::new(vec![create_square(0.0, 0.0, 1.0, 1.0)]);
        let line = vec![Coord { x: -0.1, y: 0.5 }, Coord { x: 1.1, y: 0.5 }];
        let pieces = split_by_polyline(&target, &line);
        assert_eq!(pieces.len(), 2);
        for piece in &pieces {
            assert!((piece.unsigned_area() - 0.5).abs() < 1e-9);
            assert!(piece.exterior().is_ccw());
        }
    }

    #[test]
    fn test_split_miss_returns_less_than_two() {
        let target = MultiPolygon::new(vec![create_square(0.0, 0.0, 1.0, 1.0)]);
        let line = vec![Coord { x: -0.1, y: 5.0 }, Coord { x: 1.1, y: 5.0 }];
        let pieces = split_by_polyline(&target, &line);
        assert!(pieces.len() < 2);
    }

    #[test]
    fn test_split_concave_yields_multiple_pieces() {
        // U-shaped target: a horizontal cut through the arms produces three
        // pieces (two arm tops, one base... the cut at y=0.5 splits base from
        // both arms).
        let u_shape = Polygon::new(
            LineString::new(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 3.0, y: 0.0 },
                Coord { x: 3.0, y: 2.0 },
                Coord { x: 2.0, y: 2.0 },
                Coord { x: 2.0, y: 1.0 },
                Coord { x: 1.0, y: 1.0 },
                Coord { x: 1.0, y: 2.0 },
                Coord { x: 0.0, y: 2.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![],
        );
        let target = MultiPolygon::new(vec![u_shape]);
        let line = vec![Coord { x: -0.5, y: 1.5 }, Coord { x: 3.5, y: 1.5 }];
        let pieces = split_by_polyline(&target, &line);
        assert_eq!(pieces.len(), 3);
        let total: f64 = pieces.iter().map(|p| p.unsigned_area()).sum();
        assert!((total - target.unsigned_area()).abs() < 1e-9);
    }

    #[test]
    fn test_exterior_vertex_wraps() {
        let geometry = AreaGeometry::Polygon(create_square(0.0, 0.0, 1.0, 1.0));
        let v0 = exterior_vertex(&geometry, 0).unwrap();
        let v4 = exterior_vertex(&geometry, 4).unwrap();
        assert_eq!(v0, v4);
        assert_eq!(
            exterior_vertex(&geometry, 1).unwrap(),
            Coord { x: 1.0, y: 0.0 }
        );
    }

    #[test]
    fn test_rewrite_matching_vertices() {
        let geometry = AreaGeometry::Polygon(create_square(0.0, 0.0, 1.0, 1.0));
        let rewritten = rewrite_matching_vertices(
            &geometry,
            Coord { x: 0.0, y: 0.0 },
            Coord { x: -0.5, y: 0.0 },
            DEFAULT_EPSILON,
        )
        .unwrap();
        let ring = &rewritten.polygons()[0].exterior().0;
        // Opening and closing copies both moved; ring stays closed.
        assert_eq!(ring[0], Coord { x: -0.5, y: 0.0 });
        assert_eq!(ring[ring.len() - 1], ring[0]);
        assert_eq!(ring[2], Coord { x: 1.0, y: 1.0 });
    }

    #[test]
    fn test_rewrite_no_match_is_none() {
        let geometry = AreaGeometry::Polygon(create_square(0.0, 0.0, 1.0, 1.0));
        let result = rewrite_matching_vertices(
            &geometry,
            Coord { x: 9.0, y: 9.0 },
            Coord { x: 8.0, y: 8.0 },
            DEFAULT_EPSILON,
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_dedup_latlng_drops_closing_duplicate() {
        let pts = vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 1.0),
            LatLng::new(1.0, 1.0),
            LatLng::new(0.0, 0.0),
        ];
        let deduped = dedup_latlng(&pts, DEFAULT_EPSILON);
        assert_eq!(deduped.len(), 3);
    }
}
