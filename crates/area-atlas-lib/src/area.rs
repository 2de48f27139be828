//! Area records, identifiers, and geometry value types
//!
//! An [`Area`] is the persisted entity of the catalog: a polygonal region at a
//! defined level of the hierarchy. Implicit areas are synthesized projections
//! of a childless non-leaf parent; they share this record type, carry the
//! `implicit` flag, and are never stored or written.

use std::fmt;
use std::time::SystemTime;

use geo::{Area as GeoArea, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

/// Prefix of synthesized implicit-area identifiers.
pub(crate) const IMPLICIT_ID_PREFIX: &str = "implicit:";

/// Opaque, immutable area identifier.
///
/// Implicit identifiers are deterministic: `implicit:<parent_id>:<child_level_key>`,
/// so repeated queries return equal virtual records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaId(String);

impl AreaId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic identifier of the implicit child of `parent` at the
    /// given child level.
    pub fn implicit(parent: &AreaId, child_level_key: &str) -> Self {
        Self(format!("{IMPLICIT_ID_PREFIX}{parent}:{child_level_key}"))
    }

    /// Whether this identifier names an implicit (virtual) area.
    #[inline]
    pub fn is_implicit(&self) -> bool {
        self.0.starts_with(IMPLICIT_ID_PREFIX)
    }

    /// Parse an implicit identifier into `(parent_id, child_level_key)`.
    ///
    /// Level keys contain no `:`, so the split is taken at the last colon;
    /// parent identifiers (including nested implicit ones) pass through
    /// unharmed.
    pub fn implicit_parts(&self) -> Option<(AreaId, String)> {
        let rest = self.0.strip_prefix(IMPLICIT_ID_PREFIX)?;
        let (parent, level) = rest.rsplit_once(':')?;
        if parent.is_empty() || level.is_empty() {
            return None;
        }
        Some((AreaId::new(parent), level.to_owned()))
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AreaId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Polygonal geometry of an area, in WGS84 degrees (`x` = lng, `y` = lat).
///
/// Leaf-level areas always carry the `Polygon` variant; unions of disjoint
/// children surface as `MultiPolygon`. Ring normal form everywhere: exterior
/// rings CCW, interior rings CW, rings explicitly closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AreaGeometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl AreaGeometry {
    /// View as a `MultiPolygon` (the normal form all kernel calls take).
    pub fn to_multi(&self) -> MultiPolygon<f64> {
        match self {
            Self::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
            Self::MultiPolygon(mp) => mp.clone(),
        }
    }

    /// Collapse a kernel result: exactly one member polygon becomes the
    /// `Polygon` variant, anything else stays a `MultiPolygon`.
    pub fn from_union(mut multi: MultiPolygon<f64>) -> Self {
        if multi.0.len() == 1 {
            Self::Polygon(multi.0.remove(0))
        } else {
            Self::MultiPolygon(multi)
        }
    }

    /// The member polygons as a slice.
    pub fn polygons(&self) -> &[Polygon<f64>] {
        match self {
            Self::Polygon(p) => std::slice::from_ref(p),
            Self::MultiPolygon(mp) => &mp.0,
        }
    }

    /// Whether this is a single polygon (leaf normal form).
    #[inline]
    pub fn is_single_polygon(&self) -> bool {
        matches!(self, Self::Polygon(_))
    }

    /// Unsigned planar area in squared degrees.
    pub fn unsigned_area(&self) -> f64 {
        match self {
            Self::Polygon(p) => p.unsigned_area(),
            Self::MultiPolygon(mp) => mp.unsigned_area(),
        }
    }
}

/// A named polygonal region at a defined level of the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    /// Opaque, immutable, unique identifier.
    pub id: AreaId,
    /// User-editable display name; may be empty.
    pub display_name: String,
    /// Key of this area's level.
    pub level_key: String,
    /// Identifier of the parent area, or `None` for a root-level area.
    pub parent_id: Option<AreaId>,
    /// Polygonal footprint.
    pub geometry: AreaGeometry,
    /// Optional free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Creation instant.
    pub created_at: SystemTime,
    /// Last-modification instant.
    pub updated_at: SystemTime,
    /// Set on synthesized implicit records; never true for stored areas.
    #[serde(default)]
    pub implicit: bool,
}

impl Area {
    /// Create a real area with fresh timestamps and an empty display name.
    pub fn new(
        id: AreaId,
        level_key: impl Into<String>,
        parent_id: Option<AreaId>,
        geometry: AreaGeometry,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            id,
            display_name: String::new(),
            level_key: level_key.into(),
            parent_id,
            geometry,
            metadata: None,
            created_at: now,
            updated_at: now,
            implicit: false,
        }
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = SystemTime::now();
    }
}
