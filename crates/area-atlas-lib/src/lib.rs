//! Area Atlas - Transactional Editing Engine for Hierarchical Area Catalogs
//!
//! This library provides an in-memory, transactional editor for catalogs of
//! geographic areas (WGS84 polygons) organized under a statically-declared
//! level hierarchy (e.g. country → prefecture → city → block). Catalogs can be
//! built, refined, split, merged, and restructured while every non-leaf area's
//! geometry stays equal to the union of its children's geometries, with
//! arbitrary undo/redo on top.
//!
//! # Architecture
//!
//! - **[`LevelStore`]**: Validated, static level taxonomy (linear chain)
//! - **[`AreaStore`]**: Owner of all explicit areas plus implicit-child projection
//! - **[`DraftShape`]**: Transient lat/lng vertex sequences with a pure validator
//! - **[`AreaEditor`]**: The edit engine - preconditions, mutation, ancestor
//!   propagation, history recording, and change-set dispatch
//! - **[`History`]**: Bounded undo/redo double stack of full snapshots
//! - **[`StorageAdapter`]**: Persistence seam - the editor exchanges area value
//!   objects and change sets only
//!
//! Geometry work (union, difference, intersection, ring orientation) is
//! delegated to the [`geo`] crate; the editor's own `epsilon` governs only
//! vertex-equality tests.

mod area;
mod draft;
mod engine;
pub mod geometry;
mod history;
mod level;
mod propagate;
mod scratchpad;
mod storage;
mod store;

pub use area::{Area, AreaGeometry, AreaId};
pub use draft::{DraftShape, DraftViolation, LatLng};
pub use engine::{AreaEditor, EditorConfig, NewAreaSpec};
pub use geometry::DEFAULT_EPSILON;
pub use history::{ChangeSet, History, HistoryEntry, ModifiedPair};
pub use level::{AreaLevel, LevelStore};
pub use scratchpad::DraftScratchpad;
pub use storage::{
    CatalogSnapshot, FileStorage, MemoryStorage, StorageAdapter, StorageError, StorageResult,
};
pub use store::AreaStore;

use thiserror::Error;

/// Primary error type for editor operations.
///
/// One variant per failure kind; callers distinguish by variant, never by
/// message text. No variant is a sub-kind of another.
#[derive(Debug, Error)]
pub enum EditorError {
    /// An operation was invoked before `initialize()` completed.
    #[error("editor is not initialized; call initialize() first")]
    NotInitialized,

    /// The declared level list is not a valid linear chain.
    #[error("invalid level configuration: {detail}")]
    InvalidLevelConfig { detail: String },

    /// The loaded catalog is not self-consistent.
    #[error("catalog failed integrity check: {detail}")]
    DataIntegrity { detail: String },

    /// The persistence adapter failed; in-memory state is left as-is.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A write operation referenced a missing (or implicit-only) area.
    #[error("area not found: '{id}'")]
    AreaNotFound { id: String },

    /// An operation referenced an undeclared level key.
    #[error("area level not found: '{key}'")]
    AreaLevelNotFound { key: String },

    /// A parent/level combination violates the level chain.
    #[error("level mismatch: {detail}")]
    LevelMismatch { detail: String },

    /// The target area has explicit children and the operation forbids them.
    #[error("area '{id}' has explicit children")]
    AreaHasChildren { id: String },

    /// Reparenting would leave the old parent with no explicit child.
    #[error("moving area '{id}' would leave its parent with no explicit children")]
    ParentWouldBeEmpty { id: String },

    /// Reparenting onto a descendant of the moved area.
    #[error("reparenting area '{id}' would create a cycle")]
    CircularReference { id: String },

    /// A closed draft was required.
    #[error("draft is not closed")]
    DraftNotClosed,

    /// Vertex input failed validation or produced degenerate geometry.
    #[error("invalid geometry: {detail}")]
    InvalidGeometry { detail: String },

    /// The target level is the last rung of the chain.
    #[error("level '{key}' has no child level")]
    NoChildLevel { key: String },

    /// A scratchpad draft id did not resolve.
    #[error("draft not found: '{id}'")]
    DraftNotFound { id: String },
}

/// Coarse grouping of error variants, for callers that only care whether a
/// failure was their own mistake or an external one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The editor was used before it was ready.
    Lifecycle,
    /// The caller handed in something inconsistent; state is untouched.
    Validation,
    /// The persistence adapter or the loaded data is at fault.
    External,
}

impl EditorError {
    /// Which class this error belongs to.
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotInitialized => ErrorClass::Lifecycle,
            Self::Storage(_) | Self::DataIntegrity { .. } => ErrorClass::External,
            Self::InvalidLevelConfig { .. }
            | Self::AreaNotFound { .. }
            | Self::AreaLevelNotFound { .. }
            | Self::LevelMismatch { .. }
            | Self::AreaHasChildren { .. }
            | Self::ParentWouldBeEmpty { .. }
            | Self::CircularReference { .. }
            | Self::DraftNotClosed
            | Self::InvalidGeometry { .. }
            | Self::NoChildLevel { .. }
            | Self::DraftNotFound { .. } => ErrorClass::Validation,
        }
    }

    /// Whether this error indicates a caller mistake that left all state
    /// (memory and storage) untouched.
    pub const fn is_validation(&self) -> bool {
        matches!(self.class(), ErrorClass::Validation)
    }

    /// Create an `AreaNotFound` for the given id.
    pub fn area_not_found(id: impl std::fmt::Display) -> Self {
        Self::AreaNotFound { id: id.to_string() }
    }

    /// Create a `LevelMismatch` with a detail message.
    pub fn level_mismatch(detail: impl Into<String>) -> Self {
        Self::LevelMismatch {
            detail: detail.into(),
        }
    }

    /// Create an `InvalidGeometry` with a detail message.
    pub fn invalid_geometry(detail: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            detail: detail.into(),
        }
    }

    /// Create an `InvalidLevelConfig` naming the offense.
    pub fn invalid_level_config(detail: impl Into<String>) -> Self {
        Self::InvalidLevelConfig {
            detail: detail.into(),
        }
    }

    /// Create a `DataIntegrity` with a detail message.
    pub fn data_integrity(detail: impl Into<String>) -> Self {
        Self::DataIntegrity {
            detail: detail.into(),
        }
    }
}

/// Result type alias using [`EditorError`].
pub type Result<T> = std::result::Result<T, EditorError>;
