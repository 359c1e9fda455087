//! Error types for structural storage operations.
//!
//! The storage layer has a deliberate failure asymmetry: write operations on tracked
//! state (duplicate adds, setting a component an entity does not have) are caller logic
//! bugs and surface as [`StorageError`]; read probes and removals on untracked or stale
//! entities are expected liveness races and fail softly with `None`/`false`/empty
//! instead. Soft paths never produce a `StorageError`.

use thiserror::Error;

use crate::entity::Entity;

/// An error from a structural storage operation.
///
/// Each variant names the entity and, where relevant, the component involved so callers
/// and logs can pinpoint the violated invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// A write operation targeted an entity the storage is not tracking (never spawned,
    /// despawned, or a stale generation).
    #[error("entity {entity:?} is not tracked in storage")]
    NotTracked {
        /// The offending entity handle.
        entity: Entity,
    },

    /// An entity was spawned with a handle the storage is already tracking.
    #[error("entity {entity:?} is already tracked in storage")]
    AlreadyTracked {
        /// The offending entity handle.
        entity: Entity,
    },

    /// A component add targeted an entity that already has a component of that type.
    #[error("entity {entity:?} already has component `{component}`")]
    AlreadyHas {
        /// The offending entity handle.
        entity: Entity,
        /// Name of the duplicate component type.
        component: &'static str,
    },

    /// An in-place set targeted a component the entity's archetype does not contain.
    #[error("entity {entity:?} does not have component `{component}`")]
    MissingComponent {
        /// The offending entity handle.
        entity: Entity,
        /// Name of the absent component type.
        component: &'static str,
    },
}
