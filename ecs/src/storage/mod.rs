//! Chunked columnar storage for the ECS.
//!
//! This module is the authority for entity and component data. Entities with an
//! identical component set share an [`Archetype`](archetype::Archetype); each archetype
//! stores its component data column-major in fixed-capacity [`Chunk`](chunk::Chunk)s,
//! which keeps iteration cache-friendly and gives parallel iteration a natural unit of
//! disjoint work.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Storage (this module)                                    │
//! │  - Owns archetypes, the entity index and the chunk pool   │
//! │  - Handles spawn/despawn and component migration          │
//! │  - Notifies the query manager on archetype creation       │
//! └──────────┬──────────────────┬──────────────────┬──────────┘
//!            │                  │                  │
//! ┌──────────▼───────┐ ┌────────▼────────┐ ┌───────▼────────┐
//! │  Archetypes      │ │  EntityIndex    │ │  ChunkPool     │
//! │  - Spec → chunks │ │  - Entity →     │ │  - Recycled    │
//! │  - Swap-removal  │ │    Location     │ │    chunks by   │
//! │  - Migration     │ │  - Generation   │ │    shape       │
//! └──────────────────┘ └─────────────────┘ └────────────────┘
//! ```
//!
//! # Migration
//!
//! Adding or removing components never grows an entity in place: the entity migrates to
//! the archetype for its new component set. Components common to both archetypes are
//! byte-copied (no drop), removed components are dropped, and the swap-removal in the
//! source archetype updates the moved entity's index entry in the same operation, so
//! there is no window where a lookup observes a stale slot.
//!
//! # Failure model
//!
//! Structural writes on tracked state that violate an invariant (spawning a tracked
//! entity, adding a component the entity already has, setting an absent component)
//! return a [`StorageError`]. Probes and removals targeting untracked or stale entities
//! fail softly (`None`/`false`/empty) because despawn-then-query races are normal,
//! not bugs.

pub mod archetype;
pub(crate) mod cell;
pub(crate) mod chunk;
pub(crate) mod column;
pub(crate) mod index;
pub(crate) mod location;
pub(crate) mod values;

use std::{collections::HashMap, sync::Arc};

pub use cell::Cell;
pub use chunk::{CHUNK_CAPACITY, Chunk, ChunkPool};
pub use column::Column;
pub use location::{Location, Slot};
pub use values::{BoxedValues, Values};

use crate::{
    component::{self, Component, IntoSpec},
    entity::Entity,
    error::StorageError,
    query,
    storage::{archetype::Archetype, index::EntityIndex},
};

/// Central storage container for the ECS, managing all entity and component data.
///
/// `Storage` is the authoritative source for:
/// - **Archetypes**: one per distinct component set, owning chunked columnar data
/// - **Entity index**: entity → (archetype, slot), generation-checked
/// - **Chunk pool**: recycled chunk allocations shared across archetypes
/// - **Query manager**: notified of every new archetype for incremental cache updates
pub struct Storage {
    /// All archetypes, indexed by their id.
    archetypes: Vec<Archetype>,

    /// Archetype lookup by component set.
    by_spec: HashMap<component::Spec, archetype::Id>,

    /// Tracks live entities and their storage locations.
    index: EntityIndex,

    /// Recycled chunk allocations.
    pool: ChunkPool,

    /// The query cache, shared so other threads can match against it concurrently.
    queries: Arc<query::Manager>,
}

impl Storage {
    /// Create a new empty storage.
    pub fn new() -> Self {
        Self {
            archetypes: Vec::new(),
            by_spec: HashMap::new(),
            index: EntityIndex::new(),
            pool: ChunkPool::new(),
            queries: Arc::new(query::Manager::new()),
        }
    }

    /// Get the query manager attached to this storage.
    #[inline]
    pub fn queries(&self) -> &Arc<query::Manager> {
        &self.queries
    }

    /// Get the number of archetypes.
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Get the number of tracked entities.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.index.len()
    }

    /// Get an archetype by id.
    ///
    /// # Panics
    /// Panics if the id is out of bounds.
    pub fn archetype(&self, id: archetype::Id) -> &Archetype {
        assert!(
            id.index() < self.archetypes.len(),
            "archetype id out of bounds"
        );
        &self.archetypes[id.index()]
    }

    /// Get or create the archetype for a component set.
    ///
    /// Idempotent: the same spec always resolves to the same archetype. On first
    /// creation the query manager is notified so every cached query list that matches
    /// the new archetype picks it up incrementally.
    pub fn archetype_of(
        &mut self,
        spec: component::Spec,
        registry: &component::Registry,
    ) -> archetype::Id {
        if let Some(id) = self.by_spec.get(&spec) {
            return *id;
        }

        let id = archetype::Id::new(self.archetypes.len() as u32);
        let infos = registry.info_for_spec(&spec);
        let archetype = Archetype::new(id, spec.clone(), infos);
        log::debug!(
            "created archetype {:?} with {} component(s)",
            id,
            spec.len()
        );
        self.queries.on_archetype_created(id, archetype.mask().clone());
        self.by_spec.insert(spec, id);
        self.archetypes.push(archetype);
        id
    }

    /// Register the archetype for a component set upfront, without spawning anything.
    ///
    /// Spawning entities with exactly this set afterwards hits the existing archetype,
    /// so no archetype creation (or query-cache maintenance) happens on the hot path.
    /// Idempotent: repeated calls return the same archetype and leave the count alone.
    #[inline]
    pub fn preallocate(
        &mut self,
        spec: component::Spec,
        registry: &component::Registry,
    ) -> archetype::Id {
        self.archetype_of(spec, registry)
    }

    /// Spawn an entity with the given component values.
    ///
    /// # Errors
    /// Returns [`StorageError::AlreadyTracked`] if the entity is already spawned.
    pub fn spawn_entity<V: Values>(
        &mut self,
        entity: Entity,
        values: V,
        registry: &component::Registry,
    ) -> Result<(), StorageError> {
        if self.index.contains(entity) {
            return Err(StorageError::AlreadyTracked { entity });
        }

        let spec = V::into_spec(registry);
        let id = self.archetype_of(spec, registry);
        let slot = self.archetypes[id.index()].push_with(
            entity,
            &mut self.pool,
            Vec::new(),
            |chunk, row| values.apply(chunk, row),
        );
        self.index.insert(entity, Location::new(id, slot));
        Ok(())
    }

    /// Spawn a batch of entities sharing the same component value shape.
    ///
    /// # Errors
    /// Returns [`StorageError::AlreadyTracked`] for the first already-spawned entity;
    /// entities before it in the batch remain spawned.
    pub fn spawn_entities<V: Values>(
        &mut self,
        entities: impl IntoIterator<Item = (Entity, V)>,
        registry: &component::Registry,
    ) -> Result<(), StorageError> {
        let spec = V::into_spec(registry);
        let id = self.archetype_of(spec, registry);
        for (entity, values) in entities {
            if self.index.contains(entity) {
                return Err(StorageError::AlreadyTracked { entity });
            }
            let slot = self.archetypes[id.index()].push_with(
                entity,
                &mut self.pool,
                Vec::new(),
                |chunk, row| values.apply(chunk, row),
            );
            self.index.insert(entity, Location::new(id, slot));
        }
        Ok(())
    }

    /// Spawn an entity from pre-boxed component values (the deferred-command path).
    ///
    /// # Errors
    /// Returns [`StorageError::AlreadyTracked`] if the entity is already spawned.
    pub fn spawn_dynamic(
        &mut self,
        entity: Entity,
        values: BoxedValues,
        registry: &component::Registry,
    ) -> Result<(), StorageError> {
        if self.index.contains(entity) {
            return Err(StorageError::AlreadyTracked { entity });
        }

        let id = self.archetype_of(values.spec().clone(), registry);
        let slot = self.archetypes[id.index()].push_with(
            entity,
            &mut self.pool,
            Vec::new(),
            |chunk, row| values.apply(chunk, row),
        );
        self.index.insert(entity, Location::new(id, slot));
        Ok(())
    }

    /// Despawn an entity, dropping its component values.
    ///
    /// Returns `false` (soft failure) if the entity is untracked or stale. The entity
    /// swapped into the freed slot has its index entry updated in the same operation.
    pub fn despawn_entity(&mut self, entity: Entity) -> bool {
        let Some(location) = self.index.remove(entity) else {
            return false;
        };

        let moved = self.archetypes[location.archetype().index()]
            .swap_remove(location.slot(), &mut self.pool);
        if let Some(moved) = moved {
            self.index.set(moved, location);
        }
        true
    }

    /// Add components to an existing entity, migrating it to the archetype for the
    /// union component set. Existing values are preserved; an empty value set is a
    /// no-op.
    ///
    /// # Errors
    /// - [`StorageError::NotTracked`] if the entity is untracked or stale
    /// - [`StorageError::AlreadyHas`] if the entity already has any of the components
    pub fn add_components<V: Values>(
        &mut self,
        entity: Entity,
        values: V,
        registry: &component::Registry,
    ) -> Result<(), StorageError> {
        let source = self
            .index
            .get(entity)
            .ok_or(StorageError::NotTracked { entity })?;

        let add_spec = V::into_spec(registry);
        if add_spec.is_empty() {
            return Ok(());
        }

        let source_spec = self.archetypes[source.archetype().index()].spec();
        self.ensure_disjoint(entity, source_spec, &add_spec, registry)?;

        let target = source_spec.union(&add_spec);
        self.execute_migration(entity, source, target, registry, |chunk, row| {
            values.apply(chunk, row)
        });
        Ok(())
    }

    /// Add pre-boxed components to an existing entity (the deferred-command path).
    ///
    /// # Errors
    /// Same error conditions as [`add_components`](Self::add_components).
    pub fn add_components_dynamic(
        &mut self,
        entity: Entity,
        values: BoxedValues,
        registry: &component::Registry,
    ) -> Result<(), StorageError> {
        let source = self
            .index
            .get(entity)
            .ok_or(StorageError::NotTracked { entity })?;

        if values.spec().is_empty() {
            return Ok(());
        }

        let source_spec = self.archetypes[source.archetype().index()].spec();
        self.ensure_disjoint(entity, source_spec, values.spec(), registry)?;

        let target = source_spec.union(values.spec());
        self.execute_migration(entity, source, target, registry, |chunk, row| {
            values.apply(chunk, row)
        });
        Ok(())
    }

    /// Check that none of the added component ids is already on the entity.
    fn ensure_disjoint(
        &self,
        entity: Entity,
        source_spec: &component::Spec,
        add_spec: &component::Spec,
        registry: &component::Registry,
    ) -> Result<(), StorageError> {
        if let Some(id) = add_spec.ids().iter().find(|id| source_spec.contains(**id)) {
            return Err(StorageError::AlreadyHas {
                entity,
                component: registry
                    .get_info_by_id(*id)
                    .map(|info| info.type_name())
                    .unwrap_or("<unregistered>"),
            });
        }
        Ok(())
    }

    /// Remove components from an existing entity, migrating it to the archetype for the
    /// difference component set.
    ///
    /// Returns `false` (soft failure, never an error) if the entity is untracked/stale,
    /// lacks any of the named components, or the set is empty.
    pub fn remove_components<S: IntoSpec>(
        &mut self,
        entity: Entity,
        registry: &component::Registry,
    ) -> bool {
        let remove_spec = S::into_spec(registry);
        self.remove_components_dynamic(entity, &remove_spec, registry)
    }

    /// Remove components from an existing entity by spec. See
    /// [`remove_components`](Self::remove_components).
    pub fn remove_components_dynamic(
        &mut self,
        entity: Entity,
        spec: &component::Spec,
        registry: &component::Registry,
    ) -> bool {
        let Some(source) = self.index.get(entity) else {
            return false;
        };

        if spec.is_empty() {
            return false;
        }

        let source_spec = self.archetypes[source.archetype().index()].spec();
        if !source_spec.contains_all(spec) {
            return false;
        }

        let target = source_spec.difference(spec);
        self.execute_migration(entity, source, target, registry, |_chunk, _row| {});
        true
    }

    /// Execute a migration: move an entity from its current archetype to the one for
    /// `target`, preserving shared component values.
    ///
    /// # Process
    /// 1. Get or create the target archetype (notifying the query manager if new)
    /// 2. Byte-copy the shared components out of the source row (no drop)
    /// 3. Swap-remove the source row, dropping components absent from the target
    /// 4. Update the swapped entity's index entry, if one was moved
    /// 5. Insert the entity into the target with the extracted bytes plus new values
    /// 6. Update the migrated entity's index entry
    fn execute_migration(
        &mut self,
        entity: Entity,
        source: Location,
        target: component::Spec,
        registry: &component::Registry,
        apply: impl FnOnce(&mut Chunk, usize),
    ) {
        let target_id = self.archetype_of(target, registry);

        let shared = self.archetypes[source.archetype().index()]
            .spec()
            .intersection(self.archetypes[target_id.index()].spec());

        let (extracted, moved) = self.archetypes[source.archetype().index()].extract_and_swap(
            source.slot(),
            &shared,
            &mut self.pool,
        );
        if let Some(moved) = moved {
            self.index.set(moved, source);
        }

        let slot = self.archetypes[target_id.index()].push_with(
            entity,
            &mut self.pool,
            extracted,
            apply,
        );
        self.index.set(entity, Location::new(target_id, slot));
    }

    /// Overwrite an existing component value in place (no migration).
    ///
    /// # Errors
    /// - [`StorageError::NotTracked`] if the entity is untracked or stale
    /// - [`StorageError::MissingComponent`] if the entity's archetype lacks `C`
    pub fn set_component<C: Component>(
        &mut self,
        entity: Entity,
        value: C,
    ) -> Result<(), StorageError> {
        let location = self
            .index
            .get(entity)
            .ok_or(StorageError::NotTracked { entity })?;

        let archetype = &mut self.archetypes[location.archetype().index()];
        let (chunk, row) = archetype.chunk_row_mut(location.slot());
        let Some(column) = chunk.column_by_type_mut::<C>() else {
            return Err(StorageError::MissingComponent {
                entity,
                component: std::any::type_name::<C>(),
            });
        };
        // SAFETY: The row is live (location came from the index) and holds a value of C.
        unsafe {
            column.replace(row, value);
        }
        Ok(())
    }

    /// Overwrite existing component values in place from pre-boxed values (the
    /// deserialization path). No migration happens; every component in the boxed set
    /// must already be on the entity.
    ///
    /// # Errors
    /// - [`StorageError::NotTracked`] if the entity is untracked or stale
    /// - [`StorageError::MissingComponent`] if any boxed component is absent
    pub fn set_dynamic(
        &mut self,
        entity: Entity,
        values: BoxedValues,
        registry: &component::Registry,
    ) -> Result<(), StorageError> {
        let location = self
            .index
            .get(entity)
            .ok_or(StorageError::NotTracked { entity })?;

        let archetype = &mut self.archetypes[location.archetype().index()];
        if let Some(id) = values
            .spec()
            .ids()
            .iter()
            .find(|id| !archetype.contains(**id))
        {
            return Err(StorageError::MissingComponent {
                entity,
                component: registry
                    .get_info_by_id(*id)
                    .map(|info| info.type_name())
                    .unwrap_or("<unregistered>"),
            });
        }

        let spec = values.spec().clone();
        let (chunk, row) = archetype.chunk_row_mut(location.slot());
        for id in spec.ids() {
            let column = chunk.column_mut(*id).expect("component in archetype");
            // SAFETY: The row is live and holds a value for every component in the
            // spec; the slot is rewritten by the apply below.
            unsafe {
                column.drop_at(row);
            }
        }
        values.apply(chunk, row);
        Ok(())
    }

    /// Get a reference to an entity's component value, straight into chunk storage.
    ///
    /// Returns `None` for untracked/stale entities and absent components.
    pub fn get<C: Component>(&self, entity: Entity) -> Option<&C> {
        let location = self.index.get(entity)?;
        self.archetypes[location.archetype().index()].get::<C>(location.slot())
    }

    /// Get a mutable reference to an entity's component value for in-place mutation.
    ///
    /// Returns `None` for untracked/stale entities and absent components.
    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> Option<&mut C> {
        let location = self.index.get(entity)?;
        self.archetypes[location.archetype().index()].get_mut::<C>(location.slot())
    }

    /// Check whether an entity has a component of type `C`. `false` for untracked
    /// entities, never an error.
    pub fn has<C: Component>(&self, entity: Entity, registry: &component::Registry) -> bool {
        let Some(id) = registry.get::<C>() else {
            return false;
        };
        self.has_id(entity, id)
    }

    /// Check whether an entity has the component with the given id.
    pub fn has_id(&self, entity: Entity, id: component::Id) -> bool {
        self.index
            .get(entity)
            .is_some_and(|location| self.archetypes[location.archetype().index()].contains(id))
    }

    /// Get the storage location for an entity, if it is tracked with a live generation.
    #[inline]
    pub fn location_of(&self, entity: Entity) -> Option<Location> {
        self.index.get(entity)
    }

    /// Check whether an entity is tracked with a live generation.
    #[inline]
    pub fn is_tracked(&self, entity: Entity) -> bool {
        self.index.contains(entity)
    }

    /// Iterate the component infos of an entity's current archetype.
    ///
    /// Lazy and side-effect free; empty for untracked/stale entities.
    pub fn component_infos(&self, entity: Entity) -> impl Iterator<Item = component::Info> + '_ {
        self.index
            .get(entity)
            .into_iter()
            .flat_map(move |location| {
                self.archetypes[location.archetype().index()]
                    .infos()
                    .iter()
                    .copied()
            })
    }

    /// Iterate the `(info, cell)` pairs of an entity's component values. This is the
    /// type-erased snapshot surface for serialization and inspection.
    ///
    /// Lazy and side-effect free; empty for untracked/stale entities.
    pub fn components(&self, entity: Entity) -> impl Iterator<Item = (component::Info, Cell<'_>)> {
        self.index.get(entity).into_iter().flat_map(move |location| {
            self.archetypes[location.archetype().index()].cells_at(location.slot())
        })
    }

    /// Empty all archetypes and the entity index, releasing chunk storage to the pool
    /// and dropping every cached query entry.
    ///
    /// The storage stays fully usable: new entities spawn into fresh archetypes that
    /// reuse the pooled chunks. A no-op on an already-empty storage.
    pub fn clear(&mut self) {
        for archetype in &mut self.archetypes {
            archetype.clear(&mut self.pool);
        }
        self.archetypes.clear();
        self.by_spec.clear();
        self.index.clear();
        self.queries.reset();
        log::debug!("storage cleared, {} chunk(s) pooled", self.pool.pooled());
    }

    /// Get the number of chunks currently held by the pool. Test/diagnostic surface.
    #[inline]
    pub fn pooled_chunks(&self) -> usize {
        self.pool.pooled()
    }
}

impl Default for Storage {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
