//! The World is the central container for all entities and components in the ECS.
//!
//! A `World` wires together the entity [`Allocator`](entity::Allocator), the component
//! [`Registry`](component::Registry), the chunked [`Storage`](storage::Storage) and the
//! shared query [`Manager`](query::Manager), and provides the primary API for spawning,
//! despawning, and accessing entities.
//!
//! # Threading
//!
//! The world itself is a single-threaded owner (`!Send`, like a main-thread resource).
//! Concurrency enters through three deliberately narrow doors:
//! - the query manager (`Arc`-shared, safe to match against from any thread),
//! - entity reservation (`reserve_entity` takes `&self` and is lock-free),
//! - the [`CommandBuffer`], whose pushes are lock-free and whose apply happens here.
//!
//! # Example
//!
//! ```ignore
//! use kestrel_ecs::world::{Id, World};
//!
//! let mut world = World::new(Id::new(1));
//!
//! let entity = world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.0 }));
//!
//! world.for_each::<(&mut Position, &Velocity)>(|_entity, (pos, vel)| {
//!     pos.x += vel.dx;
//! });
//!
//! world.despawn(entity);
//! ```

mod command;
mod extensions;

use std::marker::PhantomData;
use std::sync::Arc;

pub use command::{Command, CommandBuffer};
pub use extensions::{Extension, Extensions};

use crate::{
    component::{self, Component, IntoSpec, Spec},
    entity,
    error::StorageError,
    query,
    storage::{self, BoxedValues, Cell, Values},
};

/// A world identifier. This is a unique identifier for a world in the ECS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl Id {
    /// Create a new world identifier.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Id(id)
    }

    /// Get the raw identifier value.
    #[inline]
    pub const fn id(&self) -> u32 {
        self.0
    }
}

/// The central container for all entities, components, and their relationships.
///
/// Each world is fully isolated: its registry assigns component ids independently, and
/// nothing is shared with other worlds.
pub struct World {
    /// The world's unique identifier.
    id: Id,

    /// The world's entity allocator.
    allocator: entity::Allocator,

    /// The registry of all known component and extension types in the world.
    registry: component::Registry,

    /// The storage for the world's entities and components.
    storage: storage::Storage,

    /// World-level singleton values.
    extensions: Extensions,

    /// Marker to make World !Send. The world stays on the thread that created it;
    /// cross-thread access goes through the query manager and the command buffer.
    _not_send: PhantomData<*mut ()>,
}

impl World {
    /// Create a new empty world.
    pub fn new(id: Id) -> Self {
        Self {
            id,
            allocator: entity::Allocator::new(),
            registry: component::Registry::new(),
            storage: storage::Storage::new(),
            extensions: Extensions::new(),
            _not_send: PhantomData,
        }
    }

    /// Get this world's identifier.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the world's component registry.
    #[inline]
    pub fn registry(&self) -> &component::Registry {
        &self.registry
    }

    /// Get the world's storage.
    #[inline]
    pub fn storage(&self) -> &storage::Storage {
        &self.storage
    }

    /// Get the shared query manager. Clone the `Arc` to match queries from other
    /// threads while this world keeps spawning.
    #[inline]
    pub fn query_manager(&self) -> &Arc<query::Manager> {
        self.storage.queries()
    }

    /// Register a component type, returning its id.
    #[inline]
    pub fn register_component<C: Component>(&self) -> component::Id {
        self.registry.register::<C>()
    }

    /// Reserve an entity handle without spawning it. Lock-free and callable through a
    /// shared reference, which is what the command buffer uses to name entities before
    /// their deferred spawn lands. A reserved entity is not alive until spawned.
    #[inline]
    pub fn reserve_entity(&self) -> entity::Entity {
        self.allocator.alloc()
    }

    /// Spawn a new entity with the given set of component values.
    pub fn spawn<V: Values>(&mut self, values: V) -> entity::Entity {
        let entity = self.allocator.alloc();
        self.storage
            .spawn_entity(entity, values, &self.registry)
            .expect("freshly allocated entity is untracked");
        entity
    }

    /// Spawn a batch of entities sharing one component value shape.
    pub fn spawn_many<V: Values>(
        &mut self,
        values: impl IntoIterator<Item = V>,
    ) -> Vec<entity::Entity> {
        let values: Vec<V> = values.into_iter().collect();
        let entities = self.allocator.alloc_many(values.len());
        self.storage
            .spawn_entities(entities.iter().copied().zip(values), &self.registry)
            .expect("freshly allocated entities are untracked");
        entities
    }

    /// Spawn a previously reserved entity from boxed values (the deferred path).
    ///
    /// # Errors
    /// Returns [`StorageError::AlreadyTracked`] if the entity already spawned.
    pub fn spawn_reserved(
        &mut self,
        entity: entity::Entity,
        values: BoxedValues,
    ) -> Result<(), StorageError> {
        self.storage.spawn_dynamic(entity, values, &self.registry)
    }

    /// Despawn an entity, dropping its components and recycling its id.
    ///
    /// Returns `false` (a no-op) if the entity is not alive; stale handles from an
    /// earlier generation of the same id are detected and rejected the same way.
    pub fn despawn(&mut self, entity: entity::Entity) -> bool {
        if self.storage.despawn_entity(entity) {
            self.allocator.free(entity);
            return true;
        }
        false
    }

    /// Check whether an entity handle refers to a live entity.
    #[inline]
    pub fn is_alive(&self, entity: entity::Entity) -> bool {
        self.storage.is_tracked(entity)
    }

    /// Get the number of live entities.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.storage.entity_count()
    }

    /// Get the number of archetypes.
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.storage.archetype_count()
    }

    /// Register the archetype for the component set `S` upfront, so that later spawns
    /// with exactly that shape cause zero archetype creations. Idempotent.
    pub fn preallocate<S: IntoSpec>(&mut self) -> storage::archetype::Id {
        let spec = S::into_spec(&self.registry);
        self.storage.preallocate(spec, &self.registry)
    }

    /// Add components to a live entity, migrating it to the wider archetype.
    ///
    /// # Errors
    /// - [`StorageError::NotTracked`] if the entity is not alive
    /// - [`StorageError::AlreadyHas`] if any component is already present
    pub fn add_components<V: Values>(
        &mut self,
        entity: entity::Entity,
        values: V,
    ) -> Result<(), StorageError> {
        self.storage.add_components(entity, values, &self.registry)
    }

    /// Add boxed components to a live entity (the deferred path).
    ///
    /// # Errors
    /// Same error conditions as [`add_components`](Self::add_components).
    pub fn add_components_dynamic(
        &mut self,
        entity: entity::Entity,
        values: BoxedValues,
    ) -> Result<(), StorageError> {
        self.storage
            .add_components_dynamic(entity, values, &self.registry)
    }

    /// Remove components from a live entity, migrating it to the narrower archetype.
    ///
    /// Returns `false` (never an error) if the entity is not alive or lacks any of the
    /// named components.
    pub fn remove_components<S: IntoSpec>(&mut self, entity: entity::Entity) -> bool {
        self.storage.remove_components::<S>(entity, &self.registry)
    }

    /// Remove components from a live entity by spec. See
    /// [`remove_components`](Self::remove_components).
    pub fn remove_components_dynamic(
        &mut self,
        entity: entity::Entity,
        spec: &component::Spec,
    ) -> bool {
        self.storage
            .remove_components_dynamic(entity, spec, &self.registry)
    }

    /// Overwrite an existing component value in place.
    ///
    /// # Errors
    /// - [`StorageError::NotTracked`] if the entity is not alive
    /// - [`StorageError::MissingComponent`] if the component is absent
    pub fn set<C: Component>(
        &mut self,
        entity: entity::Entity,
        value: C,
    ) -> Result<(), StorageError> {
        self.storage.set_component(entity, value)
    }

    /// Overwrite existing component values in place from boxed values (the
    /// deserialization path).
    ///
    /// # Errors
    /// - [`StorageError::NotTracked`] if the entity is not alive
    /// - [`StorageError::MissingComponent`] if any boxed component is absent
    pub fn set_dynamic(
        &mut self,
        entity: entity::Entity,
        values: BoxedValues,
    ) -> Result<(), StorageError> {
        self.storage.set_dynamic(entity, values, &self.registry)
    }

    /// Get a reference to an entity's component value.
    ///
    /// Returns `None` for dead/stale entities and absent components.
    #[inline]
    pub fn get<C: Component>(&self, entity: entity::Entity) -> Option<&C> {
        self.storage.get::<C>(entity)
    }

    /// Get a mutable reference to an entity's component value, straight into chunk
    /// storage for in-place mutation.
    ///
    /// Returns `None` for dead/stale entities and absent components.
    #[inline]
    pub fn get_mut<C: Component>(&mut self, entity: entity::Entity) -> Option<&mut C> {
        self.storage.get_mut::<C>(entity)
    }

    /// Check whether an entity has a component of type `C`. `false` for dead entities.
    #[inline]
    pub fn has<C: Component>(&self, entity: entity::Entity) -> bool {
        self.storage.has::<C>(entity, &self.registry)
    }

    /// Iterate the component infos of an entity. Empty for dead/stale entities.
    pub fn component_infos(
        &self,
        entity: entity::Entity,
    ) -> impl Iterator<Item = component::Info> + '_ {
        self.storage.component_infos(entity)
    }

    /// Iterate the `(info, cell)` pairs of an entity's component values - the snapshot
    /// surface for serialization and inspectors. Empty for dead/stale entities.
    pub fn components(
        &self,
        entity: entity::Entity,
    ) -> impl Iterator<Item = (component::Info, Cell<'_>)> {
        self.storage.components(entity)
    }

    /// Get the archetypes matching the component set `S`, through the query cache.
    pub fn matching<S: IntoSpec>(&self) -> Arc<Vec<storage::archetype::Id>> {
        let descriptor = query::Descriptor::new(S::into_spec(&self.registry), Spec::EMPTY);
        self.storage.queries().matching(&descriptor)
    }

    /// Invoke `f` for every entity matching the fetch `V`, with direct access to chunk
    /// storage (`&C` shared, `&mut C` exclusive).
    ///
    /// # Panics
    /// Panics if `V` requests the same component type more than once (an aliasing
    /// violation).
    pub fn for_each<'w, V: query::Fetch<'w>>(
        &'w mut self,
        mut f: impl FnMut(entity::Entity, V),
    ) {
        Self::validate_fetch::<V>(&self.registry);
        let descriptor = query::Descriptor::new(V::spec(&self.registry), Spec::EMPTY);

        let this: &'w Self = &*self;
        let matched = this.storage.queries().matching(&descriptor);
        for id in matched.iter() {
            let archetype = this.storage.archetype(*id);
            for chunk in archetype.chunks() {
                for row in 0..chunk.len() {
                    // SAFETY: The chunk belongs to a matched archetype, the row is
                    // live, and the &mut self borrow plus the aliasing validation above
                    // make each fetched item exclusive for its invocation.
                    let item = unsafe { V::fetch(chunk, row) };
                    f(chunk.entity(row), item);
                }
            }
        }
    }

    /// Invoke `f` for every entity matching the fetch `V`, partitioning whole chunks
    /// across rayon workers.
    ///
    /// No two invocations ever share one entity's storage (chunks are disjoint and each
    /// chunk is visited by exactly one worker); no ordering across entities is
    /// guaranteed. No internal lock is held while `f` runs.
    ///
    /// # Panics
    /// Panics if `V` requests the same component type more than once (an aliasing
    /// violation).
    pub fn for_each_parallel<'w, V: query::Fetch<'w>>(
        &'w mut self,
        f: impl Fn(entity::Entity, V) + Send + Sync,
    ) {
        Self::validate_fetch::<V>(&self.registry);
        let descriptor = query::Descriptor::new(V::spec(&self.registry), Spec::EMPTY);

        let this: &'w Self = &*self;
        let matched = this.storage.queries().matching(&descriptor);

        // Flatten to chunk references up front; the scope closure must not capture the
        // world itself (the world is !Sync by design, chunks are the shareable unit).
        let mut chunks: Vec<&'w storage::Chunk> = Vec::new();
        for id in matched.iter() {
            chunks.extend(this.storage.archetype(*id).chunks());
        }

        rayon::scope(|scope| {
            for chunk in chunks {
                let f = &f;
                scope.spawn(move |_| {
                    for row in 0..chunk.len() {
                        // SAFETY: As in for_each, plus chunk disjointness: this chunk
                        // is visited by this worker only, so mutable access to its
                        // rows cannot overlap another worker's.
                        let item = unsafe { V::fetch(chunk, row) };
                        f(chunk.entity(row), item);
                    }
                });
            }
        });
    }

    /// Reject fetches that name the same component type more than once.
    fn validate_fetch<'w, V: query::Fetch<'w>>(registry: &component::Registry) {
        let mut ids = Vec::new();
        V::collect_ids(registry, &mut ids);
        let requested = ids.len();
        ids.sort();
        ids.dedup();
        assert!(
            ids.len() == requested,
            "query aliasing violation: same component requested multiple times"
        );
    }

    /// Install a world extension, replacing any previous value of the same type.
    #[inline]
    pub fn set_extension<E: Extension>(&mut self, value: E) {
        self.extensions.insert(&self.registry, value);
    }

    /// Get a reference to a world extension, if installed.
    #[inline]
    pub fn get_extension<E: Extension>(&self) -> Option<&E> {
        self.extensions.get::<E>(&self.registry)
    }

    /// Get a mutable reference to a world extension, if installed.
    #[inline]
    pub fn get_extension_mut<E: Extension>(&mut self) -> Option<&mut E> {
        self.extensions.get_mut::<E>(&self.registry)
    }

    /// Remove a world extension, returning it if it was installed.
    #[inline]
    pub fn remove_extension<E: Extension>(&mut self) -> Option<E> {
        self.extensions.remove::<E>(&self.registry)
    }

    /// Check whether a world extension is installed.
    #[inline]
    pub fn has_extension<E: Extension>(&self) -> bool {
        self.extensions.contains::<E>(&self.registry)
    }

    /// Despawn everything: empties all archetypes, the entity index and the query
    /// cache, returning chunk storage to the pool. Component registrations and
    /// extensions survive; the world stays fully usable.
    pub fn clear(&mut self) {
        self.storage.clear();
    }
}

// World is intentionally !Send:
// - The storage and allocator are designed for a single mutating owner.
// - Cross-thread consumers get the Arc'd query manager and the command buffer instead.
// The _not_send marker enforces this; the contained types are otherwise thread-movable.
