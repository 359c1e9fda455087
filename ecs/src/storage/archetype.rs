use fixedbitset::FixedBitSet;

use crate::{
    component::{self, Component},
    entity::Entity,
    storage::{
        cell::Cell,
        chunk::{CHUNK_CAPACITY, Chunk, ChunkPool},
        location::Slot,
    },
};

/// A unique identifier for an archetype within one storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(u32);

impl Id {
    /// Create a new Id with the given unique identifier.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Id(id)
    }

    /// Get the index of the Id for use in collections.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// An archetype stores all entities sharing an identical component set.
///
/// Component data lives in fixed-capacity [`Chunk`]s, densely packed with swap-removal:
/// a removed entity's slot is refilled by the archetype's last entity, so iteration never
/// skips holes, at the cost of not preserving insertion order.
///
/// # Invariants
/// - Every live slot holds a value for every component in the spec
/// - All chunks except the tail are full; the tail is non-empty (or there are no chunks)
/// - `slot = chunk_index * CHUNK_CAPACITY + row` for every stored entity
pub struct Archetype {
    /// The archetype's unique identifier.
    id: Id,

    /// The component set that identifies this archetype.
    spec: component::Spec,

    /// The spec rendered as a bitset, shared with the query manager for matching.
    mask: FixedBitSet,

    /// Infos for the stored components, in spec (id) order.
    infos: Vec<component::Info>,

    /// The chunks holding this archetype's entities.
    chunks: Vec<Chunk>,

    /// Total number of entities across all chunks.
    len: usize,
}

impl Archetype {
    /// Create a new empty archetype for the given component set.
    pub fn new(id: Id, spec: component::Spec, infos: Vec<component::Info>) -> Self {
        debug_assert_eq!(spec.len(), infos.len(), "spec and infos must align");
        let mask = spec.mask();
        Self {
            id,
            spec,
            mask,
            infos,
            chunks: Vec::new(),
            len: 0,
        }
    }

    /// Get the Id of this archetype.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the component set of this archetype.
    #[inline]
    pub fn spec(&self) -> &component::Spec {
        &self.spec
    }

    /// Get the component set as a bitset mask.
    #[inline]
    pub fn mask(&self) -> &FixedBitSet {
        &self.mask
    }

    /// Get the component infos stored by this archetype.
    #[inline]
    pub fn infos(&self) -> &[component::Info] {
        &self.infos
    }

    /// Get the chunks of this archetype.
    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Get the number of entities in this archetype.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the archetype holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// O(1) membership test for a component id.
    #[inline]
    pub fn contains(&self, id: component::Id) -> bool {
        self.spec.contains(id)
    }

    /// Membership test for a component type.
    pub fn has<C: Component>(&self) -> bool {
        self.infos
            .iter()
            .any(|info| info.type_id() == std::any::TypeId::of::<C>())
    }

    /// Get the entity stored at the given slot, if the slot is live.
    pub fn entity_at(&self, slot: Slot) -> Option<Entity> {
        if slot.index() >= self.len {
            return None;
        }
        let (chunk, row) = self.split(slot);
        Some(self.chunks[chunk].entity(row))
    }

    /// Split a slot into its chunk and row indices.
    #[inline]
    fn split(&self, slot: Slot) -> (usize, usize) {
        (slot.index() / CHUNK_CAPACITY, slot.index() % CHUNK_CAPACITY)
    }

    /// Get the chunk and row backing a slot, mutably.
    pub(crate) fn chunk_row_mut(&mut self, slot: Slot) -> (&mut Chunk, usize) {
        debug_assert!(slot.index() < self.len, "slot out of bounds");
        let (chunk, row) = self.split(slot);
        (&mut self.chunks[chunk], row)
    }

    /// Append an entity, writing its row with extracted migration bytes and/or an apply
    /// closure, and return the slot it landed in.
    ///
    /// A chunk is acquired from the pool when the tail chunk is full (or absent). The
    /// extracted bytes and the closure together must cover every column; this holds by
    /// construction because both derive from the spec the archetype was created for.
    pub(crate) fn push_with(
        &mut self,
        entity: Entity,
        pool: &mut ChunkPool,
        extracted: Vec<(component::Id, Vec<u8>)>,
        apply: impl FnOnce(&mut Chunk, usize),
    ) -> Slot {
        if self.chunks.last().is_none_or(|chunk| chunk.is_full()) {
            self.chunks.push(pool.acquire(&self.infos));
        }

        let chunk_index = self.chunks.len() - 1;
        let chunk = &mut self.chunks[chunk_index];
        let row = chunk.begin_row(entity);

        // Move extracted component bytes into the new row.
        for (id, bytes) in extracted {
            let column = chunk.column_mut(id).expect("extracted component in spec");
            // SAFETY: The bytes were moved out of the same component's source column and
            // the reserved row holds no live value yet.
            unsafe {
                column.write_bytes(row, &bytes);
            }
        }

        // Write the new component values.
        apply(chunk, row);
        chunk.commit_row();

        self.len += 1;
        Slot::new(chunk_index * CHUNK_CAPACITY + row)
    }

    /// Remove the entity at the given slot, dropping its component values and refilling
    /// the slot with the archetype's last entity. Returns the moved entity (whose index
    /// entry must be updated by the caller), or `None` if the removed slot was the last.
    pub(crate) fn swap_remove(&mut self, slot: Slot, pool: &mut ChunkPool) -> Option<Entity> {
        debug_assert!(slot.index() < self.len, "slot out of bounds");
        let (chunk, row) = self.split(slot);
        self.chunks[chunk].drop_row(row);
        self.fill_hole(chunk, row, pool)
    }

    /// Extract the shared components' bytes out of a slot (without dropping them), drop
    /// the rest, and swap-remove the row. Returns the extracted `(id, bytes)` pairs and
    /// the entity moved into the freed slot, if any.
    pub(crate) fn extract_and_swap(
        &mut self,
        slot: Slot,
        shared: &component::Spec,
        pool: &mut ChunkPool,
    ) -> (Vec<(component::Id, Vec<u8>)>, Option<Entity>) {
        debug_assert!(slot.index() < self.len, "slot out of bounds");
        let (chunk_index, row) = self.split(slot);

        let chunk = &mut self.chunks[chunk_index];
        let mut extracted = Vec::with_capacity(shared.len());
        for column in chunk.columns_mut() {
            let id = column.info().id();
            if shared.contains(id) {
                // SAFETY: The row is live; the bytes are moved (the slot is refilled or
                // shrunk away below without another drop).
                let bytes = unsafe { column.read_bytes(row).to_vec() };
                extracted.push((id, bytes));
            } else {
                // SAFETY: The row is live; the hole is refilled below.
                unsafe {
                    column.drop_at(row);
                }
            }
        }

        let moved = self.fill_hole(chunk_index, row, pool);
        (extracted, moved)
    }

    /// Refill an already-dropped row from the archetype's last entity and shrink by one.
    /// Releases the tail chunk to the pool when it empties.
    fn fill_hole(&mut self, chunk: usize, row: usize, pool: &mut ChunkPool) -> Option<Entity> {
        let last_chunk = self.chunks.len() - 1;

        let moved = if chunk == last_chunk {
            self.chunks[chunk].relocate_last_into(row)
        } else {
            let (head, tail) = self.chunks.split_at_mut(last_chunk);
            Some(head[chunk].adopt_last_from(row, &mut tail[0]))
        };

        self.len -= 1;

        if let Some(tail) = self.chunks.last()
            && tail.is_empty()
        {
            pool.release(self.chunks.pop().expect("tail chunk exists"));
        }

        moved
    }

    /// Get a reference to a component value at a slot.
    ///
    /// Returns `None` if the slot is out of bounds or the archetype does not store `C`.
    pub fn get<C: Component>(&self, slot: Slot) -> Option<&C> {
        if slot.index() >= self.len {
            return None;
        }
        let (chunk, row) = self.split(slot);
        self.chunks[chunk].column_by_type::<C>()?.get(row)
    }

    /// Get a mutable reference to a component value at a slot.
    ///
    /// Returns `None` if the slot is out of bounds or the archetype does not store `C`.
    pub fn get_mut<C: Component>(&mut self, slot: Slot) -> Option<&mut C> {
        if slot.index() >= self.len {
            return None;
        }
        let (chunk, row) = self.split(slot);
        self.chunks[chunk].column_by_type_mut::<C>()?.get_mut(row)
    }

    /// Iterate the component cells of the entity at a slot, in spec order. Used by the
    /// introspection/serialization boundary; lazy and side-effect free.
    pub fn cells_at(&self, slot: Slot) -> impl Iterator<Item = (component::Info, Cell<'_>)> {
        let (chunk, row) = self.split(slot);
        let live = slot.index() < self.len;
        live.then(move || {
            self.chunks[chunk]
                .columns()
                .iter()
                .map(move |column| (*column.info(), column.cell(row)))
        })
        .into_iter()
        .flatten()
    }

    /// Drop all entities and release every chunk back to the pool, leaving the archetype
    /// empty but reusable.
    pub(crate) fn clear(&mut self, pool: &mut ChunkPool) {
        for chunk in self.chunks.drain(..) {
            pool.release(chunk);
        }
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use kestrel_macros::Component;

    use crate::{
        component::Registry,
        entity::Allocator,
        storage::values::Values,
    };

    use super::*;

    #[derive(Component, Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Component, Debug, PartialEq)]
    struct Health(i32);

    fn archetype_for(registry: &Registry, spec: component::Spec) -> Archetype {
        let infos = registry.info_for_spec(&spec);
        Archetype::new(Id::new(0), spec, infos)
    }

    fn push<V: Values>(
        archetype: &mut Archetype,
        pool: &mut ChunkPool,
        entity: Entity,
        values: V,
    ) -> Slot {
        archetype.push_with(entity, pool, Vec::new(), |chunk, row| {
            values.apply(chunk, row)
        })
    }

    #[test]
    fn archetype_push_and_get() {
        // Given
        let registry = Registry::new();
        let mut pool = ChunkPool::new();
        let mut archetype = archetype_for(&registry, registry.spec::<(Position, Health)>());
        let allocator = Allocator::new();

        // When
        let e1 = allocator.alloc();
        let slot = push(
            &mut archetype,
            &mut pool,
            e1,
            (Position { x: 1.0, y: 2.0 }, Health(10)),
        );

        // Then
        assert_eq!(archetype.len(), 1);
        assert_eq!(slot, Slot::new(0));
        assert_eq!(archetype.entity_at(slot), Some(e1));
        assert_eq!(archetype.get::<Position>(slot), Some(&Position { x: 1.0, y: 2.0 }));
        assert_eq!(archetype.get::<Health>(slot), Some(&Health(10)));
        assert_eq!(archetype.entity_at(Slot::new(1)), None);
    }

    #[test]
    fn archetype_membership() {
        // Given
        let registry = Registry::new();
        let archetype = archetype_for(&registry, registry.spec::<(Position, Health)>());

        // Then
        assert!(archetype.contains(registry.get::<Position>().unwrap()));
        assert!(archetype.contains(registry.get::<Health>().unwrap()));
        assert!(archetype.has::<Position>());

        #[derive(Component)]
        struct Other;
        let other = registry.register::<Other>();
        assert!(!archetype.contains(other));
        assert!(!archetype.has::<Other>());
    }

    #[test]
    fn archetype_grows_across_chunks() {
        // Given
        let registry = Registry::new();
        let mut pool = ChunkPool::new();
        let mut archetype = archetype_for(&registry, registry.spec::<Health>());
        let allocator = Allocator::new();

        // When - one more entity than a single chunk holds
        for i in 0..(CHUNK_CAPACITY + 1) {
            push(&mut archetype, &mut pool, allocator.alloc(), Health(i as i32));
        }

        // Then
        assert_eq!(archetype.len(), CHUNK_CAPACITY + 1);
        assert_eq!(archetype.chunks().len(), 2);
        assert_eq!(
            archetype.get::<Health>(Slot::new(CHUNK_CAPACITY)),
            Some(&Health(CHUNK_CAPACITY as i32))
        );
    }

    #[test]
    fn archetype_swap_remove_within_chunk() {
        // Given
        let registry = Registry::new();
        let mut pool = ChunkPool::new();
        let mut archetype = archetype_for(&registry, registry.spec::<Health>());
        let allocator = Allocator::new();

        let entities: Vec<_> = (0..3)
            .map(|i| {
                let e = allocator.alloc();
                push(&mut archetype, &mut pool, e, Health(i * 100));
                e
            })
            .collect();

        // When - remove the middle entity
        let moved = archetype.swap_remove(Slot::new(1), &mut pool);

        // Then - the last entity moved into slot 1 with its data intact
        assert_eq!(moved, Some(entities[2]));
        assert_eq!(archetype.len(), 2);
        assert_eq!(archetype.entity_at(Slot::new(1)), Some(entities[2]));
        assert_eq!(archetype.get::<Health>(Slot::new(1)), Some(&Health(200)));
        assert_eq!(archetype.get::<Health>(Slot::new(0)), Some(&Health(0)));

        // When - remove the last entity
        let moved = archetype.swap_remove(Slot::new(1), &mut pool);

        // Then - nothing was moved
        assert_eq!(moved, None);
        assert_eq!(archetype.len(), 1);
    }

    #[test]
    fn archetype_swap_remove_across_chunks() {
        // Given - two chunks, so the last entity lives in a different chunk than slot 0
        let registry = Registry::new();
        let mut pool = ChunkPool::new();
        let mut archetype = archetype_for(&registry, registry.spec::<Health>());
        let allocator = Allocator::new();

        let mut entities = Vec::new();
        for i in 0..(CHUNK_CAPACITY + 1) {
            let e = allocator.alloc();
            push(&mut archetype, &mut pool, e, Health(i as i32));
            entities.push(e);
        }
        assert_eq!(archetype.chunks().len(), 2);

        // When - remove from the first chunk
        let moved = archetype.swap_remove(Slot::new(0), &mut pool);

        // Then - the entity from the second chunk filled the hole and the emptied tail
        // chunk went back to the pool
        assert_eq!(moved, Some(entities[CHUNK_CAPACITY]));
        assert_eq!(archetype.len(), CHUNK_CAPACITY);
        assert_eq!(archetype.chunks().len(), 1);
        assert_eq!(pool.pooled(), 1);
        assert_eq!(
            archetype.get::<Health>(Slot::new(0)),
            Some(&Health(CHUNK_CAPACITY as i32))
        );
    }

    #[test]
    fn archetype_swap_remove_drops_values() {
        // Given
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[derive(Debug)]
        struct DropTracker(Arc<AtomicUsize>);

        impl Drop for DropTracker {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        impl crate::component::Component for DropTracker {}

        let registry = Registry::new();
        let mut pool = ChunkPool::new();
        let mut archetype = archetype_for(&registry, registry.spec::<DropTracker>());
        let allocator = Allocator::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            push(
                &mut archetype,
                &mut pool,
                allocator.alloc(),
                DropTracker(counter.clone()),
            );
        }

        // When
        archetype.swap_remove(Slot::new(1), &mut pool);

        // Then - exactly the removed value dropped
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(archetype.len(), 2);

        // When - clear into the pool
        archetype.clear(&mut pool);

        // Then - the survivors dropped, chunk recycled
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(archetype.is_empty());
        assert_eq!(pool.pooled(), 1);
    }

    #[test]
    fn archetype_extract_preserves_shared_bytes() {
        // Given
        let registry = Registry::new();
        let mut pool = ChunkPool::new();
        let mut archetype = archetype_for(&registry, registry.spec::<(Position, Health)>());
        let allocator = Allocator::new();

        let e1 = allocator.alloc();
        let e2 = allocator.alloc();
        push(
            &mut archetype,
            &mut pool,
            e1,
            (Position { x: 1.0, y: 2.0 }, Health(10)),
        );
        push(
            &mut archetype,
            &mut pool,
            e2,
            (Position { x: 3.0, y: 4.0 }, Health(20)),
        );

        // When - extract only Position from e1's row
        let shared = registry.spec::<Position>();
        let (extracted, moved) = archetype.extract_and_swap(Slot::new(0), &shared, &mut pool);

        // Then
        assert_eq!(moved, Some(e2));
        assert_eq!(extracted.len(), 1);
        let (id, bytes) = &extracted[0];
        assert_eq!(*id, registry.get::<Position>().unwrap());
        assert_eq!(bytes.len(), std::mem::size_of::<Position>());

        // And the survivor took slot 0 with its data
        assert_eq!(archetype.len(), 1);
        assert_eq!(archetype.get::<Health>(Slot::new(0)), Some(&Health(20)));
    }

    #[test]
    fn archetype_cells_iterate_component_values() {
        // Given
        let registry = Registry::new();
        let mut pool = ChunkPool::new();
        let mut archetype = archetype_for(&registry, registry.spec::<(Position, Health)>());
        let allocator = Allocator::new();
        let slot = push(
            &mut archetype,
            &mut pool,
            allocator.alloc(),
            (Position { x: 5.0, y: 6.0 }, Health(42)),
        );

        // When
        let cells: Vec<_> = archetype.cells_at(slot).collect();

        // Then - one cell per component, in id order, readable via downcast
        assert_eq!(cells.len(), 2);
        for (info, cell) in cells {
            if info.type_id() == std::any::TypeId::of::<Position>() {
                assert_eq!(cell.as_ref::<Position>(), &Position { x: 5.0, y: 6.0 });
            } else {
                assert_eq!(cell.as_ref::<Health>(), &Health(42));
            }
        }

        // And - out-of-bounds slots yield nothing
        assert_eq!(archetype.cells_at(Slot::new(9)).count(), 0);
    }
}
