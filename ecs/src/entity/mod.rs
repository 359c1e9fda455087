//! Entity handles and allocation.
//!
//! Entities are lightweight generational handles: an [`Id`] naming a slot and a
//! [`Generation`] recording how many times that slot has been recycled. The world holds
//! at most one live entity per id; a handle is stale once the slot's generation moves on,
//! so use-after-despawn is detected instead of dangling.
//!
//! The [`Allocator`] recycles freed ids through a lock-free dead pool, which keeps the id
//! space compact for the block-based entity index and prevents id exhaustion in
//! long-running worlds:
//!
//! ```rust,ignore
//! let entity = allocator.alloc(); // Entity { id: 0, generation: 0 }
//! allocator.free(entity);
//! let reused = allocator.alloc(); // Entity { id: 0, generation: 1 }
//! // The original handle now has a mismatched generation and is treated as dead.
//! ```

use std::sync::{
    RwLock,
    atomic::{AtomicU32, Ordering},
};

use crossbeam::queue::SegQueue;

/// The generation of an entity, used to detect stale handles. The generation starts at
/// `FIRST` and is incremented each time the entity's id slot is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u32);

impl Generation {
    /// The first generation of an entity.
    pub(crate) const FIRST: Self = Self(0);

    /// Get the next generation from the current.
    #[inline]
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Get the raw generation value.
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
}

/// An entity identifier naming a slot in the world's entity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl From<u32> for Id {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Id {
    /// Get the raw id value.
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
}

/// An entity in the ECS: a generational `{id, generation}` handle.
///
/// The world contains at most one live entity for a given `id`; the `generation` tells
/// whether this handle still refers to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    /// The unique identifier of the entity.
    id: Id,

    /// The generation of the entity.
    generation: Generation,
}

impl Entity {
    /// Construct a new entity with just an id, defaulting to the first generation.
    ///
    /// This is primarily used for testing.
    #[inline]
    pub(crate) fn new(id: impl Into<Id>) -> Self {
        Self::new_with_generation(id.into(), Generation::FIRST)
    }

    /// Construct a new entity with an id and known generation.
    #[inline]
    pub(crate) const fn new_with_generation(id: Id, generation: Generation) -> Self {
        Self { id, generation }
    }

    /// Get the id of this entity.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the generation of this entity.
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Get the index of this entity for use in indexable storage (e.g. Vec).
    #[inline]
    pub fn index(&self) -> usize {
        self.id.0 as usize
    }
}

/// Order entities by id first, then generation.
impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.id.cmp(&other.id) {
            std::cmp::Ordering::Equal => self.generation.cmp(&other.generation),
            ord => ord,
        }
    }
}

const GENERATION_CHUNK: usize = 4096;

/// Growable table of atomic generation counters, mapping an entity id to its current
/// generation. Grown in fixed chunks so reads never invalidate outstanding references.
#[derive(Default, Debug)]
struct Generations {
    chunks: RwLock<Vec<Box<[AtomicU32; GENERATION_CHUNK]>>>,
}

impl Generations {
    const fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }

    fn get(&self, id: Id) -> Generation {
        let index = id.0 as usize;
        let chunk_idx = index / GENERATION_CHUNK;
        let slot_idx = index % GENERATION_CHUNK;

        let chunks = self.chunks.read().unwrap();
        Generation(if chunk_idx < chunks.len() {
            chunks[chunk_idx][slot_idx].load(Ordering::Acquire)
        } else {
            0 // Fresh id, generation 0
        })
    }

    fn increment(&self, id: Id) {
        self.ensure_capacity(id);
        let index = id.0 as usize;
        let chunk_idx = index / GENERATION_CHUNK;
        let slot_idx = index % GENERATION_CHUNK;

        let chunks = self.chunks.read().unwrap();
        chunks[chunk_idx][slot_idx].fetch_add(1, Ordering::Release);
    }

    fn ensure_capacity(&self, id: Id) {
        let chunk_idx = id.0 as usize / GENERATION_CHUNK;
        let chunks_len = self.chunks.read().unwrap().len();

        if chunk_idx >= chunks_len {
            let mut chunks = self.chunks.write().unwrap();
            while chunks.len() <= chunk_idx {
                chunks.push(Box::new(std::array::from_fn(|_| AtomicU32::new(0))));
            }
        }
    }
}

/// An allocator for entity handles.
///
/// Allocates unique ids and recycles freed ones to avoid exhaustion. When an entity is
/// freed its generation is bumped before the id enters the dead pool, invalidating any
/// stale handles still in flight.
///
/// All operations take `&self`: ids can be reserved from any thread (the command buffer
/// pre-allocates entities this way) while the world itself stays single-threaded.
#[derive(Default, Debug)]
pub struct Allocator {
    /// Generation counter for each id slot.
    generations: Generations,

    /// Pool of ids available for reuse.
    dead_pool: SegQueue<Id>,

    /// Next fresh id to allocate.
    next_id: AtomicU32,
}

impl Allocator {
    /// Construct a new entity allocator starting from id 0.
    #[inline]
    pub const fn new() -> Self {
        Self {
            generations: Generations::new(),
            dead_pool: SegQueue::new(),
            next_id: AtomicU32::new(0),
        }
    }

    /// Allocate a new entity, either by reusing a freed id from the dead pool or by
    /// allocating a fresh sequential id.
    pub fn alloc(&self) -> Entity {
        // Try to reuse from the dead pool first
        if let Some(id) = self.dead_pool.pop() {
            return Entity::new_with_generation(id, self.generations.get(id));
        }

        // Allocate a fresh id
        let id = Id(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.generations.ensure_capacity(id);
        Entity::new(id)
    }

    /// Allocate many new entities at once, draining the dead pool before minting fresh
    /// sequential ids.
    pub fn alloc_many(&self, count: usize) -> Vec<Entity> {
        let mut alloced = Vec::with_capacity(count);
        while alloced.len() < count
            && let Some(id) = self.dead_pool.pop()
        {
            alloced.push(Entity::new_with_generation(id, self.generations.get(id)));
        }

        let remaining = (count - alloced.len()) as u32;
        if remaining > 0 {
            let start_id = self.next_id.fetch_add(remaining, Ordering::Relaxed);
            let last_id = start_id + remaining;
            self.generations.ensure_capacity(Id(last_id - 1));

            alloced.extend((start_id..last_id).map(|id| Entity::new(Id(id))));
        }

        alloced
    }

    /// Free an entity id for reuse (lock-free). Bumps the slot's generation so the freed
    /// handle and any copies of it become stale.
    pub fn free(&self, entity: Entity) {
        let id = entity.id();
        self.generations.increment(id);
        self.dead_pool.push(id);
    }

    /// Get the current generation stored for an entity's id slot.
    #[inline]
    pub fn current_generation(&self, id: Id) -> Generation {
        self.generations.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_uniqueness() {
        // Given
        let allocator = Allocator::default();

        // When
        let mut entities = Vec::new();
        for _ in 0..200 {
            entities.push(allocator.alloc());
        }

        // Then - no dupes generated
        let pre_len = entities.len();
        entities.sort();
        entities.dedup();
        assert_eq!(pre_len, entities.len());
    }

    #[test]
    fn allocator_reuse_bumps_generation() {
        // Given
        let allocator = Allocator::default();

        // When
        let mut entities = Vec::new();
        for _ in 0..10 {
            entities.push(allocator.alloc());
        }

        for e in entities.drain(..) {
            allocator.free(e);
        }

        let mut reused = Vec::new();
        for _ in 0..10 {
            reused.push(allocator.alloc());
        }

        // Then - ids are reused with incremented generation
        reused.sort();
        for (i, e) in reused.iter().enumerate() {
            assert_eq!(e.id().value(), i as u32);
            assert_eq!(e.generation().value(), 1);
        }
    }

    #[test]
    fn allocator_empty_pool_allocates_new() {
        // Given
        let allocator = Allocator::default();

        // When
        let e1 = allocator.alloc();
        let e2 = allocator.alloc();

        // Then - sequential fresh ids
        assert_eq!(e1.id().value(), 0);
        assert_eq!(e2.id().value(), 1);
        assert_eq!(e1.generation(), Generation::FIRST);

        // When - free one and re-allocate
        allocator.free(e1);
        assert_eq!(allocator.current_generation(e1.id()), Generation(1));

        let e1_reused = allocator.alloc();

        // Then - freed id comes back with the next generation
        assert_eq!(e1_reused.id(), e1.id());
        assert_eq!(e1_reused.generation().value(), 1);

        // When - pool empty again
        let e3 = allocator.alloc();

        // Then
        assert_eq!(e3.id().value(), 2);
        assert_eq!(e3.generation().value(), 0);
    }

    #[test]
    fn allocator_multiple_generations() {
        // Given
        let allocator = Allocator::default();
        let entity = allocator.alloc();
        let original_id = entity.id();

        // When - free and reallocate repeatedly
        allocator.free(entity);
        let gen1 = allocator.alloc();

        allocator.free(gen1);
        let gen2 = allocator.alloc();

        allocator.free(gen2);
        let gen3 = allocator.alloc();

        // Then - same id, incrementing generations
        assert_eq!(gen1.id(), original_id);
        assert_eq!(gen1.generation().value(), 1);
        assert_eq!(gen2.generation().value(), 2);
        assert_eq!(gen3.generation().value(), 3);
    }

    #[test]
    fn allocator_alloc_many_mixed() {
        // Given
        let allocator = Allocator::default();
        for e in allocator.alloc_many(3) {
            allocator.free(e);
        }

        // When - allocate 5 (more than pool size)
        let entities = allocator.alloc_many(5);

        // Then - 3 reused + 2 new
        assert_eq!(entities.len(), 5);
        let reused: Vec<_> = entities
            .iter()
            .filter(|e| e.generation().value() == 1)
            .collect();
        let fresh: Vec<_> = entities
            .iter()
            .filter(|e| e.generation().value() == 0)
            .collect();
        assert_eq!(reused.len(), 3);
        assert_eq!(fresh.len(), 2);

        // New entities have ids 3 and 4
        let mut fresh_ids: Vec<_> = fresh.iter().map(|e| e.id().value()).collect();
        fresh_ids.sort();
        assert_eq!(fresh_ids, vec![3, 4]);
    }

    #[test]
    fn entity_ordering_and_equality() {
        // Given
        let e1 = Entity::new(Id(1));
        let e2 = Entity::new(Id(2));
        let e1_gen1 = Entity::new_with_generation(Id(1), Generation(1));

        // Then - ordered by id first, then generation
        assert!(e1 < e2);
        assert!(e1 < e1_gen1);
        assert!(e1_gen1 < e2);

        assert_eq!(e1, Entity::new(Id(1)));
        assert_ne!(e1, e1_gen1);
        assert_ne!(e1, e2);
    }

    #[test]
    fn entity_index() {
        // Given
        let e1 = Entity::new(Id(0));
        let e2 = Entity::new(Id(42));

        // Then
        assert_eq!(e1.index(), 0);
        assert_eq!(e2.index(), 42);
    }
}
