use crate::{
    entity::{Entity, Generation},
    storage::location::Location,
};

/// A block-based index mapping live entities to their storage locations.
///
/// The id space is divided into fixed-size blocks, allocated only once an entity in that
/// range is tracked. Entity ids are allocated sequentially and recycled in batches, so
/// lookups stay O(1) with good locality and without hashing.
///
/// Each entry records the generation it was inserted with: a lookup with a stale handle
/// (same id, older generation) misses, which is how despawn-then-query races are detected
/// instead of returning another entity's data.
///
/// # Invariants
/// - Exactly one entry per tracked entity; despawned entities have their entry removed
/// - An entry's location always points at the slot currently holding the entity
#[derive(Debug)]
pub struct EntityIndex {
    /// The size of blocks to allocate when growing the index.
    block_size: usize,

    /// Sparse outer blocks; dense inner vectors.
    /// Outer Vec is indexed by `entity_index / block_size`.
    /// Inner Vec is indexed by `entity_index % block_size`.
    blocks: Vec<Option<Vec<Option<(Generation, Location)>>>>,

    /// Number of tracked entities.
    len: usize,
}

impl Default for EntityIndex {
    /// Custom default to ensure the default block size is used.
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl EntityIndex {
    /// Default block size balances memory usage and access speed for typical entity
    /// allocation patterns.
    pub const DEFAULT_BLOCK_SIZE: usize = 256;

    /// Create a new index with the default block size.
    #[inline]
    pub fn new() -> Self {
        Self::with_block_size(Self::DEFAULT_BLOCK_SIZE)
    }

    /// Create a new index with a custom block size.
    ///
    /// # Panics
    /// Debug builds panic if block_size is 0.
    #[inline]
    pub fn with_block_size(block_size: usize) -> Self {
        debug_assert!(block_size > 0, "block_size must be greater than 0");
        Self {
            block_size,
            blocks: Vec::new(),
            len: 0,
        }
    }

    /// Calculate block and within-block indices for an entity.
    #[inline]
    fn indices(&self, entity: Entity) -> (usize, usize) {
        let index = entity.index();
        (index / self.block_size, index % self.block_size)
    }

    /// Track an entity at the given location. Replaces any previous entry for the id.
    pub fn insert(&mut self, entity: Entity, location: Location) {
        let (block_index, within) = self.indices(entity);

        if block_index >= self.blocks.len() {
            self.blocks.resize_with(block_index + 1, || None);
        }
        let block = self.blocks[block_index]
            .get_or_insert_with(|| vec![None; self.block_size]);

        if block[within].replace((entity.generation(), location)).is_none() {
            self.len += 1;
        }
    }

    /// Get the location of a tracked entity.
    ///
    /// Returns `None` for untracked ids and for stale handles whose generation no longer
    /// matches the tracked one.
    pub fn get(&self, entity: Entity) -> Option<Location> {
        let (block_index, within) = self.indices(entity);
        let (generation, location) = self.blocks.get(block_index)?.as_ref()?[within]?;
        (generation == entity.generation()).then_some(location)
    }

    /// Update the location of an already-tracked entity. Equivalent to insert; named
    /// separately for the swap-removal call sites where the entry must already exist.
    #[inline]
    pub fn set(&mut self, entity: Entity, location: Location) {
        debug_assert!(self.get(entity).is_some(), "entity is not tracked");
        self.insert(entity, location);
    }

    /// Stop tracking an entity, returning its last location.
    ///
    /// Returns `None` (a no-op) for untracked ids and stale handles.
    pub fn remove(&mut self, entity: Entity) -> Option<Location> {
        let (block_index, within) = self.indices(entity);
        let slot = &mut self.blocks.get_mut(block_index)?.as_mut()?[within];
        match *slot {
            Some((generation, location)) if generation == entity.generation() => {
                *slot = None;
                self.len -= 1;
                Some(location)
            }
            _ => None,
        }
    }

    /// Check if the entity is tracked (with a matching generation).
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.get(entity).is_some()
    }

    /// Get the number of tracked entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no entities are tracked.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.len = 0;
    }
}
