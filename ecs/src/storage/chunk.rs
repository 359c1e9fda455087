use std::{alloc::Layout, any::TypeId, collections::HashMap};

use crate::{
    component::{self, Component},
    entity::Entity,
    storage::column::Column,
};

/// Number of entity rows a single chunk holds. Archetypes grow by whole chunks, so this
/// is also the unit of work handed to parallel iteration.
pub const CHUNK_CAPACITY: usize = 128;

/// A fixed-capacity block of columnar storage: an entity column plus one [`Column`] per
/// component of the owning archetype, all sharing the same row count.
///
/// Chunks never grow. When an archetype's tail chunk fills up it acquires another from
/// the [`ChunkPool`]; when swap-removal empties the tail chunk it is released back.
///
/// # Invariants
/// - `entities.len()` equals every column's `len()`, except transiently between
///   `begin_row` and `commit_row` while a new row's values are being written
/// - Rows `[0..len)` of every column are initialized
pub struct Chunk {
    /// The entities stored in this chunk (one per row).
    entities: Vec<Entity>,

    /// The component columns. Each column stores all instances of one component type.
    columns: Vec<Column>,
}

impl Chunk {
    /// Create a new empty chunk with one column per component info.
    pub fn new(infos: &[component::Info]) -> Self {
        Self {
            entities: Vec::with_capacity(CHUNK_CAPACITY),
            columns: infos
                .iter()
                .map(|info| Column::with_capacity(*info, CHUNK_CAPACITY))
                .collect(),
        }
    }

    /// The shape of a chunk built for the given infos: the ordered column layouts. Chunks
    /// of equal shape are interchangeable allocations, which is what the pool keys on.
    pub fn shape_of(infos: &[component::Info]) -> Vec<Layout> {
        infos.iter().map(|info| info.layout()).collect()
    }

    /// The shape of this chunk.
    pub fn shape(&self) -> Vec<Layout> {
        self.columns.iter().map(|col| col.info().layout()).collect()
    }

    /// Get the number of entities (rows) in the chunk.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the chunk has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Check if the chunk has no free rows left.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.entities.len() == CHUNK_CAPACITY
    }

    /// Get the entity stored at a specific row.
    ///
    /// # Panics
    /// Panics if the row is out of bounds.
    #[inline]
    pub fn entity(&self, row: usize) -> Entity {
        self.entities[row]
    }

    /// Get the entities stored in this chunk.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Get the columns of this chunk.
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Get the columns of this chunk, mutably.
    #[inline]
    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    /// Get a reference to the column for a component id, if present.
    #[inline]
    pub fn column(&self, id: component::Id) -> Option<&Column> {
        self.columns.iter().find(|col| col.info().id() == id)
    }

    /// Get a mutable reference to the column for a component id, if present.
    #[inline]
    pub fn column_mut(&mut self, id: component::Id) -> Option<&mut Column> {
        self.columns.iter_mut().find(|col| col.info().id() == id)
    }

    /// Get a reference to the column storing component type `C`, if present.
    #[inline]
    pub fn column_by_type<C: Component>(&self) -> Option<&Column> {
        self.columns
            .iter()
            .find(|col| col.info().type_id() == TypeId::of::<C>())
    }

    /// Get a mutable reference to the column storing component type `C`, if present.
    #[inline]
    pub fn column_by_type_mut<C: Component>(&mut self) -> Option<&mut Column> {
        self.columns
            .iter_mut()
            .find(|col| col.info().type_id() == TypeId::of::<C>())
    }

    /// Reserve the next row for an entity and return its row index. Column values for the
    /// row must be written before [`commit_row`](Self::commit_row) is called.
    ///
    /// # Panics
    /// Panics if the chunk is full.
    pub(crate) fn begin_row(&mut self, entity: Entity) -> usize {
        assert!(!self.is_full(), "chunk is full");
        let row = self.entities.len();
        self.entities.push(entity);
        row
    }

    /// Mark the row reserved by [`begin_row`](Self::begin_row) as initialized in every
    /// column.
    ///
    /// # Safety contract
    /// The caller must have written a value into every column for the reserved row; the
    /// spawn and migration paths guarantee this because the applied value set is derived
    /// from the same spec the archetype was created for.
    pub(crate) fn commit_row(&mut self) {
        let len = self.entities.len();
        for column in self.columns.iter_mut() {
            // SAFETY: The caller wrote all column values for the reserved row.
            unsafe { column.set_len(len) };
        }
    }

    /// Write a component value into the appropriate column at the given row.
    ///
    /// # Panics
    /// Panics if the chunk has no column for `C`.
    ///
    /// # Safety contract
    /// The row must be reserved (by `begin_row`) or already cleared of its previous
    /// value; this is upheld by the spawn/migration paths that call it.
    pub fn write_value<C: Component>(&mut self, row: usize, value: C) {
        let column = self
            .column_by_type_mut::<C>()
            .expect("component not in chunk");
        // SAFETY: The row was reserved by begin_row (within capacity) and holds no live
        // value per the caller contract.
        unsafe {
            column.write(row, value);
        }
    }

    /// Drop every column value at the given row in place. The row becomes uninitialized;
    /// callers must immediately refill it or shrink the chunk.
    pub(crate) fn drop_row(&mut self, row: usize) {
        for column in self.columns.iter_mut() {
            // SAFETY: Rows below len are initialized; the caller restores the invariant.
            unsafe {
                column.drop_at(row);
            }
        }
    }

    /// Move the last row of this chunk into the given (already dropped) row and shrink by
    /// one. Returns the moved entity, or `None` if the target row was the last.
    pub(crate) fn relocate_last_into(&mut self, row: usize) -> Option<Entity> {
        let last = self.entities.len() - 1;
        if row == last {
            self.entities.pop();
            for column in self.columns.iter_mut() {
                // SAFETY: The dropped tail row is excluded from the new length.
                unsafe { column.set_len(last) };
            }
            return None;
        }

        for column in self.columns.iter_mut() {
            // SAFETY: `last` holds a live value, `row` was dropped by the caller; the
            // move leaves `last` uninitialized, excluded by the shrink below.
            unsafe {
                column.move_row(last, row);
                column.set_len(last);
            }
        }
        let moved = self.entities[last];
        self.entities[row] = moved;
        self.entities.pop();
        Some(moved)
    }

    /// Adopt the last row of another chunk into the given (already dropped) row of this
    /// one, shrinking the source chunk by one. Returns the moved entity.
    ///
    /// Used when swap-removal crosses a chunk boundary: the hole is in this chunk, the
    /// archetype's last entity lives in the source chunk.
    pub(crate) fn adopt_last_from(&mut self, row: usize, src: &mut Chunk) -> Entity {
        let src_last = src.entities.len() - 1;
        for (dst_col, src_col) in self.columns.iter_mut().zip(src.columns.iter_mut()) {
            // SAFETY: The source row is live and its bytes are moved exactly once; the
            // destination row was dropped by the caller. The source length shrinks so
            // the moved-out row is never touched again.
            unsafe {
                let bytes = src_col.read_bytes(src_last);
                dst_col.write_bytes(row, bytes);
                src_col.set_len(src_last);
            }
        }
        let moved = src.entities.pop().expect("source chunk has a row to adopt");
        self.entities[row] = moved;
        moved
    }

    /// Drop all rows, leaving the chunk empty but with its allocation intact.
    pub(crate) fn clear_rows(&mut self) {
        for column in self.columns.iter_mut() {
            column.clear();
        }
        self.entities.clear();
    }

    /// Rebind an empty chunk's columns to a new component set of identical shape.
    ///
    /// # Panics
    /// Panics if the chunk is non-empty or the shapes differ.
    pub(crate) fn rebind(&mut self, infos: &[component::Info]) {
        assert!(self.is_empty(), "cannot rebind a non-empty chunk");
        assert_eq!(self.columns.len(), infos.len(), "column count mismatch");
        for (column, info) in self.columns.iter_mut().zip(infos.iter()) {
            column.rebind(*info);
        }
    }
}

/// A pool of recycled chunks keyed by shape.
///
/// Destroying archetypes (via `clear`) releases their chunks here instead of freeing
/// them, so recreating archetypes with the same column layout reuses the allocations.
/// The pool never bounds allocation: a miss simply allocates a fresh chunk.
#[derive(Default)]
pub struct ChunkPool {
    /// Free chunks grouped by their column layout shape.
    free: HashMap<Vec<Layout>, Vec<Chunk>>,
}

impl ChunkPool {
    /// Create a new empty pool.
    pub fn new() -> Self {
        Self {
            free: HashMap::new(),
        }
    }

    /// Acquire a chunk for the given component infos, reusing a pooled chunk of the same
    /// shape when one is available.
    pub fn acquire(&mut self, infos: &[component::Info]) -> Chunk {
        let key = Chunk::shape_of(infos);
        if let Some(mut chunk) = self.free.get_mut(&key).and_then(|chunks| chunks.pop()) {
            chunk.rebind(infos);
            return chunk;
        }
        Chunk::new(infos)
    }

    /// Return a chunk to the pool. Any remaining rows are dropped first.
    pub fn release(&mut self, mut chunk: Chunk) {
        chunk.clear_rows();
        self.free.entry(chunk.shape()).or_default().push(chunk);
    }

    /// Get the number of chunks currently held by the pool.
    pub fn pooled(&self) -> usize {
        self.free.values().map(|chunks| chunks.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use kestrel_macros::Component;

    use crate::{component::Registry, entity::Allocator};

    use super::*;

    #[derive(Component, Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Component, Debug, PartialEq)]
    struct Health(i32);

    #[derive(Component, Debug)]
    struct Marker;

    fn infos_for(registry: &Registry, spec: &crate::component::Spec) -> Vec<component::Info> {
        registry.info_for_spec(spec)
    }

    #[test]
    fn chunk_add_and_read_rows() {
        // Given
        let registry = Registry::new();
        let spec = registry.spec::<(Position, Health)>();
        let mut chunk = Chunk::new(&infos_for(&registry, &spec));
        let allocator = Allocator::new();

        // When
        let e1 = allocator.alloc();
        let row = chunk.begin_row(e1);
        chunk.write_value(row, Position { x: 1.0, y: 2.0 });
        chunk.write_value(row, Health(100));
        chunk.commit_row();

        // Then
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk.entity(0), e1);
        let column = chunk.column_by_type::<Position>().unwrap();
        assert_eq!(column.get::<Position>(0), Some(&Position { x: 1.0, y: 2.0 }));
        let column = chunk.column_by_type::<Health>().unwrap();
        assert_eq!(column.get::<Health>(0), Some(&Health(100)));
    }

    #[test]
    fn chunk_fills_to_capacity() {
        // Given
        let registry = Registry::new();
        let spec = registry.spec::<Health>();
        let mut chunk = Chunk::new(&infos_for(&registry, &spec));
        let allocator = Allocator::new();

        // When
        for i in 0..CHUNK_CAPACITY {
            let row = chunk.begin_row(allocator.alloc());
            chunk.write_value(row, Health(i as i32));
            chunk.commit_row();
        }

        // Then
        assert!(chunk.is_full());
        assert_eq!(chunk.len(), CHUNK_CAPACITY);
        let column = chunk.column_by_type::<Health>().unwrap();
        assert_eq!(column.get::<Health>(77), Some(&Health(77)));
    }

    #[test]
    fn chunk_relocate_last_into_hole() {
        // Given
        let registry = Registry::new();
        let spec = registry.spec::<Health>();
        let mut chunk = Chunk::new(&infos_for(&registry, &spec));
        let allocator = Allocator::new();

        let entities: Vec<_> = (0..3)
            .map(|i| {
                let e = allocator.alloc();
                let row = chunk.begin_row(e);
                chunk.write_value(row, Health(i * 100));
                chunk.commit_row();
                e
            })
            .collect();

        // When - remove the middle row
        chunk.drop_row(1);
        let moved = chunk.relocate_last_into(1);

        // Then - the last entity filled the hole
        assert_eq!(moved, Some(entities[2]));
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.entity(1), entities[2]);
        let column = chunk.column_by_type::<Health>().unwrap();
        assert_eq!(column.get::<Health>(0), Some(&Health(0)));
        assert_eq!(column.get::<Health>(1), Some(&Health(200)));

        // When - remove the (new) last row
        chunk.drop_row(1);
        let moved = chunk.relocate_last_into(1);

        // Then - nothing was moved
        assert_eq!(moved, None);
        assert_eq!(chunk.len(), 1);
    }

    #[test]
    fn chunk_adopt_last_from_other_chunk() {
        // Given - two chunks of the same archetype shape
        let registry = Registry::new();
        let spec = registry.spec::<Health>();
        let infos = infos_for(&registry, &spec);
        let mut first = Chunk::new(&infos);
        let mut second = Chunk::new(&infos);
        let allocator = Allocator::new();

        let e1 = allocator.alloc();
        let row = first.begin_row(e1);
        first.write_value(row, Health(1));
        first.commit_row();

        let e2 = allocator.alloc();
        let row = second.begin_row(e2);
        second.write_value(row, Health(2));
        second.commit_row();

        // When - remove first's only row, adopting second's last
        first.drop_row(0);
        let moved = first.adopt_last_from(0, &mut second);

        // Then
        assert_eq!(moved, e2);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(first.entity(0), e2);
        let column = first.column_by_type::<Health>().unwrap();
        assert_eq!(column.get::<Health>(0), Some(&Health(2)));
    }

    #[test]
    fn chunk_drops_rows_on_clear() {
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
        let spec = registry.spec::<DropTracker>();
        let mut chunk = Chunk::new(&infos_for(&registry, &spec));
        let allocator = Allocator::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let row = chunk.begin_row(allocator.alloc());
            chunk.write_value(row, DropTracker(counter.clone()));
            chunk.commit_row();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        // When
        chunk.clear_rows();

        // Then
        assert!(chunk.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn pool_reuses_chunks_of_same_shape() {
        // Given
        let registry = Registry::new();
        let spec = registry.spec::<(Position, Health)>();
        let infos = infos_for(&registry, &spec);
        let mut pool = ChunkPool::new();

        let chunk = pool.acquire(&infos);
        assert_eq!(pool.pooled(), 0);

        // When - release and re-acquire the same shape
        pool.release(chunk);
        assert_eq!(pool.pooled(), 1);
        let _reused = pool.acquire(&infos);

        // Then - served from the pool, not freshly allocated
        assert_eq!(pool.pooled(), 0);
    }

    #[test]
    fn pool_does_not_cross_shapes() {
        // Given
        let registry = Registry::new();
        let pos_infos = infos_for(&registry, &registry.spec::<Position>());
        let health_infos = infos_for(&registry, &registry.spec::<Health>());
        let mut pool = ChunkPool::new();

        pool.release(Chunk::new(&pos_infos));

        // When - acquire a different shape
        let _chunk = pool.acquire(&health_infos);

        // Then - the pooled Position chunk was not consumed
        assert_eq!(pool.pooled(), 1);
    }

    #[test]
    fn pool_rebinds_to_layout_compatible_types() {
        // Given - distinct types with identical layouts
        #[derive(Component, Debug, PartialEq)]
        struct Mana(i32);

        let registry = Registry::new();
        let health_infos = infos_for(&registry, &registry.spec::<Health>());
        let mana_infos = infos_for(&registry, &registry.spec::<Mana>());
        let mut pool = ChunkPool::new();

        pool.release(Chunk::new(&health_infos));

        // When - the shape matches, so the chunk is reused for the other type
        let mut chunk = pool.acquire(&mana_infos);

        // Then
        assert_eq!(pool.pooled(), 0);
        let allocator = Allocator::new();
        let row = chunk.begin_row(allocator.alloc());
        chunk.write_value(row, Mana(5));
        chunk.commit_row();
        let column = chunk.column_by_type::<Mana>().unwrap();
        assert_eq!(column.get::<Mana>(0), Some(&Mana(5)));
    }

    #[test]
    fn tag_columns_occupy_no_storage() {
        // Given
        let registry = Registry::new();
        let spec = registry.spec::<(Health, Marker)>();
        let mut chunk = Chunk::new(&infos_for(&registry, &spec));
        let allocator = Allocator::new();

        // When
        let row = chunk.begin_row(allocator.alloc());
        chunk.write_value(row, Health(1));
        chunk.write_value(row, Marker);
        chunk.commit_row();

        // Then - the marker column exists for membership but is zero-sized
        let marker_column = chunk.column_by_type::<Marker>().unwrap();
        assert!(marker_column.info().is_tag());
        assert_eq!(marker_column.len(), 1);
    }
}
