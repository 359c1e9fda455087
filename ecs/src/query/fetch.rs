use crate::{
    all_tuples,
    component::{self, Component, Spec},
    storage::Chunk,
};

/// A statically-typed view of one entity's components, fetched straight from a chunk
/// row. Implemented for `&C`, `&mut C`, and tuples thereof.
///
/// The matching archetypes for a fetch are resolved through the query cache using
/// [`spec`](Fetch::spec); the fetch itself is a couple of pointer reads with no erasure
/// on the hot path.
///
/// # Aliasing
///
/// Requesting the same component type twice in one fetch (e.g. `(&Pos, &mut Pos)`) would
/// alias mutable storage. [`collect_ids`](Fetch::collect_ids) exposes the raw id list so
/// callers can reject such shapes before fetching; the world's iteration entry points
/// panic on them.
pub trait Fetch<'a>: Sized {
    /// Append the component ids this fetch accesses, duplicates included.
    fn collect_ids(registry: &component::Registry, ids: &mut Vec<component::Id>);

    /// The normalized component set this fetch requires, registering types on demand.
    fn spec(registry: &component::Registry) -> Spec {
        let mut ids = Vec::new();
        Self::collect_ids(registry, &mut ids);
        Spec::new(ids)
    }

    /// Read this fetch's data for one row of a chunk.
    ///
    /// # Safety
    /// The caller must ensure that:
    /// - The chunk belongs to an archetype matching this fetch's spec
    /// - `row < chunk.len()`
    /// - For mutable members, no other live reference overlaps this chunk row; the
    ///   world's iteration entry points guarantee this by holding `&mut World` and
    ///   visiting each chunk from exactly one worker
    unsafe fn fetch(chunk: &'a Chunk, row: usize) -> Self;
}

impl<'a, C: Component> Fetch<'a> for &'a C {
    fn collect_ids(registry: &component::Registry, ids: &mut Vec<component::Id>) {
        ids.push(registry.register::<C>());
    }

    unsafe fn fetch(chunk: &'a Chunk, row: usize) -> Self {
        let column = chunk
            .column_by_type::<C>()
            .expect("component in matched chunk");
        column.cell(row).as_ref::<C>()
    }
}

impl<'a, C: Component> Fetch<'a> for &'a mut C {
    fn collect_ids(registry: &component::Registry, ids: &mut Vec<component::Id>) {
        ids.push(registry.register::<C>());
    }

    unsafe fn fetch(chunk: &'a Chunk, row: usize) -> Self {
        let column = chunk
            .column_by_type::<C>()
            .expect("component in matched chunk");
        column.ensure_type::<C>();
        debug_assert!(row < column.len(), "row in matched chunk");
        // SAFETY: The caller guarantees exclusive access to this chunk row, so handing
        // out a mutable reference through the shared chunk borrow cannot alias.
        unsafe { &mut *column.ptr_at(row).as_ptr().cast::<C>() }
    }
}

/// Implement Fetch for tuples of fetches.
macro_rules! tuple_fetch {
    ($($name: ident),*) => {
        impl<'a, $($name: Fetch<'a>),*> Fetch<'a> for ($($name,)*) {
            fn collect_ids(registry: &component::Registry, ids: &mut Vec<component::Id>) {
                $(<$name as Fetch>::collect_ids(registry, ids);)*
            }

            unsafe fn fetch(chunk: &'a Chunk, row: usize) -> Self {
                // SAFETY: Forwarded caller contract.
                ($(unsafe { <$name as Fetch>::fetch(chunk, row) },)*)
            }
        }
    }
}

// Implement the tuple fetch for all supported tuple arities.
all_tuples!(tuple_fetch);
