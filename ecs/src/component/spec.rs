use fixedbitset::FixedBitSet;

use crate::{
    all_tuples,
    component::{Component, Id, Registry},
};

/// A specification for the components of an entity, archetype or query.
/// This is a sorted, deduplicated vector of component ids that can be used as a hash key
/// to identify unique component combinations.
///
/// Equality and hashing are order-independent: two specs built from the same ids in any
/// insertion order compare equal and hash identically.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Spec {
    ids: Vec<Id>,
}

impl Spec {
    /// An empty component specification.
    pub const EMPTY: Self = Spec { ids: Vec::new() };

    /// Construct a new Spec from the given component ids.
    #[inline]
    pub fn new(ids: impl Into<Vec<Id>>) -> Self {
        let mut ids = ids.into();
        // Normalize: sorted, deduplicated, trimmed.
        ids.sort();
        ids.dedup();
        ids.shrink_to_fit();

        Self { ids }
    }

    /// Get the component ids in this specification.
    #[inline]
    pub fn ids(&self) -> &[Id] {
        &self.ids
    }

    /// Determine if this specification contains the given component id.
    #[inline]
    pub fn contains(&self, id: Id) -> bool {
        // Binary search since the ids are sorted.
        self.ids.binary_search(&id).is_ok()
    }

    /// Determine if this specification contains all ids in the other specification.
    #[inline]
    pub fn contains_all(&self, other: &Spec) -> bool {
        other.ids.iter().all(|id| self.contains(*id))
    }

    /// Determine if this specification contains any ids in the other specification.
    #[inline]
    pub fn contains_any(&self, other: &Spec) -> bool {
        other.ids.iter().any(|id| self.contains(*id))
    }

    /// Create a new spec that is the union with the other spec.
    #[inline]
    pub fn union(&self, other: &Spec) -> Self {
        let mut ids = Vec::with_capacity(self.ids.len() + other.ids.len());
        ids.extend_from_slice(&self.ids);
        ids.extend_from_slice(&other.ids);
        Self::new(ids)
    }

    /// Get the ids in self that are not in other (set difference).
    #[inline]
    pub fn difference(&self, other: &Spec) -> Self {
        let ids: Vec<_> = self
            .ids
            .iter()
            .copied()
            .filter(|id| !other.contains(*id))
            .collect();
        Self { ids } // Already sorted
    }

    /// Get the ids in both self and other (set intersection).
    #[inline]
    pub fn intersection(&self, other: &Spec) -> Self {
        let ids: Vec<_> = self
            .ids
            .iter()
            .copied()
            .filter(|id| other.contains(*id))
            .collect();
        Self { ids } // Already sorted
    }

    /// Render this spec as a bitset over component id indices, used by the query manager
    /// for fast subset/disjointness matching.
    pub fn mask(&self) -> FixedBitSet {
        let nbits = self.ids.last().map_or(0, |id| id.index() + 1);
        let mut mask = FixedBitSet::with_capacity(nbits);
        for id in &self.ids {
            mask.insert(id.index());
        }
        mask
    }

    /// Returns true if this spec is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns the number of component ids in this spec.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

impl From<Vec<Id>> for Spec {
    #[inline]
    fn from(value: Vec<Id>) -> Self {
        Spec::new(value)
    }
}

/// Trait for converting a type into a component specification ([`Spec`]).
pub trait IntoSpec {
    /// Convert the type into a component specification using the given registry,
    /// registering any component types that are not yet known.
    fn into_spec(registry: &Registry) -> Spec;
}

/// [`IntoSpec`] implementation for the empty tuple.
impl IntoSpec for () {
    fn into_spec(_registry: &Registry) -> Spec {
        Spec::EMPTY
    }
}

/// [`IntoSpec`] implementation for single component types.
impl<C: Component> IntoSpec for C {
    fn into_spec(registry: &Registry) -> Spec {
        Spec::new([registry.register::<C>()])
    }
}

/// [`IntoSpec`] implementation for tuples of other [`IntoSpec`] types.
macro_rules! tuple_spec {
    ($($name: ident),*) => {
        impl<$($name: IntoSpec),*> IntoSpec for ($($name,)*) {
            fn into_spec(registry: &Registry) -> Spec {
                let mut ids = Vec::new();
                $(
                    ids.extend(<$name>::into_spec(registry).ids());
                )*
                Spec::new(ids)
            }
        }
    }
}

// Implement the tuple -> Spec conversion for all supported tuple arities.
all_tuples!(tuple_spec);
