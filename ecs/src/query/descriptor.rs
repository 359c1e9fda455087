use crate::component::{self, IntoSpec, Spec};

/// The normalized shape of a query: the component set an archetype must contain
/// (`with`) and the set it must not (`without`).
///
/// Descriptors are order-independent values: both sets are normalized [`Spec`]s, so two
/// descriptors built from the same component types in any order are equal, hash
/// identically, and share a cache entry in the [`Manager`](super::Manager).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Descriptor {
    /// Components an archetype must contain to match.
    with: Spec,

    /// Components an archetype must not contain to match.
    without: Spec,
}

impl Descriptor {
    /// Construct a descriptor from already-normalized specs.
    #[inline]
    pub fn new(with: Spec, without: Spec) -> Self {
        Self { with, without }
    }

    /// Construct a descriptor requiring the component types in `S`, excluding nothing.
    #[inline]
    pub fn with_types<S: IntoSpec>(registry: &component::Registry) -> Self {
        Self::new(S::into_spec(registry), Spec::EMPTY)
    }

    /// Add the component types in `S` as exclusions, consuming self.
    #[inline]
    pub fn without_types<S: IntoSpec>(self, registry: &component::Registry) -> Self {
        Self::new(self.with, self.without.union(&S::into_spec(registry)))
    }

    /// Derive a descriptor from a richer access description: reads, writes and explicit
    /// with-filters all become requirements; the exclusions carry over.
    pub fn from_description(description: &Description) -> Self {
        Self::new(
            description
                .reads
                .union(&description.writes)
                .union(&description.with),
            description.without.clone(),
        )
    }

    /// The required component set.
    #[inline]
    pub fn with(&self) -> &Spec {
        &self.with
    }

    /// The excluded component set.
    #[inline]
    pub fn without(&self) -> &Spec {
        &self.without
    }

    /// Determine whether an archetype's component set matches this descriptor: it must
    /// be a superset of `with` and disjoint from `without`.
    pub fn matches(&self, spec: &Spec) -> bool {
        spec.contains_all(&self.with) && !spec.contains_any(&self.without)
    }
}

/// A richer query description separating read access, write access, presence filters
/// and exclusions. Collapses into a [`Descriptor`] for caching: reads, writes and
/// with-filters are all just "required" as far as archetype matching is concerned.
#[derive(Debug, Default, Clone)]
pub struct Description {
    /// Components the query reads.
    pub reads: Spec,

    /// Components the query writes.
    pub writes: Spec,

    /// Components that must be present but are not accessed.
    pub with: Spec,

    /// Components that must be absent.
    pub without: Spec,
}

impl Description {
    /// Create an empty description.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add component types the query reads.
    pub fn reads<S: IntoSpec>(mut self, registry: &component::Registry) -> Self {
        self.reads = self.reads.union(&S::into_spec(registry));
        self
    }

    /// Add component types the query writes.
    pub fn writes<S: IntoSpec>(mut self, registry: &component::Registry) -> Self {
        self.writes = self.writes.union(&S::into_spec(registry));
        self
    }

    /// Add component types that must be present.
    pub fn with<S: IntoSpec>(mut self, registry: &component::Registry) -> Self {
        self.with = self.with.union(&S::into_spec(registry));
        self
    }

    /// Add component types that must be absent.
    pub fn without<S: IntoSpec>(mut self, registry: &component::Registry) -> Self {
        self.without = self.without.union(&S::into_spec(registry));
        self
    }
}

#[cfg(test)]
mod tests {
    use kestrel_macros::Component;
    use std::hash::{DefaultHasher, Hash, Hasher};

    use crate::component::Registry;

    use super::*;

    #[derive(Component)]
    struct Comp1;
    #[derive(Component)]
    struct Comp2;
    #[derive(Component)]
    struct Comp3;

    #[test]
    fn descriptors_are_order_independent() {
        // Given
        let registry = Registry::new();
        let id1 = registry.register::<Comp1>();
        let id2 = registry.register::<Comp2>();
        let id3 = registry.register::<Comp3>();

        // When - same sets, different insertion orders
        let d1 = Descriptor::new(Spec::new(vec![id2, id1]), Spec::new(vec![id3]));
        let d2 = Descriptor::new(Spec::new(vec![id1, id2]), Spec::new(vec![id3]));

        // Then - equal and hash-identical (they share a cache entry)
        assert_eq!(d1, d2);
        let mut h1 = DefaultHasher::new();
        d1.hash(&mut h1);
        let mut h2 = DefaultHasher::new();
        d2.hash(&mut h2);
        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn matches_requires_superset_and_disjoint() {
        // Given
        let registry = Registry::new();
        let id1 = registry.register::<Comp1>();
        let id2 = registry.register::<Comp2>();
        let id3 = registry.register::<Comp3>();

        let descriptor = Descriptor::new(Spec::new(vec![id1]), Spec::new(vec![id3]));

        // Then
        assert!(descriptor.matches(&Spec::new(vec![id1])));
        assert!(descriptor.matches(&Spec::new(vec![id1, id2])));
        assert!(!descriptor.matches(&Spec::new(vec![id2])));
        assert!(!descriptor.matches(&Spec::new(vec![id1, id3])));
    }

    #[test]
    fn empty_with_matches_everything_not_excluded() {
        // Given
        let registry = Registry::new();
        let id1 = registry.register::<Comp1>();
        let id2 = registry.register::<Comp2>();

        let descriptor = Descriptor::new(Spec::EMPTY, Spec::new(vec![id2]));

        // Then
        assert!(descriptor.matches(&Spec::EMPTY));
        assert!(descriptor.matches(&Spec::new(vec![id1])));
        assert!(!descriptor.matches(&Spec::new(vec![id1, id2])));
    }

    #[test]
    fn typed_builders() {
        // Given
        let registry = Registry::new();

        // When
        let descriptor =
            Descriptor::with_types::<(Comp1, Comp2)>(&registry).without_types::<Comp3>(&registry);

        // Then
        assert_eq!(descriptor.with().len(), 2);
        assert_eq!(descriptor.without().len(), 1);
        assert!(descriptor.with().contains(registry.get::<Comp1>().unwrap()));
        assert!(descriptor.without().contains(registry.get::<Comp3>().unwrap()));
    }

    #[test]
    fn from_description_merges_access_sets() {
        // Given
        let registry = Registry::new();
        let description = Description::new()
            .reads::<Comp1>(&registry)
            .writes::<Comp2>(&registry)
            .with::<Comp1>(&registry)
            .without::<Comp3>(&registry);

        // When
        let descriptor = Descriptor::from_description(&description);

        // Then - reads + writes + with merged (deduplicated) into the required set
        assert_eq!(descriptor.with().len(), 2);
        assert!(descriptor.with().contains(registry.get::<Comp1>().unwrap()));
        assert!(descriptor.with().contains(registry.get::<Comp2>().unwrap()));
        assert_eq!(descriptor.without().len(), 1);

        // And it equals the directly-built descriptor, sharing its cache identity
        let direct =
            Descriptor::with_types::<(Comp1, Comp2)>(&registry).without_types::<Comp3>(&registry);
        assert_eq!(descriptor, direct);
    }
}
