use std::any::Any;

use crate::component;

/// A trait for world-level singleton values installed by plugins and host code.
///
/// Extensions are not attached to entities; at most one value of each type exists per
/// world. The `Send + Sync` bounds keep the world's data model uniformly thread-movable.
pub trait Extension: 'static + Send + Sync {}

/// Type-erased storage for world extensions.
///
/// Values are keyed by their registration id from the shared [`component::Registry`]
/// (extensions and components share one id space), stored in a dense vector. The `Any`
/// erasure is confined to this container; every public method is fully typed.
#[derive(Default)]
pub struct Extensions {
    /// Extension values, indexed by registration id.
    values: Vec<Option<Box<dyn Any + Send + Sync>>>,
}

impl Extensions {
    /// Creates a new, empty extension storage.
    #[inline]
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Insert an extension value, registering its type if needed. Replaces and drops any
    /// previous value of the same type.
    pub fn insert<E: Extension>(&mut self, registry: &component::Registry, value: E) {
        let index = registry.register_extension::<E>().index();
        if index >= self.values.len() {
            self.values.resize_with(index + 1, || None);
        }
        self.values[index] = Some(Box::new(value));
    }

    /// Returns a reference to an extension, if present.
    pub fn get<E: Extension>(&self, registry: &component::Registry) -> Option<&E> {
        let index = registry.get::<E>()?.index();
        self.values
            .get(index)?
            .as_ref()
            .and_then(|stored| stored.downcast_ref::<E>())
    }

    /// Returns a mutable reference to an extension, if present.
    pub fn get_mut<E: Extension>(&mut self, registry: &component::Registry) -> Option<&mut E> {
        let index = registry.get::<E>()?.index();
        self.values
            .get_mut(index)?
            .as_mut()
            .and_then(|stored| stored.downcast_mut::<E>())
    }

    /// Removes an extension, returning it if it existed.
    pub fn remove<E: Extension>(&mut self, registry: &component::Registry) -> Option<E> {
        let index = registry.get::<E>()?.index();
        self.values
            .get_mut(index)?
            .take()
            .and_then(|stored| (stored as Box<dyn Any>).downcast::<E>().ok())
            .map(|boxed| *boxed)
    }

    /// Returns `true` if an extension of type `E` is present.
    pub fn contains<E: Extension>(&self, registry: &component::Registry) -> bool {
        self.get::<E>(registry).is_some()
    }
}

#[cfg(test)]
mod tests {
    use crate::component::Registry;

    use super::*;

    struct Score(u32);
    impl Extension for Score {}

    struct Settings {
        volume: f32,
    }
    impl Extension for Settings {}

    #[test]
    fn insert_get_and_mutate() {
        // Given
        let registry = Registry::new();
        let mut extensions = Extensions::new();

        // When
        extensions.insert(&registry, Score(100));
        extensions.insert(&registry, Settings { volume: 0.5 });

        // Then
        assert_eq!(extensions.get::<Score>(&registry).unwrap().0, 100);
        assert!(extensions.contains::<Settings>(&registry));

        // When - mutate in place
        extensions.get_mut::<Score>(&registry).unwrap().0 += 50;

        // Then
        assert_eq!(extensions.get::<Score>(&registry).unwrap().0, 150);
    }

    #[test]
    fn insert_replaces_previous_value() {
        // Given
        let registry = Registry::new();
        let mut extensions = Extensions::new();
        extensions.insert(&registry, Score(1));

        // When
        extensions.insert(&registry, Score(2));

        // Then
        assert_eq!(extensions.get::<Score>(&registry).unwrap().0, 2);
    }

    #[test]
    fn remove_returns_the_value() {
        // Given
        let registry = Registry::new();
        let mut extensions = Extensions::new();
        extensions.insert(&registry, Score(7));

        // When
        let removed = extensions.remove::<Score>(&registry);

        // Then
        assert_eq!(removed.map(|score| score.0), Some(7));
        assert!(!extensions.contains::<Score>(&registry));
        assert!(extensions.remove::<Score>(&registry).is_none());
    }

    #[test]
    fn get_unknown_extension_is_none() {
        // Given
        let registry = Registry::new();
        let extensions = Extensions::new();

        // Then - probing an unregistered extension type is a normal miss
        assert!(extensions.get::<Score>(&registry).is_none());
        assert!(!extensions.contains::<Score>(&registry));
    }
}
