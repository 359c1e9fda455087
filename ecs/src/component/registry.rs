use std::{
    any::TypeId,
    sync::RwLock,
    sync::atomic::{AtomicU32, Ordering},
};

use dashmap::DashMap;

use crate::component::{Component, Id, Info, IntoSpec, Kind, Spec};

/// A thread-safe component registry. This is responsible for handing out ids and metadata
/// for component and extension types within a single world.
///
/// The registry uses lock-free reads for TypeId-to-Id lookups via `DashMap`, making the
/// common read path highly performant. Registration uses minimal locking - only a single
/// shard of the DashMap and a write lock for the info vector.
///
/// Registries are fully independent across worlds: the same type registered in two worlds
/// gets id 0 in each. There is no shared global state.
pub struct Registry {
    /// Map from TypeId to component Id. Lock-free reads via sharded concurrent hashmap.
    type_map: DashMap<TypeId, Id>,

    /// List of registered infos in id order. Protected by RwLock for rare writes.
    infos: RwLock<Vec<Option<Info>>>,

    /// Next available identifier.
    next_id: AtomicU32,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a new empty registry.
    #[inline]
    pub fn new() -> Self {
        Self {
            type_map: DashMap::new(),
            infos: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(0),
        }
    }

    /// Register a component type and get its unique identifier.
    ///
    /// This method is thread-safe and can be called concurrently. If the type is already
    /// registered as a component, returns the existing id; registration never fails for a
    /// consistent kind.
    ///
    /// # Panics
    /// Panics if the type was previously registered as an extension.
    pub fn register<C: Component>(&self) -> Id {
        self.register_as::<C>(Kind::Component)
    }

    /// Register an extension (world singleton) type and get its unique identifier.
    ///
    /// If the type is already registered as an extension, returns the existing id.
    ///
    /// # Panics
    /// Panics if the type was previously registered as a component.
    pub fn register_extension<T: 'static>(&self) -> Id {
        self.register_as::<T>(Kind::Extension)
    }

    /// Internal registration logic shared by both kinds.
    fn register_as<T: 'static>(&self, kind: Kind) -> Id {
        let type_id = TypeId::of::<T>();

        // Fast path: check if already registered (lock-free read)
        if let Some(existing) = self.type_map.get(&type_id) {
            let id = *existing;
            self.ensure_kind::<T>(id, kind);
            return id;
        }

        // Slow path: need to register.
        // Use the entry API to avoid the race where two threads both miss the fast path.
        match self.type_map.entry(type_id) {
            dashmap::Entry::Occupied(occupied) => {
                // Another thread registered it first - verify the kind matches
                let id = *occupied.get();
                self.ensure_kind::<T>(id, kind);
                id
            }
            dashmap::Entry::Vacant(vacant) => {
                // Generate a new unique identifier
                let id_value = self.next_id.fetch_add(1, Ordering::Relaxed);
                let id = Id::new(id_value);

                // Add the entry to the info list
                let mut infos = self.infos.write().unwrap();
                let index = id_value as usize;

                // Expand if necessary
                if index >= infos.len() {
                    infos.resize(index + 1, None);
                }

                infos[index] = Some(Info::new::<T>(id, kind));
                vacant.insert(id);

                id
            }
        }
    }

    /// Verify that an already-registered type was registered as the expected kind.
    fn ensure_kind<T: 'static>(&self, id: Id, kind: Kind) {
        let infos = self.infos.read().unwrap();
        if let Some(Some(info)) = infos.get(id.index())
            && info.kind() != kind
        {
            panic!(
                "type '{}' is already registered as a {}, cannot register as {}",
                std::any::type_name::<T>(),
                info.kind(),
                kind
            )
        }
    }

    /// Get the id for a component type `C`, if registered.
    ///
    /// Probing an unregistered type is a normal state, not an error.
    #[inline]
    pub fn get<C: 'static>(&self) -> Option<Id> {
        let type_id = TypeId::of::<C>();
        self.type_map.get(&type_id).map(|entry| *entry.value())
    }

    /// Determine if the type `C` has been registered.
    #[inline]
    pub fn is_registered<C: 'static>(&self) -> bool {
        self.get::<C>().is_some()
    }

    /// Get the info for a type `C`, if registered.
    #[inline]
    pub fn get_info<C: 'static>(&self) -> Option<Info> {
        let id = self.get::<C>()?;
        self.get_info_by_id(id)
    }

    /// Get info by id.
    ///
    /// Performance:
    /// - Uses a read lock to access the info vector.
    #[inline]
    pub fn get_info_by_id(&self, id: Id) -> Option<Info> {
        let infos = self.infos.read().unwrap();
        infos.get(id.index()).and_then(|i| *i)
    }

    /// Get all registered infos in registration (id) order.
    pub fn all(&self) -> Vec<Info> {
        let infos = self.infos.read().unwrap();
        infos.iter().filter_map(|i| *i).collect()
    }

    /// Get the infos for every id in a spec, in spec (id) order.
    ///
    /// # Panics
    /// Panics if the spec contains an id that was never handed out by this registry. Specs
    /// are always built from registered ids, so this indicates a cross-world mixup.
    pub fn info_for_spec(&self, spec: &Spec) -> Vec<Info> {
        spec.ids()
            .iter()
            .map(|id| {
                self.get_info_by_id(*id)
                    .expect("spec ids come from this registry")
            })
            .collect()
    }

    /// Get a component specification for a generic type `S` which implements [`IntoSpec`].
    #[inline]
    pub fn spec<S: IntoSpec>(&self) -> Spec {
        S::into_spec(self)
    }

    /// Get the number of registered types.
    #[inline]
    pub fn len(&self) -> usize {
        self.next_id.load(Ordering::Relaxed) as usize
    }

    /// Check if the registry is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_macros::Component;
    use std::sync::Arc;
    use std::thread;

    #[derive(Component, Debug)]
    #[allow(dead_code)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Component, Debug)]
    #[allow(dead_code)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Component, Debug)]
    struct Marker;

    struct Settings {
        #[allow(dead_code)]
        volume: f32,
    }

    #[test]
    fn component_registration() {
        // Given
        let registry = Registry::new();

        // When
        let pos_id = registry.register::<Position>();
        let vel_id = registry.register::<Velocity>();

        // Then - sequential ids in registration order
        assert_eq!(pos_id, Id::new(0));
        assert_eq!(vel_id, Id::new(1));
        assert!(pos_id < vel_id);

        // Then - registering the same type again returns the same id
        assert_eq!(registry.register::<Position>(), pos_id);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn registration_is_idempotent() {
        // Given
        let registry = Registry::new();

        // When
        let first = registry.register::<Position>();
        let second = registry.register::<Position>();

        // Then - same id, same metadata
        assert_eq!(first, second);
        let info1 = registry.get_info_by_id(first).unwrap();
        let info2 = registry.get_info_by_id(second).unwrap();
        assert_eq!(info1.id(), info2.id());
        assert_eq!(info1.type_id(), info2.type_id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn id_retrieval() {
        // Given
        let registry = Registry::new();
        let pos_id = registry.register::<Position>();

        // When
        let retrieved = registry.get::<Position>().unwrap();

        // Then
        assert_eq!(pos_id, retrieved);
        assert!(registry.is_registered::<Position>());

        // When - probing a non-registered type
        let missing = registry.get::<Velocity>();

        // Then - None, no panic
        assert!(missing.is_none());
        assert!(!registry.is_registered::<Velocity>());
    }

    #[test]
    fn info_retrieval() {
        // Given
        let registry = Registry::new();
        let pos_id = registry.register::<Position>();

        // When
        let info = registry.get_info::<Position>().unwrap();

        // Then
        assert_eq!(info.id(), pos_id);
        assert_eq!(info.kind(), Kind::Component);
        assert!(info.layout().size() > 0);
        assert!(!info.is_tag());
        assert!(info.type_name().contains("Position"));

        // When - probing a non-registered type
        assert!(registry.get_info::<Velocity>().is_none());
    }

    #[test]
    fn zero_sized_components_are_tags() {
        // Given
        let registry = Registry::new();

        // When
        let id = registry.register::<Marker>();

        // Then
        let info = registry.get_info_by_id(id).unwrap();
        assert_eq!(info.layout().size(), 0);
        assert!(info.is_tag());
    }

    #[test]
    fn all_returns_infos_in_registration_order() {
        // Given
        let registry = Registry::new();
        registry.register::<Velocity>();
        registry.register::<Position>();
        registry.register::<Marker>();

        // When
        let all = registry.all();

        // Then
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id(), Id::new(0));
        assert!(all[0].type_name().contains("Velocity"));
        assert_eq!(all[1].id(), Id::new(1));
        assert!(all[1].type_name().contains("Position"));
        assert_eq!(all[2].id(), Id::new(2));
    }

    #[test]
    fn registries_are_independent() {
        // Given - two registries standing in for two isolated worlds
        let registry1 = Registry::new();
        let registry2 = Registry::new();

        // When - register in different orders
        let r1_pos = registry1.register::<Position>();
        let r1_vel = registry1.register::<Velocity>();

        let r2_vel = registry2.register::<Velocity>();
        let r2_pos = registry2.register::<Position>();

        // Then - each id space starts at 0 independently
        assert_eq!(r1_pos, Id::new(0));
        assert_eq!(r1_vel, Id::new(1));
        assert_eq!(r2_vel, Id::new(0));
        assert_eq!(r2_pos, Id::new(1));
    }

    #[test]
    fn extension_registration() {
        // Given
        let registry = Registry::new();

        // When
        let id = registry.register_extension::<Settings>();

        // Then
        let info = registry.get_info_by_id(id).unwrap();
        assert_eq!(info.kind(), Kind::Extension);
        assert_eq!(registry.register_extension::<Settings>(), id);
    }

    #[test]
    #[should_panic(expected = "already registered as a component, cannot register as extension")]
    fn component_then_extension_panics() {
        // Given
        let registry = Registry::new();
        // When
        registry.register::<Position>();
        registry.register_extension::<Position>();
    }

    #[test]
    fn concurrent_registration() {
        // Given
        let registry = Arc::new(Registry::new());

        // When - multiple threads register components concurrently
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    if i % 2 == 0 {
                        registry.register::<Position>()
                    } else {
                        registry.register::<Velocity>()
                    }
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Then - all threads registering the same type got the same id
        let pos_ids: Vec<_> = results.iter().step_by(2).copied().collect();
        let vel_ids: Vec<_> = results.iter().skip(1).step_by(2).copied().collect();

        assert!(pos_ids.iter().all(|&id| id == pos_ids[0]));
        assert!(vel_ids.iter().all(|&id| id == vel_ids[0]));
        assert_ne!(pos_ids[0], vel_ids[0]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_read_after_write() {
        // Given
        let registry = Arc::new(Registry::new());
        let id = registry.register::<Position>();

        // When - multiple threads read concurrently
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.get::<Position>())
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Then - all reads return the same id
        assert!(results.iter().all(|&r| r == Some(id)));
    }
}
