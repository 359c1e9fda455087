use crate::{
    all_tuples,
    component::{self, Component, IntoSpec},
    storage::chunk::Chunk,
};

/// A trait describing component values to be applied to an entity's storage row.
/// The goal of this trait is to allow multiple shapes of value sets: a single component,
/// a tuple of components (nested tuples included), or the empty tuple.
pub trait Values: IntoSpec + Send + 'static {
    /// Apply the component values in this set to the given chunk row. This takes
    /// ownership of self.
    fn apply(self, chunk: &mut Chunk, row: usize);
}

/// Implement Values for single component types.
impl<C: Component> Values for C {
    fn apply(self, chunk: &mut Chunk, row: usize) {
        chunk.write_value::<C>(row, self);
    }
}

impl Values for () {
    fn apply(self, _chunk: &mut Chunk, _row: usize) {
        // No components to apply.
    }
}

/// Implement Values for tuples of component values.
macro_rules! tuple_values {
    ($($name: ident),*) => {
        impl<$($name: Values),*> Values for ($($name,)*) {

            /// Apply each component in the tuple to the chunk row.
            fn apply(self, chunk: &mut Chunk, row: usize) {
                #[allow(non_snake_case)]
                let ( $($name,)* ) = self;
                $(<$name as Values>::apply($name, chunk, row);)*
            }
        }
    }
}

// Implement the tuple Values for all supported tuple arities.
all_tuples!(tuple_values);

/// A type-erased, pre-resolved set of component values.
///
/// This is the deferred-command rendition of [`Values`]: the spec is captured eagerly
/// (registering the component types), the values are captured in a boxed apply closure.
/// The erasure is confined to this boundary; the direct spawn/add paths stay fully
/// statically typed.
pub struct BoxedValues {
    /// The component spec the values cover.
    spec: component::Spec,

    /// Writes the captured values into a chunk row.
    apply: Box<dyn FnOnce(&mut Chunk, usize) + Send>,
}

impl BoxedValues {
    /// Box a set of component values, resolving (and registering) its spec now.
    pub fn new<V: Values>(values: V, registry: &component::Registry) -> Self {
        Self {
            spec: V::into_spec(registry),
            apply: Box::new(move |chunk, row| values.apply(chunk, row)),
        }
    }

    /// The component spec these values cover.
    #[inline]
    pub fn spec(&self) -> &component::Spec {
        &self.spec
    }

    /// Apply the captured values to the given chunk row, consuming self.
    pub(crate) fn apply(self, chunk: &mut Chunk, row: usize) {
        (self.apply)(chunk, row);
    }
}

#[cfg(test)]
mod tests {
    use kestrel_macros::Component;

    use crate::{component::Registry, entity::Allocator};

    use super::*;

    #[derive(Component, Debug, PartialEq)]
    struct Component1 {
        value: u32,
    }

    #[derive(Component, Debug, PartialEq)]
    struct Component2 {
        value: u32,
    }

    #[derive(Component, Debug, PartialEq)]
    struct Component3 {
        value: u32,
    }

    fn chunk_for(registry: &Registry, spec: &component::Spec) -> Chunk {
        Chunk::new(&registry.info_for_spec(spec))
    }

    #[test]
    fn single_component_values() {
        // Given
        let registry = Registry::new();
        let spec = <Component1>::into_spec(&registry);
        let mut chunk = chunk_for(&registry, &spec);
        let allocator = Allocator::new();

        // When
        let row = chunk.begin_row(allocator.alloc());
        Component1 { value: 42 }.apply(&mut chunk, row);
        chunk.commit_row();

        // Then
        let column = chunk.column_by_type::<Component1>().unwrap();
        assert_eq!(column.get::<Component1>(0), Some(&Component1 { value: 42 }));
    }

    #[test]
    fn tuple_values_apply_all() {
        // Given
        let registry = Registry::new();
        let spec = <(Component1, Component2, Component3)>::into_spec(&registry);
        let mut chunk = chunk_for(&registry, &spec);
        let allocator = Allocator::new();

        // When - nested tuple shape
        let row = chunk.begin_row(allocator.alloc());
        (
            Component1 { value: 42 },
            (Component2 { value: 67 }, Component3 { value: 99 }),
        )
            .apply(&mut chunk, row);
        chunk.commit_row();

        // Then
        let column = chunk.column_by_type::<Component1>().unwrap();
        assert_eq!(column.get::<Component1>(0), Some(&Component1 { value: 42 }));
        let column = chunk.column_by_type::<Component2>().unwrap();
        assert_eq!(column.get::<Component2>(0), Some(&Component2 { value: 67 }));
        let column = chunk.column_by_type::<Component3>().unwrap();
        assert_eq!(column.get::<Component3>(0), Some(&Component3 { value: 99 }));
    }

    #[test]
    fn boxed_values_capture_spec_and_apply() {
        // Given
        let registry = Registry::new();
        let boxed = BoxedValues::new(
            (Component1 { value: 1 }, Component2 { value: 2 }),
            &registry,
        );

        // Then - the spec was resolved (and the types registered) eagerly
        assert_eq!(boxed.spec().len(), 2);
        assert!(registry.is_registered::<Component1>());
        assert!(registry.is_registered::<Component2>());

        // When
        let mut chunk = chunk_for(&registry, &boxed.spec().clone());
        let allocator = Allocator::new();
        let row = chunk.begin_row(allocator.alloc());
        boxed.apply(&mut chunk, row);
        chunk.commit_row();

        // Then
        let column = chunk.column_by_type::<Component2>().unwrap();
        assert_eq!(column.get::<Component2>(0), Some(&Component2 { value: 2 }));
    }
}
