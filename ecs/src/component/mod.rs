//! Component registration and metadata for the ECS.
//!
//! This module provides the infrastructure for registering and describing component types.
//! Components are the data containers attached to entities; every distinct component type
//! gets a small numeric [`Id`] from the world's [`Registry`], and all storage and query
//! machinery is keyed by those ids rather than by runtime reflection.
//!
//! ## Architecture
//!
//! - [`Component`]: the trait all component types must implement
//! - [`Id`]: a unique identifier for each registered type, assigned in registration order
//! - [`Info`]: metadata about a registered type (layout, drop function, kind)
//! - [`Registry`]: thread-safe registration and lookup of types
//! - [`Spec`]: a normalized set of component ids describing an archetype or query shape
//!
//! ## Thread Safety
//!
//! The [`Registry`] is designed for concurrent access:
//! - Lock-free reads for id lookups using `DashMap`
//! - Minimal locking for registration (only when a new type is first registered)
//! - Registration is idempotent and thread-safe
//!
//! ## Tags
//!
//! A *tag* component is a zero-sized type used purely as a membership marker. Tags
//! participate in archetype identity and queries like any other component, but their
//! columns occupy no memory. In Rust tag-ness is structural: [`Info::is_tag`] is true
//! exactly when the registered layout is zero-sized.

use std::{alloc::Layout, any::TypeId, fmt, ptr::NonNull};

mod registry;
mod spec;

pub use registry::Registry;
pub use spec::{IntoSpec, Spec};

/// A component identifier. Ids are assigned sequentially starting at 0 in registration
/// order, so the total order over ids matches the order types were first registered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl Id {
    /// Construct a new component Id from a raw u32 value.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the index of this component if it were to live in indexable storage (e.g. Vec)
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for Id {
    #[inline]
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<usize> for Id {
    #[inline]
    fn from(value: usize) -> Self {
        Self::new(value as u32)
    }
}

/// A trait representing a component in the ECS (Entity Component System).
///
/// At present this only sets the required trait bounds for a type to be used as a
/// component. The `Send + Sync` bounds are what allow chunk storage to be walked from
/// parallel iteration workers.
pub trait Component: 'static + Sized + Send + Sync {}

/// The kind of type registration.
///
/// A single registry hands out ids for both entity-attached components and world-level
/// extensions so the whole ECS shares one id space. A type registers as exactly one kind
/// for the lifetime of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A component type (attached to entities, many instances).
    Component,
    /// An extension type (singleton, one instance per world).
    Extension,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Component => write!(f, "component"),
            Kind::Extension => write!(f, "extension"),
        }
    }
}

/// Metadata about a registered type.
///
/// Contains everything the type-erased storage layer needs to manage values of the type:
/// memory layout, drop function, and registration details. One `Info` exists per distinct
/// type per registry, created on first registration and immutable afterwards.
#[derive(Debug, Clone, Copy)]
pub struct Info {
    /// The unique component id.
    id: Id,

    /// What kind of type this is (component or extension).
    kind: Kind,

    /// The Rust TypeId for runtime type checking.
    type_id: TypeId,

    /// The memory layout of the type.
    layout: Layout,

    /// The type name, used in error and log messages.
    type_name: &'static str,

    /// The drop function for the type (a no-op for types without drop glue).
    drop_fn: unsafe fn(NonNull<u8>),
}

impl Info {
    /// Construct Info for type `T`.
    pub(crate) fn new<T: 'static>(id: Id, kind: Kind) -> Self {
        let drop_fn = if std::mem::needs_drop::<T>() {
            Self::drop_impl::<T>
        } else {
            Self::drop_noop
        };
        Self {
            id,
            kind,
            type_id: TypeId::of::<T>(),
            layout: Layout::new::<T>(),
            type_name: std::any::type_name::<T>(),
            drop_fn,
        }
    }

    /// Get the component id.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the kind of type (component or extension).
    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Get the Rust TypeId.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Get the memory layout.
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Get the type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether this component is a tag: a zero-sized membership marker with no stored data.
    #[inline]
    pub fn is_tag(&self) -> bool {
        self.kind == Kind::Component && self.layout.size() == 0
    }

    /// Get the drop function.
    #[inline]
    pub fn drop_fn(&self) -> unsafe fn(NonNull<u8>) {
        self.drop_fn
    }

    /// Drop implementation for types that need drop.
    unsafe fn drop_impl<T>(ptr: NonNull<u8>) {
        unsafe {
            std::ptr::drop_in_place(ptr.as_ptr() as *mut T);
        }
    }

    /// No-op drop for types that don't need drop.
    unsafe fn drop_noop(_ptr: NonNull<u8>) {}
}
