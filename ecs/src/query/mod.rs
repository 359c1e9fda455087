//! Cached archetype queries.
//!
//! A query's shape is a [`Descriptor`]: the normalized sets of components an archetype
//! must contain and must not contain. The [`Manager`] caches, per descriptor, the list
//! of matching archetypes and keeps every cached list current *incrementally* - each
//! newly created archetype pushes itself into the cached entries it matches, so a cache
//! entry is filled by exactly one scan over the archetype list and never rescanned or
//! invalidated by structural growth.
//!
//! [`Fetch`] is the statically-typed access layer on top: `&C`, `&mut C` and tuples
//! thereof resolve to a descriptor for cache lookup and then read chunk rows directly.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kestrel_ecs::query::Descriptor;
//!
//! // Typed iteration through the world (descriptor and caching are implicit):
//! world.for_each::<(&Position, &mut Velocity)>(|entity, (pos, vel)| {
//!     vel.dx += pos.x * 0.1;
//! });
//!
//! // Raw archetype matching through the shared manager, callable from any thread:
//! let descriptor = Descriptor::with_types::<(Position, Velocity)>(world.registry());
//! let archetypes = world.query_manager().matching(&descriptor);
//! ```

mod descriptor;
mod fetch;
mod manager;

pub use descriptor::{Description, Descriptor};
pub use fetch::Fetch;
pub use manager::Manager;
