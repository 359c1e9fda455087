//! An archetype-based Entity Component System with chunked columnar storage and a
//! cached, incrementally-maintained query layer.
//!
//! # Architecture
//!
//! - [`component`]: per-world type registration - ids, metadata, and normalized
//!   component sets ([`component::Spec`])
//! - [`entity`]: generational entity handles and the lock-free allocator
//! - [`storage`]: archetypes, fixed-capacity chunks, the pooled chunk allocator, the
//!   entity index, and migration between archetypes
//! - [`query`]: query descriptors, the thread-safe incremental query cache, and the
//!   statically-typed [`query::Fetch`] access layer
//! - [`world`]: the facade wiring it all together, plus extensions and the deferred
//!   command buffer
//!
//! # Example
//!
//! ```ignore
//! use kestrel_ecs::world::{Id, World};
//! use kestrel_macros::Component;
//!
//! #[derive(Component)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Component)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut world = World::new(Id::new(0));
//! world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.5 }));
//!
//! world.for_each::<(&mut Position, &Velocity)>(|_entity, (pos, vel)| {
//!     pos.x += vel.dx;
//!     pos.y += vel.dy;
//! });
//! ```

// Allow the derive macros' `::kestrel_ecs::...` paths to resolve inside this crate.
extern crate self as kestrel_ecs;

pub mod component;
pub mod entity;
pub mod error;
pub mod query;
pub mod storage;
pub mod world;

pub(crate) mod util;

pub use component::Component;
pub use entity::Entity;
pub use error::StorageError;
pub use world::{CommandBuffer, Extension, Id as WorldId, World};
