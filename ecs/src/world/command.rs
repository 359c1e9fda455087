//! Deferred command buffer for structural entity operations.
//!
//! Structural mutation (spawning, despawning, adding/removing components) needs `&mut
//! World`. Code running where only shared access is available - parallel iteration
//! callbacks, worker threads - queues [`Command`]s into a [`CommandBuffer`] instead and
//! the owner applies them at a synchronization point.
//!
//! Pushes are lock-free (crossbeam `SegQueue`); [`CommandBuffer::apply`] drains in FIFO
//! order on the thread owning the world. Spawn commands carry a pre-reserved entity
//! handle so queued work can reference the entity before it exists in storage.

use crossbeam::queue::SegQueue;

use crate::{
    component,
    entity::Entity,
    storage::BoxedValues,
    world::World,
};

/// A deferred structural operation.
pub enum Command {
    /// Spawn a new entity with the given boxed component values.
    ///
    /// The entity handle is reserved up front via [`World::reserve_entity`], so systems
    /// can store or link it before the spawn lands.
    Spawn {
        /// The pre-reserved entity handle.
        entity: Entity,
        /// Type-erased component values to attach.
        values: BoxedValues,
    },

    /// Remove an entity and all its components from the world.
    Despawn {
        /// The entity to remove.
        entity: Entity,
    },

    /// Add components to an existing entity (migrating it to a wider archetype).
    AddComponents {
        /// The target entity.
        entity: Entity,
        /// Type-erased component values to add.
        values: BoxedValues,
    },

    /// Remove components from an existing entity by spec.
    RemoveComponents {
        /// The target entity.
        entity: Entity,
        /// Which component types to remove.
        spec: component::Spec,
    },
}

/// Thread-safe buffer of deferred commands.
///
/// `push` is lock-free and callable from any number of threads; `drain`/`apply` belong
/// on the single thread owning the world.
#[derive(Default)]
pub struct CommandBuffer {
    commands: SegQueue<Command>,
}

impl CommandBuffer {
    /// Create a new empty command buffer.
    pub fn new() -> Self {
        Self {
            commands: SegQueue::new(),
        }
    }

    /// Push a command to the buffer. Lock-free; safe from any thread.
    pub fn push(&self, command: Command) {
        self.commands.push(command);
    }

    /// Queue a spawn of a reserved entity with the given values.
    pub fn spawn(&self, entity: Entity, values: BoxedValues) {
        self.push(Command::Spawn { entity, values });
    }

    /// Queue a despawn.
    pub fn despawn(&self, entity: Entity) {
        self.push(Command::Despawn { entity });
    }

    /// Queue a component add.
    pub fn add_components(&self, entity: Entity, values: BoxedValues) {
        self.push(Command::AddComponents { entity, values });
    }

    /// Queue a component removal.
    pub fn remove_components(&self, entity: Entity, spec: component::Spec) {
        self.push(Command::RemoveComponents { entity, spec });
    }

    /// Get the number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check whether the buffer has no queued commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drain all commands from the buffer in FIFO order.
    pub fn drain(&self) -> Vec<Command> {
        let mut commands = Vec::new();
        while let Some(command) = self.commands.pop() {
            commands.push(command);
        }
        commands
    }

    /// Drain the buffer and apply each command to the world in FIFO order.
    ///
    /// Commands that lose a liveness race (an add against an entity despawned by an
    /// earlier command, a duplicate spawn) are logged and skipped rather than aborting
    /// the batch: deferred mutation is exactly where such races are expected.
    pub fn apply(&self, world: &mut World) {
        for command in self.drain() {
            match command {
                Command::Spawn { entity, values } => {
                    if let Err(error) = world.spawn_reserved(entity, values) {
                        log::warn!("skipping deferred spawn: {error}");
                    }
                }
                Command::Despawn { entity } => {
                    world.despawn(entity);
                }
                Command::AddComponents { entity, values } => {
                    if let Err(error) = world.add_components_dynamic(entity, values) {
                        log::warn!("skipping deferred component add: {error}");
                    }
                }
                Command::RemoveComponents { entity, spec } => {
                    world.remove_components_dynamic(entity, &spec);
                }
            }
        }
    }
}
