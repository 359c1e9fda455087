//! Shared fixtures for the kestrel_ecs benchmarks.

use kestrel_ecs::world::{Id, World};
use kestrel_macros::Component;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Component, Debug, Clone, Copy)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Component, Debug, Clone, Copy)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

#[derive(Component, Debug, Clone, Copy)]
pub struct Health {
    pub hp: i32,
}

#[derive(Component, Debug, Clone, Copy)]
pub struct Stunned;

/// Deterministic RNG so runs are comparable.
pub fn rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(0x5eed)
}

/// Build a world holding `count` entities spread over a few archetype shapes, roughly
/// the mix a small simulation settles into.
pub fn populated_world(count: usize) -> World {
    let mut rng = rng();
    let mut world = World::new(Id::new(0));

    for _ in 0..count {
        let position = Position {
            x: rng.gen_range(-100.0..100.0),
            y: rng.gen_range(-100.0..100.0),
        };
        let velocity = Velocity {
            dx: rng.gen_range(-1.0..1.0),
            dy: rng.gen_range(-1.0..1.0),
        };
        match rng.gen_range(0..4) {
            0 => {
                world.spawn(position);
            }
            1 => {
                world.spawn((position, velocity));
            }
            2 => {
                world.spawn((position, velocity, Health { hp: 100 }));
            }
            _ => {
                world.spawn((position, velocity, Health { hp: 100 }, Stunned));
            }
        }
    }

    world
}
