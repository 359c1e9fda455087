//! A small end-to-end tour of the world API: spawning, querying, migration, and the
//! deferred command buffer.
//!
//! Run with: `cargo run --example simple_world`

use kestrel_ecs::storage::BoxedValues;
use kestrel_ecs::world::{CommandBuffer, Id, World};
use kestrel_macros::Component;

#[derive(Component, Debug)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Component, Debug)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Component, Debug)]
struct Lifetime {
    ticks: u32,
}

fn main() {
    let mut world = World::new(Id::new(0));

    // A moving swarm plus one stationary landmark.
    for i in 0..64 {
        world.spawn((
            Position {
                x: i as f32,
                y: 0.0,
            },
            Velocity {
                dx: 0.0,
                dy: 1.0 + (i % 4) as f32,
            },
            Lifetime { ticks: 3 + i % 5 },
        ));
    }
    world.spawn(Position { x: -1.0, y: -1.0 });

    println!(
        "spawned {} entities across {} archetypes",
        world.entity_count(),
        world.archetype_count()
    );

    let commands = CommandBuffer::new();
    for tick in 0..8 {
        // Integrate movement; only the swarm matches.
        world.for_each::<(&mut Position, &Velocity)>(|_entity, (pos, vel)| {
            pos.x += vel.dx;
            pos.y += vel.dy;
        });

        // Tick lifetimes down, queueing despawns for the expired.
        world.for_each::<&mut Lifetime>(|entity, lifetime| {
            if lifetime.ticks == 0 {
                commands.despawn(entity);
            } else {
                lifetime.ticks -= 1;
            }
        });
        commands.apply(&mut world);

        println!("tick {tick}: {} entities alive", world.entity_count());
    }

    // Deferred spawn through the command buffer.
    let reserved = world.reserve_entity();
    commands.spawn(
        reserved,
        BoxedValues::new(Position { x: 0.0, y: 0.0 }, world.registry()),
    );
    commands.apply(&mut world);
    println!(
        "reserved entity alive after apply: {}",
        world.is_alive(reserved)
    );

    let queries = world.query_manager();
    println!(
        "query cache: {} cached, {} hits, {} misses ({:.1}% hit rate)",
        queries.cached_queries(),
        queries.hits(),
        queries.misses(),
        queries.hit_rate()
    );
}
