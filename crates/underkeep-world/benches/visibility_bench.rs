//! Criterion benchmarks for the visibility refresh pass.
//!
//! Two groups:
//! - `refresh_static`: nothing moves; measures the steady-state cost of a
//!   pass that produces no events.
//! - `refresh_moving`: a rival patrol walks across the keeper's creatures
//!   every iteration, producing add/remove traffic.

use criterion::{Criterion, criterion_group, criterion_main};
use underkeep_core::id::{EntityId, SeatId, TilePos};
use underkeep_core::test_utils::*;
use underkeep_world::codec::EntityCodecRegistry;
use underkeep_world::entity::{CreatureBody, Entity, EntityBody, EntityHeader, Position};
use underkeep_world::world::World;

fn creature(name: String, seat: SeatId, tile: TilePos) -> Entity {
    Entity::new(
        EntityHeader::new(name, seat, Position::on_tile(tile)),
        EntityBody::Creature(CreatureBody {
            class: "Goblin".into(),
            hp: 50,
            max_hp: 50,
            level: 1,
        }),
    )
}

/// 400 keeper creatures on a 20x20 grid, 20 rival patrollers off to the side.
fn build_world() -> (World, Vec<EntityId>) {
    let mut world = World::new(keeper_seats(), 3);
    for y in 0..20 {
        for x in 0..20 {
            world
                .add_entity(creature(format!("Imp_{x}_{y}"), keeper(), TilePos::new(x * 2, y * 2)))
                .expect("unique name");
        }
    }
    let patrol = (0..20)
        .map(|i| {
            world
                .add_entity(creature(format!("Patrol_{i}"), rival(), TilePos::new(-50, i * 2)))
                .expect("unique name")
        })
        .collect();
    (world, patrol)
}

fn refresh_static(c: &mut Criterion) {
    let codecs = EntityCodecRegistry::standard();
    let (mut world, _) = build_world();
    world.refresh_visibility(&codecs);
    world.drain_events();

    c.bench_function("refresh_static", |b| {
        b.iter(|| {
            world.refresh_visibility(&codecs);
            world.drain_events()
        })
    });
}

fn refresh_moving(c: &mut Criterion) {
    let codecs = EntityCodecRegistry::standard();
    let (mut world, patrol) = build_world();
    let mut step = 0i32;

    c.bench_function("refresh_moving", |b| {
        b.iter(|| {
            step = (step + 1) % 60;
            for id in &patrol {
                if let Some(entity) = world.get_mut(*id) {
                    entity.header.position.x = (step - 10) as f32;
                }
            }
            world.refresh_visibility(&codecs);
            world.drain_events()
        })
    });
}

criterion_group!(benches, refresh_static, refresh_moving);
criterion_main!(benches);
