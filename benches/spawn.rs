use bytemuck::{Pod, Zeroable};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use taxa_ecs::World;

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
struct Team(u32);

fn empty_world() -> (World, taxa_ecs::TypeIndex) {
    let mut world = World::new();
    let position = world.register_data::<Position>("position").unwrap();
    world.register_filter::<Team>("team").unwrap();
    world.add_archetype(&[position]).unwrap();
    world.initialize().unwrap();
    (world, position)
}

fn bench_spawn_and_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    group.bench_function("spawn_1k_reconcile", |b| {
        b.iter_batched(
            || empty_world().0,
            |mut world| {
                let entities: Vec<_> =
                    (0..1000).map(|_| world.create_entity(false).unwrap()).collect();
                for (i, &entity) in entities.iter().enumerate() {
                    world
                        .add_data(entity, Position { x: i as f32, y: 0.0 })
                        .unwrap();
                    world.add_filter(entity, Team((i % 4) as u32)).unwrap();
                }
                world.process_component_changes().unwrap();
                world
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("filter_churn_1k", |b| {
        b.iter_batched(
            || {
                let (mut world, _) = empty_world();
                let entities: Vec<_> =
                    (0..1000).map(|_| world.create_entity(false).unwrap()).collect();
                for (i, &entity) in entities.iter().enumerate() {
                    world
                        .add_data(entity, Position { x: i as f32, y: 0.0 })
                        .unwrap();
                    world.add_filter(entity, Team((i % 4) as u32)).unwrap();
                }
                world.process_component_changes().unwrap();
                (world, entities)
            },
            |(mut world, entities)| {
                for (i, &entity) in entities.iter().enumerate() {
                    world.set_filter(entity, Team(((i + 1) % 4) as u32)).unwrap();
                }
                world.process_component_changes().unwrap();
                world
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_spawn_and_reconcile);
criterion_main!(benches);
