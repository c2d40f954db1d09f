use bytemuck::{Pod, Zeroable};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

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

fn populated_world(count: usize) -> (World, taxa_ecs::ArchetypeIndex) {
    let mut world = World::new();
    let position = world.register_data::<Position>("position").unwrap();
    world.register_filter::<Team>("team").unwrap();
    let archetype = world.add_archetype(&[position]).unwrap();
    world.initialize().unwrap();

    let entities: Vec<_> = (0..count).map(|_| world.create_entity(false).unwrap()).collect();
    for (i, &entity) in entities.iter().enumerate() {
        world
            .add_data(entity, Position { x: i as f32, y: 1.0 })
            .unwrap();
        world.add_filter(entity, Team((i % 8) as u32)).unwrap();
    }
    world.process_component_changes().unwrap();
    (world, archetype)
}

fn bench_iteration(c: &mut Criterion) {
    let (mut world, archetype) = populated_world(10_000);
    let all = world.query(archetype).build().unwrap();
    let red = world.query(archetype).with(Team(0)).build().unwrap();

    let mut group = c.benchmark_group("iterate");

    group.bench_function("sum_10k_unfiltered", |b| {
        let pool = world.data::<Position>().unwrap();
        b.iter(|| {
            let mut sum = 0.0f32;
            pool.for_each(&all, |_, position| sum += position.x);
            black_box(sum)
        })
    });

    group.bench_function("sum_10k_one_filter_bucket", |b| {
        let pool = world.data::<Position>().unwrap();
        b.iter(|| {
            let mut sum = 0.0f32;
            pool.for_each(&red, |_, position| sum += position.x);
            black_box(sum)
        })
    });

    group.bench_function("slice_zip_10k", |b| {
        let pool = world.data::<Position>().unwrap();
        b.iter(|| {
            let mut sum = 0.0f32;
            for &taxon in all.taxa() {
                let slice = pool.slice(taxon);
                for (entity, position) in slice.iter() {
                    sum += position.y + entity.id() as f32;
                }
            }
            black_box(sum)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_iteration);
criterion_main!(benches);
