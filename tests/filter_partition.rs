use std::collections::BTreeSet;

use bytemuck::{Pod, Zeroable};

use taxa_ecs::{Entity, World};

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Position {
    x: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Aux {
    value: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
struct Team(u32);

const RED: Team = Team(1);
const BLUE: Team = Team(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
struct Squad(u32);

fn team_world() -> (World, taxa_ecs::ArchetypeIndex, Vec<Entity>) {
    let mut world = World::new();
    let position = world.register_data::<Position>("position").unwrap();
    world.register_filter::<Team>("team").unwrap();
    let archetype = world.add_archetype(&[position]).unwrap();
    world.initialize().unwrap();

    let entities: Vec<Entity> = (0..5).map(|_| world.create_entity(false).unwrap()).collect();
    for (i, &entity) in entities.iter().enumerate() {
        world.add_data(entity, Position { x: (i + 1) as f32 }).unwrap();
    }
    world.process_component_changes().unwrap();
    (world, archetype, entities)
}

#[test]
fn filter_values_partition_an_archetype() {
    let (mut world, archetype, entities) = team_world();

    // Red: entities 1, 3, 5. Blue: entities 2, 4.
    for (i, &entity) in entities.iter().enumerate() {
        let team = if i % 2 == 0 { RED } else { BLUE };
        world.add_filter(entity, team).unwrap();
    }
    world.process_component_changes().unwrap();

    let red = world.query(archetype).with(RED).build().unwrap();
    let pool = world.data::<Position>().unwrap();
    let red_values: BTreeSet<i32> = pool.values_in(&red).map(|p| p.x as i32).collect();
    assert_eq!(pool.entities_in(&red).count(), 3);
    assert_eq!(red_values, BTreeSet::from([1, 3, 5]));

    let blue = world.query(archetype).with(BLUE).build().unwrap();
    let pool = world.data::<Position>().unwrap();
    let blue_values: BTreeSet<i32> = pool.values_in(&blue).map(|p| p.x as i32).collect();
    assert_eq!(pool.entities_in(&blue).count(), 2);
    assert_eq!(blue_values, BTreeSet::from([2, 4]));

    // The unfiltered query still sees all five.
    let all = world.query(archetype).build().unwrap();
    let pool = world.data::<Position>().unwrap();
    assert_eq!(pool.entities_in(&all).count(), 5);
}

#[test]
fn filter_change_migrates_every_pool_in_lockstep() {
    let (mut world, archetype, entities) = team_world();
    for (i, &entity) in entities.iter().enumerate() {
        let team = if i % 2 == 0 { RED } else { BLUE };
        world.add_filter(entity, team).unwrap();
    }
    world.process_component_changes().unwrap();

    let changed = entities[0];
    world.set_filter(changed, BLUE).unwrap();
    assert_eq!(world.pending_changes(), 1);
    world.process_component_changes().unwrap();

    let blue = world.query(archetype).with(BLUE).build().unwrap();
    let data = world.data::<Position>().unwrap();
    assert_eq!(data.entities_in(&blue).count(), 3);

    // The data record and the filter record agree on taxon and position.
    let filters = world.filters::<Team>().unwrap();
    let data_index = data.index_of(changed).unwrap();
    let filter_index = filters.index_of(changed).unwrap();
    assert_eq!(data_index.taxon(), filter_index.taxon());
    assert_eq!(data_index.entry(), filter_index.entry());
    assert_eq!(filters.read(changed).unwrap(), BLUE);

    // The whole per-taxon entity order matches across the two pools.
    let taxon = data_index.taxon();
    assert_eq!(data.slice(taxon).entities, filters.slice(taxon).entities);

    let red = world.query(archetype).with(RED).build().unwrap();
    let data = world.data::<Position>().unwrap();
    assert_eq!(data.entities_in(&red).count(), 2);
}

#[test]
fn unseen_filter_values_yield_empty_queries() {
    let (mut world, archetype, entities) = team_world();
    world.add_filter(entities[0], RED).unwrap();
    world.process_component_changes().unwrap();

    let query = world.query(archetype).with(Team(42)).build().unwrap();
    assert!(query.is_empty());
}

#[test]
fn unique_value_table_interns_and_never_shrinks() {
    let (mut world, _archetype, entities) = team_world();
    for &entity in &entities {
        world.add_filter(entity, RED).unwrap();
    }
    world.process_component_changes().unwrap();

    let filters = world.filters::<Team>().unwrap();
    assert_eq!(filters.unique_len(), 1);
    assert_eq!(filters.refcount(&RED), Some(5));
    assert_eq!(filters.read(entities[0]).unwrap(), RED);

    world.remove_component::<Team>(entities[0]).unwrap();
    world.process_component_changes().unwrap();

    // The refcount drops but the table keeps the entry.
    let filters = world.filters::<Team>().unwrap();
    assert_eq!(filters.unique_len(), 1);
    assert_eq!(filters.refcount(&RED), Some(4));
}

#[test]
fn combinations_project_onto_declared_filter_types() {
    let mut world = World::new();
    let position = world.register_data::<Position>("position").unwrap();
    let aux = world.register_data::<Aux>("aux").unwrap();
    let team = world.register_filter::<Team>("team").unwrap();
    let squad = world.register_filter::<Squad>("squad").unwrap();
    let by_team = world.add_archetype(&[position, team]).unwrap();
    let by_squad = world.add_archetype(&[aux, squad]).unwrap();
    world.initialize().unwrap();

    let entity = world.create_entity(false).unwrap();
    world.add_data(entity, Position { x: 1.0 }).unwrap();
    world.add_data(entity, Aux { value: 2.0 }).unwrap();
    world.add_filter(entity, RED).unwrap();
    world.add_filter(entity, Squad(7)).unwrap();
    world.process_component_changes().unwrap();

    // Position storage is partitioned by team only; the squad value is
    // erased from its taxon's combination.
    let by_team_red = world.query(by_team).with(RED).build().unwrap();
    let positions = world.data::<Position>().unwrap();
    assert_eq!(positions.entities_in(&by_team_red).count(), 1);

    let by_squad_seven = world.query(by_squad).with(Squad(7)).build().unwrap();
    let auxes = world.data::<Aux>().unwrap();
    assert_eq!(auxes.entities_in(&by_squad_seven).count(), 1);

    // Asking the team archetype for a squad grouping finds nothing: no
    // taxon of its meta-archetypes retains the squad instance.
    let crossed = world.query(by_team).with(Squad(7)).build().unwrap();
    let positions = world.data::<Position>().unwrap();
    assert_eq!(positions.entities_in(&crossed).count(), 0);

    // The two data pools landed in different taxa (disjoint metas).
    let positions = world.data::<Position>().unwrap();
    let auxes = world.data::<Aux>().unwrap();
    assert_ne!(
        positions.index_of(entity).unwrap().taxon(),
        auxes.index_of(entity).unwrap().taxon()
    );
}
