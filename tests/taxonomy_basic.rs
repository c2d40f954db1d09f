use bytemuck::{Pod, Zeroable};

use taxa_ecs::{EcsError, Entity, World, WorldError};

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Position {
    x: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
struct Team(u32);

#[test]
fn single_archetype_linear_scan() {
    let mut world = World::new();
    let position = world.register_data::<Position>("position").unwrap();
    let archetype = world.add_archetype(&[position]).unwrap();
    world.initialize().unwrap();

    let entities: Vec<Entity> = (0..5).map(|_| world.create_entity(false).unwrap()).collect();
    for (i, &entity) in entities.iter().enumerate() {
        world.add_data(entity, Position { x: (i + 1) as f32 }).unwrap();
    }
    world.process_component_changes().unwrap();

    let query = world.query(archetype).build().unwrap();
    let pool = world.data::<Position>().unwrap();

    let values: Vec<f32> = pool.values_in(&query).map(|p| p.x).collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0]);

    let matched: Vec<Entity> = pool.entities_in(&query).collect();
    assert_eq!(matched, entities);

    // All five records share one populated taxon.
    let populated: Vec<_> = query
        .taxa()
        .iter()
        .filter(|&&taxon| !pool.slice(taxon).is_empty())
        .collect();
    assert_eq!(populated.len(), 1);
    assert_eq!(pool.slice(*populated[0]).len(), 5);
}

#[test]
fn lifecycle_misuse_is_fatal() {
    let mut world = World::new();
    let position = world.register_data::<Position>("position").unwrap();
    world.add_archetype(&[position]).unwrap();

    // Entities cannot exist before initialize.
    assert!(matches!(
        world.create_entity(false),
        Err(EcsError::World(WorldError::NotInitialized))
    ));

    world.initialize().unwrap();

    // The archetype set is sealed.
    assert!(matches!(
        world.add_archetype(&[position]),
        Err(EcsError::World(WorldError::ArchetypeAfterInitialize))
    ));
    assert!(matches!(
        world.initialize(),
        Err(EcsError::World(WorldError::AlreadyInitialized))
    ));

    // A dirty set blocks entity creation until reconciled.
    let entity = world.create_entity(false).unwrap();
    world.add_data(entity, Position { x: 1.0 }).unwrap();
    assert!(matches!(
        world.create_entity(false),
        Err(EcsError::World(WorldError::PendingChanges { .. }))
    ));
    world.process_component_changes().unwrap();
    world.create_entity(false).unwrap();
}

#[test]
fn empty_archetype_is_rejected() {
    let mut world = World::new();
    assert!(matches!(
        world.add_archetype(&[]),
        Err(EcsError::World(WorldError::EmptyArchetype))
    ));
}

#[test]
fn super_archetype_requires_component_and_filter_subsets() {
    // A narrow archetype must reach the taxa of every meta-archetype whose
    // component bag and filter bag both contain it.
    let mut world = World::new();
    let position = world.register_data::<Position>("position").unwrap();
    let team = world.register_filter::<Team>("team").unwrap();
    let narrow = world.add_archetype(&[position]).unwrap();
    let wide = world.add_archetype(&[position, team]).unwrap();
    world.initialize().unwrap();

    let entity = world.create_entity(false).unwrap();
    world.add_data(entity, Position { x: 7.0 }).unwrap();
    world.add_filter(entity, Team(3)).unwrap();
    world.process_component_changes().unwrap();

    // The entity matches both archetypes; its single merged meta-archetype
    // carries the filter, and the narrow archetype still reaches it.
    let via_narrow = world.query(narrow).build().unwrap();
    let pool = world.data::<Position>().unwrap();
    assert_eq!(pool.entities_in(&via_narrow).collect::<Vec<_>>(), vec![entity]);

    let via_wide = world.query(wide).with(Team(3)).build().unwrap();
    let pool = world.data::<Position>().unwrap();
    assert_eq!(pool.entities_in(&via_wide).collect::<Vec<_>>(), vec![entity]);

    // The narrow archetype filtered by team also admits the superset taxon.
    let via_narrow_filtered = world.query(narrow).with(Team(3)).build().unwrap();
    let pool = world.data::<Position>().unwrap();
    assert_eq!(pool.entities_in(&via_narrow_filtered).count(), 1);
}

#[test]
fn entity_ids_are_recycled_through_the_free_list() {
    let mut world = World::new();
    let position = world.register_data::<Position>("position").unwrap();
    world.add_archetype(&[position]).unwrap();
    world.initialize().unwrap();

    let a = world.create_entity(false).unwrap();
    let b = world.create_entity(false).unwrap();
    assert_ne!(a.id(), b.id());

    world.destroy(a).unwrap();
    assert!(!world.has_entity(a));

    let c = world.create_entity(false).unwrap();
    assert_eq!(c.id(), a.id());
    assert!(world.has_entity(c));

    // The stale handle and the recycled one are both the same bits here,
    // so liveness follows the slot content.
    assert_eq!(world.entity_count(), 2);
}

#[test]
fn prototypes_never_enter_queries() {
    let mut world = World::new();
    let position = world.register_data::<Position>("position").unwrap();
    let archetype = world.add_archetype(&[position]).unwrap();
    world.initialize().unwrap();

    let prototype = world.create_entity(true).unwrap();
    world.add_data(prototype, Position { x: 9.0 }).unwrap();
    assert_eq!(world.pending_changes(), 0, "prototypes never become dirty");

    let query = world.query(archetype).build().unwrap();
    let pool = world.data::<Position>().unwrap();
    assert_eq!(pool.entities_in(&query).count(), 0);
    assert_eq!(pool.read(prototype).unwrap().x, 9.0);
}
