use std::sync::{Arc, Mutex};

use bytemuck::{Pod, Zeroable};

use taxa_ecs::{
    ComponentDestroyed, DestroyEntityEvent, EcsError, EcsResult, Entity, QueueIndex,
    ScheduleError, Scheduler, System, World,
};

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Health {
    hp: f32,
}

#[derive(Clone, Copy, Debug)]
struct Ping {
    at: f64,
}

type Journal = Arc<Mutex<Vec<String>>>;

fn log_line(journal: &Journal, line: String) {
    journal.lock().unwrap().push(line);
}

struct PingEmitter {
    journal: Journal,
}

impl System for PingEmitter {
    fn name(&self) -> &'static str {
        "ping_emitter"
    }

    fn process_events(&mut self, _world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    fn update_entity(&mut self, world: &mut World, _entity: Entity, time: f64) -> EcsResult<()> {
        log_line(&self.journal, format!("emit@{time}"));
        world.events_mut().emit(Ping { at: time })
    }
}

struct PingListener {
    journal: Journal,
}

impl System for PingListener {
    fn name(&self) -> &'static str {
        "ping_listener"
    }

    fn process_events(&mut self, world: &mut World) -> EcsResult<()> {
        for ping in world.events().listener::<Ping>() {
            log_line(&self.journal, format!("seen@{}", ping.at));
        }
        Ok(())
    }

    fn update_entity(&mut self, _world: &mut World, _entity: Entity, time: f64) -> EcsResult<()> {
        log_line(&self.journal, format!("listener_update@{time}"));
        Ok(())
    }
}

fn bare_world() -> World {
    let mut world = World::new();
    let health = world.register_data::<Health>("health").unwrap();
    world.add_archetype(&[health]).unwrap();
    world.initialize().unwrap();
    world
}

#[test]
fn emitter_runs_and_publishes_before_dependent_listener() {
    let mut world = bare_world();
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let ping = world.events_mut().register::<Ping>().unwrap();

    let mut scheduler = Scheduler::new();
    let emitter_queue = scheduler
        .add_scheduled(
            Box::new(PingEmitter { journal: journal.clone() }),
            &mut world,
            "emitter",
            vec![ping],
            vec![],
        )
        .unwrap();
    let listener_queue = scheduler
        .add_scheduled(
            Box::new(PingListener { journal: journal.clone() }),
            &mut world,
            "listener",
            vec![],
            vec![ping],
        )
        .unwrap();

    let entity = world.create_entity(false).unwrap();
    world.schedule(emitter_queue, entity, 5.0).unwrap();
    world.schedule(listener_queue, entity, 5.0).unwrap();

    scheduler.tick(&mut world, 10.0).unwrap();
    scheduler.finish_tick(&mut world, 10.0).unwrap();

    // At the shared deadline the emitter updates first, its event is
    // published, and only then does the listener update.
    let journal = journal.lock().unwrap();
    let emit = journal.iter().position(|l| l == "emit@5").unwrap();
    let seen = journal.iter().position(|l| l == "seen@5").unwrap();
    let update = journal.iter().position(|l| l == "listener_update@5").unwrap();
    assert!(emit < seen, "journal: {journal:?}");
    assert!(seen < update, "journal: {journal:?}");

    assert_eq!(world.sim_time(), 10.0);
}

#[test]
fn listener_is_throttled_to_the_emitter_deadline() {
    let mut world = bare_world();
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let ping = world.events_mut().register::<Ping>().unwrap();

    let mut scheduler = Scheduler::new();
    let emitter_queue = scheduler
        .add_scheduled(
            Box::new(PingEmitter { journal: journal.clone() }),
            &mut world,
            "emitter",
            vec![ping],
            vec![],
        )
        .unwrap();
    let listener_queue = scheduler
        .add_scheduled(
            Box::new(PingListener { journal: journal.clone() }),
            &mut world,
            "listener",
            vec![],
            vec![ping],
        )
        .unwrap();

    let entity = world.create_entity(false).unwrap();
    world.schedule(emitter_queue, entity, 5.0).unwrap();
    world.schedule(emitter_queue, entity, 7.0).unwrap();
    world.schedule(listener_queue, entity, 6.0).unwrap();
    world.schedule(listener_queue, entity, 8.0).unwrap();

    scheduler.tick(&mut world, 10.0).unwrap();
    scheduler.finish_tick(&mut world, 10.0).unwrap();

    let journal = journal.lock().unwrap();
    let position = |line: &str| journal.iter().position(|l| l == line).unwrap();

    // The listener's 6.0 update runs after the emitter's 5.0 emission is
    // published, and its 8.0 update only after the emitter reached 7.0.
    assert!(position("emit@5") < position("seen@5"), "journal: {journal:?}");
    assert!(position("seen@5") < position("listener_update@6"), "journal: {journal:?}");
    assert!(position("emit@7") < position("listener_update@8"), "journal: {journal:?}");
}

#[test]
fn events_are_invisible_until_the_buffer_swap() {
    let mut world = bare_world();
    world.events_mut().emit(Ping { at: 1.0 }).unwrap();
    assert!(world.events().listener::<Ping>().is_empty());

    world.events_mut().swap_buffers();
    assert_eq!(world.events().listener::<Ping>().len(), 1);

    // The next swap clears what was published and publishes nothing new.
    world.events_mut().swap_buffers();
    assert!(world.events().listener::<Ping>().is_empty());
}

struct SelfRescheduler;

impl System for SelfRescheduler {
    fn name(&self) -> &'static str {
        "self_rescheduler"
    }

    fn process_events(&mut self, _world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    fn update_entity(&mut self, world: &mut World, entity: Entity, time: f64) -> EcsResult<()> {
        let queue: QueueIndex = world
            .work_queues()
            .index_by_name("feedback")
            .expect("own queue registered");
        world.schedule(queue, entity, time)
    }
}

#[test]
fn runaway_feedback_loops_trip_the_guard() {
    let mut world = bare_world();
    let mut scheduler = Scheduler::new();
    scheduler.set_update_guard(100);
    let queue = scheduler
        .add_scheduled(Box::new(SelfRescheduler), &mut world, "feedback", vec![], vec![])
        .unwrap();

    let entity = world.create_entity(false).unwrap();
    world.schedule(queue, entity, 1.0).unwrap();

    let result = scheduler.tick(&mut world, 2.0);
    assert!(matches!(
        result,
        Err(EcsError::Schedule(ScheduleError::RunawayUpdate { .. }))
    ));
}

struct Reaper {
    victim: Entity,
    fired: bool,
}

impl System for Reaper {
    fn name(&self) -> &'static str {
        "reaper"
    }

    fn process_events(&mut self, world: &mut World) -> EcsResult<()> {
        if !self.fired {
            self.fired = true;
            world.queue_destroy(self.victim)?;
        }
        Ok(())
    }
}

#[test]
fn entity_destruction_is_routed_through_the_bus() {
    let mut world = bare_world();
    world.listen_component_destroyed::<Health>().unwrap();

    let victim = world.create_entity(false).unwrap();
    world.add_data(victim, Health { hp: 12.0 }).unwrap();
    world.process_component_changes().unwrap();

    let mut scheduler = Scheduler::new();
    scheduler.add_passive(Box::new(Reaper { victim, fired: false }), vec![], vec![]);

    scheduler.tick(&mut world, 1.0).unwrap();
    // The request is only applied by the end-of-tick drain.
    assert!(world.has_entity(victim));
    scheduler.finish_tick(&mut world, 1.0).unwrap();
    assert!(!world.has_entity(victim));

    // The component's destruction event was emitted by the destroy path
    // and is published at the next swap, value included.
    world.events_mut().swap_buffers();
    let destroyed = world.events().listener::<ComponentDestroyed<Health>>();
    assert_eq!(destroyed.len(), 1);
    assert_eq!(destroyed[0].entity, victim);
    assert_eq!(destroyed[0].value.hp, 12.0);
}

struct FrameCounter {
    journal: Journal,
}

impl System for FrameCounter {
    fn name(&self) -> &'static str {
        "frame_counter"
    }

    fn process_events(&mut self, _world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    fn update_frame(&mut self, _world: &mut World, time: f64) -> EcsResult<()> {
        log_line(&self.journal, format!("frame@{time}"));
        Ok(())
    }

    fn complete_update(&mut self, _world: &mut World) -> EcsResult<()> {
        log_line(&self.journal, "complete".to_string());
        Ok(())
    }
}

#[test]
fn frame_systems_run_once_per_tick() {
    let mut world = bare_world();
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = Scheduler::new();
    scheduler.add_frame(Box::new(FrameCounter { journal: journal.clone() }), vec![], vec![]);

    scheduler.tick(&mut world, 1.0).unwrap();
    scheduler.finish_tick(&mut world, 1.0).unwrap();
    scheduler.tick(&mut world, 2.0).unwrap();
    scheduler.finish_tick(&mut world, 2.0).unwrap();

    let journal = journal.lock().unwrap();
    assert_eq!(*journal, vec!["frame@1", "complete", "frame@2", "complete"]);
}

#[test]
fn time_offset_shifts_the_simulation_clock() {
    let mut world = bare_world();
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = Scheduler::new();
    scheduler.set_time_offset(100.0);
    let queue = scheduler
        .add_scheduled(
            Box::new(PingEmitter { journal: journal.clone() }),
            &mut world,
            "emitter",
            vec![],
            vec![],
        )
        .unwrap();

    let entity = world.create_entity(false).unwrap();
    world.schedule(queue, entity, 103.0).unwrap();

    // Host time 2.0 maps to simulation time 102.0: the deadline holds.
    scheduler.tick(&mut world, 2.0).unwrap();
    assert_eq!(world.sim_time(), 102.0);
    assert!(journal.lock().unwrap().is_empty());

    scheduler.tick(&mut world, 4.0).unwrap();
    assert_eq!(world.sim_time(), 104.0);
    assert_eq!(*journal.lock().unwrap(), vec!["emit@103"]);
}

#[test]
fn destroy_requests_for_dead_entities_are_ignored() {
    let mut world = bare_world();
    let entity = world.create_entity(false).unwrap();
    world.destroy(entity).unwrap();

    world.queue_destroy(entity).unwrap();
    world.events_mut().swap_buffers();
    assert_eq!(world.apply_destroy_events().unwrap(), 0);
    let _ = world.events().listener::<DestroyEntityEvent>();
}
