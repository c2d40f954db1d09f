//! Event-driven system scheduling.
//!
//! This module is responsible for:
//! * registering passive, scheduled, and frame systems,
//! * inferring dependency edges between scheduled systems from their
//!   declared event types,
//! * advancing scheduled work in deadline order with dependency throttling,
//! * running the frame phases and the end-of-tick drain.
//!
//! ## Tick algorithm
//!
//! On each host tick at time `t = host_time + offset`:
//!
//! 1. Repeat until the bus quiesces:
//!    - swap event buffers (publish),
//!    - run every system's `process_events`,
//!    - drain scheduled work: pick the system with the smallest next
//!      deadline (ties broken emitters-first), advance it up to
//!      `min(t, earliest dependency deadline)`, and re-publish as soon as
//!      it emits so listeners observe its events before their own updates
//!      at the same deadline.
//! 2. Run every frame system's `update_frame(t)`.
//!
//! After the host finishes its tick, [`Scheduler::finish_tick`] runs
//! `complete_update` on frame systems, publishes and processes late
//! emissions once more, and applies the accumulated entity-destruction
//! requests through the world.
//!
//! ## Runaway protection
//!
//! A single advance of one system is bounded by the configured update
//! guard (10 000 by default). Exceeding it is a categorical error so buggy
//! feedback loops cannot silently stall a tick.

use crate::engine::error::{EcsResult, ScheduleError};
use crate::engine::systems::System;
use crate::engine::types::{EventTypeIndex, QueueIndex};
use crate::engine::world::{World, WorldConfig};


#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SystemKind {
    Passive,
    Scheduled { queue: QueueIndex },
    Frame,
}

struct SystemEntry {
    system: Box<dyn System>,
    kind: SystemKind,
    emits: Vec<EventTypeIndex>,
    listens: Vec<EventTypeIndex>,
    /// Indices of scheduled systems this one must not advance past.
    depends_on: Vec<usize>,
    /// Topological rank; emitters sort before their listeners.
    rank: usize,
}

/// Registers systems and drives them through the tick algorithm.
pub struct Scheduler {
    entries: Vec<SystemEntry>,
    update_guard: usize,
    time_offset: f64,
    initialized: bool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates an empty scheduler with the default update guard.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            update_guard: 10_000,
            time_offset: 0.0,
            initialized: false,
        }
    }

    /// Creates a scheduler whose update guard follows the world
    /// configuration.
    pub fn with_config(config: &WorldConfig) -> Self {
        let mut scheduler = Self::new();
        scheduler.update_guard = config.max_updates_per_call.max(1);
        scheduler
    }

    /// Number of registered systems.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no system is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bounds how many updates a single advance may perform.
    pub fn set_update_guard(&mut self, bound: usize) {
        self.update_guard = bound.max(1);
    }

    /// Offset added to the host clock to form simulation time.
    pub fn set_time_offset(&mut self, offset: f64) {
        self.time_offset = offset;
    }

    /// Registers a passive system.
    pub fn add_passive(
        &mut self,
        system: Box<dyn System>,
        emits: Vec<EventTypeIndex>,
        listens: Vec<EventTypeIndex>,
    ) {
        self.push(system, SystemKind::Passive, emits, listens);
    }

    /// Registers a scheduled system owning the named work queue.
    pub fn add_scheduled(
        &mut self,
        system: Box<dyn System>,
        world: &mut World,
        queue_name: &str,
        emits: Vec<EventTypeIndex>,
        listens: Vec<EventTypeIndex>,
    ) -> EcsResult<QueueIndex> {
        let queue = world.create_queue(queue_name)?;
        self.push(system, SystemKind::Scheduled { queue }, emits, listens);
        Ok(queue)
    }

    /// Registers a frame system.
    pub fn add_frame(
        &mut self,
        system: Box<dyn System>,
        emits: Vec<EventTypeIndex>,
        listens: Vec<EventTypeIndex>,
    ) {
        self.push(system, SystemKind::Frame, emits, listens);
    }

    fn push(
        &mut self,
        system: Box<dyn System>,
        kind: SystemKind,
        emits: Vec<EventTypeIndex>,
        listens: Vec<EventTypeIndex>,
    ) {
        self.entries.push(SystemEntry {
            system,
            kind,
            emits,
            listens,
            depends_on: Vec::new(),
            rank: 0,
        });
        self.initialized = false;
    }

    /// Infers dependency edges and topological ranks.
    ///
    /// For every event type with at least one scheduled emitter and one
    /// scheduled listener, each listener depends on each emitter.
    /// Idempotent; `tick` calls it lazily after registration changes.
    pub fn initialize(&mut self) {
        for entry in &mut self.entries {
            entry.depends_on.clear();
            entry.rank = 0;
        }

        let scheduled: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e.kind, SystemKind::Scheduled { .. }))
            .map(|(i, _)| i)
            .collect();

        for &listener in &scheduled {
            let listens = self.entries[listener].listens.clone();
            for &emitter in &scheduled {
                if emitter == listener {
                    continue;
                }
                let emits_watched = self.entries[emitter]
                    .emits
                    .iter()
                    .any(|event| listens.contains(event));
                if emits_watched && !self.entries[listener].depends_on.contains(&emitter) {
                    self.entries[listener].depends_on.push(emitter);
                }
            }
        }

        // Kahn ranking so emitters sort before listeners at equal
        // deadlines; cycles keep registration order.
        let mut rank = 0usize;
        let mut assigned = vec![false; self.entries.len()];
        loop {
            let mut progressed = false;
            for i in 0..self.entries.len() {
                if assigned[i] {
                    continue;
                }
                let ready = self.entries[i]
                    .depends_on
                    .iter()
                    .all(|&dep| assigned[dep]);
                if ready {
                    self.entries[i].rank = rank;
                    assigned[i] = true;
                    rank += 1;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        for i in 0..self.entries.len() {
            if !assigned[i] {
                self.entries[i].rank = rank + i;
                log::warn!(
                    "system {} is in a dependency cycle; falling back to registration order",
                    self.entries[i].system.name()
                );
            }
        }

        self.initialized = true;
        log::debug!("scheduler initialized with {} systems", self.entries.len());
    }

    fn next_deadline(&self, index: usize, world: &World) -> Option<f64> {
        match self.entries[index].kind {
            SystemKind::Scheduled { queue } => world.work_queues().next_deadline(queue),
            _ => None,
        }
    }

    /// Picks the scheduled system with the smallest next deadline, breaking
    /// ties by topological rank.
    fn pick_scheduled(&self, world: &World) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for index in 0..self.entries.len() {
            let Some(deadline) = self.next_deadline(index, world) else {
                continue;
            };
            match best {
                None => best = Some((index, deadline)),
                Some((current, current_deadline)) => {
                    let earlier = deadline < current_deadline;
                    let tie_wins = deadline == current_deadline
                        && self.entries[index].rank < self.entries[current].rank;
                    if earlier || tie_wins {
                        best = Some((index, deadline));
                    }
                }
            }
        }
        best
    }

    /// Drains one system's queue while deadlines stay at or below
    /// `max_time`.
    fn update_to(&mut self, index: usize, world: &mut World, max_time: f64) -> EcsResult<()> {
        let SystemKind::Scheduled { queue } = self.entries[index].kind else {
            return Ok(());
        };
        let mut iterations = 0usize;
        loop {
            match world.work_queues().next_deadline(queue) {
                Some(deadline) if deadline <= max_time => {}
                _ => break,
            }
            iterations += 1;
            if iterations > self.update_guard {
                return Err(ScheduleError::RunawayUpdate {
                    system: self.entries[index].system.name().to_string(),
                    iterations: self.update_guard,
                }
                .into());
            }
            let (entity, deadline) = world.work_queues_mut().pop(queue)?;
            self.entries[index].system.update_entity(world, entity, deadline)?;
        }
        Ok(())
    }

    fn process_all(&mut self, world: &mut World) -> EcsResult<()> {
        for entry in &mut self.entries {
            entry.system.process_events(world)?;
        }
        Ok(())
    }

    /// Advances the simulation to `host_time + offset`.
    ///
    /// Publishes events, processes them, and drains scheduled work in
    /// dependency order until the bus quiesces, then runs the frame
    /// systems' `update_frame`.
    pub fn tick(&mut self, world: &mut World, host_time: f64) -> EcsResult<()> {
        if !self.initialized {
            self.initialize();
        }
        let t = host_time + self.time_offset;
        world.set_sim_time(t);

        loop {
            world.events_mut().swap_buffers();
            self.process_all(world)?;

            let emitted_before = world.events().emitted_total();
            loop {
                let Some((index, deadline)) = self.pick_scheduled(world) else {
                    break;
                };
                if deadline > t {
                    break;
                }
                let mut max_time = t;
                for dep in self.entries[index].depends_on.clone() {
                    if let Some(dep_deadline) = self.next_deadline(dep, world) {
                        max_time = max_time.min(dep_deadline);
                    }
                }
                let before = world.events().emitted_total();
                self.update_to(index, world, max_time)?;
                // Anything emitted must be published before dependents
                // advance through the same deadline.
                if world.events().emitted_total() != before {
                    break;
                }
            }
            if world.events().emitted_total() == emitted_before {
                break;
            }
        }

        for index in 0..self.entries.len() {
            if self.entries[index].kind == SystemKind::Frame {
                self.entries[index].system.update_frame(world, t)?;
            }
        }
        Ok(())
    }

    /// Finishes the tick after the host: frame completion, one more
    /// publish/process round for late emissions, and the entity-destruction
    /// drain.
    pub fn finish_tick(&mut self, world: &mut World, host_time: f64) -> EcsResult<()> {
        let t = host_time + self.time_offset;
        for index in 0..self.entries.len() {
            if self.entries[index].kind == SystemKind::Frame {
                self.entries[index].system.complete_update(world)?;
            }
        }

        world.events_mut().swap_buffers();
        self.process_all(world)?;

        let destroyed = world.apply_destroy_events()?;
        if destroyed > 0 {
            log::debug!("destroyed {} entities at end of tick {}", destroyed, t);
        }
        Ok(())
    }
}
