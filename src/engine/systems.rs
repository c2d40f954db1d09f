//! System abstractions.
//!
//! A **system** is a unit of logic driven by the scheduler. All three kinds
//! share the [`System`] trait and its `process_events` entry; the other
//! hooks have default no-op implementations and are exercised according to
//! how the system was registered:
//!
//! - **Passive** — only `process_events`, run once per event publish.
//! - **Scheduled** — owns a named work queue of `(entity, deadline)` pairs;
//!   the scheduler drains it in deadline order through `update_entity`.
//!   Updates may schedule follow-up work on any queue or emit events.
//! - **Frame** — `update_frame` once per host tick, `complete_update` after
//!   the host finishes its tick.
//!
//! ## Event dependencies
//!
//! Systems declare which event types they emit and listen to at
//! registration. For every event type with at least one scheduled emitter
//! and one scheduled listener, each listener gains a dependency edge on
//! each emitter; the scheduler uses these edges to throttle listeners so
//! they never advance past the simulation time of an emitter that could
//! still produce events they must observe.

use crate::engine::error::EcsResult;
use crate::engine::types::Entity;
use crate::engine::world::World;


/// A unit of executable logic driven by the scheduler.
///
/// Systems receive exclusive world access and run to completion; the core
/// is single-threaded cooperative at the system level. Parallelism, if
/// any, is launched explicitly from inside a system over pool slices.
pub trait System: Send {
    /// Human-readable name, used in diagnostics and guard errors.
    fn name(&self) -> &'static str;

    /// Reacts to the events published by the latest buffer swap.
    fn process_events(&mut self, world: &mut World) -> EcsResult<()>;

    /// Processes one scheduled entity at its deadline (scheduled systems).
    fn update_entity(&mut self, _world: &mut World, _entity: Entity, _time: f64) -> EcsResult<()> {
        Ok(())
    }

    /// Runs once per host tick (frame systems).
    fn update_frame(&mut self, _world: &mut World, _time: f64) -> EcsResult<()> {
        Ok(())
    }

    /// Runs after the host finishes its tick (frame systems).
    fn complete_update(&mut self, _world: &mut World) -> EcsResult<()> {
        Ok(())
    }
}
