//! Event bus with double-buffered channels.
//!
//! Every event type owns a pair of queues: an **emit buffer** that emitters
//! append to during the current phase, and a **listen buffer** that
//! listeners iterate. [`EventBus::swap_buffers`] is the *only* moment
//! emitted events become visible: it clears the listen buffer and moves the
//! emit buffer into it.
//!
//! ## Visibility rule
//! An event emitted at simulation time `t` is observable by listeners only
//! after the next swap. Systems therefore never react to events produced in
//! the same phase they run in; the scheduler's tick loop re-runs
//! `process_events` after each swap until the bus quiesces.
//!
//! ## Component lifecycle events
//! Pools emit [`ComponentCreated`] / [`ComponentDestroyed`] (and the list
//! equivalents) when the corresponding flag is enabled. The flags are
//! enabled lazily by listener subscription through the world, so untracked
//! component types pay nothing.
//!
//! ## Entity destruction
//! Entity teardown is routed through [`DestroyEntityEvent`]: systems emit
//! it, and the scheduler's end-of-tick drain hands the accumulated requests
//! to the world's destroy path.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;

use crate::engine::error::{EcsResult, RegistryError};
use crate::engine::types::{Entity, EventTypeIndex};


/// Emitted by a pool when a record is created for a non-prototype entity.
#[derive(Clone, Copy, Debug)]
pub struct ComponentCreated<T> {
    /// Owner of the new record.
    pub entity: Entity,
    marker: PhantomData<fn() -> T>,
}

impl<T> ComponentCreated<T> {
    /// Builds a creation event for `entity`.
    pub fn new(entity: Entity) -> Self {
        Self { entity, marker: PhantomData }
    }
}

/// Emitted by a data pool when a record is destroyed.
///
/// Carries the value as it was just before destruction.
#[derive(Clone, Copy, Debug)]
pub struct ComponentDestroyed<T> {
    /// Former owner of the record.
    pub entity: Entity,
    /// The value the record held when destroyed.
    pub value: T,
}

/// Emitted by a list pool when a list record is created for a non-prototype
/// entity.
#[derive(Clone, Copy, Debug)]
pub struct ListCreated<T> {
    /// Owner of the new list.
    pub entity: Entity,
    marker: PhantomData<fn() -> T>,
}

impl<T> ListCreated<T> {
    /// Builds a creation event for `entity`.
    pub fn new(entity: Entity) -> Self {
        Self { entity, marker: PhantomData }
    }
}

/// Emitted by a list pool when a list record is destroyed.
#[derive(Clone, Copy, Debug)]
pub struct ListDestroyed<T> {
    /// Former owner of the list.
    pub entity: Entity,
    marker: PhantomData<fn() -> T>,
}

impl<T> ListDestroyed<T> {
    /// Builds a destruction event for `entity`.
    pub fn new(entity: Entity) -> Self {
        Self { entity, marker: PhantomData }
    }
}

/// Request to destroy an entity at the end of the current tick.
///
/// Emitting this instead of calling the destroy path directly guarantees
/// that every system observes the entity's component destruction events
/// before its id is recycled.
#[derive(Clone, Copy, Debug)]
pub struct DestroyEntityEvent {
    /// The entity to destroy.
    pub entity: Entity,
}

trait EventChannel: Send + Sync {
    fn swap(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct TypedChannel<E: Send + Sync + 'static> {
    listen: Vec<E>,
    emit: Vec<E>,
}

impl<E: Send + Sync + 'static> TypedChannel<E> {
    fn new() -> Self {
        Self { listen: Vec::new(), emit: Vec::new() }
    }
}

impl<E: Send + Sync + 'static> EventChannel for TypedChannel<E> {
    fn swap(&mut self) {
        self.listen.clear();
        std::mem::swap(&mut self.listen, &mut self.emit);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Write handle onto an event type's emit buffer.
pub struct Emitter<'a, E> {
    queue: &'a mut Vec<E>,
    emitted: &'a mut u64,
}

impl<E> Emitter<'_, E> {
    /// Appends an event. It becomes visible at the next buffer swap.
    pub fn emit(&mut self, event: E) {
        self.queue.push(event);
        *self.emitted += 1;
    }
}

/// Type-indexed event bus with double-buffered channels.
pub struct EventBus {
    channels: Vec<Box<dyn EventChannel>>,
    by_type: HashMap<TypeId, EventTypeIndex>,
    emitted_total: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            by_type: HashMap::new(),
            emitted_total: 0,
        }
    }
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns event type `E`, returning its stable index.
    pub fn register<E: Send + Sync + 'static>(&mut self) -> EcsResult<EventTypeIndex> {
        let type_id = TypeId::of::<E>();
        if let Some(&index) = self.by_type.get(&type_id) {
            return Ok(index);
        }
        if self.channels.len() >= u16::MAX as usize {
            return Err(RegistryError::CapacityExceeded { cap: u16::MAX as usize }.into());
        }
        let index = self.channels.len() as EventTypeIndex;
        self.by_type.insert(type_id, index);
        self.channels.push(Box::new(TypedChannel::<E>::new()));
        Ok(index)
    }

    /// Returns the index of event type `E`, if registered.
    pub fn type_index_of<E: Send + Sync + 'static>(&self) -> Option<EventTypeIndex> {
        self.by_type.get(&TypeId::of::<E>()).copied()
    }

    /// Appends an event of type `E`, registering the channel on first use.
    pub fn emit<E: Send + Sync + 'static>(&mut self, event: E) -> EcsResult<()> {
        let index = self.register::<E>()?;
        let channel = self.channels[index as usize]
            .as_any_mut()
            .downcast_mut::<TypedChannel<E>>()
            .expect("channel type is keyed by TypeId");
        channel.emit.push(event);
        self.emitted_total += 1;
        Ok(())
    }

    /// Returns a reusable write handle for event type `E`.
    pub fn emitter<E: Send + Sync + 'static>(&mut self) -> EcsResult<Emitter<'_, E>> {
        let index = self.register::<E>()?;
        let channel = self.channels[index as usize]
            .as_any_mut()
            .downcast_mut::<TypedChannel<E>>()
            .expect("channel type is keyed by TypeId");
        Ok(Emitter { queue: &mut channel.emit, emitted: &mut self.emitted_total })
    }

    /// Returns the published events of type `E`.
    ///
    /// Empty until the channel exists and a swap has published something.
    pub fn listener<E: Send + Sync + 'static>(&self) -> &[E] {
        let Some(&index) = self.by_type.get(&TypeId::of::<E>()) else {
            return &[];
        };
        let channel = self.channels[index as usize]
            .as_any()
            .downcast_ref::<TypedChannel<E>>()
            .expect("channel type is keyed by TypeId");
        &channel.listen
    }

    /// Publishes all emitted events.
    ///
    /// For every channel: the listen buffer is cleared and the emit buffer
    /// moves into it, leaving the emit buffer empty. This is the only point
    /// at which listeners observe new events.
    pub fn swap_buffers(&mut self) {
        for channel in &mut self.channels {
            channel.swap();
        }
    }

    /// Cumulative count of events emitted since the bus was created.
    ///
    /// The scheduler compares this across phases to detect quiescence.
    #[inline]
    pub fn emitted_total(&self) -> u64 {
        self.emitted_total
    }

    /// Number of registered event types.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
