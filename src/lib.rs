//! # Taxa ECS
//!
//! Data-oriented Entity-Component-System runtime that organizes component
//! records into dense, contiguously indexed groups (*taxa*) so that
//! iteration over any subset of entities matching a declared shape
//! (*archetype*) and a set of exact-match discriminator values (*filters*)
//! is a linear scan over aligned arrays.
//!
//! ## Design Goals
//! - Taxon-grouped dense storage for cache efficiency
//! - Cross-pool co-location: parallel slices share one entity order
//! - Batched reconciliation of structural changes
//! - Event-driven scheduling with inferred dependencies
//!
//! ## Typical flow
//! Register component types and archetypes, initialize, create entities
//! and attach components (marking them dirty), reconcile, then query:
//! each pool serves position-parallel slices per matched taxon.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Core world types

pub use engine::world::{
    FilterCombination,
    World,
    WorldConfig,
    WorldSnapshot,
};

pub use engine::entity::EntityAllocator;

pub use engine::types::{
    ArchetypeIndex,
    ComponentIndex,
    ComponentKind,
    Entity,
    EventTypeIndex,
    FilterCombinationIndex,
    FilterInstanceIndex,
    QueueIndex,
    TaxonId,
    TypeIndex,
    TypeSet,
    TAXON_DEFAULT,
    TAXON_NULL,
    TAXON_PROTOTYPE,
};

// Pools and accessors

pub use engine::pool::{Component, FilterInstanceTable, FilterValue, Pool, PoolSnapshot};
pub use engine::data_pool::{DataPool, DataSlice, DataSliceMut};
pub use engine::list_pool::{ListMut, ListPool, ListRef, ListSlice};
pub use engine::filter_pool::{FilterPool, FilterSlice, LocalFilterId};

// Queries

pub use engine::query::{Query, QueryBuilder};

// Events and scheduling

pub use engine::events::{
    ComponentCreated,
    ComponentDestroyed,
    DestroyEntityEvent,
    Emitter,
    EventBus,
    ListCreated,
    ListDestroyed,
};
pub use engine::priority::{PriorityQueue, WorkQueues};
pub use engine::scheduler::Scheduler;
pub use engine::systems::System;

// Primitives

pub use engine::nested::NestedList;
pub use engine::registry::{FallbackLoader, NamedRegistry, Registry};

// Errors

pub use engine::error::{
    AllocError,
    EcsError,
    EcsResult,
    EmptyQueueError,
    PoolError,
    RegistryError,
    ScheduleError,
    WorldError,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used engine types.
///
/// Import with:
/// ```rust
/// use taxa_ecs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Component,
        EcsResult,
        Entity,
        FilterValue,
        Query,
        Scheduler,
        System,
        World,
        WorldConfig,
    };
}
