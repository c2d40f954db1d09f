//! Error types for the taxon engine.
//!
//! This module declares focused, composable error types used across the
//! entity–component storage, taxonization, query, and scheduling layers.
//! Each error carries enough context to make failures actionable while
//! remaining small and cheap to pass around or convert into the aggregate
//! [`EcsError`].
//!
//! ## Goals
//! * **Specificity:** Each error type models a single failure family (e.g.
//!   registry misuse, id-space exhaustion, pool contract violations).
//! * **Ergonomics:** All errors implement [`std::error::Error`] and
//!   [`fmt::Display`], and provide `From<T>` conversions into [`EcsError`]
//!   so `?` bubbles failures upward.
//! * **Actionability:** Structured fields (offending entity, type index,
//!   capacity limits) make logs useful without reproducing the issue.
//!
//! ## Disposition
//! Recoverable conditions (an unseen filter value at query time) surface as
//! empty results, never as errors. Everything in this module is categorical:
//! a returned error means a contract or invariant was violated, or a
//! capacity was exhausted, and the engine state is not guaranteed usable
//! afterwards.
//!
//! ## Display vs. Debug
//! * [`fmt::Display`] is optimized for operator logs (short, imperative
//!   phrasing).
//! * [`fmt::Debug`] (derived) retains full structure for diagnostics.

use std::fmt;

use crate::engine::types::{Entity, QueueIndex, TaxonId, TypeIndex, ComponentKind};


/// Crate-wide result alias.
pub type EcsResult<T> = Result<T, EcsError>;

/// Errors raised by interning registries.
///
/// ## Context
/// Registries hand out stable 16-bit indices; these errors cover index-space
/// exhaustion and named-lookup failures.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry's 16-bit index space (or a configured cap) is exhausted.
    CapacityExceeded {
        /// Maximum number of entries the registry can hold.
        cap: usize,
    },

    /// A name was registered twice.
    DuplicateName {
        /// The offending name.
        name: String,
    },

    /// A name lookup missed and no fallback loader was installed.
    MissingEntry {
        /// The name that could not be resolved.
        name: String,
    },

    /// An index was out of bounds for the registry.
    IndexOutOfBounds {
        /// Offending index.
        index: usize,
        /// Number of interned entries.
        len: usize,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::CapacityExceeded { cap } => {
                write!(f, "registry capacity exceeded (cap {})", cap)
            }
            RegistryError::DuplicateName { name } => {
                write!(f, "name already registered: {}", name)
            }
            RegistryError::MissingEntry { name } => {
                write!(f, "no entry named {} and no fallback loader installed", name)
            }
            RegistryError::IndexOutOfBounds { index, len } => {
                write!(f, "registry index {} out of bounds (len {})", index, len)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Returned when the 31-bit entity id space is exhausted, or a dead handle
/// is passed where a live one is required.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// No more entity ids can be issued.
    IdSpaceExhausted {
        /// Ids issued so far.
        issued: u64,
        /// The hard ceiling of the id space.
        capacity: u64,
    },

    /// A handle referred to a destroyed or never-issued entity.
    StaleEntity {
        /// The offending handle.
        entity: Entity,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::IdSpaceExhausted { issued, capacity } => {
                write!(f, "entity id space exhausted ({} issued; capacity {})", issued, capacity)
            }
            AllocError::StaleEntity { entity } => {
                write!(f, "stale or dead entity reference: {:?}", entity)
            }
        }
    }
}

impl std::error::Error for AllocError {}

/// Errors raised by component pools.
///
/// ## Context
/// Pools enforce the programmer contract of the storage layer: one record
/// per entity per type, prototypes pinned to their reserved taxon, packed
/// address limits respected.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// `add` was called for an entity that already has a record.
    DuplicateComponent {
        /// The offending entity.
        entity: Entity,
        /// Type of the pool.
        type_index: TypeIndex,
    },

    /// An operation required a record the entity does not have.
    MissingComponent {
        /// The offending entity.
        entity: Entity,
        /// Type of the pool.
        type_index: TypeIndex,
    },

    /// A taxon migration was requested for a prototype entity.
    PrototypeTaxonChange {
        /// The offending prototype.
        entity: Entity,
    },

    /// A taxon's entry count reached the packed-address limit.
    EntryOverflow {
        /// The full taxon.
        taxon: TaxonId,
        /// Entries currently stored.
        entries: usize,
    },

    /// A taxon id exceeded the packed-address taxon range.
    TaxonOutOfRange {
        /// The offending taxon id.
        taxon: TaxonId,
    },

    /// A list element index was out of bounds.
    ElementOutOfBounds {
        /// Offending element index.
        index: usize,
        /// Length of the list.
        len: usize,
    },

    /// The unique-value table of a filter pool is full.
    FilterTableFull {
        /// Maximum number of unique values.
        cap: usize,
    },

    /// A snapshot could not be decoded back into pool storage.
    CorruptSnapshot {
        /// What was inconsistent.
        reason: &'static str,
    },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::DuplicateComponent { entity, type_index } => {
                write!(f, "entity {:?} already has a component of type {}", entity, type_index)
            }
            PoolError::MissingComponent { entity, type_index } => {
                write!(f, "entity {:?} has no component of type {}", entity, type_index)
            }
            PoolError::PrototypeTaxonChange { entity } => {
                write!(f, "cannot change the taxon of prototype {:?}", entity)
            }
            PoolError::EntryOverflow { taxon, entries } => {
                write!(f, "taxon {} is full ({} entries)", taxon, entries)
            }
            PoolError::TaxonOutOfRange { taxon } => {
                write!(f, "taxon id {} exceeds the addressable range", taxon)
            }
            PoolError::ElementOutOfBounds { index, len } => {
                write!(f, "list element {} out of bounds (len {})", index, len)
            }
            PoolError::FilterTableFull { cap } => {
                write!(f, "filter unique-value table full (cap {})", cap)
            }
            PoolError::CorruptSnapshot { reason } => {
                write!(f, "corrupt pool snapshot: {}", reason)
            }
        }
    }
}

impl std::error::Error for PoolError {}

/// Errors raised by the world's lifecycle and taxonization layer.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// An operation required `initialize` to have run.
    NotInitialized,

    /// `initialize` was called twice.
    AlreadyInitialized,

    /// An archetype was declared after `initialize`.
    ArchetypeAfterInitialize,

    /// A component type was registered after `initialize`.
    TypeAfterInitialize,

    /// An operation required an empty dirty set; reconcile first.
    PendingChanges {
        /// Number of entities awaiting reconciliation.
        count: usize,
    },

    /// A component type was used without being registered.
    UnregisteredType {
        /// Rust type name for diagnostics.
        name: &'static str,
    },

    /// A component type was used through the wrong pool kind.
    KindMismatch {
        /// The offending type.
        type_index: TypeIndex,
        /// Kind the operation expected.
        expected: ComponentKind,
        /// Kind the type was registered with.
        actual: ComponentKind,
    },

    /// `instantiate` was called with a non-prototype source.
    NotAPrototype {
        /// The offending handle.
        entity: Entity,
    },

    /// An archetype was declared with no members.
    EmptyArchetype,

    /// An archetype index was out of bounds.
    UnknownArchetype {
        /// The offending index.
        index: usize,
    },

    /// The 12-bit taxon id space is exhausted.
    TaxonCapacity {
        /// Maximum number of taxa.
        cap: usize,
    },
}

impl fmt::Display for WorldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldError::NotInitialized => f.write_str("world has not been initialized"),
            WorldError::AlreadyInitialized => f.write_str("world is already initialized"),
            WorldError::ArchetypeAfterInitialize => {
                f.write_str("archetypes must be declared before initialize")
            }
            WorldError::TypeAfterInitialize => {
                f.write_str("component types must be registered before initialize")
            }
            WorldError::PendingChanges { count } => {
                write!(f, "{} dirty entities pending; reconcile before this operation", count)
            }
            WorldError::UnregisteredType { name } => {
                write!(f, "component type not registered: {}", name)
            }
            WorldError::KindMismatch { type_index, expected, actual } => {
                write!(
                    f,
                    "type {} is a {} component, operation expected {}",
                    type_index, actual, expected
                )
            }
            WorldError::NotAPrototype { entity } => {
                write!(f, "entity {:?} is not a prototype", entity)
            }
            WorldError::EmptyArchetype => f.write_str("archetype contains no members"),
            WorldError::UnknownArchetype { index } => {
                write!(f, "unknown archetype index {}", index)
            }
            WorldError::TaxonCapacity { cap } => {
                write!(f, "taxon id space exhausted (cap {})", cap)
            }
        }
    }
}

impl std::error::Error for WorldError {}

/// Returned when `pop`, `peek`, or `top_priority` is called on an empty
/// priority queue.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyQueueError;

impl fmt::Display for EmptyQueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation on empty priority queue")
    }
}

impl std::error::Error for EmptyQueueError {}

/// Errors raised by the scheduler and work-queue layer.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// A single `update_to` call exceeded the configured iteration bound.
    ///
    /// This is loop detection: a system kept rescheduling work at or before
    /// the current advance bound.
    RunawayUpdate {
        /// Name of the offending system.
        system: String,
        /// Iterations performed before the guard fired.
        iterations: usize,
    },

    /// A queue index did not name an existing work queue.
    UnknownQueue {
        /// The offending index.
        index: QueueIndex,
    },

    /// A work queue name was registered twice.
    DuplicateQueue {
        /// The offending name.
        name: String,
    },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::RunawayUpdate { system, iterations } => {
                write!(
                    f,
                    "system {} exceeded {} updates in a single advance; runaway loop suspected",
                    system, iterations
                )
            }
            ScheduleError::UnknownQueue { index } => {
                write!(f, "unknown work queue {}", index)
            }
            ScheduleError::DuplicateQueue { name } => {
                write!(f, "work queue already registered: {}", name)
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

/// Aggregate error for all engine operations.
///
/// `From<T>` conversions are implemented for every error family so callers
/// can write `?` and still return a single, expressive type.

#[derive(Debug, Clone, PartialEq)]
pub enum EcsError {
    /// A registry operation failed.
    Registry(RegistryError),

    /// Entity allocation or liveness checking failed.
    Alloc(AllocError),

    /// A pool contract was violated.
    Pool(PoolError),

    /// A world lifecycle or taxonization invariant was violated.
    World(WorldError),

    /// A priority queue was misused.
    Queue(EmptyQueueError),

    /// The scheduler detected a fault.
    Schedule(ScheduleError),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::Registry(e) => write!(f, "{e}"),
            EcsError::Alloc(e) => write!(f, "{e}"),
            EcsError::Pool(e) => write!(f, "{e}"),
            EcsError::World(e) => write!(f, "{e}"),
            EcsError::Queue(e) => write!(f, "{e}"),
            EcsError::Schedule(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<RegistryError> for EcsError {
    fn from(e: RegistryError) -> Self { EcsError::Registry(e) }
}
impl From<AllocError> for EcsError {
    fn from(e: AllocError) -> Self { EcsError::Alloc(e) }
}
impl From<PoolError> for EcsError {
    fn from(e: PoolError) -> Self { EcsError::Pool(e) }
}
impl From<WorldError> for EcsError {
    fn from(e: WorldError) -> Self { EcsError::World(e) }
}
impl From<EmptyQueueError> for EcsError {
    fn from(e: EmptyQueueError) -> Self { EcsError::Queue(e) }
}
impl From<ScheduleError> for EcsError {
    fn from(e: ScheduleError) -> Self { EcsError::Schedule(e) }
}
