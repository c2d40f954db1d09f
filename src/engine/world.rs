//! # World and Taxonizer
//!
//! The [`World`] owns the entity id space, the component type and archetype
//! registries, the filter-combination and taxon registries, the per-entity
//! taxonomy bookkeeping, the dirty set, the event bus, and the work queues.
//! All structural mutation flows through its entry points.
//!
//! ## Taxonization
//!
//! Every component record lives in exactly one *taxon*, the storage bucket
//! named by a `(meta-archetype, filter-combination)` pair. The compound
//! invariant the world maintains is co-location: for every entity, the
//! taxon of each of its records agrees across every pool that stores one of
//! its components, and the entity's position inside one pool's taxon equals
//! its position in every other pool's same taxon. Queries rely on this to
//! zip pool slices position-parallel.
//!
//! ## Reconciliation
//!
//! Component adds, removes, and filter changes mark the owning entity
//! *dirty*; records stay in their staging taxon until
//! [`World::process_component_changes`] runs. Reconciliation recomputes, per
//! dirty entity:
//!
//! 1. the filter combination (interning each current filter value),
//! 2. the matched archetype set (cached by component type set),
//! 3. the meta-archetype set (greedy union closure of the matched
//!    archetypes; overlapping bags merge until no two share a component
//!    without one containing the other),
//! 4. the target taxon of every component type, migrating each pool record
//!    via `update_taxon`.
//!
//! Filter-kind types the entity holds that no matched archetype declares
//! are adopted into the filter set of the first closure bag (canonical
//! order), so their values keep partitioning the entity's storage; with no
//! matched archetype at all such records fall back to the default taxon.
//!
//! ## Prototypes
//!
//! Prototype entities are templates: their records live permanently in the
//! reserved prototype taxon, they never become dirty, and
//! [`World::instantiate`] stamps out fully reconciled copies of them.

use std::any::{type_name, TypeId};
use std::collections::HashMap;

use crate::engine::data_pool::DataPool;
use crate::engine::entity::EntityAllocator;
use crate::engine::error::{AllocError, EcsResult, RegistryError, WorldError};
use crate::engine::events::{
    ComponentCreated, ComponentDestroyed, DestroyEntityEvent, EventBus, ListCreated,
    ListDestroyed,
};
use crate::engine::filter_pool::FilterPool;
use crate::engine::list_pool::ListPool;
use crate::engine::pool::{
    Component, FilterInstanceTable, FilterValue, Pool, PoolSnapshot,
};
use crate::engine::priority::WorkQueues;
use crate::engine::query::{Query, QueryBuilder};
use crate::engine::registry::{NamedRegistry, Registry};
use crate::engine::types::{
    ArchetypeIndex, ComponentKind, Entity, EventTypeIndex, FilterCombinationIndex,
    FilterInstanceIndex, MetaArchetypeIndex, QueueIndex, TaxonId, TypeIndex, TypeSet,
    TAXON_CAP, TAXON_DEFAULT, TYPE_CAP,
};


/// Tunable world parameters.
#[derive(Clone, Copy, Debug)]
pub struct WorldConfig {
    /// Reserve hint for the entity id space.
    pub entity_capacity: usize,
    /// Iteration bound for a single scheduled-system advance before the
    /// runaway guard fires.
    pub max_updates_per_call: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self { entity_capacity: 1024, max_updates_per_call: 10_000 }
    }
}

/// Interned set of filter instance indices.
///
/// Instances are kept sorted and deduplicated so combinations compare and
/// hash by content. The empty combination is the default and always interns
/// to index 0.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct FilterCombination {
    instances: Vec<FilterInstanceIndex>,
}

impl FilterCombination {
    /// Builds a combination from arbitrary-order instances.
    pub fn new(mut instances: Vec<FilterInstanceIndex>) -> Self {
        instances.sort_unstable();
        instances.dedup();
        Self { instances }
    }

    /// The empty (default) combination.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The member instances, sorted ascending.
    pub fn instances(&self) -> &[FilterInstanceIndex] {
        &self.instances
    }

    /// Number of member instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns `true` for the empty combination.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Returns `true` if `instance` is a member.
    pub fn contains(&self, instance: FilterInstanceIndex) -> bool {
        self.instances.binary_search(&instance).is_ok()
    }

    /// Returns `true` if every member of `self` is in `other`.
    pub fn is_subset_of(&self, other: &FilterCombination) -> bool {
        self.instances.iter().all(|&i| other.contains(i))
    }
}

/// User-declared archetype bag.
#[derive(Clone, Debug)]
struct ArchetypeDef {
    components: TypeSet,
    filters: TypeSet,
}

/// Derived meta-archetype bag.
#[derive(Clone, Debug)]
struct MetaArchetype {
    components: TypeSet,
    filters: TypeSet,
}

/// Identity of one taxon.
#[derive(Clone, Copy, Debug)]
struct TaxonDesc {
    meta: MetaArchetypeIndex,
    combination: FilterCombinationIndex,
}

/// Snapshot of the world and every registered pool.
///
/// The save/load collaborator persists these byte arrays opaquely; loading
/// replays pool additions and reconciles, so taxon ids are recomputed
/// rather than stored.
#[derive(Clone, Debug)]
pub struct WorldSnapshot {
    /// Allocator slot array.
    pub entities: Vec<u8>,
    /// Allocator high-water mark.
    pub next_free: u32,
    /// Allocator free-list head.
    pub recycle_next: u32,
    /// Simulation clock at capture time.
    pub sim_time: f64,
    /// Per-pool payload snapshots, keyed by type index.
    pub pools: Vec<(TypeIndex, PoolSnapshot)>,
}

/// The engine core: id space, registries, pools, taxonomy, events, queues.
pub struct World {
    config: WorldConfig,
    initialized: bool,

    allocator: EntityAllocator,
    types: NamedRegistry<ComponentKind>,
    pools: Vec<Option<Box<dyn Pool>>>,
    pool_by_type_id: HashMap<TypeId, TypeIndex>,

    archetypes: Vec<ArchetypeDef>,
    metas: Vec<MetaArchetype>,
    meta_lookup: HashMap<(TypeSet, TypeSet), MetaArchetypeIndex>,
    super_archetypes: Vec<Vec<MetaArchetypeIndex>>,
    default_meta: MetaArchetypeIndex,

    filter_instances: FilterInstanceTable,
    combinations: Registry<FilterCombination>,
    super_filters: Vec<Vec<FilterCombinationIndex>>,

    taxa: Vec<TaxonDesc>,
    taxon_lookup: HashMap<(MetaArchetypeIndex, FilterCombinationIndex), TaxonId>,

    component_types: Vec<TypeSet>,
    archetype_map: Vec<Vec<ArchetypeIndex>>,
    meta_map: Vec<Vec<MetaArchetypeIndex>>,
    combination_map: Vec<FilterCombinationIndex>,
    dirty: Vec<Entity>,
    dirty_flags: Vec<bool>,
    archetype_cache: HashMap<TypeSet, Vec<ArchetypeIndex>>,

    events: EventBus,
    work_queues: WorkQueues,
    sim_time: f64,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates a world with default configuration.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Creates a world with the given configuration.
    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            allocator: EntityAllocator::with_capacity(config.entity_capacity),
            config,
            initialized: false,
            types: NamedRegistry::new(),
            pools: Vec::new(),
            pool_by_type_id: HashMap::new(),
            archetypes: Vec::new(),
            metas: Vec::new(),
            meta_lookup: HashMap::new(),
            super_archetypes: Vec::new(),
            default_meta: 0,
            filter_instances: FilterInstanceTable::new(),
            combinations: Registry::new(),
            super_filters: Vec::new(),
            taxa: Vec::new(),
            taxon_lookup: HashMap::new(),
            component_types: Vec::new(),
            archetype_map: Vec::new(),
            meta_map: Vec::new(),
            combination_map: Vec::new(),
            dirty: Vec::new(),
            dirty_flags: Vec::new(),
            archetype_cache: HashMap::new(),
            events: EventBus::new(),
            work_queues: WorkQueues::new(),
            sim_time: 0.0,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    // ────────────────────────────────────────────────────────────────────
    // Component type registration
    // ────────────────────────────────────────────────────────────────────

    fn register_type<P: Pool + 'static>(
        &mut self,
        name: &str,
        kind: ComponentKind,
        type_id: TypeId,
        make_pool: impl FnOnce(TypeIndex) -> P,
    ) -> EcsResult<TypeIndex> {
        if self.initialized {
            return Err(WorldError::TypeAfterInitialize.into());
        }
        if self.pool_by_type_id.contains_key(&type_id) {
            return Err(RegistryError::DuplicateName { name: name.to_string() }.into());
        }
        if self.types.len() >= TYPE_CAP {
            return Err(RegistryError::CapacityExceeded { cap: TYPE_CAP }.into());
        }
        let type_index = self.types.add(name, kind)?;
        self.pools.push(Some(Box::new(make_pool(type_index))));
        self.pool_by_type_id.insert(type_id, type_index);
        Ok(type_index)
    }

    /// Registers a data component type under `name`.
    pub fn register_data<T: Component>(&mut self, name: &str) -> EcsResult<TypeIndex> {
        self.register_type(name, ComponentKind::Data, TypeId::of::<T>(), DataPool::<T>::new)
    }

    /// Registers a list component type under `name`.
    pub fn register_list<T: Component>(&mut self, name: &str) -> EcsResult<TypeIndex> {
        self.register_type(name, ComponentKind::List, TypeId::of::<T>(), ListPool::<T>::new)
    }

    /// Registers a filter component type under `name`.
    pub fn register_filter<T: FilterValue>(&mut self, name: &str) -> EcsResult<TypeIndex> {
        self.register_type(name, ComponentKind::Filter, TypeId::of::<T>(), FilterPool::<T>::new)
    }

    /// The interned index of component type `T`.
    pub fn type_index_of<T: 'static>(&self) -> EcsResult<TypeIndex> {
        self.pool_by_type_id
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or_else(|| WorldError::UnregisteredType { name: type_name::<T>() }.into())
    }

    /// The kind a type index was registered with.
    pub fn type_kind(&self, type_index: TypeIndex) -> EcsResult<ComponentKind> {
        Ok(*self.types.require(type_index)?)
    }

    /// The name a type index was registered under.
    pub fn type_name(&self, type_index: TypeIndex) -> Option<&str> {
        self.types.name(type_index)
    }

    /// Number of registered component types.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    // ────────────────────────────────────────────────────────────────────
    // Archetypes and initialization
    // ────────────────────────────────────────────────────────────────────

    /// Declares an archetype from a list of registered component types.
    ///
    /// The engine classifies each member by its registered kind: data and
    /// list types form the component bag, filter types the filter bag.
    ///
    /// ## Errors
    /// Fatal after `initialize`, for an empty member list, or for
    /// unregistered indices.
    pub fn add_archetype(&mut self, members: &[TypeIndex]) -> EcsResult<ArchetypeIndex> {
        if self.initialized {
            return Err(WorldError::ArchetypeAfterInitialize.into());
        }
        if members.is_empty() {
            return Err(WorldError::EmptyArchetype.into());
        }
        let mut components = TypeSet::default();
        let mut filters = TypeSet::default();
        for &member in members {
            match self.type_kind(member)? {
                ComponentKind::Data | ComponentKind::List => components.set(member),
                ComponentKind::Filter => filters.set(member),
            }
        }
        let index = self.archetypes.len() as ArchetypeIndex;
        self.archetypes.push(ArchetypeDef { components, filters });
        Ok(index)
    }

    /// Number of declared archetypes.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Seals the archetype set and prepares the taxonomy registries.
    ///
    /// ## Behavior
    /// - Interns the empty filter combination (index 0).
    /// - Seeds one meta-archetype per declared archetype and the default
    ///   meta-archetype, building the super-archetype map as it goes: a
    ///   meta `M` is a super of archetype `A` iff `A`'s components and
    ///   filters are both subsets of `M`'s.
    /// - Seeds the three reserved taxa and binds the default meta-archetype
    ///   to the default taxon.
    ///
    /// ## Errors
    /// Fatal when called twice.
    pub fn initialize(&mut self) -> EcsResult<()> {
        if self.initialized {
            return Err(WorldError::AlreadyInitialized.into());
        }

        self.super_archetypes = vec![Vec::new(); self.archetypes.len()];

        let empty = self.intern_combination(FilterCombination::empty())?;
        debug_assert_eq!(empty, 0);

        for i in 0..self.archetypes.len() {
            let def = self.archetypes[i].clone();
            self.intern_meta(def.components, def.filters)?;
        }
        self.default_meta = self.intern_meta(TypeSet::default(), TypeSet::default())?;

        // Reserved taxa: null, prototype, default.
        let reserved = TaxonDesc { meta: self.default_meta, combination: empty };
        self.taxa = vec![reserved; 3];
        self.taxon_lookup.insert((self.default_meta, empty), TAXON_DEFAULT);

        self.events.register::<DestroyEntityEvent>()?;

        self.initialized = true;
        log::info!(
            "world initialized: {} component types, {} archetypes, {} meta-archetypes",
            self.types.len(),
            self.archetypes.len(),
            self.metas.len()
        );
        Ok(())
    }

    /// Returns `true` once `initialize` has run.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn ensure_initialized(&self) -> EcsResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(WorldError::NotInitialized.into())
        }
    }

    fn intern_meta(&mut self, components: TypeSet, filters: TypeSet) -> EcsResult<MetaArchetypeIndex> {
        if let Some(&index) = self.meta_lookup.get(&(components, filters)) {
            return Ok(index);
        }
        if self.metas.len() >= u16::MAX as usize {
            return Err(RegistryError::CapacityExceeded { cap: u16::MAX as usize }.into());
        }
        let index = self.metas.len() as MetaArchetypeIndex;
        self.meta_lookup.insert((components, filters), index);
        self.metas.push(MetaArchetype { components, filters });

        for (a, def) in self.archetypes.iter().enumerate() {
            if components.contains_all(&def.components) && filters.contains_all(&def.filters) {
                self.super_archetypes[a].push(index);
            }
        }
        log::debug!(
            "meta-archetype {} interned ({} components, {} filters)",
            index,
            components.len(),
            filters.len()
        );
        Ok(index)
    }

    fn intern_combination(&mut self, combination: FilterCombination) -> EcsResult<FilterCombinationIndex> {
        if let Some(index) = self.combinations.index_of(&combination) {
            return Ok(index);
        }
        let index = self.combinations.intern(combination.clone())?;
        self.super_filters.push(Vec::new());
        // Maintain superset links in both directions.
        for i in 0..index {
            let existing = self.combinations.get(i).expect("interned below index");
            if existing.len() < combination.len() && existing.is_subset_of(&combination) {
                self.super_filters[i as usize].push(index);
            } else if combination.len() < existing.len() && combination.is_subset_of(existing) {
                self.super_filters[index as usize].push(i);
            }
        }
        Ok(index)
    }

    /// Resolves (allocating on first use) the taxon for a meta-archetype
    /// and a filter combination.
    ///
    /// The combination is first projected onto the meta-archetype's filter
    /// types: instances of undeclared filter types are erased before
    /// lookup.
    fn exact_taxon(
        &mut self,
        meta: MetaArchetypeIndex,
        combination: FilterCombinationIndex,
    ) -> EcsResult<TaxonId> {
        let filters = self.metas[meta as usize].filters;
        let full = self
            .combinations
            .get(combination)
            .expect("combination interned before taxon resolution")
            .clone();
        let projected: Vec<FilterInstanceIndex> = full
            .instances()
            .iter()
            .copied()
            .filter(|&instance| {
                self.filter_instances
                    .owner(instance)
                    .map(|owner| filters.has(owner))
                    .unwrap_or(false)
            })
            .collect();
        let projected = self.intern_combination(FilterCombination::new(projected))?;

        if let Some(&taxon) = self.taxon_lookup.get(&(meta, projected)) {
            return Ok(taxon);
        }
        if self.taxa.len() >= TAXON_CAP {
            return Err(WorldError::TaxonCapacity { cap: TAXON_CAP }.into());
        }
        let taxon = self.taxa.len() as TaxonId;
        self.taxa.push(TaxonDesc { meta, combination: projected });
        self.taxon_lookup.insert((meta, projected), taxon);
        log::debug!(
            "allocated taxon {} (meta-archetype {}, combination {})",
            taxon,
            meta,
            projected
        );
        Ok(taxon)
    }

    /// Number of taxa, including the three reserved ones.
    pub fn taxon_count(&self) -> usize {
        self.taxa.len()
    }

    /// Number of derived meta-archetypes.
    pub fn meta_archetype_count(&self) -> usize {
        self.metas.len()
    }

    // ────────────────────────────────────────────────────────────────────
    // Entities
    // ────────────────────────────────────────────────────────────────────

    /// Creates a fresh entity.
    ///
    /// ## Errors
    /// Fatal before `initialize`, while dirty entities await
    /// reconciliation, or when the 31-bit id space is exhausted.
    pub fn create_entity(&mut self, prototype: bool) -> EcsResult<Entity> {
        self.ensure_initialized()?;
        if !self.dirty.is_empty() {
            return Err(WorldError::PendingChanges { count: self.dirty.len() }.into());
        }
        let entity = self.allocator.create(prototype)?;
        let id = entity.id() as usize;
        if id >= self.component_types.len() {
            let len = id + 1;
            self.component_types.resize_with(len, TypeSet::default);
            self.archetype_map.resize_with(len, Vec::new);
            self.meta_map.resize_with(len, Vec::new);
            self.combination_map.resize(len, 0);
            self.dirty_flags.resize(len, false);
        }
        self.component_types[id] = TypeSet::default();
        self.archetype_map[id].clear();
        self.meta_map[id].clear();
        self.combination_map[id] = 0;
        self.dirty_flags[id] = false;
        Ok(entity)
    }

    /// Returns `true` if `entity` is live.
    pub fn has_entity(&self, entity: Entity) -> bool {
        self.allocator.contains(entity)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.allocator.live_count()
    }

    fn ensure_live(&self, entity: Entity) -> EcsResult<()> {
        if self.allocator.contains(entity) {
            Ok(())
        } else {
            Err(AllocError::StaleEntity { entity }.into())
        }
    }

    /// Destroys `entity`: every pool record first (emitting destruction
    /// events where enabled), then the id is recycled.
    pub fn destroy(&mut self, entity: Entity) -> EcsResult<()> {
        self.ensure_initialized()?;
        self.ensure_live(entity)?;

        let id = entity.id() as usize;
        let types: Vec<TypeIndex> = self.component_types[id].iter().collect();
        for type_index in types {
            let pool = self.pools[type_index as usize]
                .as_mut()
                .expect("registered type has a pool");
            pool.destroy(entity, &mut self.events)?;
        }

        self.component_types[id] = TypeSet::default();
        self.archetype_map[id].clear();
        self.meta_map[id].clear();
        self.combination_map[id] = 0;
        self.dirty_flags[id] = false;

        self.allocator.destroy(entity)
    }

    /// Creates a normal entity carrying copies of every component of
    /// `prototype`.
    ///
    /// The new entity acquires the prototype's component type set,
    /// archetype set, and filter combination, and each pool copies its
    /// record into the computed taxon; the result is fully reconciled and
    /// never enters the dirty set.
    pub fn instantiate(&mut self, prototype: Entity) -> EcsResult<Entity> {
        self.ensure_initialized()?;
        self.ensure_live(prototype)?;
        if !prototype.is_prototype() {
            return Err(WorldError::NotAPrototype { entity: prototype }.into());
        }

        let entity = self.create_entity(false)?;
        let types = self.component_types[prototype.id() as usize];
        self.component_types[entity.id() as usize] = types;

        let plan = self.taxonomy_plan(prototype, entity, types)?;
        for (type_index, taxon) in plan {
            let pool = self.pools[type_index as usize]
                .as_mut()
                .expect("registered type has a pool");
            pool.copy_record(prototype, entity, taxon, &mut self.events)?;
        }
        Ok(entity)
    }

    // ────────────────────────────────────────────────────────────────────
    // Component attachment (all mutation goes through the world)
    // ────────────────────────────────────────────────────────────────────

    /// Attaches a data component to `entity` and marks it dirty.
    pub fn add_data<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        self.ensure_live(entity)?;
        let type_index = self.type_index_of::<T>()?;
        let slot = self.pools[type_index as usize]
            .as_mut()
            .expect("registered type has a pool");
        let actual = slot.kind();
        let Some(pool) = slot.as_any_mut().downcast_mut::<DataPool<T>>() else {
            return Err(WorldError::KindMismatch {
                type_index,
                expected: ComponentKind::Data,
                actual,
            }
            .into());
        };
        pool.add(entity, value, &mut self.events)?;
        self.register_component_add(entity, type_index);
        Ok(())
    }

    /// Attaches a list component with the given initial capacity.
    pub fn add_list<T: Component>(&mut self, entity: Entity, capacity: usize) -> EcsResult<()> {
        self.ensure_live(entity)?;
        let type_index = self.type_index_of::<T>()?;
        let slot = self.pools[type_index as usize]
            .as_mut()
            .expect("registered type has a pool");
        let actual = slot.kind();
        let Some(pool) = slot.as_any_mut().downcast_mut::<ListPool<T>>() else {
            return Err(WorldError::KindMismatch {
                type_index,
                expected: ComponentKind::List,
                actual,
            }
            .into());
        };
        pool.add(entity, capacity, &mut self.events)?;
        self.register_component_add(entity, type_index);
        Ok(())
    }

    /// Attaches a filter component to `entity` and marks it dirty.
    pub fn add_filter<T: FilterValue>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        self.ensure_live(entity)?;
        let type_index = self.type_index_of::<T>()?;
        let slot = self.pools[type_index as usize]
            .as_mut()
            .expect("registered type has a pool");
        let actual = slot.kind();
        let Some(pool) = slot.as_any_mut().downcast_mut::<FilterPool<T>>() else {
            return Err(WorldError::KindMismatch {
                type_index,
                expected: ComponentKind::Filter,
                actual,
            }
            .into());
        };
        pool.add(entity, value, &mut self.filter_instances)?;
        self.register_component_add(entity, type_index);
        Ok(())
    }

    /// Replaces `entity`'s filter value and registers the change.
    ///
    /// The entity becomes dirty; its records migrate to the new taxon at
    /// the next reconciliation.
    pub fn set_filter<T: FilterValue>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        self.ensure_live(entity)?;
        let type_index = self.type_index_of::<T>()?;
        let slot = self.pools[type_index as usize]
            .as_mut()
            .expect("registered type has a pool");
        let actual = slot.kind();
        let Some(pool) = slot.as_any_mut().downcast_mut::<FilterPool<T>>() else {
            return Err(WorldError::KindMismatch {
                type_index,
                expected: ComponentKind::Filter,
                actual,
            }
            .into());
        };
        pool.set(entity, value, &mut self.filter_instances)?;
        self.register_filter_change(entity);
        Ok(())
    }

    /// Removes `entity`'s component of type `T` (any kind) and marks it
    /// dirty.
    pub fn remove_component<T: 'static>(&mut self, entity: Entity) -> EcsResult<()> {
        self.ensure_live(entity)?;
        let type_index = self.type_index_of::<T>()?;
        let pool = self.pools[type_index as usize]
            .as_mut()
            .expect("registered type has a pool");
        pool.destroy(entity, &mut self.events)?;
        self.register_component_remove(entity, type_index);
        Ok(())
    }

    /// Returns `true` if `entity` has a component of type `T`.
    pub fn has_component<T: 'static>(&self, entity: Entity) -> bool {
        let Ok(type_index) = self.type_index_of::<T>() else {
            return false;
        };
        self.pools[type_index as usize]
            .as_ref()
            .map(|pool| pool.has(entity))
            .unwrap_or(false)
    }

    /// Records a component addition in the entity's type set.
    pub fn register_component_add(&mut self, entity: Entity, type_index: TypeIndex) {
        self.component_types[entity.id() as usize].set(type_index);
        self.mark_dirty(entity);
    }

    /// Records a component removal in the entity's type set.
    pub fn register_component_remove(&mut self, entity: Entity, type_index: TypeIndex) {
        self.component_types[entity.id() as usize].clear(type_index);
        self.mark_dirty(entity);
    }

    /// Records a filter value change.
    pub fn register_filter_change(&mut self, entity: Entity) {
        self.mark_dirty(entity);
    }

    fn mark_dirty(&mut self, entity: Entity) {
        if entity.is_prototype() {
            return;
        }
        let id = entity.id() as usize;
        if !self.dirty_flags[id] {
            self.dirty_flags[id] = true;
            self.dirty.push(entity);
        }
    }

    /// Number of entities awaiting reconciliation.
    pub fn pending_changes(&self) -> usize {
        self.dirty.len()
    }

    // ────────────────────────────────────────────────────────────────────
    // Typed pool access
    // ────────────────────────────────────────────────────────────────────

    /// Shared access to the data pool of `T`.
    pub fn data<T: Component>(&self) -> EcsResult<&DataPool<T>> {
        let type_index = self.type_index_of::<T>()?;
        let pool = self.pools[type_index as usize]
            .as_ref()
            .expect("registered type has a pool");
        let actual = pool.kind();
        pool.as_any().downcast_ref::<DataPool<T>>().ok_or_else(|| {
            WorldError::KindMismatch { type_index, expected: ComponentKind::Data, actual }.into()
        })
    }

    /// Mutable access to the data pool of `T` (value writes only; structure
    /// changes go through the world).
    pub fn data_mut<T: Component>(&mut self) -> EcsResult<&mut DataPool<T>> {
        let type_index = self.type_index_of::<T>()?;
        let pool = self.pools[type_index as usize]
            .as_mut()
            .expect("registered type has a pool");
        let actual = pool.kind();
        pool.as_any_mut().downcast_mut::<DataPool<T>>().ok_or_else(|| {
            WorldError::KindMismatch { type_index, expected: ComponentKind::Data, actual }.into()
        })
    }

    /// Shared access to the list pool of `T`.
    pub fn lists<T: Component>(&self) -> EcsResult<&ListPool<T>> {
        let type_index = self.type_index_of::<T>()?;
        let pool = self.pools[type_index as usize]
            .as_ref()
            .expect("registered type has a pool");
        let actual = pool.kind();
        pool.as_any().downcast_ref::<ListPool<T>>().ok_or_else(|| {
            WorldError::KindMismatch { type_index, expected: ComponentKind::List, actual }.into()
        })
    }

    /// Mutable access to the list pool of `T`.
    pub fn lists_mut<T: Component>(&mut self) -> EcsResult<&mut ListPool<T>> {
        let type_index = self.type_index_of::<T>()?;
        let pool = self.pools[type_index as usize]
            .as_mut()
            .expect("registered type has a pool");
        let actual = pool.kind();
        pool.as_any_mut().downcast_mut::<ListPool<T>>().ok_or_else(|| {
            WorldError::KindMismatch { type_index, expected: ComponentKind::List, actual }.into()
        })
    }

    /// Shared access to the filter pool of `T`.
    pub fn filters<T: FilterValue>(&self) -> EcsResult<&FilterPool<T>> {
        let type_index = self.type_index_of::<T>()?;
        let pool = self.pools[type_index as usize]
            .as_ref()
            .expect("registered type has a pool");
        let actual = pool.kind();
        pool.as_any().downcast_ref::<FilterPool<T>>().ok_or_else(|| {
            WorldError::KindMismatch { type_index, expected: ComponentKind::Filter, actual }.into()
        })
    }

    // ────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ────────────────────────────────────────────────────────────────────

    /// Reconciles every dirty entity.
    ///
    /// Recomputes filter combinations, archetype and meta-archetype sets,
    /// and migrates every affected pool record into its target taxon. Must
    /// run before queries or entity creation once anything is dirty.
    pub fn process_component_changes(&mut self) -> EcsResult<()> {
        if self.dirty.is_empty() {
            return Ok(());
        }
        let dirty = std::mem::take(&mut self.dirty);
        for entity in &dirty {
            let id = entity.id() as usize;
            if id < self.dirty_flags.len() {
                self.dirty_flags[id] = false;
            }
        }
        let count = dirty.len();
        for entity in dirty {
            if !self.allocator.contains(entity) {
                continue;
            }
            self.reconcile_entity(entity)?;
        }
        log::debug!("reconciled {} dirty entities", count);
        Ok(())
    }

    fn reconcile_entity(&mut self, entity: Entity) -> EcsResult<()> {
        let types = self.component_types[entity.id() as usize];
        let plan = self.taxonomy_plan(entity, entity, types)?;
        for (type_index, taxon) in plan {
            let pool = self.pools[type_index as usize]
                .as_mut()
                .expect("registered type has a pool");
            pool.update_taxon(entity, taxon)?;
        }
        Ok(())
    }

    /// Computes the per-type target taxa for `target`, reading filter
    /// values from `source` (`source == target` during reconciliation;
    /// source is the prototype during instantiation).
    ///
    /// Updates the target's combination, archetype, and meta-archetype
    /// bookkeeping as a side effect.
    fn taxonomy_plan(
        &mut self,
        source: Entity,
        target: Entity,
        types: TypeSet,
    ) -> EcsResult<Vec<(TypeIndex, TaxonId)>> {
        let id = target.id() as usize;

        // 1. Filter combination: intern every current filter value.
        let mut instances: Vec<FilterInstanceIndex> = Vec::new();
        for type_index in types.iter() {
            if *self.types.require(type_index)? != ComponentKind::Filter {
                continue;
            }
            let pool = self.pools[type_index as usize]
                .as_ref()
                .expect("registered type has a pool");
            if let Some(instance) = pool.filter_instance(source) {
                instances.push(instance);
            }
        }
        let combination = self.intern_combination(FilterCombination::new(instances))?;
        self.combination_map[id] = combination;

        // 2. Matched archetypes, cached by type set.
        let archetypes = self.matching_archetypes(types);
        self.archetype_map[id] = archetypes.clone();

        // 3. Meta-archetype closure.
        let metas = self.resolve_meta_archetypes(&archetypes, types)?;
        self.meta_map[id] = metas.clone();

        // 4. Target taxon per component type.
        let mut plan = Vec::with_capacity(types.len());
        for type_index in types.iter() {
            let kind = *self.types.require(type_index)?;
            let meta = metas
                .iter()
                .copied()
                .find(|&m| match kind {
                    ComponentKind::Data | ComponentKind::List => {
                        self.metas[m as usize].components.has(type_index)
                    }
                    ComponentKind::Filter => self.metas[m as usize].filters.has(type_index),
                })
                .unwrap_or(self.default_meta);
            let taxon = self.exact_taxon(meta, combination)?;
            plan.push((type_index, taxon));
        }
        Ok(plan)
    }

    fn matching_archetypes(&mut self, types: TypeSet) -> Vec<ArchetypeIndex> {
        if let Some(cached) = self.archetype_cache.get(&types) {
            return cached.clone();
        }
        let matched: Vec<ArchetypeIndex> = self
            .archetypes
            .iter()
            .enumerate()
            .filter(|(_, def)| types.contains_all(&def.components))
            .map(|(i, _)| i as ArchetypeIndex)
            .collect();
        self.archetype_cache.insert(types, matched.clone());
        matched
    }

    /// Greedy union closure over the matched archetype bags.
    ///
    /// Two bags sharing at least one component merge into their union;
    /// bags contained in another are dropped. The result partitions the
    /// entity's data and list component types. Filter types the entity
    /// holds that no bag declares are adopted by the canonically first bag
    /// so their values keep partitioning storage.
    fn resolve_meta_archetypes(
        &mut self,
        archetypes: &[ArchetypeIndex],
        types: TypeSet,
    ) -> EcsResult<Vec<MetaArchetypeIndex>> {
        let mut bags: Vec<(TypeSet, TypeSet)> = archetypes
            .iter()
            .map(|&a| {
                let def = &self.archetypes[a as usize];
                (def.components, def.filters)
            })
            .collect();

        loop {
            let mut merged = false;
            'scan: for i in 0..bags.len() {
                for j in (i + 1)..bags.len() {
                    let (ci, fi) = bags[i];
                    let (cj, fj) = bags[j];
                    if !ci.intersects(&cj) {
                        continue;
                    }
                    if ci.contains_all(&cj) && fi.contains_all(&fj) {
                        bags.swap_remove(j);
                    } else if cj.contains_all(&ci) && fj.contains_all(&fi) {
                        bags[i] = (cj, fj);
                        bags.swap_remove(j);
                    } else {
                        let (mut cu, mut fu) = (ci, fi);
                        cu.union_with(&cj);
                        fu.union_with(&fj);
                        bags[i] = (cu, fu);
                        bags.swap_remove(j);
                    }
                    merged = true;
                    break 'scan;
                }
            }
            if !merged {
                break;
            }
        }

        // Adopt filter types no matched archetype declared.
        if !bags.is_empty() {
            let mut declared = TypeSet::default();
            for (_, filters) in &bags {
                declared.union_with(filters);
            }
            let mut undeclared = TypeSet::default();
            for type_index in types.iter() {
                if *self.types.require(type_index)? == ComponentKind::Filter
                    && !declared.has(type_index)
                {
                    undeclared.set(type_index);
                }
            }
            if !undeclared.is_empty() {
                let canonical = bags
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, (components, _))| components.first().unwrap_or(u16::MAX))
                    .map(|(i, _)| i)
                    .expect("bags checked non-empty");
                bags[canonical].1.union_with(&undeclared);
            }
        }

        let mut metas = Vec::with_capacity(bags.len());
        for (components, filters) in bags {
            metas.push(self.intern_meta(components, filters)?);
        }
        metas.sort_unstable();
        Ok(metas)
    }

    // ────────────────────────────────────────────────────────────────────
    // Queries
    // ────────────────────────────────────────────────────────────────────

    /// Starts a query over `archetype`.
    pub fn query(&mut self, archetype: ArchetypeIndex) -> QueryBuilder<'_> {
        QueryBuilder::new(self, archetype)
    }

    pub(crate) fn build_query(
        &mut self,
        archetype: ArchetypeIndex,
        instances: &[Option<FilterInstanceIndex>],
    ) -> EcsResult<Query> {
        self.ensure_initialized()?;
        if !self.dirty.is_empty() {
            return Err(WorldError::PendingChanges { count: self.dirty.len() }.into());
        }
        if archetype as usize >= self.archetypes.len() {
            return Err(WorldError::UnknownArchetype { index: archetype as usize }.into());
        }

        // A never-seen filter value cannot match any taxon.
        let mut resolved: Vec<FilterInstanceIndex> = Vec::with_capacity(instances.len());
        for instance in instances {
            match instance {
                Some(index) => resolved.push(*index),
                None => return Ok(Query::empty()),
            }
        }

        let wanted = if resolved.is_empty() {
            None
        } else {
            Some(self.intern_combination(FilterCombination::new(resolved))?)
        };

        let metas = &self.super_archetypes[archetype as usize];
        let taxa: Vec<TaxonId> = self
            .taxa
            .iter()
            .enumerate()
            .skip(TAXON_DEFAULT as usize + 1)
            .filter(|(_, desc)| {
                if !metas.contains(&desc.meta) {
                    return false;
                }
                match wanted {
                    None => true,
                    // Equal, or a proper superset reachable through the
                    // precomputed superset links.
                    Some(wanted) => {
                        desc.combination == wanted
                            || self.super_filters[wanted as usize].contains(&desc.combination)
                    }
                }
            })
            .map(|(taxon, _)| taxon as TaxonId)
            .collect();
        Ok(Query::from_taxa(taxa))
    }

    // ────────────────────────────────────────────────────────────────────
    // Events and destruction routing
    // ────────────────────────────────────────────────────────────────────

    /// Shared access to the event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Mutable access to the event bus.
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Subscribes to `ComponentCreated<T>`, lazily enabling the emitter on
    /// the data pool of `T`. Returns the event type index for system
    /// dependency declarations.
    pub fn listen_component_created<T: Component>(&mut self) -> EcsResult<EventTypeIndex> {
        let index = self.events.register::<ComponentCreated<T>>()?;
        self.data_mut::<T>()?.enable_creation_events();
        Ok(index)
    }

    /// Subscribes to `ComponentDestroyed<T>`, lazily enabling the emitter
    /// on the data pool of `T`.
    pub fn listen_component_destroyed<T: Component>(&mut self) -> EcsResult<EventTypeIndex> {
        let index = self.events.register::<ComponentDestroyed<T>>()?;
        self.data_mut::<T>()?.enable_destruction_events();
        Ok(index)
    }

    /// Subscribes to `ListCreated<T>`, lazily enabling the emitter on the
    /// list pool of `T`.
    pub fn listen_list_created<T: Component>(&mut self) -> EcsResult<EventTypeIndex> {
        let index = self.events.register::<ListCreated<T>>()?;
        self.lists_mut::<T>()?.enable_creation_events();
        Ok(index)
    }

    /// Subscribes to `ListDestroyed<T>`, lazily enabling the emitter on the
    /// list pool of `T`.
    pub fn listen_list_destroyed<T: Component>(&mut self) -> EcsResult<EventTypeIndex> {
        let index = self.events.register::<ListDestroyed<T>>()?;
        self.lists_mut::<T>()?.enable_destruction_events();
        Ok(index)
    }

    /// Requests destruction of `entity` at the end of the current tick.
    pub fn queue_destroy(&mut self, entity: Entity) -> EcsResult<()> {
        self.events.emit(DestroyEntityEvent { entity })
    }

    /// Destroys every entity named by a published [`DestroyEntityEvent`].
    ///
    /// Called by the scheduler's end-of-tick drain so systems observe the
    /// component destruction events before the ids are recycled.
    pub fn apply_destroy_events(&mut self) -> EcsResult<usize> {
        let pending: Vec<Entity> = self
            .events
            .listener::<DestroyEntityEvent>()
            .iter()
            .map(|event| event.entity)
            .collect();
        let mut destroyed = 0;
        for entity in pending {
            if self.allocator.contains(entity) {
                self.destroy(entity)?;
                destroyed += 1;
            }
        }
        Ok(destroyed)
    }

    // ────────────────────────────────────────────────────────────────────
    // Work queues and time
    // ────────────────────────────────────────────────────────────────────

    /// Registers a named work queue.
    pub fn create_queue(&mut self, name: &str) -> EcsResult<QueueIndex> {
        self.work_queues.create(name)
    }

    /// Pushes `(entity, deadline)` onto a work queue.
    pub fn schedule(&mut self, queue: QueueIndex, entity: Entity, deadline: f64) -> EcsResult<()> {
        self.work_queues.schedule(queue, entity, deadline)
    }

    /// Shared access to the work queue set.
    pub fn work_queues(&self) -> &WorkQueues {
        &self.work_queues
    }

    /// Mutable access to the work queue set.
    pub fn work_queues_mut(&mut self) -> &mut WorkQueues {
        &mut self.work_queues
    }

    /// Current simulation time.
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Sets the simulation clock; the scheduler advances it every tick.
    pub fn set_sim_time(&mut self, time: f64) {
        self.sim_time = time;
    }

    // ────────────────────────────────────────────────────────────────────
    // Snapshots
    // ────────────────────────────────────────────────────────────────────

    /// Captures the id space, the clock, and every pool.
    pub fn save_snapshot(&self) -> WorldSnapshot {
        let pools = self
            .pools
            .iter()
            .flatten()
            .map(|pool| (pool.type_index(), pool.serialize()))
            .collect();
        WorldSnapshot {
            entities: self.allocator.snapshot_bytes(),
            next_free: self.allocator.next_free(),
            recycle_next: self.allocator.recycle_next(),
            sim_time: self.sim_time,
            pools,
        }
    }

    /// Restores a snapshot: the allocator state is replaced, pools are
    /// reset and replayed, and every live entity is reconciled.
    pub fn load_snapshot(&mut self, snapshot: &WorldSnapshot) -> EcsResult<()> {
        self.ensure_initialized()?;

        self.allocator
            .restore(&snapshot.entities, snapshot.next_free, snapshot.recycle_next);
        self.sim_time = snapshot.sim_time;

        let len = snapshot.next_free as usize;
        self.component_types = vec![TypeSet::default(); len];
        self.archetype_map = vec![Vec::new(); len];
        self.meta_map = vec![Vec::new(); len];
        self.combination_map = vec![0; len];
        self.dirty_flags = vec![false; len];
        self.dirty.clear();

        for (type_index, pool_snapshot) in &snapshot.pools {
            let pool = self.pools[*type_index as usize]
                .as_mut()
                .expect("snapshot names a registered type");
            pool.deserialize(pool_snapshot, &mut self.filter_instances)?;
        }

        // Rebuild per-entity type sets from the replayed pools.
        for pool in self.pools.iter().flatten() {
            let type_index = pool.type_index();
            for entity in pool.entities() {
                self.component_types[entity.id() as usize].set(type_index);
            }
        }

        let live: Vec<Entity> = self.allocator.iter().collect();
        for entity in live {
            self.mark_dirty(entity);
        }
        self.process_component_changes()?;
        log::info!(
            "snapshot restored: {} live entities, sim time {}",
            self.allocator.live_count(),
            self.sim_time
        );
        Ok(())
    }
}
