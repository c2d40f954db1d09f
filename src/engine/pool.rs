//! Shared pool machinery.
//!
//! All three pool kinds (data, list, filter) store their records grouped by
//! taxon and keep the same bookkeeping, factored here as [`PoolCore`]:
//!
//! - `index_map`: entity id → packed [`ComponentIndex`] (null sentinel for
//!   absent records),
//! - `entity_maps[taxon]`: the dense, canonical per-taxon entity order,
//! - `taxa`: the list of taxa this pool has allocated storage for.
//!
//! ## Invariants
//! - For every record: `index_map[entity_maps[t][k]] == (t, k)`.
//! - Payload vectors owned by the concrete pools are position-parallel to
//!   `entity_maps[t]`; every structural operation here returns enough
//!   information (swap-back entries) for payloads to mirror it exactly.
//! - Prototype records live only in the prototype taxon and never migrate.
//!
//! The type-erased [`Pool`] trait is the handle the world holds: it carries
//! exactly the operations taxonization, teardown, prototype instantiation,
//! and the save/load collaborator need, with `as_any` downcasting for typed
//! access.

use std::any::Any;
use std::hash::Hash;

use bytemuck::Pod;

use crate::engine::error::{EcsResult, PoolError, RegistryError};
use crate::engine::events::EventBus;
use crate::engine::types::{
    ComponentIndex, ComponentKind, Entity, FilterInstanceIndex, TaxonId, TypeIndex,
    ENTRY_CAP, TAXON_CAP,
};


/// Marker for storable component payloads.
///
/// Components must be flat value types (plain old data) so pool storage can
/// be bulk-copied byte-for-byte during snapshots.
pub trait Component: Pod + Send + Sync + 'static {}
impl<T: Pod + Send + Sync + 'static> Component for T {}

/// Marker for filter component values.
///
/// Filter values additionally need value equality and a hash so they can be
/// interned into the unique-value table.
pub trait FilterValue: Component + Eq + Hash {}
impl<T: Component + Eq + Hash> FilterValue for T {}

/// Engine-global table attributing each unique filter value to its owning
/// filter component type.
///
/// Filter combinations mix instances of different filter types, so instance
/// indices must be globally unique; pools allocate through this table and
/// the taxonizer uses it to project combinations onto a meta-archetype's
/// filter types. Indices are never reused and the table never shrinks.
pub struct FilterInstanceTable {
    owners: Vec<TypeIndex>,
}

impl Default for FilterInstanceTable {
    fn default() -> Self {
        Self { owners: Vec::new() }
    }
}

impl FilterInstanceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next instance index for a value owned by `owner`.
    pub fn alloc(&mut self, owner: TypeIndex) -> EcsResult<FilterInstanceIndex> {
        if self.owners.len() >= u16::MAX as usize {
            return Err(RegistryError::CapacityExceeded { cap: u16::MAX as usize }.into());
        }
        let index = self.owners.len() as FilterInstanceIndex;
        self.owners.push(owner);
        Ok(index)
    }

    /// Returns the filter type owning `index`.
    #[inline]
    pub fn owner(&self, index: FilterInstanceIndex) -> Option<TypeIndex> {
        self.owners.get(index as usize).copied()
    }

    /// Number of instances ever allocated.
    #[inline]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Returns `true` if no instance has been allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Opaque byte arrays describing one pool's full contents.
///
/// `entities` and `components` are present for every kind; `filter_indices`
/// is filled by filter pools and `element_counts` by list pools. On load the
/// pool is `reset` and the additions are replayed in the original order.
#[derive(Clone, Debug, Default)]
pub struct PoolSnapshot {
    /// Record owners, in taxon-then-entry order.
    pub entities: Vec<u8>,
    /// Payload bytes; layout depends on the pool kind.
    pub components: Vec<u8>,
    /// Per-record interned value ids (filter pools).
    pub filter_indices: Option<Vec<u8>>,
    /// Per-record element counts (list pools).
    pub element_counts: Option<Vec<u8>>,
}

/// Type-erased handle to a component pool.
///
/// The world drives pools exclusively through this trait during
/// reconciliation, entity teardown, prototype instantiation, and
/// snapshotting; typed access goes through `as_any` downcasts.
pub trait Pool: Send + Sync {
    /// Interned component type this pool stores.
    fn type_index(&self) -> TypeIndex;

    /// Which of the three pool kinds this is.
    fn kind(&self) -> ComponentKind;

    /// Returns `true` if `entity` has a record in this pool.
    fn has(&self, entity: Entity) -> bool;

    /// All record owners, in taxon-then-entry order.
    fn entities(&self) -> Vec<Entity>;

    /// Destroys `entity`'s record, emitting a destruction event when
    /// enabled.
    fn destroy(&mut self, entity: Entity, events: &mut EventBus) -> EcsResult<()>;

    /// Migrates `entity`'s record into `taxon`.
    ///
    /// A no-op when the record is already there. Forbidden on prototypes.
    fn update_taxon(&mut self, entity: Entity, taxon: TaxonId) -> EcsResult<()>;

    /// Copies `source`'s record onto `target`, placing it in `taxon`.
    ///
    /// Used by prototype instantiation; emits a creation event when enabled.
    fn copy_record(
        &mut self,
        source: Entity,
        target: Entity,
        taxon: TaxonId,
        events: &mut EventBus,
    ) -> EcsResult<()>;

    /// The interned instance id of `entity`'s filter value.
    ///
    /// `None` for data and list pools, and for entities without a record.
    fn filter_instance(&self, _entity: Entity) -> Option<FilterInstanceIndex> {
        None
    }

    /// Serializes the pool into opaque byte arrays.
    fn serialize(&self) -> PoolSnapshot;

    /// Drops every record and taxon, keeping the type identity.
    fn reset(&mut self);

    /// Restores the pool from a snapshot by reset-then-replay.
    fn deserialize(
        &mut self,
        snapshot: &PoolSnapshot,
        instances: &mut FilterInstanceTable,
    ) -> EcsResult<()>;

    /// Upcast for typed downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Structural bookkeeping shared by every pool kind.
pub(crate) struct PoolCore {
    type_index: TypeIndex,
    index_map: Vec<ComponentIndex>,
    entity_maps: Vec<Vec<Entity>>,
    taxa: Vec<TaxonId>,
}

impl PoolCore {
    pub(crate) fn new(type_index: TypeIndex) -> Self {
        Self {
            type_index,
            index_map: Vec::new(),
            entity_maps: Vec::new(),
            taxa: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn type_index(&self) -> TypeIndex {
        self.type_index
    }

    /// Packed address of `entity`'s record, if present.
    #[inline]
    pub(crate) fn index_of(&self, entity: Entity) -> Option<ComponentIndex> {
        let id = entity.id() as usize;
        match self.index_map.get(id) {
            Some(&index) if !index.is_null() => {
                // The slot is only trusted if the entity still owns it.
                let entry = index.entry() as usize;
                let taxon = index.taxon() as usize;
                if self.entity_maps[taxon].get(entry) == Some(&entity) {
                    Some(index)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn has(&self, entity: Entity) -> bool {
        self.index_of(entity).is_some()
    }

    /// Taxa this pool has allocated storage for, in first-use order.
    #[inline]
    pub(crate) fn taxa(&self) -> &[TaxonId] {
        &self.taxa
    }

    /// Canonical entity order of `taxon` (empty when unallocated).
    #[inline]
    pub(crate) fn entities(&self, taxon: TaxonId) -> &[Entity] {
        self.entity_maps
            .get(taxon as usize)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn all_entities(&self) -> Vec<Entity> {
        let mut out = Vec::new();
        for &taxon in &self.taxa {
            out.extend_from_slice(&self.entity_maps[taxon as usize]);
        }
        out
    }

    /// Guarantees per-taxon storage exists; returns `true` on first use.
    pub(crate) fn ensure_taxon(&mut self, taxon: TaxonId) -> EcsResult<bool> {
        if taxon as usize >= TAXON_CAP {
            return Err(PoolError::TaxonOutOfRange { taxon }.into());
        }
        if (taxon as usize) >= self.entity_maps.len() {
            self.entity_maps.resize_with(taxon as usize + 1, Vec::new);
        }
        if self.taxa.contains(&taxon) {
            Ok(false)
        } else {
            self.taxa.push(taxon);
            Ok(true)
        }
    }

    /// Appends `entity` to `taxon` and records its address.
    ///
    /// The caller must push the payload record at the same position.
    pub(crate) fn link(&mut self, entity: Entity, taxon: TaxonId) -> EcsResult<u32> {
        self.ensure_taxon(taxon)?;
        let entries = self.entity_maps[taxon as usize].len();
        if entries >= ENTRY_CAP {
            return Err(PoolError::EntryOverflow { taxon, entries }.into());
        }
        let entry = entries as u32;
        self.entity_maps[taxon as usize].push(entity);

        let id = entity.id() as usize;
        if id >= self.index_map.len() {
            self.index_map.resize(id + 1, ComponentIndex::NULL);
        }
        self.index_map[id] = ComponentIndex::new(taxon, entry);
        Ok(entry)
    }

    /// Removes `entity` from its taxon by swap-back.
    ///
    /// Returns the freed address and the entity that was swapped into the
    /// hole (if any); that entity's address has already been rewritten. The
    /// caller must mirror the swap in its payload vector.
    pub(crate) fn unlink(&mut self, entity: Entity) -> EcsResult<(ComponentIndex, Option<Entity>)> {
        let index = self.index_of(entity).ok_or(PoolError::MissingComponent {
            entity,
            type_index: self.type_index,
        })?;

        let taxon = index.taxon();
        let entry = index.entry() as usize;

        let map = &mut self.entity_maps[taxon as usize];
        map.swap_remove(entry);
        let swapped = map.get(entry).copied();

        if let Some(moved) = swapped {
            self.index_map[moved.id() as usize] = ComponentIndex::new(taxon, entry as u32);
        }
        self.index_map[entity.id() as usize] = ComponentIndex::NULL;

        Ok((index, swapped))
    }

    /// Drops all records and taxa.
    pub(crate) fn reset(&mut self) {
        self.index_map.clear();
        self.entity_maps.clear();
        self.taxa.clear();
    }
}
