//! Filter component pool.
//!
//! Filter components partition entities by *exact value equality*. A
//! [`FilterPool`] interns each distinct value it has ever observed into a
//! unique-value table and stores, per taxon, only the small interned ids —
//! the taxonizer then works with integer sets instead of arbitrary payloads
//! when deriving filter combinations.
//!
//! Every unique value is also assigned an engine-global
//! [`FilterInstanceIndex`](crate::engine::types::FilterInstanceIndex)
//! through the world's [`FilterInstanceTable`], so combinations can mix
//! values of different filter types without ambiguity.
//!
//! Reference counts are kept per unique value for bookkeeping, but entries
//! are never freed: the table grows monotonically, bounded by the user's
//! input distribution.

use std::any::Any;
use std::collections::HashMap;

use crate::engine::error::{EcsResult, PoolError};
use crate::engine::events::EventBus;
use crate::engine::pool::{FilterInstanceTable, FilterValue, Pool, PoolCore, PoolSnapshot};
use crate::engine::types::{
    ComponentIndex, ComponentKind, Entity, FilterInstanceIndex, TaxonId, TypeIndex,
    TAXON_DEFAULT, TAXON_PROTOTYPE,
};


/// Local index into one pool's unique-value table.
pub type LocalFilterId = u16;

const LOCAL_CAP: usize = u16::MAX as usize;

/// Read view over one taxon's interned filter ids.
///
/// `ids` is position-parallel to `entities`; `table` is the pool's backing
/// unique-value table, so `table[ids[k] as usize]` is the value of the
/// record at position `k`.
pub struct FilterSlice<'a, T> {
    /// Canonical entity order of the taxon.
    pub entities: &'a [Entity],
    /// Interned value ids, position-parallel to `entities`.
    pub ids: &'a [LocalFilterId],
    /// Unique-value backing table.
    pub table: &'a [T],
}

impl<'a, T: FilterValue> FilterSlice<'a, T> {
    /// Number of records in the taxon.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the taxon holds no records.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The filter value of the record at position `k`.
    pub fn value_at(&self, k: usize) -> Option<&'a T> {
        self.ids.get(k).and_then(|&id| self.table.get(id as usize))
    }
}

/// Per-taxon storage of interned filter values.
pub struct FilterPool<T: FilterValue> {
    core: PoolCore,
    unique_by_id: Vec<T>,
    global_ids: Vec<FilterInstanceIndex>,
    unique_reverse: HashMap<T, LocalFilterId>,
    refcounts: Vec<u32>,
    filter_ids: Vec<Vec<LocalFilterId>>,
}

impl<T: FilterValue> FilterPool<T> {
    /// Creates an empty pool for the given interned type.
    pub fn new(type_index: TypeIndex) -> Self {
        Self {
            core: PoolCore::new(type_index),
            unique_by_id: Vec::new(),
            global_ids: Vec::new(),
            unique_reverse: HashMap::new(),
            refcounts: Vec::new(),
            filter_ids: Vec::new(),
        }
    }

    fn intern(
        &mut self,
        value: T,
        instances: &mut FilterInstanceTable,
    ) -> EcsResult<LocalFilterId> {
        if let Some(&local) = self.unique_reverse.get(&value) {
            return Ok(local);
        }
        if self.unique_by_id.len() >= LOCAL_CAP {
            return Err(PoolError::FilterTableFull { cap: LOCAL_CAP }.into());
        }
        let local = self.unique_by_id.len() as LocalFilterId;
        let global = instances.alloc(self.core.type_index())?;
        self.unique_by_id.push(value);
        self.global_ids.push(global);
        self.refcounts.push(0);
        self.unique_reverse.insert(value, local);
        Ok(local)
    }

    fn ids_mut(&mut self, taxon: TaxonId) -> &mut Vec<LocalFilterId> {
        if (taxon as usize) >= self.filter_ids.len() {
            self.filter_ids.resize_with(taxon as usize + 1, Vec::new);
        }
        &mut self.filter_ids[taxon as usize]
    }

    fn insert(&mut self, entity: Entity, local: LocalFilterId, taxon: TaxonId) -> EcsResult<()> {
        self.core.link(entity, taxon)?;
        self.ids_mut(taxon).push(local);
        Ok(())
    }

    /// Attaches a filter record for `entity`.
    pub(crate) fn add(
        &mut self,
        entity: Entity,
        value: T,
        instances: &mut FilterInstanceTable,
    ) -> EcsResult<()> {
        if self.core.has(entity) {
            return Err(PoolError::DuplicateComponent {
                entity,
                type_index: self.core.type_index(),
            }
            .into());
        }
        let local = self.intern(value, instances)?;
        self.refcounts[local as usize] += 1;
        let taxon = if entity.is_prototype() { TAXON_PROTOTYPE } else { TAXON_DEFAULT };
        self.insert(entity, local, taxon)
    }

    pub(crate) fn remove(&mut self, entity: Entity) -> EcsResult<()> {
        let (index, _swapped) = self.core.unlink(entity)?;
        let local = self.filter_ids[index.taxon() as usize].swap_remove(index.entry() as usize);
        // Refcounts drop but the unique table never shrinks.
        let count = &mut self.refcounts[local as usize];
        *count = count.saturating_sub(1);
        Ok(())
    }

    /// Replaces `entity`'s filter value in place.
    ///
    /// Bookkeeping-wise this is a removal plus an addition: the old value's
    /// refcount drops and the new value is interned. The record keeps its
    /// taxon position until reconciliation migrates the entity.
    pub(crate) fn set(
        &mut self,
        entity: Entity,
        value: T,
        instances: &mut FilterInstanceTable,
    ) -> EcsResult<()> {
        let index = self.core.index_of(entity).ok_or(PoolError::MissingComponent {
            entity,
            type_index: self.core.type_index(),
        })?;
        let local = self.intern(value, instances)?;
        let slot = &mut self.filter_ids[index.taxon() as usize][index.entry() as usize];
        let old = *slot;
        if old == local {
            return Ok(());
        }
        *slot = local;
        let count = &mut self.refcounts[old as usize];
        *count = count.saturating_sub(1);
        self.refcounts[local as usize] += 1;
        Ok(())
    }

    pub(crate) fn migrate(&mut self, entity: Entity, taxon: TaxonId) -> EcsResult<()> {
        if entity.is_prototype() {
            return Err(PoolError::PrototypeTaxonChange { entity }.into());
        }
        let Some(index) = self.core.index_of(entity) else {
            return Err(PoolError::MissingComponent {
                entity,
                type_index: self.core.type_index(),
            }
            .into());
        };
        if index.taxon() == taxon {
            return Ok(());
        }
        let (old, _swapped) = self.core.unlink(entity)?;
        let local = self.filter_ids[old.taxon() as usize].swap_remove(old.entry() as usize);
        self.insert(entity, local, taxon)
    }

    /// Returns `true` if `entity` has a record.
    #[inline]
    pub fn has(&self, entity: Entity) -> bool {
        self.core.has(entity)
    }

    /// Packed address of `entity`'s record, if present.
    #[inline]
    pub fn index_of(&self, entity: Entity) -> Option<ComponentIndex> {
        self.core.index_of(entity)
    }

    /// Reads `entity`'s filter value.
    pub fn read(&self, entity: Entity) -> EcsResult<T> {
        let index = self.core.index_of(entity).ok_or(PoolError::MissingComponent {
            entity,
            type_index: self.core.type_index(),
        })?;
        let local = self.filter_ids[index.taxon() as usize][index.entry() as usize];
        Ok(self.unique_by_id[local as usize])
    }

    /// The engine-global instance id of `value`, if it has ever been
    /// observed.
    ///
    /// A miss is recoverable: queries over unseen values yield empty
    /// results.
    pub fn lookup(&self, value: &T) -> Option<FilterInstanceIndex> {
        self.unique_reverse
            .get(value)
            .map(|&local| self.global_ids[local as usize])
    }

    /// Number of distinct values ever observed.
    pub fn unique_len(&self) -> usize {
        self.unique_by_id.len()
    }

    /// Reference count of the interned `value`, if observed.
    pub fn refcount(&self, value: &T) -> Option<u32> {
        self.unique_reverse
            .get(value)
            .map(|&local| self.refcounts[local as usize])
    }

    /// Read view over one taxon.
    pub fn slice(&self, taxon: TaxonId) -> FilterSlice<'_, T> {
        FilterSlice {
            entities: self.core.entities(taxon),
            ids: self
                .filter_ids
                .get(taxon as usize)
                .map(|v| v.as_slice())
                .unwrap_or(&[]),
            table: &self.unique_by_id,
        }
    }
}

impl<T: FilterValue> Pool for FilterPool<T> {
    fn type_index(&self) -> TypeIndex {
        self.core.type_index()
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Filter
    }

    fn has(&self, entity: Entity) -> bool {
        self.core.has(entity)
    }

    fn entities(&self) -> Vec<Entity> {
        self.core.all_entities()
    }

    fn destroy(&mut self, entity: Entity, _events: &mut EventBus) -> EcsResult<()> {
        self.remove(entity)
    }

    fn update_taxon(&mut self, entity: Entity, taxon: TaxonId) -> EcsResult<()> {
        self.migrate(entity, taxon)
    }

    fn copy_record(
        &mut self,
        source: Entity,
        target: Entity,
        taxon: TaxonId,
        _events: &mut EventBus,
    ) -> EcsResult<()> {
        if self.core.has(target) {
            return Err(PoolError::DuplicateComponent {
                entity: target,
                type_index: self.core.type_index(),
            }
            .into());
        }
        let index = self.core.index_of(source).ok_or(PoolError::MissingComponent {
            entity: source,
            type_index: self.core.type_index(),
        })?;
        let local = self.filter_ids[index.taxon() as usize][index.entry() as usize];
        self.refcounts[local as usize] += 1;
        self.insert(target, local, taxon)
    }

    fn filter_instance(&self, entity: Entity) -> Option<FilterInstanceIndex> {
        let index = self.core.index_of(entity)?;
        let local = self.filter_ids[index.taxon() as usize][index.entry() as usize];
        Some(self.global_ids[local as usize])
    }

    fn serialize(&self) -> PoolSnapshot {
        let entities = self.core.all_entities();
        let mut ids: Vec<LocalFilterId> = Vec::with_capacity(entities.len());
        for &taxon in self.core.taxa() {
            ids.extend_from_slice(&self.filter_ids[taxon as usize]);
        }
        PoolSnapshot {
            entities: bytemuck::cast_slice(&entities).to_vec(),
            components: bytemuck::cast_slice(&self.unique_by_id).to_vec(),
            filter_indices: Some(bytemuck::cast_slice(&ids).to_vec()),
            element_counts: None,
        }
    }

    fn reset(&mut self) {
        self.core.reset();
        self.unique_by_id.clear();
        self.global_ids.clear();
        self.unique_reverse.clear();
        self.refcounts.clear();
        self.filter_ids.clear();
    }

    fn deserialize(
        &mut self,
        snapshot: &PoolSnapshot,
        instances: &mut FilterInstanceTable,
    ) -> EcsResult<()> {
        self.reset();
        let entities: Vec<Entity> = bytemuck::pod_collect_to_vec(&snapshot.entities);
        let table: Vec<T> = bytemuck::pod_collect_to_vec(&snapshot.components);
        let ids: Vec<LocalFilterId> = match &snapshot.filter_indices {
            Some(bytes) => bytemuck::pod_collect_to_vec(bytes),
            None => {
                return Err(PoolError::CorruptSnapshot {
                    reason: "filter snapshot is missing value indices",
                }
                .into())
            }
        };
        if entities.len() != ids.len() {
            return Err(PoolError::CorruptSnapshot {
                reason: "entity and index lengths differ",
            }
            .into());
        }
        for (entity, local) in entities.into_iter().zip(ids) {
            let value = *table.get(local as usize).ok_or(PoolError::CorruptSnapshot {
                reason: "value index exceeds unique table",
            })?;
            self.add(entity, value, instances)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
