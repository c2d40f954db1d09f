//! Dense data component pool.
//!
//! A [`DataPool`] stores one flat value per entity, grouped by taxon: for
//! every allocated taxon there is a dense `Vec<T>` position-parallel to the
//! pool's canonical entity order. Iterating a query is therefore a linear
//! scan over aligned arrays, taxon by taxon.
//!
//! ## Accessor validity
//! Slices returned by [`DataPool::slice`] / [`DataPool::slice_mut`] stay
//! valid until the next operation that may resize storage or migrate
//! records: add, destroy, taxon migration, or reconciliation. Rust's
//! aliasing rules enforce the read/write discipline; parallel iteration
//! borrows the pool shared and is safe to fan out across worker threads.

use std::any::Any;

use rayon::prelude::*;

use crate::engine::error::{EcsResult, PoolError};
use crate::engine::events::{ComponentCreated, ComponentDestroyed, EventBus};
use crate::engine::pool::{Component, FilterInstanceTable, Pool, PoolCore, PoolSnapshot};
use crate::engine::query::Query;
use crate::engine::types::{
    ComponentIndex, ComponentKind, Entity, TaxonId, TypeIndex, TAXON_DEFAULT, TAXON_PROTOTYPE,
};


/// Read view over one taxon's records.
///
/// `entities` and `values` are position-parallel; zipping them with slices
/// of other pools over the same taxon is well-defined.
pub struct DataSlice<'a, T> {
    /// Canonical entity order of the taxon.
    pub entities: &'a [Entity],
    /// Component values, position-parallel to `entities`.
    pub values: &'a [T],
}

impl<'a, T> DataSlice<'a, T> {
    /// Number of records in the taxon.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the taxon holds no records.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterates `(entity, value)` pairs in taxon order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &'a T)> + '_ {
        self.entities.iter().copied().zip(self.values.iter())
    }
}

/// Write view over one taxon's records.
pub struct DataSliceMut<'a, T> {
    /// Canonical entity order of the taxon.
    pub entities: &'a [Entity],
    /// Component values, position-parallel to `entities`.
    pub values: &'a mut [T],
}

impl<'a, T> DataSliceMut<'a, T> {
    /// Number of records in the taxon.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the taxon holds no records.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Per-taxon dense storage of flat component values.
pub struct DataPool<T: Component> {
    core: PoolCore,
    components: Vec<Vec<T>>,
    creation_events: bool,
    destruction_events: bool,
}

impl<T: Component> DataPool<T> {
    /// Creates an empty pool for the given interned type.
    pub fn new(type_index: TypeIndex) -> Self {
        Self {
            core: PoolCore::new(type_index),
            components: Vec::new(),
            creation_events: false,
            destruction_events: false,
        }
    }

    /// Enables `ComponentCreated<T>` emission on add.
    pub(crate) fn enable_creation_events(&mut self) {
        self.creation_events = true;
    }

    /// Enables `ComponentDestroyed<T>` emission on destroy.
    pub(crate) fn enable_destruction_events(&mut self) {
        self.destruction_events = true;
    }

    fn payload_mut(&mut self, taxon: TaxonId) -> &mut Vec<T> {
        if (taxon as usize) >= self.components.len() {
            self.components.resize_with(taxon as usize + 1, Vec::new);
        }
        &mut self.components[taxon as usize]
    }

    fn insert(&mut self, entity: Entity, value: T, taxon: TaxonId) -> EcsResult<()> {
        self.core.link(entity, taxon)?;
        self.payload_mut(taxon).push(value);
        Ok(())
    }

    /// Attaches a record for `entity`.
    ///
    /// The record is staged in the prototype or default taxon; for normal
    /// entities reconciliation migrates it to its final taxon.
    pub(crate) fn add(
        &mut self,
        entity: Entity,
        value: T,
        events: &mut EventBus,
    ) -> EcsResult<()> {
        if self.core.has(entity) {
            return Err(PoolError::DuplicateComponent {
                entity,
                type_index: self.core.type_index(),
            }
            .into());
        }
        let taxon = if entity.is_prototype() { TAXON_PROTOTYPE } else { TAXON_DEFAULT };
        self.insert(entity, value, taxon)?;
        if self.creation_events && !entity.is_prototype() {
            events.emit(ComponentCreated::<T>::new(entity))?;
        }
        Ok(())
    }

    pub(crate) fn remove(&mut self, entity: Entity, events: &mut EventBus) -> EcsResult<()> {
        let (index, _swapped) = self.core.unlink(entity)?;
        let taxon = index.taxon() as usize;
        let value = self.components[taxon].swap_remove(index.entry() as usize);
        if self.destruction_events && !entity.is_prototype() {
            events.emit(ComponentDestroyed { entity, value })?;
        }
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
        let value = self.components[old.taxon() as usize].swap_remove(old.entry() as usize);
        self.insert(entity, value, taxon)
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

    /// Reads `entity`'s value.
    pub fn read(&self, entity: Entity) -> EcsResult<&T> {
        let index = self.core.index_of(entity).ok_or(PoolError::MissingComponent {
            entity,
            type_index: self.core.type_index(),
        })?;
        Ok(&self.components[index.taxon() as usize][index.entry() as usize])
    }

    /// Mutably reads `entity`'s value.
    pub fn get_mut(&mut self, entity: Entity) -> EcsResult<&mut T> {
        let index = self.core.index_of(entity).ok_or(PoolError::MissingComponent {
            entity,
            type_index: self.core.type_index(),
        })?;
        Ok(&mut self.components[index.taxon() as usize][index.entry() as usize])
    }

    /// Reads the value at a packed address.
    ///
    /// Addresses are invalidated by structural mutation; `None` means the
    /// address no longer points at a record.
    pub fn get(&self, index: ComponentIndex) -> Option<&T> {
        self.components
            .get(index.taxon() as usize)
            .and_then(|v| v.get(index.entry() as usize))
    }

    /// Read view over one taxon.
    pub fn slice(&self, taxon: TaxonId) -> DataSlice<'_, T> {
        DataSlice {
            entities: self.core.entities(taxon),
            values: self
                .components
                .get(taxon as usize)
                .map(|v| v.as_slice())
                .unwrap_or(&[]),
        }
    }

    /// Write view over one taxon.
    pub fn slice_mut(&mut self, taxon: TaxonId) -> DataSliceMut<'_, T> {
        if (taxon as usize) >= self.components.len() {
            self.components.resize_with(taxon as usize + 1, Vec::new);
        }
        DataSliceMut {
            entities: self.core.entities(taxon),
            values: self.components[taxon as usize].as_mut_slice(),
        }
    }

    /// Iterates all values matched by `query`, in taxon order.
    pub fn values_in<'a>(&'a self, query: &'a Query) -> impl Iterator<Item = &'a T> + 'a {
        query.taxa().iter().flat_map(move |&taxon| self.slice(taxon).values.iter())
    }

    /// Iterates all entities matched by `query`, in taxon order.
    pub fn entities_in<'a>(&'a self, query: &'a Query) -> impl Iterator<Item = Entity> + 'a {
        query
            .taxa()
            .iter()
            .flat_map(move |&taxon| self.core.entities(taxon).iter().copied())
    }

    /// Runs `f` over every `(entity, value)` pair matched by `query`.
    pub fn for_each(&self, query: &Query, mut f: impl FnMut(Entity, &T)) {
        for &taxon in query.taxa() {
            let slice = self.slice(taxon);
            for (entity, value) in slice.iter() {
                f(entity, value);
            }
        }
    }

    /// Runs `f` mutably over every `(entity, value)` pair matched by
    /// `query`.
    pub fn for_each_mut(&mut self, query: &Query, mut f: impl FnMut(Entity, &mut T)) {
        for &taxon in query.taxa() {
            let entities = self.core.entities(taxon);
            let Some(values) = self.components.get_mut(taxon as usize) else {
                continue;
            };
            for (&entity, value) in entities.iter().zip(values.iter_mut()) {
                f(entity, value);
            }
        }
    }

    /// Fans `f` out over the query's taxa on the rayon thread pool.
    ///
    /// Each taxon's slice is processed independently; `f` must therefore be
    /// safe to call concurrently for different records.
    pub fn par_for_each(&self, query: &Query, f: impl Fn(Entity, &T) + Send + Sync) {
        query.taxa().par_iter().for_each(|&taxon| {
            let slice = self.slice(taxon);
            for (entity, value) in slice.iter() {
                f(entity, value);
            }
        });
    }

    pub(crate) fn copy_between(
        &mut self,
        source: Entity,
        target: Entity,
        taxon: TaxonId,
        events: &mut EventBus,
    ) -> EcsResult<()> {
        if self.core.has(target) {
            return Err(PoolError::DuplicateComponent {
                entity: target,
                type_index: self.core.type_index(),
            }
            .into());
        }
        let value = *self.read(source)?;
        self.insert(target, value, taxon)?;
        if self.creation_events && !target.is_prototype() {
            events.emit(ComponentCreated::<T>::new(target))?;
        }
        Ok(())
    }
}

impl<T: Component> Pool for DataPool<T> {
    fn type_index(&self) -> TypeIndex {
        self.core.type_index()
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Data
    }

    fn has(&self, entity: Entity) -> bool {
        self.core.has(entity)
    }

    fn entities(&self) -> Vec<Entity> {
        self.core.all_entities()
    }

    fn destroy(&mut self, entity: Entity, events: &mut EventBus) -> EcsResult<()> {
        self.remove(entity, events)
    }

    fn update_taxon(&mut self, entity: Entity, taxon: TaxonId) -> EcsResult<()> {
        self.migrate(entity, taxon)
    }

    fn copy_record(
        &mut self,
        source: Entity,
        target: Entity,
        taxon: TaxonId,
        events: &mut EventBus,
    ) -> EcsResult<()> {
        self.copy_between(source, target, taxon, events)
    }

    fn serialize(&self) -> PoolSnapshot {
        let entities = self.core.all_entities();
        let mut values: Vec<T> = Vec::with_capacity(entities.len());
        for &taxon in self.core.taxa() {
            values.extend_from_slice(&self.components[taxon as usize]);
        }
        PoolSnapshot {
            entities: bytemuck::cast_slice(&entities).to_vec(),
            components: bytemuck::cast_slice(&values).to_vec(),
            filter_indices: None,
            element_counts: None,
        }
    }

    fn reset(&mut self) {
        self.core.reset();
        self.components.clear();
    }

    fn deserialize(
        &mut self,
        snapshot: &PoolSnapshot,
        _instances: &mut FilterInstanceTable,
    ) -> EcsResult<()> {
        self.reset();
        let entities: Vec<Entity> = bytemuck::pod_collect_to_vec(&snapshot.entities);
        let values: Vec<T> = bytemuck::pod_collect_to_vec(&snapshot.components);
        if entities.len() != values.len() {
            return Err(PoolError::CorruptSnapshot {
                reason: "entity and component counts differ",
            }
            .into());
        }
        for (entity, value) in entities.into_iter().zip(values) {
            let taxon = if entity.is_prototype() { TAXON_PROTOTYPE } else { TAXON_DEFAULT };
            self.insert(entity, value, taxon)?;
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
