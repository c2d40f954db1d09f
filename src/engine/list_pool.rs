//! List component pool.
//!
//! A [`ListPool`] attaches a growable, owned sequence of flat elements to
//! each entity. Per taxon, the payload is a [`NestedList`] whose outer order
//! mirrors the pool's canonical entity order; taxon migration moves only the
//! owning buffer between containers, never the elements themselves.
//!
//! Element access goes through [`ListRef`] / [`ListMut`] accessors, which
//! expose length, indexed read/write, append, swap-back removal, clearing,
//! and iteration.

use std::any::Any;

use crate::engine::error::{EcsResult, PoolError};
use crate::engine::events::{EventBus, ListCreated, ListDestroyed};
use crate::engine::nested::NestedList;
use crate::engine::pool::{Component, FilterInstanceTable, Pool, PoolCore, PoolSnapshot};
use crate::engine::types::{
    ComponentIndex, ComponentKind, Entity, TaxonId, TypeIndex, TAXON_DEFAULT, TAXON_PROTOTYPE,
};


/// Read accessor over one entity's list.
pub struct ListRef<'a, T> {
    elements: &'a Vec<T>,
}

impl<'a, T: Component> ListRef<'a, T> {
    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if the list has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Reads the element at `index`.
    pub fn read(&self, index: usize) -> EcsResult<T> {
        self.elements
            .get(index)
            .copied()
            .ok_or_else(|| PoolError::ElementOutOfBounds { index, len: self.elements.len() }.into())
    }

    /// Iterates the elements in order.
    pub fn iter(&self) -> impl Iterator<Item = &'a T> + '_ {
        self.elements.iter()
    }

    /// The elements as a slice.
    pub fn as_slice(&self) -> &'a [T] {
        self.elements.as_slice()
    }
}

/// Write accessor over one entity's list.
pub struct ListMut<'a, T> {
    elements: &'a mut Vec<T>,
}

impl<T: Component> ListMut<'_, T> {
    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if the list has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Reads the element at `index`.
    pub fn read(&self, index: usize) -> EcsResult<T> {
        self.elements
            .get(index)
            .copied()
            .ok_or_else(|| PoolError::ElementOutOfBounds { index, len: self.elements.len() }.into())
    }

    /// Overwrites the element at `index`.
    pub fn write(&mut self, index: usize, value: T) -> EcsResult<()> {
        let len = self.elements.len();
        let slot = self
            .elements
            .get_mut(index)
            .ok_or(PoolError::ElementOutOfBounds { index, len })?;
        *slot = value;
        Ok(())
    }

    /// Appends an element at the end.
    pub fn append(&mut self, value: T) {
        self.elements.push(value);
    }

    /// Removes the element at `index` by swap-back and returns it.
    ///
    /// The previously last element now sits at `index`.
    pub fn remove_swap(&mut self, index: usize) -> EcsResult<T> {
        if index >= self.elements.len() {
            return Err(
                PoolError::ElementOutOfBounds { index, len: self.elements.len() }.into()
            );
        }
        Ok(self.elements.swap_remove(index))
    }

    /// Removes every element.
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Iterates the elements mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.elements.iter_mut()
    }
}

/// Read view over one taxon's lists.
pub struct ListSlice<'a, T> {
    /// Canonical entity order of the taxon.
    pub entities: &'a [Entity],
    lists: Option<&'a NestedList<T>>,
}

impl<'a, T: Component> ListSlice<'a, T> {
    /// Number of records in the taxon.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the taxon holds no records.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The list stored at entry `k`, position-parallel to `entities`.
    pub fn list(&self, k: usize) -> Option<ListRef<'a, T>> {
        self.lists?.row(k).map(|elements| ListRef { elements })
    }
}

/// Per-taxon storage of owned element lists.
pub struct ListPool<T: Component> {
    core: PoolCore,
    lists: Vec<NestedList<T>>,
    creation_events: bool,
    destruction_events: bool,
}

impl<T: Component> ListPool<T> {
    /// Creates an empty pool for the given interned type.
    pub fn new(type_index: TypeIndex) -> Self {
        Self {
            core: PoolCore::new(type_index),
            lists: Vec::new(),
            creation_events: false,
            destruction_events: false,
        }
    }

    /// Enables `ListCreated<T>` emission on add.
    pub(crate) fn enable_creation_events(&mut self) {
        self.creation_events = true;
    }

    /// Enables `ListDestroyed<T>` emission on destroy.
    pub(crate) fn enable_destruction_events(&mut self) {
        self.destruction_events = true;
    }

    fn payload_mut(&mut self, taxon: TaxonId) -> &mut NestedList<T> {
        if (taxon as usize) >= self.lists.len() {
            self.lists.resize_with(taxon as usize + 1, NestedList::new);
        }
        &mut self.lists[taxon as usize]
    }

    fn insert(&mut self, entity: Entity, row: Vec<T>, taxon: TaxonId) -> EcsResult<()> {
        self.core.link(entity, taxon)?;
        self.payload_mut(taxon).adopt_row(row);
        Ok(())
    }

    /// Attaches an empty list with the given capacity to `entity`.
    pub(crate) fn add(
        &mut self,
        entity: Entity,
        capacity: usize,
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
        self.insert(entity, Vec::with_capacity(capacity), taxon)?;
        if self.creation_events && !entity.is_prototype() {
            events.emit(ListCreated::<T>::new(entity))?;
        }
        Ok(())
    }

    pub(crate) fn remove(&mut self, entity: Entity, events: &mut EventBus) -> EcsResult<()> {
        let (index, _swapped) = self.core.unlink(entity)?;
        // Swap-back at the outer level drops the owned inner list.
        self.lists[index.taxon() as usize].take_row(index.entry() as usize)?;
        if self.destruction_events && !entity.is_prototype() {
            events.emit(ListDestroyed::<T>::new(entity))?;
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
        // Ownership of the buffer moves; elements are not reallocated.
        let row = self.lists[old.taxon() as usize].take_row(old.entry() as usize)?;
        self.insert(entity, row, taxon)
    }

    /// Returns `true` if `entity` has a list.
    #[inline]
    pub fn has(&self, entity: Entity) -> bool {
        self.core.has(entity)
    }

    /// Packed address of `entity`'s record, if present.
    #[inline]
    pub fn index_of(&self, entity: Entity) -> Option<ComponentIndex> {
        self.core.index_of(entity)
    }

    /// Read accessor over `entity`'s list.
    pub fn list(&self, entity: Entity) -> EcsResult<ListRef<'_, T>> {
        let index = self.core.index_of(entity).ok_or(PoolError::MissingComponent {
            entity,
            type_index: self.core.type_index(),
        })?;
        let elements = self.lists[index.taxon() as usize]
            .row(index.entry() as usize)
            .ok_or(PoolError::CorruptSnapshot { reason: "list row missing for linked entry" })?;
        Ok(ListRef { elements })
    }

    /// Write accessor over `entity`'s list.
    pub fn list_mut(&mut self, entity: Entity) -> EcsResult<ListMut<'_, T>> {
        let index = self.core.index_of(entity).ok_or(PoolError::MissingComponent {
            entity,
            type_index: self.core.type_index(),
        })?;
        let elements = self.lists[index.taxon() as usize]
            .row_mut(index.entry() as usize)
            .ok_or(PoolError::CorruptSnapshot { reason: "list row missing for linked entry" })?;
        Ok(ListMut { elements })
    }

    /// Read view over one taxon.
    pub fn slice(&self, taxon: TaxonId) -> ListSlice<'_, T> {
        ListSlice {
            entities: self.core.entities(taxon),
            lists: self.lists.get(taxon as usize),
        }
    }
}

impl<T: Component> Pool for ListPool<T> {
    fn type_index(&self) -> TypeIndex {
        self.core.type_index()
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::List
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
        if self.core.has(target) {
            return Err(PoolError::DuplicateComponent {
                entity: target,
                type_index: self.core.type_index(),
            }
            .into());
        }
        // Element-by-element copy; the source list's length decides the count.
        let elements: Vec<T> = self.list(source)?.iter().copied().collect();
        self.insert(target, elements, taxon)?;
        if self.creation_events && !target.is_prototype() {
            events.emit(ListCreated::<T>::new(target))?;
        }
        Ok(())
    }

    fn serialize(&self) -> PoolSnapshot {
        let entities = self.core.all_entities();
        let mut counts: Vec<u32> = Vec::with_capacity(entities.len());
        let mut elements: Vec<T> = Vec::new();
        for &taxon in self.core.taxa() {
            let lists = &self.lists[taxon as usize];
            for k in 0..lists.len() {
                let row = lists.row(k).expect("row count matches entity map");
                counts.push(row.len() as u32);
                elements.extend_from_slice(row);
            }
        }
        PoolSnapshot {
            entities: bytemuck::cast_slice(&entities).to_vec(),
            components: bytemuck::cast_slice(&elements).to_vec(),
            filter_indices: None,
            element_counts: Some(bytemuck::cast_slice(&counts).to_vec()),
        }
    }

    fn reset(&mut self) {
        self.core.reset();
        self.lists.clear();
    }

    fn deserialize(
        &mut self,
        snapshot: &PoolSnapshot,
        _instances: &mut FilterInstanceTable,
    ) -> EcsResult<()> {
        self.reset();
        let entities: Vec<Entity> = bytemuck::pod_collect_to_vec(&snapshot.entities);
        let elements: Vec<T> = bytemuck::pod_collect_to_vec(&snapshot.components);
        let counts: Vec<u32> = match &snapshot.element_counts {
            Some(bytes) => bytemuck::pod_collect_to_vec(bytes),
            None => {
                return Err(PoolError::CorruptSnapshot {
                    reason: "list snapshot is missing element counts",
                }
                .into())
            }
        };
        if entities.len() != counts.len() {
            return Err(PoolError::CorruptSnapshot {
                reason: "entity and count lengths differ",
            }
            .into());
        }
        let mut cursor = 0usize;
        for (entity, count) in entities.into_iter().zip(counts) {
            let count = count as usize;
            let end = cursor + count;
            if end > elements.len() {
                return Err(PoolError::CorruptSnapshot {
                    reason: "element counts exceed element data",
                }
                .into());
            }
            let row: Vec<T> = elements[cursor..end].to_vec();
            cursor = end;
            let taxon = if entity.is_prototype() { TAXON_PROTOTYPE } else { TAXON_DEFAULT };
            self.insert(entity, row, taxon)?;
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
