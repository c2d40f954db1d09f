//! # Entity Management
//!
//! This module defines the entity identity, lifecycle, and recycling
//! allocator used by the engine.
//!
//! ## Purpose
//! Entities are lightweight, opaque identifiers that reference records in
//! taxon-grouped pool storage. This module is responsible for:
//!
//! - Generating stable entity identifiers
//! - Recycling destroyed ids through an embedded free-list
//! - Tracking entity liveness
//! - Snapshotting the id space for save/load
//!
//! ## Entity Model
//! An [`Entity`] is a compact handle composed of:
//!
//! - A **31-bit id**, identifying the slot within the allocator
//! - A **prototype flag**, marking template entities
//!
//! Ids are handed out monotonically; destroyed ids enter a free-list that is
//! embedded in the slot array itself: a free slot stores the id of the next
//! free slot until it is reused.
//!
//! ## Invariants
//! - An entity `e` exists iff `slots[e.id()] == e.0` and `e.id() <
//!   next_free`.
//! - Id 0 is reserved for the null entity and is never issued.
//! - A slot is either live (holds its own entity value) or on the free-list
//!   (holds the next free id, which is never its own id).
//!
//! ## Capacity
//! Exhausting the 31-bit id space is a categorical failure; the allocator
//! never wraps.

use crate::engine::error::{AllocError, EcsResult};
use crate::engine::types::{Entity, EntityBits, EntityId, ENTITY_ID_CAP};


/// Recycling allocator over the 31-bit entity id space.
///
/// ## Design
/// - `slots[id]` holds the full entity value while `id` is live.
/// - Destroyed slots store the next free id, forming an intrusive free-list
///   headed by `recycle_next` (0 terminates the list).
/// - `next_free` is the monotonic high-water mark: every id below it has
///   been issued at least once.
pub struct EntityAllocator {
    slots: Vec<EntityBits>,
    next_free: EntityId,
    recycle_next: EntityId,
}

impl Default for EntityAllocator {
    fn default() -> Self {
        // Slot 0 backs the reserved null id.
        Self { slots: vec![0], next_free: 1, recycle_next: 0 }
    }
}

impl EntityAllocator {
    /// Creates an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an allocator with room reserved for `capacity` entities.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut allocator = Self::default();
        allocator.slots.reserve(capacity);
        allocator
    }

    /// Issues a new entity, reusing a recycled id when one is available.
    ///
    /// ## Errors
    /// `AllocError::IdSpaceExhausted` once all 2^31 - 1 ids are live.
    pub fn create(&mut self, prototype: bool) -> EcsResult<Entity> {
        let id = if self.recycle_next != 0 {
            let id = self.recycle_next;
            self.recycle_next = self.slots[id as usize];
            id
        } else {
            if self.next_free > ENTITY_ID_CAP {
                return Err(AllocError::IdSpaceExhausted {
                    issued: self.next_free as u64,
                    capacity: ENTITY_ID_CAP as u64,
                }
                .into());
            }
            let id = self.next_free;
            self.next_free += 1;
            self.slots.push(0);
            id
        };

        let entity = Entity::new(id, prototype);
        self.slots[id as usize] = entity.0;
        Ok(entity)
    }

    /// Returns `true` if `entity` is live.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        let id = entity.id();
        id != 0 && id < self.next_free && self.slots[id as usize] == entity.0
    }

    /// Destroys `entity`, pushing its id onto the free-list.
    ///
    /// ## Errors
    /// `AllocError::StaleEntity` if the handle is not live.
    pub fn destroy(&mut self, entity: Entity) -> EcsResult<()> {
        if !self.contains(entity) {
            return Err(AllocError::StaleEntity { entity }.into());
        }
        let id = entity.id();
        self.slots[id as usize] = self.recycle_next;
        self.recycle_next = id;
        Ok(())
    }

    /// The monotonic high-water mark: one past the largest id ever issued.
    #[inline]
    pub fn next_free(&self) -> EntityId {
        self.next_free
    }

    /// Head of the recycled-id free-list (0 when empty).
    #[inline]
    pub fn recycle_next(&self) -> EntityId {
        self.recycle_next
    }

    /// Number of live entities.
    pub fn live_count(&self) -> usize {
        self.iter().count()
    }

    /// Iterates over all live entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        (1..self.next_free).filter_map(move |id| {
            let bits = self.slots[id as usize];
            let entity = Entity(bits);
            if entity.id() == id {
                Some(entity)
            } else {
                None
            }
        })
    }

    /// Serializes the slot array for the world snapshot.
    pub fn snapshot_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.slots).to_vec()
    }

    /// Restores the allocator from snapshot state.
    ///
    /// Replaces the slot array, high-water mark, and free-list head
    /// wholesale; the caller is responsible for replaying pool contents.
    pub fn restore(&mut self, bytes: &[u8], next_free: EntityId, recycle_next: EntityId) {
        self.slots = bytemuck::pod_collect_to_vec::<u8, EntityBits>(bytes);
        if self.slots.is_empty() {
            self.slots.push(0);
        }
        self.next_free = next_free;
        self.recycle_next = recycle_next;
    }
}
