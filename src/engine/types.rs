//! Core Types, Identifiers, and Bit-Level Layouts
//!
//! This module defines the **fundamental types, identifiers, bit layouts, and
//! type-set signatures** shared across the engine: entity handles, component
//! type indices, taxon identifiers, and packed component addresses.
//!
//! ## Design Philosophy
//!
//! The engine is designed around:
//!
//! - **Dense, taxon-grouped storage**
//! - **Interned identities behind small numeric indices**
//! - **Bitset-based type sets**
//! - **Stable packed handles**
//!
//! To support these goals efficiently, this module:
//!
//! - Encodes entities into a single 32-bit value,
//! - Encodes component addresses into a single 32-bit value,
//! - Represents component type sets as fixed-size bit arrays,
//! - Avoids heap allocation in hot paths.
//!
//! ## Entity Representation
//!
//! Entities are packed 32-bit integers with the following layout:
//!
//! ```text
//! | prototype | id |
//! ```
//!
//! - **Id** occupies the low 31 bits; id 0 is reserved for the null entity.
//! - **Prototype** is a single flag in the top bit. Prototype entities act as
//!   templates: they never appear in queries and never become dirty.
//!
//! Equality is by the full 32-bit value, so a prototype and a normal entity
//! with the same id are distinct handles.
//!
//! ## Component Addresses
//!
//! A [`ComponentIndex`] locates a component record inside its pool as a
//! `(taxon, entry)` pair packed into 32 bits: the taxon id in the high 12
//! bits and the entry position in the low 20 bits. Component indices are
//! invalidated by removal, taxon migration, or a filter change of the owning
//! entity.
//!
//! ## Taxa
//!
//! A taxon names a `(meta-archetype, filter-combination)` pair and therefore
//! a storage bucket in which co-located records live. Taxon ids 0, 1, and 2
//! are reserved (null, prototype, default); the rest are allocated lazily.

use bytemuck::{Pod, Zeroable};


/// Bit-width type used for compile-time layout calculations.
pub type Bits = u8;

/// Raw 32-bit entity value (31-bit id plus prototype flag).
pub type EntityBits = u32;
/// Plain entity id, without the prototype flag.
pub type EntityId = u32;

/// Interned component type identity.
pub type TypeIndex = u16;
/// Interned user archetype identity.
pub type ArchetypeIndex = u16;
/// Interned meta-archetype identity.
pub type MetaArchetypeIndex = u16;
/// Interned unique filter value identity (engine-global).
pub type FilterInstanceIndex = u16;
/// Interned filter-combination identity.
pub type FilterCombinationIndex = u16;
/// Taxon identifier naming a `(meta-archetype, filter-combination)` bucket.
pub type TaxonId = u16;
/// Index of a named work queue.
pub type QueueIndex = u16;
/// Interned event type identity.
pub type EventTypeIndex = u16;

/// Total number of bits in an entity handle.
pub const ENTITY_BITS: Bits = 32;
/// Number of bits reserved for the entity id.
pub const ENTITY_ID_BITS: Bits = 31;
/// Mask selecting the id portion of an entity.
pub const ENTITY_ID_MASK: EntityBits = (1 << ENTITY_ID_BITS) - 1;
/// Flag bit marking prototype entities.
pub const PROTOTYPE_FLAG: EntityBits = 1 << ENTITY_ID_BITS;
/// Largest assignable entity id.
pub const ENTITY_ID_CAP: EntityId = ENTITY_ID_MASK;

/// Number of bits reserved for the taxon in a [`ComponentIndex`].
pub const TAXON_BITS: Bits = 12;
/// Number of bits reserved for the entry in a [`ComponentIndex`].
pub const ENTRY_BITS: Bits = 20;
/// Maximum number of taxa addressable by a [`ComponentIndex`].
pub const TAXON_CAP: usize = 1 << TAXON_BITS;
/// Maximum number of entries per taxon in a single pool.
pub const ENTRY_CAP: usize = 1 << ENTRY_BITS;
/// Mask selecting the entry portion of a packed component index.
pub const ENTRY_MASK: u32 = (ENTRY_CAP - 1) as u32;

/// Reserved taxon: the null taxon. No records are ever stored here.
pub const TAXON_NULL: TaxonId = 0;
/// Reserved taxon holding every component record of prototype entities.
pub const TAXON_PROTOTYPE: TaxonId = 1;
/// Reserved taxon for components matching no archetype, and the staging
/// bucket for freshly attached records awaiting reconciliation.
pub const TAXON_DEFAULT: TaxonId = 2;
/// First taxon id handed out by lazy allocation.
pub const TAXON_FIRST_DYNAMIC: TaxonId = 3;

/// Maximum number of registered component types.
pub const TYPE_CAP: usize = 1024;
/// Number of `u64` words required to represent a full type set.
pub const TYPE_SET_WORDS: usize = TYPE_CAP / 64;

const _: [(); 1] = [(); (ENTITY_ID_BITS < ENTITY_BITS) as usize];
const _: [(); 1] = [(); (TAXON_BITS + ENTRY_BITS == 32) as usize];
const _: [(); 1] = [(); (TYPE_CAP % 64 == 0) as usize];

/// Opaque handle for an engine entity.
///
/// ## Representation
/// A packed 32-bit value: the id in the low 31 bits and the prototype flag
/// in the top bit. Id 0 is reserved; [`Entity::NULL`] is the canonical null
/// handle.
///
/// ## Invariants
/// - Two handles are equal iff their full 32-bit values are equal.
/// - A handle is live iff the allocator's slot for its id still holds
///   exactly this value.
///
/// ## Notes
/// `Entity` values are cheap to copy and compare, are plain old data, and
/// may be embedded in component payloads as weak references; use
/// `World::has_entity` to check liveness before dereferencing.

#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Pod, Zeroable)]
pub struct Entity(pub EntityBits);

impl Entity {
    /// The null entity. Never live.
    pub const NULL: Entity = Entity(0);

    /// Packs an id and a prototype flag into a handle.
    #[inline]
    pub const fn new(id: EntityId, prototype: bool) -> Self {
        Entity(if prototype { id | PROTOTYPE_FLAG } else { id })
    }

    /// Returns the 31-bit id component of this handle.
    #[inline]
    pub const fn id(self) -> EntityId {
        self.0 & ENTITY_ID_MASK
    }

    /// Returns `true` if the prototype flag is set.
    #[inline]
    pub const fn is_prototype(self) -> bool {
        self.0 & PROTOTYPE_FLAG != 0
    }

    /// Returns `true` if this is the null handle.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Packed address of a component record inside its pool.
///
/// ## Representation
/// `(taxon: 12 bits, entry: 20 bits)` packed into 32 bits. The all-zero
/// value doubles as the null sentinel because no record is ever stored in
/// the null taxon.
///
/// ## Invalidation
/// A component index is invalidated by removal of the record (swap-back),
/// taxon migration, or a filter change of the owning entity. Holders must
/// re-resolve through the pool's index map after any such operation.

#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct ComponentIndex(pub u32);

impl ComponentIndex {
    /// Null sentinel (taxon 0, entry 0).
    pub const NULL: ComponentIndex = ComponentIndex(0);

    /// Packs a taxon id and entry position into an address.
    #[inline]
    pub const fn new(taxon: TaxonId, entry: u32) -> Self {
        ComponentIndex(((taxon as u32) << ENTRY_BITS) | (entry & ENTRY_MASK))
    }

    /// Returns the taxon id this address points into.
    #[inline]
    pub const fn taxon(self) -> TaxonId {
        (self.0 >> ENTRY_BITS) as TaxonId
    }

    /// Returns the entry position inside the taxon.
    #[inline]
    pub const fn entry(self) -> u32 {
        self.0 & ENTRY_MASK
    }

    /// Returns `true` if this is the null sentinel.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Debug for ComponentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            f.write_str("ComponentIndex(NULL)")
        } else {
            write!(f, "ComponentIndex(taxon: {}, entry: {})", self.taxon(), self.entry())
        }
    }
}

/// The three disjoint kinds of component pools.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ComponentKind {
    /// Plain dense value storage.
    Data,
    /// Variable-length sequences of elements.
    List,
    /// Exact-match partitioning values backed by an interned unique table.
    Filter,
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentKind::Data => f.write_str("data"),
            ComponentKind::List => f.write_str("list"),
            ComponentKind::Filter => f.write_str("filter"),
        }
    }
}

/// Bitset over registered component type indices.
///
/// Used for per-entity component type sets, archetype and meta-archetype
/// bags, and as the key of the archetype-match cache.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TypeSet {
    /// Packed type-index bitset.
    pub words: [u64; TYPE_SET_WORDS],
}

impl Default for TypeSet {
    fn default() -> Self {
        Self { words: [0u64; TYPE_SET_WORDS] }
    }
}

impl TypeSet {
    /// Builds a set from a list of type indices.
    pub fn from_indices(indices: &[TypeIndex]) -> Self {
        let mut set = Self::default();
        for &index in indices {
            set.set(index);
        }
        set
    }

    /// Sets the bit corresponding to `type_index`.
    #[inline]
    pub fn set(&mut self, type_index: TypeIndex) {
        let word = (type_index as usize) / 64;
        let bit = (type_index as usize) % 64;
        self.words[word] |= 1u64 << bit;
    }

    /// Clears the bit corresponding to `type_index`.
    #[inline]
    pub fn clear(&mut self, type_index: TypeIndex) {
        let word = (type_index as usize) / 64;
        let bit = (type_index as usize) % 64;
        self.words[word] &= !(1u64 << bit);
    }

    /// Returns `true` if `type_index` is present in this set.
    #[inline]
    pub fn has(&self, type_index: TypeIndex) -> bool {
        let word = (type_index as usize) / 64;
        let bit = (type_index as usize) % 64;
        (self.words[word] >> bit) & 1 == 1
    }

    /// Returns `true` if every member of `other` is present in `self`.
    #[inline]
    pub fn contains_all(&self, other: &TypeSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| (a & b) == *b)
    }

    /// Returns `true` if the two sets share at least one member.
    #[inline]
    pub fn intersects(&self, other: &TypeSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| (a & b) != 0)
    }

    /// Adds every member of `other` into `self`.
    #[inline]
    pub fn union_with(&mut self, other: &TypeSet) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= *b;
        }
    }

    /// Returns `true` if the set has no members.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Returns the number of members.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns the smallest member, if any.
    pub fn first(&self) -> Option<TypeIndex> {
        self.iter().next()
    }

    /// Iterates over all type indices set in this set, ascending.
    pub fn iter(&self) -> impl Iterator<Item = TypeIndex> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, &word)| {
            let base = word_index * 64;
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some((base + tz) as TypeIndex)
            })
        })
    }
}
