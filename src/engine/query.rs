//! Typed query construction.
//!
//! A [`Query`] is an ordered list of taxon ids: every taxon whose
//! meta-archetype covers the queried archetype and, for filtered queries,
//! whose filter combination equals or strictly contains the requested
//! values. Enumeration of a query is enumeration of *slices*, not entities:
//! callers ask each pool for its slice at each taxon and parallel-iterate.
//!
//! ## Snapshot semantics
//! A query captures the taxon list at build time. Operations that mark
//! entities dirty (component add/remove, filter changes) may invalidate it;
//! do not hold a query across such operations — rebuild it after the next
//! reconciliation instead.

use crate::engine::error::EcsResult;
use crate::engine::pool::FilterValue;
use crate::engine::types::{ArchetypeIndex, FilterInstanceIndex, TaxonId};
use crate::engine::world::World;


/// Ordered list of taxa matching an archetype and optional filter values.
///
/// Empty queries are legal; iterating one visits nothing.
#[derive(Clone, Debug, Default)]
pub struct Query {
    taxa: Vec<TaxonId>,
}

impl Query {
    /// A query matching no taxa.
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_taxa(taxa: Vec<TaxonId>) -> Self {
        Self { taxa }
    }

    /// The matched taxa, in ascending id order.
    #[inline]
    pub fn taxa(&self) -> &[TaxonId] {
        &self.taxa
    }

    /// Number of matched taxa.
    #[inline]
    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    /// Returns `true` if no taxon matched.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }
}

/// Builder for archetype queries with optional exact-match filter values.
///
/// Produced by [`World::query`]; consumed by [`QueryBuilder::build`].
///
/// ## Example
/// ```ignore
/// let red_units = world.query(unit_archetype).with(Team::RED).build()?;
/// for &taxon in red_units.taxa() {
///     let positions = world.data::<Position>()?.slice(taxon);
///     // ...
/// }
/// ```
pub struct QueryBuilder<'w> {
    world: &'w mut World,
    archetype: ArchetypeIndex,
    /// One entry per `with` call; `None` records a never-seen value.
    instances: Vec<Option<FilterInstanceIndex>>,
}

impl<'w> QueryBuilder<'w> {
    pub(crate) fn new(world: &'w mut World, archetype: ArchetypeIndex) -> Self {
        Self { world, archetype, instances: Vec::new() }
    }

    /// Requires records to be grouped under the exact filter value `value`.
    ///
    /// A value that has never been observed cannot match any taxon; the
    /// built query is then empty (recoverable, not an error).
    pub fn with<T: FilterValue>(mut self, value: T) -> Self {
        let instance = self
            .world
            .filters::<T>()
            .ok()
            .and_then(|pool| pool.lookup(&value));
        self.instances.push(instance);
        self
    }

    /// Resolves the taxon list.
    ///
    /// ## Errors
    /// Fails when the world is uninitialized, the archetype index is
    /// unknown, or reconciliation is pending.
    pub fn build(self) -> EcsResult<Query> {
        self.world.build_query(self.archetype, &self.instances)
    }
}
