//! Nested list container.
//!
//! A [`NestedList`] is a dense vector of owned growable rows, addressed by
//! `(outer, inner)`. The outer level mirrors a taxon's entry order: rows are
//! appended at the end and removed by swap-back, exactly like the sibling
//! payload vectors of a pool. Moving a row between two containers transfers
//! ownership of the inner buffer; elements are never reallocated.

use crate::engine::error::{EcsResult, PoolError};


/// Dense vector of owned element rows.
pub struct NestedList<T> {
    rows: Vec<Vec<T>>,
}

impl<T> Default for NestedList<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<T> NestedList<T> {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the container holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends an empty row with the given capacity; returns its outer index.
    pub fn push_row(&mut self, capacity: usize) -> usize {
        self.rows.push(Vec::with_capacity(capacity));
        self.rows.len() - 1
    }

    /// Appends an already-built row; returns its outer index.
    pub fn adopt_row(&mut self, row: Vec<T>) -> usize {
        self.rows.push(row);
        self.rows.len() - 1
    }

    /// Removes the row at `outer` by swap-back and returns it.
    ///
    /// The previously last row now sits at `outer`.
    pub fn take_row(&mut self, outer: usize) -> EcsResult<Vec<T>> {
        if outer >= self.rows.len() {
            return Err(PoolError::ElementOutOfBounds { index: outer, len: self.rows.len() }.into());
        }
        Ok(self.rows.swap_remove(outer))
    }

    /// Borrows the row at `outer`.
    #[inline]
    pub fn row(&self, outer: usize) -> Option<&Vec<T>> {
        self.rows.get(outer)
    }

    /// Mutably borrows the row at `outer`.
    #[inline]
    pub fn row_mut(&mut self, outer: usize) -> Option<&mut Vec<T>> {
        self.rows.get_mut(outer)
    }

    /// Reads the element at `(outer, inner)`.
    #[inline]
    pub fn get(&self, outer: usize, inner: usize) -> Option<&T> {
        self.rows.get(outer).and_then(|row| row.get(inner))
    }

    /// Mutably reads the element at `(outer, inner)`.
    #[inline]
    pub fn get_mut(&mut self, outer: usize, inner: usize) -> Option<&mut T> {
        self.rows.get_mut(outer).and_then(|row| row.get_mut(inner))
    }

    /// Moves the row at `outer` into `target`, returning its new outer index
    /// there.
    ///
    /// Only ownership of the buffer moves; elements stay in place. The
    /// source side fills the hole by swap-back.
    pub fn transfer(&mut self, outer: usize, target: &mut NestedList<T>) -> EcsResult<usize> {
        let row = self.take_row(outer)?;
        Ok(target.adopt_row(row))
    }

    /// Drops every row.
    pub fn clear(&mut self) {
        self.rows.clear();
    }
}
