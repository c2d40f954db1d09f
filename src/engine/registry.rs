//! Interning registries.
//!
//! Two flavors share the same contract: append-only storage behind a stable
//! 16-bit index.
//!
//! - [`Registry`] interns *values*: interning the same value twice yields
//!   the same index. Used for filter combinations and other identity sets.
//! - [`NamedRegistry`] interns *named entries*: the name is the key and the
//!   value is arbitrary payload. An optional fallback loader can construct
//!   missing entries on lookup; a miss without a loader is fatal.
//!
//! Indices are never reused and entries are never removed.

use std::collections::HashMap;
use std::hash::Hash;

use crate::engine::error::{EcsResult, RegistryError};


const INDEX_CAP: usize = u16::MAX as usize;

/// Append-only value interner behind a stable 16-bit index.
pub struct Registry<T: Eq + Hash + Clone> {
    values: Vec<T>,
    reverse: HashMap<T, u16>,
}

impl<T: Eq + Hash + Clone> Default for Registry<T> {
    fn default() -> Self {
        Self { values: Vec::new(), reverse: HashMap::new() }
    }
}

impl<T: Eq + Hash + Clone> Registry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `value`, returning its stable index.
    ///
    /// Interning an already-present value returns the existing index.
    ///
    /// ## Errors
    /// `RegistryError::CapacityExceeded` once the 16-bit index space is
    /// exhausted.
    pub fn intern(&mut self, value: T) -> EcsResult<u16> {
        if let Some(&index) = self.reverse.get(&value) {
            return Ok(index);
        }
        if self.values.len() >= INDEX_CAP {
            return Err(RegistryError::CapacityExceeded { cap: INDEX_CAP }.into());
        }
        let index = self.values.len() as u16;
        self.reverse.insert(value.clone(), index);
        self.values.push(value);
        Ok(index)
    }

    /// Returns the value behind `index`, if interned.
    #[inline]
    pub fn get(&self, index: u16) -> Option<&T> {
        self.values.get(index as usize)
    }

    /// Returns the index of `value`, if interned.
    #[inline]
    pub fn index_of(&self, value: &T) -> Option<u16> {
        self.reverse.get(value).copied()
    }

    /// Number of interned values.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing has been interned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(index, value)` pairs in interning order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &T)> {
        self.values.iter().enumerate().map(|(i, v)| (i as u16, v))
    }
}

/// Fallback constructor invoked when a named lookup misses.
pub type FallbackLoader<T> = Box<dyn Fn(&str) -> EcsResult<T> + Send + Sync>;

/// Append-only name-keyed registry behind a stable 16-bit index.
///
/// ## Purpose
/// Associates string names with payload values and hands out compact
/// indices. External collaborators (prototype loaders, asset tables) resolve
/// names once and use the index afterwards.
///
/// ## Fallback loading
/// A registry may carry a fallback loader. `get_or_load` invokes it on a
/// miss to construct a fresh value; without a loader, a miss is the fatal
/// `MissingEntry` error.
pub struct NamedRegistry<T> {
    values: Vec<T>,
    names: Vec<String>,
    by_name: HashMap<String, u16>,
    loader: Option<FallbackLoader<T>>,
}

impl<T> Default for NamedRegistry<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            names: Vec::new(),
            by_name: HashMap::new(),
            loader: None,
        }
    }
}

impl<T> NamedRegistry<T> {
    /// Creates an empty named registry without a fallback loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the fallback loader invoked on lookup misses.
    pub fn set_loader(&mut self, loader: FallbackLoader<T>) {
        self.loader = Some(loader);
    }

    /// Registers `value` under `name`, returning its stable index.
    ///
    /// ## Errors
    /// - `DuplicateName` if the name is already registered.
    /// - `CapacityExceeded` once the 16-bit index space is exhausted.
    pub fn add(&mut self, name: &str, value: T) -> EcsResult<u16> {
        if self.by_name.contains_key(name) {
            return Err(RegistryError::DuplicateName { name: name.to_string() }.into());
        }
        if self.values.len() >= INDEX_CAP {
            return Err(RegistryError::CapacityExceeded { cap: INDEX_CAP }.into());
        }
        let index = self.values.len() as u16;
        self.by_name.insert(name.to_string(), index);
        self.names.push(name.to_string());
        self.values.push(value);
        Ok(index)
    }

    /// Returns the value behind `index`, if registered.
    #[inline]
    pub fn get(&self, index: u16) -> Option<&T> {
        self.values.get(index as usize)
    }

    /// Returns the value behind `index` or an out-of-bounds error.
    pub fn require(&self, index: u16) -> EcsResult<&T> {
        self.values.get(index as usize).ok_or_else(|| {
            RegistryError::IndexOutOfBounds { index: index as usize, len: self.values.len() }
                .into()
        })
    }

    /// Returns the name behind `index`, if registered.
    #[inline]
    pub fn name(&self, index: u16) -> Option<&str> {
        self.names.get(index as usize).map(|n| n.as_str())
    }

    /// Returns the index registered under `name`, if any.
    #[inline]
    pub fn index_by_name(&self, name: &str) -> Option<u16> {
        self.by_name.get(name).copied()
    }

    /// Resolves `name`, invoking the fallback loader on a miss.
    ///
    /// ## Errors
    /// `MissingEntry` when the name is unknown and no loader is installed;
    /// otherwise whatever the loader returns.
    pub fn get_or_load(&mut self, name: &str) -> EcsResult<u16> {
        if let Some(&index) = self.by_name.get(name) {
            return Ok(index);
        }
        let Some(loader) = self.loader.as_ref() else {
            return Err(RegistryError::MissingEntry { name: name.to_string() }.into());
        };
        let value = loader(name)?;
        self.add(name, value)
    }

    /// Number of registered entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing has been registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
