//! Directory catalog
//!
//! A directory's content is its child table: name -> (type, handle). The
//! table is persisted through the active allocation strategy as an encoded
//! blob (see [`codec`]) and rebuilt from it on every lookup.

pub mod codec;
pub mod metadata;

pub use codec::{decode_entries, encode_entries};
pub use metadata::{DirEntry, Entry, FileType};

use crate::allocator::{AllocationStrategy, Handle};
use crate::error::{FsError, Result};
use std::collections::BTreeMap;

/// Decoded child table of one directory
///
/// Provides the operations the facade needs:
/// - Insert a new child (names stay unique)
/// - Look up / remove children by name
/// - Re-point a child at a new handle
/// - Iterate children in name order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryTable {
    entries: BTreeMap<String, DirEntry>,
}

impl EntryTable {
    pub fn new() -> Self {
        EntryTable::default()
    }

    /// Load and decode the table stored under `handle`
    pub fn load(strategy: &dyn AllocationStrategy, handle: Handle) -> Result<Self> {
        let bytes = strategy.load(handle)?;
        Self::decode(&bytes, strategy)
    }

    /// Decode an encoded table
    pub fn decode(bytes: &[u8], strategy: &dyn AllocationStrategy) -> Result<Self> {
        let mut table = EntryTable::new();
        for entry in decode_entries(bytes, strategy)? {
            if table.entries.contains_key(&entry.name) {
                return Err(FsError::invalid(format!(
                    "duplicate entry '{}' in directory table",
                    entry.name
                )));
            }
            table.entries.insert(entry.name.clone(), entry);
        }
        Ok(table)
    }

    /// Encode the whole table (records in name order)
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_entries(self.entries.values())
    }

    pub fn get(&self, name: &str) -> Option<&DirEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Add a child; fails with `AlreadyExists` if the name is taken
    pub fn insert(&mut self, entry: DirEntry) -> Result<()> {
        if self.entries.contains_key(&entry.name) {
            return Err(FsError::AlreadyExists(entry.name));
        }
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<DirEntry> {
        self.entries.remove(name)
    }

    /// Point an existing child at a new handle
    pub fn set_handle(&mut self, name: &str, handle: Handle) -> Result<()> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        entry.handle = handle;
        Ok(())
    }

    /// Children in name order
    pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
