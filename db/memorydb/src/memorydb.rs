//! In-memory database implementation for snapshot data.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use thiserror::Error;

use rust_eth_snaptree_common::{
    KeyValueBatch, KeyValueDatabase, KeyValueIterator, KeyValueWriter,
};

/// Error type for memory database operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryDBError {
    /// The database was closed before the operation
    #[error("database closed")]
    Closed,
}

/// In-memory batch implementation for MemoryDB.
///
/// Writes are buffered in insertion order and replayed sequentially on
/// commit, so a later write to a key overrides an earlier delete of it.
#[derive(Debug, Default)]
pub struct MemoryDBBatch {
    /// Pending operations to be applied, None value means delete
    writes: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

impl MemoryDBBatch {
    /// Create a new empty batch
    pub fn new() -> Self {
        Self { writes: Vec::new() }
    }
}

impl KeyValueWriter for MemoryDBBatch {
    type Error = MemoryDBError;

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), Self::Error> {
        self.writes.push((key.to_vec(), Some(value)));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), Self::Error> {
        self.writes.push((key.to_vec(), None));
        Ok(())
    }
}

impl KeyValueBatch for MemoryDBBatch {
    fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    fn len(&self) -> usize {
        self.writes.len()
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.writes.clear();
        Ok(())
    }
}

/// Iterator over a subset of the memory database content.
///
/// Internally it is a deep copy of the iterated range taken under the read
/// lock at construction, sorted by key, so it is unaffected by writes that
/// happen after it was created.
#[derive(Debug)]
pub struct MemoryDBIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    current: Option<usize>,
    next_index: usize,
}

impl KeyValueIterator for MemoryDBIterator {
    fn next(&mut self) -> bool {
        if self.next_index < self.entries.len() {
            self.current = Some(self.next_index);
            self.next_index += 1;
            true
        } else {
            self.current = None;
            false
        }
    }

    fn key(&self) -> &[u8] {
        self.current.map_or(&[], |i| self.entries[i].0.as_slice())
    }

    fn value(&self) -> &[u8] {
        self.current.map_or(&[], |i| self.entries[i].1.as_slice())
    }

    fn error(&self) -> Option<String> {
        // A memory iterator cannot encounter errors.
        None
    }
}

/// Ephemeral key-value store backed by an ordered map.
#[derive(Debug, Clone)]
pub struct MemoryDB {
    /// Entry storage, None once the database has been closed.
    entries: Arc<RwLock<Option<BTreeMap<Vec<u8>, Vec<u8>>>>>,
}

impl MemoryDB {
    /// Creates a new empty memory database.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Some(BTreeMap::new()))),
        }
    }

    /// Returns the number of entries currently present in the database.
    pub fn len(&self) -> usize {
        self.entries.read().as_ref().map_or(0, |map| map.len())
    }

    /// Checks if the database is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryDB {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueDatabase for MemoryDB {
    type Error = MemoryDBError;
    type Batch = MemoryDBBatch;
    type Iterator<'a> = MemoryDBIterator where Self: 'a;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Self::Error> {
        let guard = self.entries.read();
        let map = guard.as_ref().ok_or(MemoryDBError::Closed)?;
        Ok(map.get(key).cloned())
    }

    fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<(), Self::Error> {
        let mut guard = self.entries.write();
        let map = guard.as_mut().ok_or(MemoryDBError::Closed)?;
        map.insert(key.to_vec(), value);
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<(), Self::Error> {
        let mut guard = self.entries.write();
        let map = guard.as_mut().ok_or(MemoryDBError::Closed)?;
        map.remove(key);
        Ok(())
    }

    fn contains(&self, key: &[u8]) -> Result<bool, Self::Error> {
        let guard = self.entries.read();
        let map = guard.as_ref().ok_or(MemoryDBError::Closed)?;
        Ok(map.contains_key(key))
    }

    fn create_batch(&self) -> Self::Batch {
        MemoryDBBatch::new()
    }

    fn batch_commit(&self, batch: Self::Batch) -> Result<(), Self::Error> {
        let mut guard = self.entries.write();
        let map = guard.as_mut().ok_or(MemoryDBError::Closed)?;
        for (key, value) in batch.writes {
            match value {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn iterator(&self, prefix: &[u8], start: &[u8]) -> Result<Self::Iterator<'_>, Self::Error> {
        let guard = self.entries.read();
        let map = guard.as_ref().ok_or(MemoryDBError::Closed)?;

        let mut first = prefix.to_vec();
        first.extend_from_slice(start);

        let entries = map
            .range::<[u8], _>((Bound::Included(first.as_slice()), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(MemoryDBIterator {
            entries,
            current: None,
            next_index: 0,
        })
    }

    fn close(&self) -> Result<(), Self::Error> {
        *self.entries.write() = None;
        Ok(())
    }
}

impl KeyValueWriter for MemoryDB {
    type Error = MemoryDBError;

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), Self::Error> {
        KeyValueDatabase::insert(self, key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), Self::Error> {
        KeyValueDatabase::remove(self, key)
    }
}
