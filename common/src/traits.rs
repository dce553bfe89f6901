//! Key-value database traits for snapshot storage backends.

/// Write access to a key-value store or a write batch.
///
/// Both the databases themselves and their batches implement this trait, so
/// codec helpers that produce writes can target either.
pub trait KeyValueWriter {
    /// Associated error type for write operations
    type Error;

    /// Insert the given value into the store under the given key
    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), Self::Error>;

    /// Remove the key from the store
    fn delete(&mut self, key: &[u8]) -> Result<(), Self::Error>;
}

/// A buffered set of writes that is committed atomically through the
/// database that created it.
pub trait KeyValueBatch: KeyValueWriter {
    /// Returns true if the batch holds no operations
    fn is_empty(&self) -> bool;

    /// Number of buffered operations
    fn len(&self) -> usize;

    /// Drop all buffered operations
    fn clear(&mut self) -> Result<(), Self::Error>;
}

/// Cursor over an ordered subset of the key space.
///
/// Iterators are lazy and caller-driven: `next` must return true before
/// `key`/`value` are meaningful. The view is consistent with the store state
/// at construction time, regardless of concurrent writes.
pub trait KeyValueIterator {
    /// Advance to the next entry, returning false once exhausted
    fn next(&mut self) -> bool;

    /// Key of the current entry, empty if not positioned
    fn key(&self) -> &[u8];

    /// Value of the current entry, empty if not positioned
    fn value(&self) -> &[u8];

    /// Any error accumulated while iterating
    fn error(&self) -> Option<String>;
}

/// Ordered byte-keyed database with atomic batches and prefix iteration.
pub trait KeyValueDatabase {
    /// Associated error type for database operations
    type Error;
    /// Buffered write batch type
    type Batch: KeyValueBatch<Error = Self::Error>;
    /// Iterator type, borrowing the database for its lifetime
    type Iterator<'a>: KeyValueIterator
    where
        Self: 'a;

    /// Get a value from the store by key
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Insert a value into the store under the given key
    fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<(), Self::Error>;

    /// Remove a key from the store
    fn remove(&self, key: &[u8]) -> Result<(), Self::Error>;

    /// Check whether a key exists in the store
    fn contains(&self, key: &[u8]) -> Result<bool, Self::Error>;

    /// Create an empty write batch
    fn create_batch(&self) -> Self::Batch;

    /// Atomically apply a batch to the store
    fn batch_commit(&self, batch: Self::Batch) -> Result<(), Self::Error>;

    /// Iterate entries whose key carries the given prefix, in ascending byte
    /// order of the full key, starting at the first key >= prefix || start.
    fn iterator(&self, prefix: &[u8], start: &[u8]) -> Result<Self::Iterator<'_>, Self::Error>;

    /// Close the store; subsequent operations fail
    fn close(&self) -> Result<(), Self::Error>;
}
