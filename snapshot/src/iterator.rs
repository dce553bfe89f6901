//! Ordered iteration over the disk layer.

use alloy_primitives::B256;

use rust_eth_snaptree_common::{KeyValueDatabase, KeyValueIterator};

use crate::error::SnapshotError;
use crate::rawdb;

/// Base interface shared by the account and storage iterators.
///
/// Advancement is lazy and caller-driven: `next` must return true before
/// `hash` and the payload accessors are meaningful. Entries come in
/// ascending byte order of the hash key.
pub trait SnapshotIterator {
    /// Advance to the next entry, returning false once exhausted
    fn next(&mut self) -> bool;

    /// Failure that ended iteration early, if any
    fn error(&self) -> Option<SnapshotError>;

    /// Hash key of the current entry
    fn hash(&self) -> B256;

    /// Release the underlying store cursor; further next calls return false
    fn release(&mut self);
}

/// Iterator over the account records of the disk layer.
pub trait AccountIterator: SnapshotIterator {
    /// Account payload of the current entry
    fn account(&self) -> &[u8];
}

/// Iterator over one account's storage records of the disk layer.
pub trait StorageIterator: SnapshotIterator {
    /// Slot payload of the current entry
    fn slot(&self) -> &[u8];
}

/// Account iterator walking the store in key order.
///
/// The store cursor is only trusted for ordering: the account-space boundary
/// is enforced here, so a key with a higher prefix ends the iteration
/// immediately instead of leaking foreign records.
pub struct DiskAccountIterator<'a, DB>
where
    DB: KeyValueDatabase + 'a,
{
    inner: Option<DB::Iterator<'a>>,
    fail: Option<SnapshotError>,
}

impl<'a, DB> DiskAccountIterator<'a, DB>
where
    DB: KeyValueDatabase + 'a,
{
    pub(crate) fn new(inner: DB::Iterator<'a>) -> Self {
        Self {
            inner: Some(inner),
            fail: None,
        }
    }
}

impl<'a, DB> SnapshotIterator for DiskAccountIterator<'a, DB>
where
    DB: KeyValueDatabase + 'a,
{
    fn next(&mut self) -> bool {
        let Some(it) = self.inner.as_mut() else {
            return false;
        };
        loop {
            if !it.next() {
                self.fail = it.error().map(SnapshotError::Database);
                break;
            }
            let key = it.key();
            // First key past the account space ends the iteration.
            if !key.starts_with(rawdb::ACCOUNT_SNAPSHOT_PREFIX) {
                break;
            }
            if key.len() == rawdb::ACCOUNT_SNAPSHOT_PREFIX.len() + 32 {
                return true;
            }
            // Same prefix but malformed length, skip it.
        }
        self.inner = None;
        false
    }

    fn error(&self) -> Option<SnapshotError> {
        self.fail.clone()
    }

    fn hash(&self) -> B256 {
        match &self.inner {
            Some(it) => {
                let key = it.key();
                if key.len() == rawdb::ACCOUNT_SNAPSHOT_PREFIX.len() + 32 {
                    B256::from_slice(&key[rawdb::ACCOUNT_SNAPSHOT_PREFIX.len()..])
                } else {
                    B256::ZERO
                }
            }
            None => B256::ZERO,
        }
    }

    fn release(&mut self) {
        self.inner = None;
    }
}

impl<'a, DB> AccountIterator for DiskAccountIterator<'a, DB>
where
    DB: KeyValueDatabase + 'a,
{
    fn account(&self) -> &[u8] {
        self.inner.as_ref().map_or(&[], |it| it.value())
    }
}

/// Storage iterator walking one account's slots in key order.
pub struct DiskStorageIterator<'a, DB>
where
    DB: KeyValueDatabase + 'a,
{
    inner: Option<DB::Iterator<'a>>,
    /// Storage prefix plus the account hash.
    prefix: Vec<u8>,
    fail: Option<SnapshotError>,
}

impl<'a, DB> DiskStorageIterator<'a, DB>
where
    DB: KeyValueDatabase + 'a,
{
    pub(crate) fn new(inner: DB::Iterator<'a>, prefix: Vec<u8>) -> Self {
        Self {
            inner: Some(inner),
            prefix,
            fail: None,
        }
    }
}

impl<'a, DB> SnapshotIterator for DiskStorageIterator<'a, DB>
where
    DB: KeyValueDatabase + 'a,
{
    fn next(&mut self) -> bool {
        let Some(it) = self.inner.as_mut() else {
            return false;
        };
        loop {
            if !it.next() {
                self.fail = it.error().map(SnapshotError::Database);
                break;
            }
            let key = it.key();
            // First key belonging to another account or key space ends the
            // iteration.
            if !key.starts_with(&self.prefix) {
                break;
            }
            if key.len() == self.prefix.len() + 32 {
                return true;
            }
        }
        self.inner = None;
        false
    }

    fn error(&self) -> Option<SnapshotError> {
        self.fail.clone()
    }

    fn hash(&self) -> B256 {
        match &self.inner {
            Some(it) => {
                let key = it.key();
                if key.len() == self.prefix.len() + 32 {
                    B256::from_slice(&key[self.prefix.len()..])
                } else {
                    B256::ZERO
                }
            }
            None => B256::ZERO,
        }
    }

    fn release(&mut self) {
        self.inner = None;
    }
}

impl<'a, DB> StorageIterator for DiskStorageIterator<'a, DB>
where
    DB: KeyValueDatabase + 'a,
{
    fn slot(&self) -> &[u8] {
        self.inner.as_ref().map_or(&[], |it| it.value())
    }
}
