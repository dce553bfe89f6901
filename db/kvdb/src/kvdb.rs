//! KvDB implementation for RocksDB integration.

use std::fmt::Debug;
use std::sync::Arc;

use rocksdb::{DBRawIteratorWithThreadMode, Options, ReadOptions, WriteBatch, WriteOptions, DB};
use tracing::{error, trace};

use rust_eth_snaptree_common::{
    KeyValueBatch, KeyValueDatabase, KeyValueIterator, KeyValueWriter,
};

use crate::traits::*;

use reth_metrics::{metrics::Counter, Metrics};

/// Metrics for the `KvDB`.
#[derive(Metrics, Clone)]
#[metrics(scope = "rust.eth.snaptree.kvdb")]
pub(crate) struct KvDBMetrics {
    /// Counter of point reads
    pub(crate) reads: Counter,
    /// Counter of single-key writes
    pub(crate) writes: Counter,
    /// Counter of committed batches
    pub(crate) batch_commits: Counter,
}

/// Buffered write batch backed by a RocksDB `WriteBatch`.
pub struct KvDBBatch {
    inner: WriteBatch,
}

impl KeyValueWriter for KvDBBatch {
    type Error = KvDBError;

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), Self::Error> {
        self.inner.put(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), Self::Error> {
        self.inner.delete(key);
        Ok(())
    }
}

impl KeyValueBatch for KvDBBatch {
    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.inner.clear();
        Ok(())
    }
}

/// Ordered prefix iterator over the RocksDB key space.
///
/// RocksDB iterators pin an implicit snapshot of the database at creation,
/// so the yielded entries are unaffected by concurrent writes. The prefix
/// boundary is enforced here rather than delegated to RocksDB.
pub struct KvDBIterator<'a> {
    inner: DBRawIteratorWithThreadMode<'a, DB>,
    prefix: Vec<u8>,
    started: bool,
    exhausted: bool,
}

impl<'a> KvDBIterator<'a> {
    fn new(inner: DBRawIteratorWithThreadMode<'a, DB>, prefix: Vec<u8>) -> Self {
        Self {
            inner,
            prefix,
            started: false,
            exhausted: false,
        }
    }
}

impl KeyValueIterator for KvDBIterator<'_> {
    fn next(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        if self.started {
            self.inner.next();
        } else {
            // The raw iterator was seeked to the start position on creation.
            self.started = true;
        }
        match self.inner.key() {
            Some(key) if key.starts_with(&self.prefix) => true,
            _ => {
                self.exhausted = true;
                false
            }
        }
    }

    fn key(&self) -> &[u8] {
        if !self.started || self.exhausted {
            return &[];
        }
        self.inner.key().unwrap_or(&[])
    }

    fn value(&self) -> &[u8] {
        if !self.started || self.exhausted {
            return &[];
        }
        self.inner.value().unwrap_or(&[])
    }

    fn error(&self) -> Option<String> {
        self.inner.status().err().map(|e| e.to_string())
    }
}

/// Persistent key-value store implementation using RocksDB.
#[derive(Clone)]
pub struct KvDB {
    /// The underlying RocksDB instance.
    db: Arc<DB>,
    /// Configuration for the database.
    config: KvDBConfig,
    /// Metrics for the KvDB.
    metrics: KvDBMetrics,
}

impl Debug for KvDB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvDB").field("config", &self.config).finish()
    }
}

impl KvDB {
    /// Create a new KvDB instance.
    pub fn new(path: &str, config: KvDBConfig) -> KvDBResult<Self> {
        let mut db_opts = Options::default();
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_write_buffer_size(config.write_buffer_size);
        db_opts.set_max_write_buffer_number(config.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.target_file_size_base);
        db_opts.set_max_background_jobs(config.max_background_jobs);
        db_opts.create_if_missing(config.create_if_missing);

        let db = DB::open(&db_opts, path)
            .map_err(|e| KvDBError::Database(format!("Failed to open RocksDB: {}", e)))?;

        Ok(Self {
            db: Arc::new(db),
            config,
            metrics: KvDBMetrics::new_with_labels(&[("instance", "default")]),
        })
    }

    /// Get the underlying RocksDB instance.
    pub fn inner(&self) -> &Arc<DB> {
        &self.db
    }

    /// Get the configuration.
    pub fn config(&self) -> &KvDBConfig {
        &self.config
    }

    /// Create a new metrics instance for the KvDB.
    pub fn with_new_metrics(&mut self, instance_name: &str) {
        self.metrics = KvDBMetrics::new_with_labels(&[("instance", instance_name.to_string())]);
    }

    fn read_options(&self) -> ReadOptions {
        let mut read_options = ReadOptions::default();
        read_options.fill_cache(self.config.fill_cache);
        read_options.set_readahead_size(self.config.readahead_size);
        read_options.set_async_io(self.config.async_io);
        read_options.set_verify_checksums(self.config.verify_checksums);
        read_options
    }
}

impl KeyValueDatabase for KvDB {
    type Error = KvDBError;
    type Batch = KvDBBatch;
    type Iterator<'a> = KvDBIterator<'a> where Self: 'a;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Self::Error> {
        trace!(target: "kvdb::rocksdb", "Getting key: {:?}", key);
        self.metrics.reads.increment(1);

        match self.db.get_opt(key, &self.read_options()) {
            Ok(value) => Ok(value),
            Err(e) => {
                error!(target: "kvdb::rocksdb", "Error getting key {:?}: {}", key, e);
                Err(KvDBError::Database(format!("RocksDB get error: {}", e)))
            }
        }
    }

    fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<(), Self::Error> {
        trace!(target: "kvdb::rocksdb", "Putting key: {:?}, value_len: {}", key, value.len());
        self.metrics.writes.increment(1);

        match self.db.put_opt(key, value, &WriteOptions::default()) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(target: "kvdb::rocksdb", "Error putting key {:?}: {}", key, e);
                Err(KvDBError::Database(format!("RocksDB put error: {}", e)))
            }
        }
    }

    fn remove(&self, key: &[u8]) -> Result<(), Self::Error> {
        trace!(target: "kvdb::rocksdb", "Deleting key: {:?}", key);
        self.metrics.writes.increment(1);

        match self.db.delete_opt(key, &WriteOptions::default()) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(target: "kvdb::rocksdb", "Error deleting key {:?}: {}", key, e);
                Err(KvDBError::Database(format!("RocksDB delete error: {}", e)))
            }
        }
    }

    fn contains(&self, key: &[u8]) -> Result<bool, Self::Error> {
        Ok(self.get(key)?.is_some())
    }

    fn create_batch(&self) -> Self::Batch {
        KvDBBatch {
            inner: WriteBatch::default(),
        }
    }

    fn batch_commit(&self, batch: Self::Batch) -> Result<(), Self::Error> {
        trace!(target: "kvdb::rocksdb", "Committing batch with {} operations", batch.len());
        self.metrics.batch_commits.increment(1);

        match self.db.write_opt(batch.inner, &WriteOptions::default()) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(target: "kvdb::rocksdb", "Error committing batch: {}", e);
                Err(KvDBError::Database(format!("RocksDB batch write error: {}", e)))
            }
        }
    }

    fn iterator(&self, prefix: &[u8], start: &[u8]) -> Result<Self::Iterator<'_>, Self::Error> {
        let mut seek = prefix.to_vec();
        seek.extend_from_slice(start);

        let mut inner = self.db.raw_iterator_opt(self.read_options());
        inner.seek(&seek);

        Ok(KvDBIterator::new(inner, prefix.to_vec()))
    }

    fn close(&self) -> Result<(), Self::Error> {
        trace!(target: "kvdb::rocksdb", "Closing database");

        // RocksDB closes when the last Arc is dropped
        Ok(())
    }
}

impl KeyValueWriter for KvDB {
    type Error = KvDBError;

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), Self::Error> {
        KeyValueDatabase::insert(self, key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), Self::Error> {
        KeyValueDatabase::remove(self, key)
    }
}
