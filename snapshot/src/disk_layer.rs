//! Disk layer implementation: the persistent base of the snapshot tree.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy_primitives::B256;
use parking_lot::{Mutex, RwLock};
use schnellru::{ByLength, LruMap};
use tracing::trace;

use rust_eth_snaptree_common::KeyValueDatabase;

use reth_metrics::{metrics::Counter, Metrics};

use crate::error::{SnapshotError, SnapshotResult};
use crate::rawdb;

/// Number of blobs the disk layer cache retains.
pub const DEFAULT_DISK_CACHE_ENTRIES: u32 = 100_000;

/// Metrics for the `DiskLayer`.
#[derive(Metrics, Clone)]
#[metrics(scope = "rust.eth.snaptree.disklayer")]
pub(crate) struct DiskLayerMetrics {
    /// Counter of cache hits
    pub(crate) cache_hits: Counter,
    /// Counter of cache misses
    pub(crate) cache_misses: Counter,
}

/// Blob cache keyed by raw snapshot key. An empty value is a tombstone for
/// a key known to be absent from the store, distinguishable from a miss.
pub(crate) type BlobCache = Mutex<LruMap<Vec<u8>, Vec<u8>, ByLength>>;

/// The persistent bottom layer of the snapshot tree.
///
/// Reads go through the blob cache to the backing store. While the external
/// generator is still populating the store, `gen_marker` delimits the covered
/// prefix of the key space; reads past it fail with
/// [`SnapshotError::NotCoveredYet`]. Once the layer has been superseded by a
/// flatten it is stale and every read fails with [`SnapshotError::Stale`].
pub struct DiskLayer<DB>
where
    DB: KeyValueDatabase + Clone + Send + Sync,
    DB::Error: Debug,
{
    /// The backing persistent store.
    diskdb: DB,
    /// Blob cache shared with the layer's replacements.
    cache: Arc<BlobCache>,
    /// The state root this layer represents.
    root: B256,
    /// Population progress of the external generator, None once complete.
    gen_marker: RwLock<Option<Vec<u8>>>,
    /// Set once the layer is replaced during a flatten.
    stale: AtomicBool,
    /// Metrics for the disk layer.
    metrics: DiskLayerMetrics,
}

impl<DB> Debug for DiskLayer<DB>
where
    DB: KeyValueDatabase + Clone + Send + Sync,
    DB::Error: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskLayer")
            .field("root", &self.root)
            .field("gen_marker", &self.gen_marker.read())
            .field("stale", &self.stale.load(Ordering::Acquire))
            .finish()
    }
}

impl<DB> DiskLayer<DB>
where
    DB: KeyValueDatabase + Clone + Send + Sync,
    DB::Error: Debug,
{
    /// Creates a disk layer over the given store with a fresh cache.
    pub fn new(diskdb: DB, root: B256, gen_marker: Option<Vec<u8>>) -> Self {
        let cache = Arc::new(Mutex::new(LruMap::new(ByLength::new(
            DEFAULT_DISK_CACHE_ENTRIES,
        ))));
        Self::with_cache(diskdb, root, gen_marker, cache)
    }

    /// Creates a disk layer adopting an existing cache instance. Used when a
    /// flatten replaces the layer and migrates the warmed cache.
    pub(crate) fn with_cache(
        diskdb: DB,
        root: B256,
        gen_marker: Option<Vec<u8>>,
        cache: Arc<BlobCache>,
    ) -> Self {
        Self {
            diskdb,
            cache,
            root,
            gen_marker: RwLock::new(gen_marker),
            stale: AtomicBool::new(false),
            metrics: DiskLayerMetrics::new_with_labels(&[("instance", "default")]),
        }
    }

    /// The state root this layer represents.
    pub fn root(&self) -> B256 {
        self.root
    }

    /// Whether the layer has been superseded by a flatten.
    pub fn stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Publish the layer as superseded; reads fail from here on.
    pub(crate) fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    /// Current generation marker, None once the layer is fully populated.
    pub fn gen_marker(&self) -> Option<Vec<u8>> {
        self.gen_marker.read().clone()
    }

    /// Whether the external generator is still populating this layer.
    pub fn generating(&self) -> bool {
        self.gen_marker.read().is_some()
    }

    /// Move the generation marker. Called by the external generator as it
    /// progresses through the key space; passing None declares the layer
    /// fully populated.
    pub fn set_gen_marker(&self, marker: Option<Vec<u8>>) {
        *self.gen_marker.write() = marker;
    }

    /// Account payload visible at this layer. Absent accounts read as empty
    /// bytes without error.
    pub fn account_rlp(&self, account: B256) -> SnapshotResult<Vec<u8>> {
        if self.stale() {
            return Err(SnapshotError::Stale);
        }
        // Keys beyond the generator position are not backed by data yet.
        if let Some(marker) = self.gen_marker.read().as_deref() {
            if account.as_slice() > marker {
                return Err(SnapshotError::NotCoveredYet);
            }
        }
        self.read_blob(rawdb::account_snapshot_key(account))
    }

    /// Storage slot payload visible at this layer. Cleared or absent slots
    /// read as empty bytes without error.
    pub fn storage(&self, account: B256, slot: B256) -> SnapshotResult<Vec<u8>> {
        if self.stale() {
            return Err(SnapshotError::Stale);
        }
        // The coverage predicate uses the account || slot concatenation.
        if let Some(marker) = self.gen_marker.read().as_deref() {
            let mut payload = [0u8; 64];
            payload[..32].copy_from_slice(account.as_slice());
            payload[32..].copy_from_slice(slot.as_slice());
            if &payload[..] > marker {
                return Err(SnapshotError::NotCoveredYet);
            }
        }
        self.read_blob(rawdb::storage_snapshot_key(account, slot))
    }

    /// The backing store handle.
    pub(crate) fn diskdb(&self) -> &DB {
        &self.diskdb
    }

    /// The cache instance, shared with replacement layers.
    pub(crate) fn cache(&self) -> Arc<BlobCache> {
        self.cache.clone()
    }

    /// Overwrite a cache entry; an empty blob acts as a tombstone.
    pub(crate) fn cache_set(&self, key: Vec<u8>, blob: Vec<u8>) {
        self.cache.lock().insert(key, blob);
    }

    /// Drop a cache entry entirely.
    pub(crate) fn cache_remove(&self, key: &[u8]) {
        self.cache.lock().remove(key);
    }

    fn read_blob(&self, key: Vec<u8>) -> SnapshotResult<Vec<u8>> {
        {
            let mut cache = self.cache.lock();
            if let Some(blob) = cache.get(key.as_slice()) {
                self.metrics.cache_hits.increment(1);
                return Ok(blob.clone());
            }
        }
        self.metrics.cache_misses.increment(1);

        let blob = self
            .diskdb
            .get(&key)
            .map_err(SnapshotError::database)?
            .unwrap_or_default();
        trace!(
            target: "snapshot::disk",
            key_len = key.len(),
            blob_len = blob.len(),
            "Loaded snapshot blob from store"
        );
        // Cache absence as an empty tombstone as well, so repeated misses
        // stay off the store.
        self.cache.lock().insert(key, blob.clone());
        Ok(blob)
    }
}
