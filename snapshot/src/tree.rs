//! The snapshot tree: a root-indexed family of layers over one disk layer.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use alloy_primitives::{Bytes, B256};
use parking_lot::RwLock;
use tracing::{error, trace};

use rust_eth_snaptree_common::{KeyValueDatabase, KeyValueIterator, KeyValueWriter};

use reth_metrics::{
    metrics::{Counter, Histogram},
    Metrics,
};

use crate::diff_layer::DiffLayer;
use crate::disk_layer::DiskLayer;
use crate::error::{SnapshotError, SnapshotResult};
use crate::iterator::{DiskAccountIterator, DiskStorageIterator};
use crate::layer::Layer;
use crate::rawdb::{self, GeneratorState};

/// Metrics for the snapshot `Tree`.
#[derive(Metrics, Clone)]
#[metrics(scope = "rust.eth.snaptree.tree")]
pub(crate) struct TreeMetrics {
    /// Counter of diff layers flattened into the disk layer
    pub(crate) flattened_layers: Counter,
    /// Histogram of cap durations (in seconds)
    pub(crate) flatten_duration: Histogram,
}

/// The layer tree.
///
/// Maps state roots to layers. Exactly one entry is the disk layer; every
/// diff layer chains down to it through its parent links. The map is guarded
/// by a single reader-writer lock: lookups take it shared, `update` and `cap`
/// take it exclusively and `cap` holds it for its entire duration.
pub struct Tree<DB>
where
    DB: KeyValueDatabase + Clone + Send + Sync,
    DB::Error: Debug,
{
    /// Handle to the persistent store backing the disk layer.
    diskdb: DB,
    /// All known layers indexed by their state root.
    layers: RwLock<HashMap<B256, Layer<DB>>>,
    /// Metrics for the tree.
    metrics: TreeMetrics,
}

impl<DB> Debug for Tree<DB>
where
    DB: KeyValueDatabase + Clone + Send + Sync,
    DB::Error: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("layers", &self.layers.read().len())
            .finish()
    }
}

impl<DB> Tree<DB>
where
    DB: KeyValueDatabase + Clone + Send + Sync,
    DB::Error: Debug,
{
    /// Open the snapshot tree over the given store, expecting it to hold the
    /// state identified by `root`.
    ///
    /// A store with a matching persisted root resumes where it left off,
    /// including the journaled generator position of a partially built disk
    /// layer. A fresh store starts a fully covered disk layer at `root` and
    /// persists the bookkeeping records immediately. A store persisted at a
    /// different root is rejected; rebuilding it is the generator's job.
    pub fn new(diskdb: DB, root: B256) -> SnapshotResult<Self> {
        let disk = match rawdb::read_snapshot_root(&diskdb).map_err(SnapshotError::database)? {
            Some(stored) => {
                if stored != root {
                    return Err(SnapshotError::Database(format!(
                        "persisted snapshot root {stored} does not match requested {root}"
                    )));
                }
                let gen_marker = match rawdb::read_snapshot_generator(&diskdb)? {
                    Some(generator) if !generator.done => Some(generator.marker.to_vec()),
                    _ => None,
                };
                trace!(
                    target: "snapshot::tree",
                    root = %root,
                    generating = gen_marker.is_some(),
                    "Resumed persisted snapshot"
                );
                DiskLayer::new(diskdb.clone(), root, gen_marker)
            }
            None => {
                let mut batch = diskdb.create_batch();
                rawdb::write_snapshot_root(&mut batch, root).map_err(SnapshotError::database)?;
                rawdb::write_snapshot_generator(
                    &mut batch,
                    &GeneratorState {
                        done: true,
                        ..Default::default()
                    },
                )
                .map_err(SnapshotError::database)?;
                diskdb.batch_commit(batch).map_err(SnapshotError::database)?;
                trace!(target: "snapshot::tree", root = %root, "Started fresh snapshot");
                DiskLayer::new(diskdb.clone(), root, None)
            }
        };

        let mut layers = HashMap::new();
        layers.insert(root, Layer::Disk(Arc::new(disk)));
        Ok(Self {
            diskdb,
            layers: RwLock::new(layers),
            metrics: TreeMetrics::new_with_labels(&[("instance", "default")]),
        })
    }

    /// Retrieve the layer registered for the given root, if any.
    pub fn snapshot(&self, root: B256) -> Option<Layer<DB>> {
        self.layers.read().get(&root).cloned()
    }

    /// The current disk layer.
    pub fn disk_layer(&self) -> Arc<DiskLayer<DB>> {
        let layers = self.layers.read();
        for layer in layers.values() {
            if let Layer::Disk(disk) = layer {
                return disk.clone();
            }
        }
        // The constructor installs a disk layer and cap always replaces it
        // with another one, so the tree cannot lack one.
        panic!("snapshot tree has no disk layer");
    }

    /// Root of the current disk layer.
    pub fn disk_root(&self) -> B256 {
        self.disk_layer().root()
    }

    /// Install a new diff layer with the given mutations on top of an
    /// existing layer. The parent does not have to be the previous tip;
    /// snapshots form a tree, not a chain.
    pub fn update(
        &self,
        block_root: B256,
        parent_root: B256,
        destruct_set: HashSet<B256>,
        account_data: HashMap<B256, Vec<u8>>,
        storage_data: HashMap<B256, HashMap<B256, Vec<u8>>>,
    ) -> SnapshotResult<()> {
        if block_root == parent_root {
            return Err(SnapshotError::SnapshotCycle);
        }
        let mut layers = self.layers.write();
        if layers.contains_key(&block_root) {
            return Err(SnapshotError::LayerExists(block_root));
        }
        let parent = layers
            .get(&parent_root)
            .cloned()
            .ok_or(SnapshotError::UnknownParent(parent_root))?;

        let diff = DiffLayer::new(parent, block_root, destruct_set, account_data, storage_data);
        layers.insert(block_root, Layer::Diff(Arc::new(diff)));
        trace!(
            target: "snapshot::tree",
            root = %block_root,
            parent = %parent_root,
            "Installed diff layer"
        );
        Ok(())
    }

    /// Bound the diff chain ending at `root` to at most `layers` diff layers
    /// above the disk layer, merging the excess bottom layers into it oldest
    /// first. Zero flattens the whole chain down to disk.
    ///
    /// Layers that forked off a flattened diff become unreachable and are
    /// dropped from the tree, as is the superseded disk layer.
    pub fn cap(&self, root: B256, layers: usize) -> SnapshotResult<()> {
        let start = Instant::now();
        let mut map = self.layers.write();
        let layer = map
            .get(&root)
            .cloned()
            .ok_or(SnapshotError::UnknownLayer(root))?;

        // A chain ending at the disk layer has nothing above it to flatten.
        let Layer::Diff(diff) = layer else {
            return Ok(());
        };

        // Collect the chain top-down; the last element is the bottom-most
        // diff, parented directly on the disk layer.
        let mut chain = vec![diff.clone()];
        let mut current = diff;
        loop {
            match current.parent() {
                Layer::Diff(parent) => {
                    chain.push(parent.clone());
                    current = parent;
                }
                Layer::Disk(_) => break,
            }
        }

        let mut flattened = 0u64;
        while chain.len() > layers {
            let Some(bottom) = chain.pop() else {
                break;
            };
            let disk = self.diff_to_disk(&bottom)?;
            let replacement = Layer::Disk(disk.clone());
            // The merged diff's root now identifies the disk layer.
            map.insert(disk.root(), replacement.clone());
            // Hand the diff that sat directly above over to the new base.
            if let Some(above) = chain.last() {
                above.set_parent(replacement);
            }
            flattened += 1;
        }

        if flattened > 0 {
            // Drop everything that no longer descends from the live disk
            // layer: the superseded disk layers and any chain that forked
            // off a consumed diff.
            map.retain(|_, layer| descends_from_live_disk(layer));

            self.metrics.flattened_layers.increment(flattened);
            self.metrics
                .flatten_duration
                .record(start.elapsed().as_secs_f64());
            trace!(
                target: "snapshot::tree",
                root = %root,
                flattened,
                retained = layers,
                "Flattened diff layers into disk"
            );
        }
        Ok(())
    }

    /// Ordered iterator over the disk layer's account records, starting at
    /// the first account hash >= `seek`.
    pub fn account_iterator(
        &self,
        root: B256,
        seek: B256,
    ) -> SnapshotResult<DiskAccountIterator<'_, DB>> {
        if !self.layers.read().contains_key(&root) {
            return Err(SnapshotError::UnknownLayer(root));
        }
        let inner = self
            .diskdb
            .iterator(rawdb::ACCOUNT_SNAPSHOT_PREFIX, seek.as_slice())
            .map_err(SnapshotError::database)?;
        Ok(DiskAccountIterator::new(inner))
    }

    /// Ordered iterator over the disk layer's storage records of one
    /// account, starting at the first slot hash >= `seek`.
    pub fn storage_iterator(
        &self,
        root: B256,
        account: B256,
        seek: B256,
    ) -> SnapshotResult<DiskStorageIterator<'_, DB>> {
        if !self.layers.read().contains_key(&root) {
            return Err(SnapshotError::UnknownLayer(root));
        }
        let prefix = rawdb::storage_snapshots_key(account);
        let inner = self
            .diskdb
            .iterator(&prefix, seek.as_slice())
            .map_err(SnapshotError::database)?;
        Ok(DiskStorageIterator::new(inner, prefix))
    }

    /// Merge a bottom-most diff layer into the disk layer it is parented on
    /// and return the replacement disk layer carrying the diff's root.
    ///
    /// Mutations beyond the generation marker are dropped: that region is
    /// owned by the external generator, which must be suspended while the
    /// tree lock is held. The write batch commits before the old layer is
    /// retired, so a store failure leaves the tree untouched.
    fn diff_to_disk(&self, bottom: &Arc<DiffLayer<DB>>) -> SnapshotResult<Arc<DiskLayer<DB>>> {
        let base = match bottom.parent() {
            Layer::Disk(base) => base,
            Layer::Diff(_) => panic!("snapshot flatten target is not the disk layer"),
        };
        let marker = base.gen_marker();

        let mut batch = self.diskdb.create_batch();

        // Destroyed accounts first: the account record goes, along with
        // every covered storage slot currently persisted for it.
        let mut wiped_slots: Vec<Vec<u8>> = Vec::new();
        for account in bottom.destruct_set() {
            if !covered(account.as_slice(), marker.as_deref()) {
                continue;
            }
            rawdb::delete_account_snapshot(&mut batch, *account)
                .map_err(SnapshotError::database)?;

            let prefix = rawdb::storage_snapshots_key(*account);
            let mut it = self
                .diskdb
                .iterator(&prefix, &[])
                .map_err(SnapshotError::database)?;
            while it.next() {
                let key = it.key();
                if key.len() != rawdb::STORAGE_SNAPSHOT_PREFIX.len() + 64 {
                    continue;
                }
                if covered(
                    &key[rawdb::STORAGE_SNAPSHOT_PREFIX.len()..],
                    marker.as_deref(),
                ) {
                    batch.delete(key).map_err(SnapshotError::database)?;
                    wiped_slots.push(key.to_vec());
                }
            }
            if let Some(err) = it.error() {
                return Err(SnapshotError::Database(err));
            }
        }

        // Account writes next, deletes encoded as empty payloads.
        for (account, data) in bottom.account_data() {
            if !covered(account.as_slice(), marker.as_deref()) {
                continue;
            }
            if data.is_empty() {
                rawdb::delete_account_snapshot(&mut batch, *account)
                    .map_err(SnapshotError::database)?;
            } else {
                rawdb::write_account_snapshot(&mut batch, *account, data)
                    .map_err(SnapshotError::database)?;
            }
        }

        // Storage writes last, so slots of an account re-created over its
        // own destruction end up persisted.
        for (account, slots) in bottom.storage_data() {
            for (slot, data) in slots {
                let mut payload = [0u8; 64];
                payload[..32].copy_from_slice(account.as_slice());
                payload[32..].copy_from_slice(slot.as_slice());
                if !covered(&payload, marker.as_deref()) {
                    continue;
                }
                if data.is_empty() {
                    rawdb::delete_storage_snapshot(&mut batch, *account, *slot)
                        .map_err(SnapshotError::database)?;
                } else {
                    rawdb::write_storage_snapshot(&mut batch, *account, *slot, data)
                        .map_err(SnapshotError::database)?;
                }
            }
        }

        // Move the root pointer and re-journal the generator position so a
        // restart resumes from the same place.
        rawdb::write_snapshot_root(&mut batch, bottom.root()).map_err(SnapshotError::database)?;
        let mut generator = rawdb::read_snapshot_generator(&self.diskdb)?.unwrap_or_default();
        generator.done = marker.is_none();
        generator.marker = Bytes::from(marker.clone().unwrap_or_default());
        rawdb::write_snapshot_generator(&mut batch, &generator)
            .map_err(SnapshotError::database)?;

        if let Err(err) = self.diskdb.batch_commit(batch) {
            error!(target: "snapshot::tree", ?err, root = %bottom.root(), "Failed to flatten diff layer");
            return Err(SnapshotError::database(err));
        }

        // The data is durable: retire the old layer, then refresh the cache
        // for every touched key before the replacement becomes visible.
        base.mark_stale();

        for account in bottom.destruct_set() {
            if !covered(account.as_slice(), marker.as_deref()) {
                continue;
            }
            base.cache_set(rawdb::account_snapshot_key(*account), Vec::new());
        }
        for key in &wiped_slots {
            base.cache_remove(key);
        }
        for (account, data) in bottom.account_data() {
            if !covered(account.as_slice(), marker.as_deref()) {
                continue;
            }
            base.cache_set(rawdb::account_snapshot_key(*account), data.clone());
        }
        for (account, slots) in bottom.storage_data() {
            for (slot, data) in slots {
                let mut payload = [0u8; 64];
                payload[..32].copy_from_slice(account.as_slice());
                payload[32..].copy_from_slice(slot.as_slice());
                if !covered(&payload, marker.as_deref()) {
                    continue;
                }
                base.cache_set(rawdb::storage_snapshot_key(*account, *slot), data.clone());
            }
        }

        Ok(Arc::new(DiskLayer::with_cache(
            self.diskdb.clone(),
            bottom.root(),
            marker,
            base.cache(),
        )))
    }
}

/// Whether a key at `payload` falls into the generated region of the disk
/// layer. Payloads are raw hash bytes: 32 for accounts, 64 for storage.
fn covered(payload: &[u8], marker: Option<&[u8]>) -> bool {
    marker.map_or(true, |marker| payload <= marker)
}

/// Whether a layer still chains down to a live disk layer.
fn descends_from_live_disk<DB>(layer: &Layer<DB>) -> bool
where
    DB: KeyValueDatabase + Clone + Send + Sync,
    DB::Error: Debug,
{
    let mut current = layer.clone();
    loop {
        match current {
            Layer::Disk(disk) => return !disk.stale(),
            Layer::Diff(diff) => current = diff.parent(),
        }
    }
}
