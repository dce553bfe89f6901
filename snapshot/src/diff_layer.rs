//! Diff layer implementation: an immutable delta above another layer.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

use alloy_primitives::B256;
use parking_lot::RwLock;

use rust_eth_snaptree_common::KeyValueDatabase;

use crate::error::SnapshotResult;
use crate::layer::Layer;

/// An in-memory set of state mutations on top of a parent layer.
///
/// A diff layer is sealed at installation: its data never changes, only the
/// parent link is rewritten when the layer below it is flattened into the
/// disk layer. Lookups walk from this layer toward the disk layer and stop
/// at the first layer with an opinion on the queried key.
///
/// An account in `destruct_set` is gone together with all of its storage,
/// regardless of per-slot data recorded below this layer. If the same layer
/// also carries an entry for the account in `account_data`/`storage_data`,
/// the account was destroyed and re-created within this very layer and the
/// new data wins.
pub struct DiffLayer<DB>
where
    DB: KeyValueDatabase + Clone + Send + Sync,
    DB::Error: Debug,
{
    /// The layer this diff was built on, rewritten during flattens.
    parent: RwLock<Layer<DB>>,
    /// The state root this layer represents.
    root: B256,
    /// Accounts destroyed at this layer, storage included.
    destruct_set: HashSet<B256>,
    /// Account payloads changed at this layer, empty payload means deleted.
    account_data: HashMap<B256, Vec<u8>>,
    /// Storage payloads changed at this layer, empty payload means cleared.
    storage_data: HashMap<B256, HashMap<B256, Vec<u8>>>,
}

impl<DB> Debug for DiffLayer<DB>
where
    DB: KeyValueDatabase + Clone + Send + Sync,
    DB::Error: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffLayer")
            .field("root", &self.root)
            .field("destructs", &self.destruct_set.len())
            .field("accounts", &self.account_data.len())
            .field("storages", &self.storage_data.len())
            .finish()
    }
}

impl<DB> DiffLayer<DB>
where
    DB: KeyValueDatabase + Clone + Send + Sync,
    DB::Error: Debug,
{
    /// Seals the given mutations into a new diff layer on top of `parent`.
    pub(crate) fn new(
        parent: Layer<DB>,
        root: B256,
        destruct_set: HashSet<B256>,
        account_data: HashMap<B256, Vec<u8>>,
        storage_data: HashMap<B256, HashMap<B256, Vec<u8>>>,
    ) -> Self {
        Self {
            parent: RwLock::new(parent),
            root,
            destruct_set,
            account_data,
            storage_data,
        }
    }

    /// The state root this layer represents.
    pub fn root(&self) -> B256 {
        self.root
    }

    /// The layer this diff is currently parented on.
    pub fn parent(&self) -> Layer<DB> {
        self.parent.read().clone()
    }

    /// Swap the parent link after the previous parent was flattened away.
    pub(crate) fn set_parent(&self, parent: Layer<DB>) {
        *self.parent.write() = parent;
    }

    pub(crate) fn destruct_set(&self) -> &HashSet<B256> {
        &self.destruct_set
    }

    pub(crate) fn account_data(&self) -> &HashMap<B256, Vec<u8>> {
        &self.account_data
    }

    pub(crate) fn storage_data(&self) -> &HashMap<B256, HashMap<B256, Vec<u8>>> {
        &self.storage_data
    }

    /// Account payload visible at this layer, walking toward the disk layer
    /// on a miss.
    pub fn account_rlp(&self, account: B256) -> SnapshotResult<Vec<u8>> {
        // Re-created data at this layer takes precedence over a destruct
        // recorded alongside it.
        if let Some(data) = self.account_data.get(&account) {
            return Ok(data.clone());
        }
        if self.destruct_set.contains(&account) {
            return Ok(Vec::new());
        }
        match &*self.parent.read() {
            Layer::Diff(parent) => parent.account_rlp(account),
            Layer::Disk(parent) => parent.account_rlp(account),
        }
    }

    /// Storage slot payload visible at this layer, walking toward the disk
    /// layer on a miss.
    pub fn storage(&self, account: B256, slot: B256) -> SnapshotResult<Vec<u8>> {
        if let Some(slots) = self.storage_data.get(&account) {
            if let Some(data) = slots.get(&slot) {
                return Ok(data.clone());
            }
        }
        // A destructed account shadows all storage recorded below, even when
        // the account itself was re-created at this layer.
        if self.destruct_set.contains(&account) {
            return Ok(Vec::new());
        }
        match &*self.parent.read() {
            Layer::Diff(parent) => parent.storage(account, slot),
            Layer::Disk(parent) => parent.storage(account, slot),
        }
    }
}
