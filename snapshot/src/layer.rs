//! Polymorphic layer handle shared by the disk and diff variants.

use std::fmt::Debug;
use std::sync::Arc;

use alloy_primitives::B256;

use rust_eth_snaptree_common::KeyValueDatabase;

use crate::diff_layer::DiffLayer;
use crate::disk_layer::DiskLayer;
use crate::error::SnapshotResult;

/// A snapshot of the world state at a given root.
///
/// Either the persistent disk layer at the bottom of the tree or one of the
/// in-memory diff layers above it; both expose the same read interface.
pub enum Layer<DB>
where
    DB: KeyValueDatabase + Clone + Send + Sync,
    DB::Error: Debug,
{
    /// The persistent bottom layer.
    Disk(Arc<DiskLayer<DB>>),
    /// An in-memory delta above some parent layer.
    Diff(Arc<DiffLayer<DB>>),
}

impl<DB> Clone for Layer<DB>
where
    DB: KeyValueDatabase + Clone + Send + Sync,
    DB::Error: Debug,
{
    fn clone(&self) -> Self {
        match self {
            Self::Disk(layer) => Self::Disk(layer.clone()),
            Self::Diff(layer) => Self::Diff(layer.clone()),
        }
    }
}

impl<DB> Debug for Layer<DB>
where
    DB: KeyValueDatabase + Clone + Send + Sync,
    DB::Error: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disk(layer) => f.debug_tuple("Disk").field(layer).finish(),
            Self::Diff(layer) => f.debug_tuple("Diff").field(layer).finish(),
        }
    }
}

impl<DB> Layer<DB>
where
    DB: KeyValueDatabase + Clone + Send + Sync,
    DB::Error: Debug,
{
    /// The state root this layer represents.
    pub fn root(&self) -> B256 {
        match self {
            Self::Disk(layer) => layer.root(),
            Self::Diff(layer) => layer.root(),
        }
    }

    /// Account payload visible at this layer. Absent accounts read as empty
    /// bytes without error.
    pub fn account_rlp(&self, account: B256) -> SnapshotResult<Vec<u8>> {
        match self {
            Self::Disk(layer) => layer.account_rlp(account),
            Self::Diff(layer) => layer.account_rlp(account),
        }
    }

    /// Storage slot payload visible at this layer. Cleared or absent slots
    /// read as empty bytes without error.
    pub fn storage(&self, account: B256, slot: B256) -> SnapshotResult<Vec<u8>> {
        match self {
            Self::Disk(layer) => layer.storage(account, slot),
            Self::Diff(layer) => layer.storage(account, slot),
        }
    }

    /// Downcast to the disk variant.
    pub fn as_disk(&self) -> Option<&Arc<DiskLayer<DB>>> {
        match self {
            Self::Disk(layer) => Some(layer),
            Self::Diff(_) => None,
        }
    }

    /// Downcast to the diff variant.
    pub fn as_diff(&self) -> Option<&Arc<DiffLayer<DB>>> {
        match self {
            Self::Diff(layer) => Some(layer),
            Self::Disk(_) => None,
        }
    }
}
