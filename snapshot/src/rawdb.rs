//! Snapshot key codec and raw database accessors.
//!
//! Snapshot entities map to prefixed binary keys so that account records,
//! storage records and the bookkeeping singletons occupy disjoint, ordered
//! regions of the key space.

use alloy_primitives::{Bytes, B256};
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable};

use rust_eth_snaptree_common::{KeyValueDatabase, KeyValueWriter};

use crate::error::{SnapshotError, SnapshotResult};

/// Prefix of account snapshot records: `b"a" || account_hash(32)`.
pub const ACCOUNT_SNAPSHOT_PREFIX: &[u8] = b"a";

/// Prefix of storage snapshot records: `b"o" || account_hash(32) || slot_hash(32)`.
pub const STORAGE_SNAPSHOT_PREFIX: &[u8] = b"o";

/// Key of the root the persisted snapshot represents.
pub const SNAPSHOT_ROOT_KEY: &[u8] = b"SnapshotRoot";

/// Key of the journaled snapshot generator progress.
pub const SNAPSHOT_GENERATOR_KEY: &[u8] = b"SnapshotGenerator";

/// Journaled progress of the external snapshot generator.
///
/// The marker is empty, 32 bytes (account position) or 64 bytes
/// (account + slot position).
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct GeneratorState {
    /// Whether the generator finished populating the disk layer
    pub done: bool,
    /// Number of accounts indexed so far
    pub accounts: u64,
    /// Number of storage slots indexed so far
    pub slots: u64,
    /// Total account and storage payload bytes written so far
    pub storage: u64,
    /// Key position the generator has reached
    pub marker: Bytes,
}

/// Key under which an account snapshot record is stored.
pub fn account_snapshot_key(account: B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(ACCOUNT_SNAPSHOT_PREFIX.len() + 32);
    key.extend_from_slice(ACCOUNT_SNAPSHOT_PREFIX);
    key.extend_from_slice(account.as_slice());
    key
}

/// Key prefix under which all storage snapshot records of an account live.
pub fn storage_snapshots_key(account: B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(STORAGE_SNAPSHOT_PREFIX.len() + 32);
    key.extend_from_slice(STORAGE_SNAPSHOT_PREFIX);
    key.extend_from_slice(account.as_slice());
    key
}

/// Key under which a storage snapshot record is stored.
pub fn storage_snapshot_key(account: B256, slot: B256) -> Vec<u8> {
    let mut key = storage_snapshots_key(account);
    key.extend_from_slice(slot.as_slice());
    key
}

/// Retrieve an account snapshot payload.
pub fn read_account_snapshot<DB: KeyValueDatabase>(
    db: &DB,
    account: B256,
) -> Result<Option<Vec<u8>>, DB::Error> {
    db.get(&account_snapshot_key(account))
}

/// Store an account snapshot payload.
pub fn write_account_snapshot<W: KeyValueWriter>(
    writer: &mut W,
    account: B256,
    data: &[u8],
) -> Result<(), W::Error> {
    writer.set(&account_snapshot_key(account), data.to_vec())
}

/// Remove an account snapshot record.
pub fn delete_account_snapshot<W: KeyValueWriter>(
    writer: &mut W,
    account: B256,
) -> Result<(), W::Error> {
    writer.delete(&account_snapshot_key(account))
}

/// Retrieve a storage snapshot payload.
pub fn read_storage_snapshot<DB: KeyValueDatabase>(
    db: &DB,
    account: B256,
    slot: B256,
) -> Result<Option<Vec<u8>>, DB::Error> {
    db.get(&storage_snapshot_key(account, slot))
}

/// Store a storage snapshot payload.
pub fn write_storage_snapshot<W: KeyValueWriter>(
    writer: &mut W,
    account: B256,
    slot: B256,
    data: &[u8],
) -> Result<(), W::Error> {
    writer.set(&storage_snapshot_key(account, slot), data.to_vec())
}

/// Remove a storage snapshot record.
pub fn delete_storage_snapshot<W: KeyValueWriter>(
    writer: &mut W,
    account: B256,
    slot: B256,
) -> Result<(), W::Error> {
    writer.delete(&storage_snapshot_key(account, slot))
}

/// Retrieve the root the persisted snapshot represents, if any.
pub fn read_snapshot_root<DB: KeyValueDatabase>(db: &DB) -> Result<Option<B256>, DB::Error> {
    Ok(db
        .get(SNAPSHOT_ROOT_KEY)?
        .filter(|blob| blob.len() == 32)
        .map(|blob| B256::from_slice(&blob)))
}

/// Store the root the persisted snapshot represents.
pub fn write_snapshot_root<W: KeyValueWriter>(writer: &mut W, root: B256) -> Result<(), W::Error> {
    writer.set(SNAPSHOT_ROOT_KEY, root.as_slice().to_vec())
}

/// Retrieve the journaled generator progress, if any.
pub fn read_snapshot_generator<DB>(db: &DB) -> SnapshotResult<Option<GeneratorState>>
where
    DB: KeyValueDatabase,
    DB::Error: std::fmt::Debug,
{
    match db.get(SNAPSHOT_GENERATOR_KEY).map_err(SnapshotError::database)? {
        Some(blob) => Ok(Some(GeneratorState::decode(&mut blob.as_slice())?)),
        None => Ok(None),
    }
}

/// Journal the generator progress.
pub fn write_snapshot_generator<W: KeyValueWriter>(
    writer: &mut W,
    generator: &GeneratorState,
) -> Result<(), W::Error> {
    writer.set(SNAPSHOT_GENERATOR_KEY, alloy_rlp::encode(generator))
}
