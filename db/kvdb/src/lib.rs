//! RocksDB-backed key-value store for snapshot persistence.
//!
//! This crate provides a thread-safe implementation of the snapshot store
//! contract on top of RocksDB with support for:
//! - Basic key-value operations (get, insert, remove)
//! - Atomic batch writes
//! - Ordered prefix iteration with point-in-time consistency

pub mod kvdb;
pub mod traits;


pub use kvdb::{KvDB, KvDBBatch, KvDBIterator};
pub use traits::*;
