//! Layered account-state snapshot engine.
//!
//! The engine maintains a stack of in-memory diff layers on top of a single
//! persistent disk layer, so the most recent world state (accounts and their
//! storage slots) can be read directly from memory without walking a trie,
//! while remaining reconstructible from durable storage.
//!
//! New diffs are installed on top of any known root with [`Tree::update`],
//! memory is bounded by flattening the oldest diffs into the disk layer with
//! [`Tree::cap`], and the flattened state can be walked in key order through
//! the disk iterators. A partially generated disk layer carries a progress
//! marker that is journaled across restarts; reads beyond it fail with
//! [`SnapshotError::NotCoveredYet`] until the external generator catches up.

/// Error taxonomy of the snapshot engine.
pub mod error;

/// Snapshot key codec and raw database accessors.
pub mod rawdb;

/// The persistent base layer.
pub mod disk_layer;

/// Immutable in-memory delta layers.
pub mod diff_layer;

/// Polymorphic layer handle.
pub mod layer;

/// The root-indexed layer tree with update and cap flows.
pub mod tree;

/// Ordered iteration over the disk layer.
pub mod iterator;


pub use diff_layer::DiffLayer;
pub use disk_layer::DiskLayer;
pub use error::{SnapshotError, SnapshotResult};
pub use iterator::{
    AccountIterator, DiskAccountIterator, DiskStorageIterator, SnapshotIterator, StorageIterator,
};
pub use layer::Layer;
pub use rawdb::GeneratorState;
pub use tree::Tree;
