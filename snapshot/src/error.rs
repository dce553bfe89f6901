//! Error types for snapshot operations.

use alloy_primitives::B256;
use std::fmt::Debug;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Error type for snapshot operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    /// The requested key lies beyond the generation marker of a disk layer
    /// that is still being populated. Expected during generation; callers
    /// retry later or fall back to the authoritative trie.
    #[error("snapshot not covered yet")]
    NotCoveredYet,
    /// The layer was superseded by a flatten; re-resolve the root through
    /// the tree.
    #[error("snapshot stale")]
    Stale,
    /// No layer is registered for the given root.
    #[error("unknown snapshot layer {0}")]
    UnknownLayer(B256),
    /// The parent root given to an update names no layer.
    #[error("unknown snapshot parent {0}")]
    UnknownParent(B256),
    /// A layer with the given root is already installed.
    #[error("snapshot layer {0} already exists")]
    LayerExists(B256),
    /// A layer may not be its own parent.
    #[error("snapshot cycle")]
    SnapshotCycle,
    /// Store failure, carried verbatim.
    #[error("database error: {0}")]
    Database(String),
    /// Malformed generator journal.
    #[error("rlp decode error: {0}")]
    Rlp(#[from] alloy_rlp::Error),
}

impl SnapshotError {
    /// Erase a backend error into the database variant.
    pub(crate) fn database<E: Debug>(err: E) -> Self {
        Self::Database(format!("{:?}", err))
    }
}
