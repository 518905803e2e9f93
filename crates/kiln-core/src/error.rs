//! Error types for the store core.

use thiserror::Error;

/// Error returned by payload accessors when the entry's discriminant does
/// not match the requested variant. The command layer maps this to a
/// protocol-level type error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("WRONGTYPE operation against a key holding the wrong kind of value")]
pub struct WrongKind;

/// Errors returned by store operations.
///
/// A missing expired-entry releaser is not represented here: sweeping
/// without one is a setup bug and panics instead.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// A payload accessor was called with a mismatching discriminant.
    #[error(transparent)]
    WrongKind(#[from] WrongKind),

    /// `insert_if` was called with both the NX and XX predicates.
    /// Rejected before any lookup or mutation.
    #[error("NX and XX predicates are mutually exclusive")]
    InvalidPredicate,

    /// The allocator refused to grow entry storage. The operation had
    /// no effect on the store.
    #[error("out of memory while allocating entry storage")]
    AllocationFailure,
}

/// Errors returned by shard handle operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ShardError {
    /// The target shard task is no longer running (channel closed).
    #[error("shard unavailable")]
    Unavailable,
}
