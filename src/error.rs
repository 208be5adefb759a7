//! Error types for sync sessions.

use crate::types::Revision;
use thiserror::Error;

/// Main error type for sync operations.
///
/// Recoverable errors travel on the channels returned by
/// [`Syncer::sync_base`](crate::Syncer::sync_base) and
/// [`Syncer::sync_updates`](crate::Syncer::sync_updates), never as the
/// return value of a blocking call, so a caller can keep draining pages
/// already in flight. Sequencing faults are not represented here at all:
/// calling `sync_updates` before a revision is pinned panics.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The store or its transport failed.
    #[error("store error: {0}")]
    Store(String),

    /// The operation was cancelled through its [`CancelToken`](crate::CancelToken).
    #[error("operation cancelled")]
    Cancelled,

    /// The requested revision is older than the store's compaction point.
    /// Terminal for the session: resync must restart from a fresh snapshot.
    #[error("revision {0} has been compacted away")]
    Compacted(Revision),

    /// A previous revision pin failed; the session refuses further work.
    #[error("session unusable: revision pin previously failed")]
    SessionPoisoned,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
