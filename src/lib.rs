//! # kvsync
//!
//! Revision-pinned key-space synchronization over a versioned key-value
//! store: a consistent bulk snapshot transfer followed by a gapless
//! incremental change stream, both pinned to a single store revision so
//! the two phases compose into an exactly-once view of a key range as it
//! evolves.
//!
//! ## Core Concepts
//!
//! - **Snapshot scan**: a paginated read of a key range as of one fixed
//!   revision R, streamed to the caller as ordered pages
//! - **Pinning**: R is chosen explicitly or resolved by a cheap probe
//!   read before the scan starts, and written exactly once
//! - **Change feed**: a live subscription resumed at exactly R+1, with
//!   each mutated key's previous value attached
//!
//! The store itself is an external collaborator behind the [`KvClient`]
//! trait; this crate decides neither when to resync nor what to do with
//! the synced data.
//!
//! ## Example
//!
//! ```ignore
//! use kvsync::{CancelToken, MemoryStore, Syncer};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let syncer = Syncer::new(store, "jobs/", None);
//! let ctx = CancelToken::new();
//!
//! // Phase one: drain the snapshot.
//! let (pages, errors) = syncer.sync_base(&ctx);
//! for page in pages {
//!     apply_snapshot(page.entries)?;
//! }
//! if let Ok(err) = errors.recv() {
//!     return Err(err);
//! }
//!
//! // Phase two: follow every change after the snapshot, exactly once.
//! for event in syncer.sync_updates(&ctx) {
//!     apply_change(event?)?;
//! }
//! ```

pub mod cancel;
pub mod client;
pub mod error;
pub mod memory;
pub mod range;
pub mod syncer;
pub mod types;

// Re-exports
pub use cancel::CancelToken;
pub use client::{KvClient, RangeRequest, SortOrder, WatchRequest};
pub use error::{Result, SyncError};
pub use memory::MemoryStore;
pub use range::{next_key, prefix_range_end, ScanRange};
pub use syncer::{SyncConfig, Syncer, DEFAULT_BATCH_LIMIT};
pub use types::{ChangeEvent, EventKind, KeyValue, Revision, SnapshotPage};
