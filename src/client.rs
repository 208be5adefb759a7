//! The store capability consumed by sync sessions.
//!
//! Connection management, authentication, transport, and retries all
//! belong to the implementation behind [`KvClient`]; this crate only
//! issues reads and subscriptions against it.

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::types::{ChangeEvent, Revision, SnapshotPage};
use crossbeam_channel::Receiver;

/// Sort order for range reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One page of a sorted, optionally revision-pinned range read.
#[derive(Clone, Debug)]
pub struct RangeRequest {
    /// First key of the range.
    pub start: Vec<u8>,

    /// Exclusive upper bound; `None` reads to the end of the key space.
    pub end: Option<Vec<u8>>,

    /// Max entries in the returned page; 0 means unlimited.
    pub limit: usize,

    /// Revision to serve the read at; `None` serves at the current
    /// revision, which the response reports.
    pub revision: Option<Revision>,

    /// Key order of the returned page.
    pub sort: SortOrder,
}

/// A change-feed subscription.
#[derive(Clone, Debug)]
pub struct WatchRequest {
    /// Key prefix to watch; empty watches the entire key space.
    pub prefix: Vec<u8>,

    /// First revision the feed delivers events from.
    pub start_revision: Revision,

    /// Attach each mutated key's previous value to its event.
    pub prev_kv: bool,
}

/// Revision-aware range-read/watch client for a key-value store.
pub trait KvClient: Send + Sync + 'static {
    /// Serve one page of a range read.
    ///
    /// The page reports the revision it was served at and whether more
    /// entries remain past `limit`. A cancelled token surfaces as
    /// [`SyncError::Cancelled`](crate::SyncError::Cancelled).
    fn range(&self, ctx: &CancelToken, req: RangeRequest) -> Result<SnapshotPage>;

    /// Open a live change feed.
    ///
    /// The channel delivers events in revision order and ends when `ctx`
    /// is cancelled or the store terminates the feed; an abnormal end
    /// (such as a compacted start revision) is a terminal `Err` event.
    fn watch(&self, ctx: &CancelToken, req: WatchRequest) -> Receiver<Result<ChangeEvent>>;
}
