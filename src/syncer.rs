//! Two-phase sync sessions: revision-pinned snapshot scan, then a
//! gapless change-feed handoff.
//!
//! A [`Syncer`] first streams the full state of a key range as of one
//! snapshot revision R ([`Syncer::sync_base`]), then resumes the store's
//! change feed at exactly R+1 ([`Syncer::sync_updates`]). Together the
//! two streams give the caller every key-state in the range exactly once,
//! with no gap and no duplicate, as long as all pages are applied before
//! any change event.

use crate::cancel::CancelToken;
use crate::client::{KvClient, RangeRequest, SortOrder, WatchRequest};
use crate::error::{Result, SyncError};
use crate::range::{next_key, ScanRange};
use crate::types::{ChangeEvent, Revision, SnapshotPage};
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use tracing::{debug, warn};

/// Default entries per scan page.
pub const DEFAULT_BATCH_LIMIT: usize = 1024;

/// Configuration for a sync session.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Max entries per range read. Bounds per-request memory and read
    /// latency at the cost of round trips.
    pub batch_limit: usize,

    /// Page channel capacity; the scan worker blocks once the caller
    /// falls this many pages behind.
    pub page_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            page_buffer: 1024,
        }
    }
}

/// A two-phase sync session over one key range.
///
/// The session identity is the key prefix (empty = entire key space) and
/// the snapshot revision. The revision is pinned exactly once — either up
/// front through the constructor or by the first `sync_base` call — and
/// never reset; `sync_updates` requires it to already be pinned.
pub struct Syncer<C: KvClient> {
    client: Arc<C>,
    prefix: Vec<u8>,
    config: SyncConfig,
    /// Snapshot revision. Written at most once; the write happens before
    /// the scan worker spawns and before any subscriber reads it.
    rev: OnceLock<Revision>,
    /// Set when the pin probe fails. The session then refuses all work.
    poisoned: AtomicBool,
}

impl<C: KvClient> Syncer<C> {
    /// Create a session for `prefix`, pinned to `rev` if given, otherwise
    /// pinned opportunistically by the first [`sync_base`](Self::sync_base)
    /// call.
    pub fn new(client: Arc<C>, prefix: impl Into<Vec<u8>>, rev: Option<Revision>) -> Self {
        Self::with_config(client, prefix, rev, SyncConfig::default())
    }

    pub fn with_config(
        client: Arc<C>,
        prefix: impl Into<Vec<u8>>,
        rev: Option<Revision>,
        config: SyncConfig,
    ) -> Self {
        let pin = OnceLock::new();
        if let Some(rev) = rev {
            let _ = pin.set(rev);
        }
        Self {
            client,
            prefix: prefix.into(),
            config,
            rev: pin,
            poisoned: AtomicBool::new(false),
        }
    }

    /// The snapshot revision, once pinned.
    pub fn revision(&self) -> Option<Revision> {
        self.rev.get().copied()
    }

    /// Stream the snapshot of the key range as of the pinned revision.
    ///
    /// Pins the revision first if the session has none, synchronously, so
    /// a probe failure is reported before any background work starts.
    /// Returns a page channel and an error channel; both close when the
    /// scan terminates, and at most one error is ever delivered. An empty
    /// range yields a single page with zero entries, which is success.
    ///
    /// Pages arrive in strictly increasing key order. Errors already past
    /// pages remain valid as a consistent partial prefix of the range,
    /// but a full resync must restart from a fresh session.
    pub fn sync_base(&self, ctx: &CancelToken) -> (Receiver<SnapshotPage>, Receiver<SyncError>) {
        let (page_tx, page_rx) = bounded(self.config.page_buffer);
        let (err_tx, err_rx) = bounded(1);

        if self.poisoned.load(Ordering::SeqCst) {
            let _ = err_tx.send(SyncError::SessionPoisoned);
            return (page_rx, err_rx);
        }

        if self.rev.get().is_none() {
            match self.pin_revision(ctx) {
                Ok(rev) => {
                    let _ = self.rev.set(rev);
                }
                Err(err) => {
                    warn!(error = %err, "revision pin failed");
                    self.poisoned.store(true, Ordering::SeqCst);
                    let _ = err_tx.send(err);
                    return (page_rx, err_rx);
                }
            }
        }
        let rev = match self.rev.get() {
            Some(rev) => *rev,
            // Unreachable after a successful pin; refuse rather than scan
            // at a guessed revision.
            None => {
                let _ = err_tx.send(SyncError::SessionPoisoned);
                return (page_rx, err_rx);
            }
        };

        let range = ScanRange::for_prefix(&self.prefix);
        debug!(revision = %rev, "starting snapshot scan");

        let client = Arc::clone(&self.client);
        let limit = self.config.batch_limit;
        let ctx = ctx.clone();
        thread::spawn(move || {
            let mut cursor = range.start;
            loop {
                let req = RangeRequest {
                    start: cursor,
                    end: range.end.clone(),
                    limit,
                    revision: Some(rev),
                    sort: SortOrder::Ascending,
                };
                let page = match client.range(&ctx, req) {
                    Ok(page) => page,
                    Err(err) => {
                        warn!(error = %err, "snapshot scan failed");
                        let _ = err_tx.send(err);
                        return;
                    }
                };

                let more = page.more;
                let last = page.entries.last().map(|kv| kv.key.clone());
                if page_tx.send(page).is_err() {
                    // Caller dropped the page receiver; abandon quietly.
                    return;
                }
                if !more {
                    debug!(revision = %rev, "snapshot scan complete");
                    return;
                }
                match last {
                    Some(key) => cursor = next_key(&key),
                    None => {
                        let _ = err_tx.send(SyncError::Store(
                            "store reported more data on an empty page".into(),
                        ));
                        return;
                    }
                }
            }
        });

        (page_rx, err_rx)
    }

    /// Resume the change feed at pinned revision + 1.
    ///
    /// Every mutation to the key range after the snapshot was taken is
    /// delivered exactly once, in revision order, with the mutated key's
    /// previous value attached. The feed is long-lived: it ends only on
    /// cancellation or when the store terminates it. A terminal `Err`
    /// event (such as [`SyncError::Compacted`]) means the whole session
    /// must restart from a fresh snapshot.
    ///
    /// # Panics
    ///
    /// Panics if no revision has been pinned yet. Calling this before
    /// `sync_base` is a contract violation: any guessed revision could
    /// reintroduce gaps or duplicates, so it is not downgraded to an
    /// error value.
    pub fn sync_updates(&self, ctx: &CancelToken) -> Receiver<Result<ChangeEvent>> {
        let rev = match self.rev.get() {
            Some(rev) => *rev,
            None => panic!("sync_updates called before sync_base pinned a revision"),
        };
        debug!(revision = %rev, "subscribing to updates");
        self.client.watch(
            ctx,
            WatchRequest {
                prefix: self.prefix.clone(),
                start_revision: rev.next(),
                prev_kv: true,
            },
        )
    }

    /// Probe for a fresh revision. Only the serving revision of the
    /// response matters; the content is discarded. With no prefix, the
    /// probe targets the lowest possible key rather than a sentinel that
    /// might actually exist.
    fn pin_revision(&self, ctx: &CancelToken) -> Result<Revision> {
        let probe = if self.prefix.is_empty() {
            vec![0x00]
        } else {
            self.prefix.clone()
        };
        let page = self.client.range(
            ctx,
            RangeRequest {
                start: probe,
                end: None,
                limit: 1,
                revision: None,
                sort: SortOrder::Ascending,
            },
        )?;
        debug!(revision = %page.revision, "pinned snapshot revision");
        Ok(page.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn drain(
        rx: Receiver<SnapshotPage>,
        errs: Receiver<SyncError>,
    ) -> (Vec<SnapshotPage>, Vec<SyncError>) {
        (rx.iter().collect(), errs.iter().collect())
    }

    #[test]
    fn test_auto_pin_probes_prefix() {
        let store = Arc::new(MemoryStore::new());
        store.put("a1", "v");
        let pinned_at = store.current_revision();
        let syncer = Syncer::new(Arc::clone(&store), "a", None);

        let (pages, errs) = syncer.sync_base(&CancelToken::new());
        let (pages, errs) = drain(pages, errs);
        assert_eq!(pages.len(), 1);
        assert!(errs.is_empty());

        assert_eq!(syncer.revision(), Some(pinned_at));
        let probe = &store.range_requests()[0];
        assert_eq!(probe.start, b"a".to_vec());
        assert_eq!(probe.limit, 1);
        assert_eq!(probe.revision, None);
    }

    #[test]
    fn test_auto_pin_empty_prefix_probes_lowest_key() {
        let store = Arc::new(MemoryStore::new());
        store.put("anything", "v");
        let syncer = Syncer::new(Arc::clone(&store), Vec::new(), None);

        let (pages, errs) = syncer.sync_base(&CancelToken::new());
        let _ = drain(pages, errs);

        let probe = &store.range_requests()[0];
        assert_eq!(probe.start, vec![0x00]);
        assert_eq!(probe.limit, 1);
    }

    #[test]
    fn test_explicit_revision_skips_probe() {
        let store = Arc::new(MemoryStore::new());
        store.put("a1", "v");
        let rev = store.current_revision();
        let syncer = Syncer::new(Arc::clone(&store), "a", Some(rev));

        let (pages, errs) = syncer.sync_base(&CancelToken::new());
        let (pages, errs) = drain(pages, errs);
        assert_eq!(pages.len(), 1);
        assert!(errs.is_empty());

        // Every recorded request is a pinned scan read, no probe.
        for req in store.range_requests() {
            assert_eq!(req.revision, Some(rev));
        }
    }

    #[test]
    fn test_empty_range_yields_one_empty_page() {
        let store = Arc::new(MemoryStore::new());
        store.put("b1", "outside");
        let syncer = Syncer::new(Arc::clone(&store), "a", None);

        let (pages, errs) = syncer.sync_base(&CancelToken::new());
        let (pages, errs) = drain(pages, errs);

        assert_eq!(pages.len(), 1);
        assert!(pages[0].entries.is_empty());
        assert!(!pages[0].more);
        assert!(errs.is_empty());
    }
}
