//! In-memory revision-ordered store.
//!
//! `MemoryStore` is a small but complete [`KvClient`]: every mutation is
//! assigned the next revision, per-key version chains serve pinned reads
//! at any retained revision, and watchers get historical replay followed
//! by live events. It records the requests it receives and supports
//! injected failures and compaction, which is what the test suite runs
//! sync sessions against.

use crate::cancel::CancelToken;
use crate::client::{KvClient, RangeRequest, SortOrder, WatchRequest};
use crate::error::{Result, SyncError};
use crate::types::{ChangeEvent, EventKind, KeyValue, Revision, SnapshotPage};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tracing::trace;

/// One link in a key's version chain. `kv` is `None` for tombstones.
#[derive(Clone, Debug)]
struct VersionEntry {
    revision: Revision,
    kv: Option<KeyValue>,
}

struct Watcher {
    prefix: Vec<u8>,
    prev_kv: bool,
    ctx: CancelToken,
    sender: Sender<Result<ChangeEvent>>,
}

#[derive(Default)]
struct Inner {
    revision: Revision,
    compacted: Revision,
    versions: BTreeMap<Vec<u8>, Vec<VersionEntry>>,
    /// Every mutation in revision order, with previous values attached.
    log: Vec<ChangeEvent>,
    watchers: Vec<Watcher>,
    range_requests: Vec<RangeRequest>,
    watch_requests: Vec<WatchRequest>,
    /// Injected failures, keyed by 1-based range call number.
    range_failures: HashMap<usize, SyncError>,
}

/// In-memory revision-ordered key-value store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a key, returning the revision the write committed at.
    pub fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Revision {
        let key = key.into();
        let value = value.into();
        let mut inner = self.inner.write();
        let rev = inner.revision.next();
        inner.revision = rev;

        let prev = inner
            .versions
            .get(&key)
            .and_then(|chain| chain.last())
            .and_then(|entry| entry.kv.clone());

        let kv = match &prev {
            Some(p) => KeyValue {
                key: key.clone(),
                value,
                create_revision: p.create_revision,
                mod_revision: rev,
                version: p.version + 1,
            },
            None => KeyValue {
                key: key.clone(),
                value,
                create_revision: rev,
                mod_revision: rev,
                version: 1,
            },
        };

        inner.versions.entry(key).or_default().push(VersionEntry {
            revision: rev,
            kv: Some(kv.clone()),
        });

        let event = ChangeEvent {
            kind: EventKind::Put,
            kv,
            prev_kv: prev,
        };
        inner.log.push(event.clone());
        Self::broadcast(&mut inner, &event);
        rev
    }

    /// Delete a key. Returns the deletion revision, or `None` if the key
    /// was not alive.
    pub fn delete(&self, key: &[u8]) -> Option<Revision> {
        let mut inner = self.inner.write();
        let prev = inner
            .versions
            .get(key)
            .and_then(|chain| chain.last())
            .and_then(|entry| entry.kv.clone())?;

        let rev = inner.revision.next();
        inner.revision = rev;

        inner
            .versions
            .entry(key.to_vec())
            .or_default()
            .push(VersionEntry {
                revision: rev,
                kv: None,
            });

        let event = ChangeEvent {
            kind: EventKind::Delete,
            kv: KeyValue {
                key: key.to_vec(),
                value: Vec::new(),
                create_revision: Revision(0),
                mod_revision: rev,
                version: 0,
            },
            prev_kv: Some(prev),
        };
        inner.log.push(event.clone());
        Self::broadcast(&mut inner, &event);
        Some(rev)
    }

    /// Discard history before `rev`. Reads and watches below the
    /// compaction point fail with [`SyncError::Compacted`].
    pub fn compact(&self, rev: Revision) {
        let mut inner = self.inner.write();
        if rev > inner.compacted {
            inner.compacted = rev;
        }
    }

    /// Revision of the most recent committed mutation.
    pub fn current_revision(&self) -> Revision {
        self.inner.read().revision
    }

    /// Fail the next range call with `err`.
    pub fn fail_next_range(&self, err: SyncError) {
        let mut inner = self.inner.write();
        let call = inner.range_requests.len() + 1;
        inner.range_failures.insert(call, err);
    }

    /// Fail the `call`-th range call (1-based, counted across the store's
    /// lifetime, probes included) with `err`.
    pub fn fail_range_call(&self, call: usize, err: SyncError) {
        self.inner.write().range_failures.insert(call, err);
    }

    /// Every range request received so far, in order.
    pub fn range_requests(&self) -> Vec<RangeRequest> {
        self.inner.read().range_requests.clone()
    }

    /// Every watch request received so far, in order.
    pub fn watch_requests(&self) -> Vec<WatchRequest> {
        self.inner.read().watch_requests.clone()
    }

    fn broadcast(inner: &mut Inner, event: &ChangeEvent) {
        inner.watchers.retain(|w| {
            if w.ctx.is_cancelled() {
                trace!("dropping watcher: cancelled");
                return false;
            }
            if !event.kv.key.starts_with(&w.prefix) {
                return true;
            }
            let mut ev = event.clone();
            if !w.prev_kv {
                ev.prev_kv = None;
            }
            w.sender.send(Ok(ev)).is_ok()
        });
    }
}

impl KvClient for MemoryStore {
    fn range(&self, ctx: &CancelToken, req: RangeRequest) -> Result<SnapshotPage> {
        if ctx.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let mut inner = self.inner.write();
        inner.range_requests.push(req.clone());
        let call = inner.range_requests.len();
        if let Some(err) = inner.range_failures.remove(&call) {
            return Err(err);
        }

        let rev = req.revision.unwrap_or(inner.revision);
        if rev < inner.compacted {
            return Err(SyncError::Compacted(rev));
        }

        let lower = Bound::Included(req.start.clone());
        let upper = match &req.end {
            Some(end) => Bound::Excluded(end.clone()),
            None => Bound::Unbounded,
        };

        let mut entries: Vec<KeyValue> = inner
            .versions
            .range((lower, upper))
            .filter_map(|(_, chain)| {
                chain
                    .iter()
                    .rev()
                    .find(|entry| entry.revision <= rev)
                    .and_then(|entry| entry.kv.clone())
            })
            .collect();

        if req.sort == SortOrder::Descending {
            entries.reverse();
        }

        let more = req.limit > 0 && entries.len() > req.limit;
        if more {
            entries.truncate(req.limit);
        }

        Ok(SnapshotPage {
            entries,
            more,
            revision: rev,
        })
    }

    fn watch(&self, ctx: &CancelToken, req: WatchRequest) -> Receiver<Result<ChangeEvent>> {
        let mut inner = self.inner.write();
        inner.watch_requests.push(req.clone());
        let (tx, rx) = unbounded();

        if req.start_revision < inner.compacted {
            let _ = tx.send(Err(SyncError::Compacted(req.start_revision)));
            return rx;
        }

        // Replay history from the start revision, then go live. Both
        // happen under the same lock, so no event is lost in between.
        for event in &inner.log {
            if event.kv.mod_revision < req.start_revision {
                continue;
            }
            if !event.kv.key.starts_with(&req.prefix) {
                continue;
            }
            let mut ev = event.clone();
            if !req.prev_kv {
                ev.prev_kv = None;
            }
            let _ = tx.send(Ok(ev));
        }

        inner.watchers.push(Watcher {
            prefix: req.prefix,
            prev_kv: req.prev_kv,
            ctx: ctx.clone(),
            sender: tx,
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_all(store: &MemoryStore, revision: Option<Revision>) -> SnapshotPage {
        store
            .range(
                &CancelToken::new(),
                RangeRequest {
                    start: vec![0x00],
                    end: None,
                    limit: 0,
                    revision,
                    sort: SortOrder::Ascending,
                },
            )
            .unwrap()
    }

    #[test]
    fn test_version_chain_metadata() {
        let store = MemoryStore::new();
        let r1 = store.put("k", "v1");
        let r2 = store.put("k", "v2");
        assert_eq!(r2, r1.next());

        let page = range_all(&store, None);
        let kv = &page.entries[0];
        assert_eq!(kv.create_revision, r1);
        assert_eq!(kv.mod_revision, r2);
        assert_eq!(kv.version, 2);

        // Delete ends the chain; a rewrite starts a fresh one.
        store.delete(b"k").unwrap();
        let r4 = store.put("k", "v3");
        let kv = range_all(&store, None).entries[0].clone();
        assert_eq!(kv.create_revision, r4);
        assert_eq!(kv.version, 1);
    }

    #[test]
    fn test_pinned_read_sees_old_state() {
        let store = MemoryStore::new();
        store.put("a", "old");
        let pin = store.current_revision();
        store.put("a", "new");
        store.put("b", "later");

        let page = range_all(&store, Some(pin));
        assert_eq!(page.revision, pin);
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].value, b"old");
    }

    #[test]
    fn test_delete_of_absent_key_is_noop() {
        let store = MemoryStore::new();
        assert_eq!(store.delete(b"ghost"), None);
        assert_eq!(store.current_revision(), Revision(0));
    }

    #[test]
    fn test_watch_replays_then_streams() {
        let store = MemoryStore::new();
        store.put("a/1", "x");
        let from = store.current_revision().next();
        store.put("a/2", "y");
        store.put("b/1", "ignored");

        let ctx = CancelToken::new();
        let rx = store.watch(
            &ctx,
            WatchRequest {
                prefix: b"a/".to_vec(),
                start_revision: from,
                prev_kv: true,
            },
        );

        // Replayed: only a/2 is at or past `from` and under the prefix.
        let replayed = rx.try_recv().unwrap().unwrap();
        assert_eq!(replayed.kv.key, b"a/2");
        assert!(rx.try_recv().is_err());

        // Live: a later put arrives with its previous value.
        store.put("a/2", "z");
        let live = rx.try_recv().unwrap().unwrap();
        assert_eq!(live.kv.value, b"z");
        assert_eq!(live.prev_kv.unwrap().value, b"y");
    }

    #[test]
    fn test_watch_without_prev_kv_strips_previous_values() {
        let store = MemoryStore::new();
        store.put("k", "v1");

        let ctx = CancelToken::new();
        let rx = store.watch(
            &ctx,
            WatchRequest {
                prefix: Vec::new(),
                start_revision: Revision(1),
                prev_kv: false,
            },
        );
        store.put("k", "v2");

        let first = rx.try_recv().unwrap().unwrap();
        assert_eq!(first.prev_kv, None);
        let second = rx.try_recv().unwrap().unwrap();
        assert_eq!(second.kv.value, b"v2");
        assert_eq!(second.prev_kv, None);
    }

    #[test]
    fn test_watch_below_compaction_fails() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.put(format!("k{i}"), "v");
        }
        store.compact(Revision(4));

        let rx = store.watch(
            &CancelToken::new(),
            WatchRequest {
                prefix: Vec::new(),
                start_revision: Revision(2),
                prev_kv: true,
            },
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Err(SyncError::Compacted(Revision(2)))
        );
        // Terminal: the channel is closed behind the error.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cancelled_watcher_is_dropped_on_broadcast() {
        let store = MemoryStore::new();
        let ctx = CancelToken::new();
        let rx = store.watch(
            &ctx,
            WatchRequest {
                prefix: Vec::new(),
                start_revision: Revision(1),
                prev_kv: false,
            },
        );

        ctx.cancel();
        store.put("k", "v");

        // The watcher was removed without receiving the event.
        assert!(rx.try_recv().is_err());
    }
}
