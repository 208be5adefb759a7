//! Core types for revision-pinned synchronization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical timestamp assigned by the store to every committed mutation.
///
/// Reads and watches can be pinned to a revision for consistency across
/// round trips.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Revision(pub u64);

impl Revision {
    /// The revision immediately after this one.
    pub fn next(self) -> Self {
        Revision(self.0 + 1)
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rev({})", self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One stored entry with its revision metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,

    /// Revision at which the key was (last) created.
    pub create_revision: Revision,

    /// Revision of the most recent write to the key.
    pub mod_revision: Revision,

    /// Writes since creation. A delete ends the chain; the tombstone
    /// carried on delete events has version 0.
    pub version: u64,
}

/// One page of snapshot scan results.
///
/// Ownership transfers to the caller on receipt from the page channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPage {
    /// Entries in key order (per the request's sort order).
    pub entries: Vec<KeyValue>,

    /// Whether further pages remain past this one.
    pub more: bool,

    /// Revision the page was served at.
    pub revision: Revision,
}

/// Kind of mutation carried by a change event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Put,
    Delete,
}

/// One mutation observed by a change feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: EventKind,

    /// The key's state after the mutation. For deletes: empty value,
    /// version 0, `mod_revision` set to the deletion revision.
    pub kv: KeyValue,

    /// The key's state at mutation time, when the subscription requested
    /// previous values and the key existed.
    pub prev_kv: Option<KeyValue>,
}
