//! Key-range math for prefix scans.
//!
//! Keys are plain byte strings compared lexicographically. A prefix scan
//! covers `[prefix, prefix_range_end(prefix))`; pagination resumes from
//! the previous page's last key via [`next_key`].

/// Exclusive upper bound of the range of keys beginning with `prefix`.
///
/// Trailing `0xFF` bytes are stripped, then the last remaining byte is
/// incremented. Returns `None` when no finite bound exists (empty prefix
/// or all bytes `0xFF`), meaning the range extends to the end of the key
/// space.
pub fn prefix_range_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xFF {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Smallest key strictly greater than `key`: the key with a single zero
/// byte appended.
///
/// Used as the scan cursor, so the next page requests keys strictly past
/// the previous endpoint even when stored keys share it as a proper
/// prefix.
pub fn next_key(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0x00);
    next
}

/// Resolved scan bounds for a sync target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanRange {
    /// First key of the scan.
    pub start: Vec<u8>,

    /// Exclusive upper bound; `None` scans to the end of the key space.
    pub end: Option<Vec<u8>>,
}

impl ScanRange {
    /// Bounds covering every key beginning with `prefix`.
    ///
    /// An empty prefix covers the entire key space: the scan starts at
    /// the lowest possible key (a single zero byte) with no upper bound.
    pub fn for_prefix(prefix: &[u8]) -> Self {
        if prefix.is_empty() {
            ScanRange {
                start: vec![0x00],
                end: None,
            }
        } else {
            ScanRange {
                start: prefix.to_vec(),
                end: prefix_range_end(prefix),
            }
        }
    }
}
