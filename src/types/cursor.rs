//! Sync cursor: the composite "what has already been seen" marker.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One counter of a [`SyncCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorEntry {
    pub key: u64,
    pub value: u64,
}

/// Ordered list of `(key, value)` counters.
///
/// The remote treats the cursor as an opaque composite key, so entry order is
/// preserved exactly as the server returned it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCursor {
    entries: Vec<CursorEntry>,
}

impl SyncCursor {
    pub fn new(entries: Vec<CursorEntry>) -> Self {
        Self { entries }
    }

    /// Build a cursor from `(key, value)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u64, u64)>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(key, value)| CursorEntry { key, value })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[CursorEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: u64) -> Option<u64> {
        self.entries.iter().find(|e| e.key == key).map(|e| e.value)
    }

    /// Move the cursor forward to `next`.
    ///
    /// Never rolls back: shared keys keep the larger value, the layout of
    /// `next` wins otherwise, and an empty `next` is ignored. Returns whether
    /// the cursor changed.
    pub fn advance(&mut self, next: SyncCursor) -> bool {
        if next.is_empty() {
            return false;
        }

        let merged: Vec<CursorEntry> = next
            .entries
            .into_iter()
            .map(|entry| match self.get(entry.key) {
                Some(current) if current > entry.value => {
                    log::warn!(
                        "server returned cursor key {} at {} behind local {}; keeping local",
                        entry.key,
                        entry.value,
                        current
                    );
                    CursorEntry {
                        key: entry.key,
                        value: current,
                    }
                }
                _ => entry,
            })
            .collect();

        if merged == self.entries {
            return false;
        }
        self.entries = merged;
        true
    }

    /// Whether every key shared with `other` is at least as far along.
    pub fn dominates(&self, other: &SyncCursor) -> bool {
        self.entries.iter().all(|entry| match other.get(entry.key) {
            Some(theirs) => entry.value >= theirs,
            None => true,
        })
    }

    /// Stable query-string form: `key_value|key_value`.
    pub fn to_query_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{}_{}", entry.key, entry.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_value_preserves_order() {
        let cursor = SyncCursor::from_pairs([(3, 30), (1, 10), (2, 20)]);
        assert_eq!(cursor.to_query_value(), "3_30|1_10|2_20");
        assert_eq!(SyncCursor::default().to_query_value(), "");
    }

    #[test]
    fn test_advance_replaces_with_newer() {
        let mut cursor = SyncCursor::from_pairs([(1, 10), (2, 20)]);
        assert!(cursor.advance(SyncCursor::from_pairs([(1, 11), (2, 20), (3, 1)])));
        assert_eq!(cursor, SyncCursor::from_pairs([(1, 11), (2, 20), (3, 1)]));
    }

    #[test]
    fn test_advance_never_rolls_back() {
        let mut cursor = SyncCursor::from_pairs([(1, 10), (2, 20)]);
        let before = cursor.clone();
        cursor.advance(SyncCursor::from_pairs([(1, 5), (2, 25)]));
        assert_eq!(cursor.get(1), Some(10));
        assert_eq!(cursor.get(2), Some(25));
        assert!(cursor.dominates(&before));
    }

    #[test]
    fn test_advance_ignores_empty() {
        let mut cursor = SyncCursor::from_pairs([(1, 10)]);
        assert!(!cursor.advance(SyncCursor::default()));
        assert_eq!(cursor.get(1), Some(10));
    }

    #[test]
    fn test_json_form_is_ordered_list() {
        let cursor = SyncCursor::from_pairs([(2, 7), (1, 9)]);
        let json = serde_json::to_string(&cursor).unwrap();
        assert_eq!(json, r#"[{"key":2,"value":7},{"key":1,"value":9}]"#);
        let back: SyncCursor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cursor);
    }
}
