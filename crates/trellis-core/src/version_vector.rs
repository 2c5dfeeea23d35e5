//! Version vector for compact causal context representation.
//!
//! A version vector summarizes the causal context by tracking the highest
//! contiguous sequence number seen from each client. It is the resumable
//! cursor exchanged on reconnect: a peer answers with every operation past
//! the cursor.

use crate::clock::SeqNo;
use crate::lattice::Lattice;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A version vector tracking the frontier of seen updates per client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector {
    entries: BTreeMap<String, SeqNo>,
}

impl VersionVector {
    /// Create an empty version vector.
    pub fn new() -> Self {
        VersionVector {
            entries: BTreeMap::new(),
        }
    }

    /// Create a version vector from entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, SeqNo)>) -> Self {
        let mut vv = VersionVector::new();
        for (client, seq) in entries {
            vv.set(client, seq);
        }
        vv
    }

    /// Get the sequence number for a client (0 when never seen).
    pub fn get(&self, client_id: &str) -> SeqNo {
        self.entries.get(client_id).copied().unwrap_or(0)
    }

    /// Set the sequence number for a client.
    pub fn set(&mut self, client_id: impl Into<String>, sequence: SeqNo) {
        let client_id = client_id.into();
        if sequence > 0 {
            self.entries.insert(client_id, sequence);
        } else {
            self.entries.remove(&client_id);
        }
    }

    /// Whether the operation `(client_id, seq)` is covered by this vector.
    pub fn covers(&self, client_id: &str, seq: SeqNo) -> bool {
        seq <= self.get(client_id)
    }

    /// Returns true if for all clients, self[c] >= other[c].
    pub fn dominates(&self, other: &VersionVector) -> bool {
        other
            .entries
            .iter()
            .all(|(client_id, &seq)| self.get(client_id) >= seq)
    }

    /// Check if two vectors are concurrent (neither dominates the other).
    pub fn is_concurrent_with(&self, other: &VersionVector) -> bool {
        !self.dominates(other) && !other.dominates(self)
    }

    /// Merge with another version vector (component-wise max).
    pub fn merge(&mut self, other: &VersionVector) {
        for (client_id, &seq) in &other.entries {
            let current = self.entries.entry(client_id.clone()).or_insert(0);
            *current = (*current).max(seq);
        }
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SeqNo)> {
        self.entries.iter()
    }

    /// Get the number of clients tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the version vector is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Lattice for VersionVector {
    fn bottom() -> Self {
        VersionVector::new()
    }

    fn join(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_defaults_to_zero() {
        let vv = VersionVector::new();
        assert_eq!(vv.get("a"), 0);
        assert!(vv.is_empty());
    }

    #[test]
    fn test_set_zero_removes_entry() {
        let mut vv = VersionVector::from_entries([("a".to_string(), 3)]);
        vv.set("a", 0);
        assert!(vv.is_empty());
    }

    #[test]
    fn test_covers() {
        let vv = VersionVector::from_entries([("a".to_string(), 3)]);
        assert!(vv.covers("a", 3));
        assert!(!vv.covers("a", 4));
        assert!(!vv.covers("b", 1));
    }

    #[test]
    fn test_dominates_and_concurrency() {
        let a = VersionVector::from_entries([("a".to_string(), 2), ("b".to_string(), 1)]);
        let b = VersionVector::from_entries([("a".to_string(), 1), ("b".to_string(), 3)]);
        assert!(a.is_concurrent_with(&b));

        let joined = a.join(&b);
        assert!(joined.dominates(&a));
        assert!(joined.dominates(&b));
        assert_eq!(joined.get("a"), 2);
        assert_eq!(joined.get("b"), 3);
    }
}
