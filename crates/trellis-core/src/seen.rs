//! Deduplication set of observed `(client, seq)` pairs.
//!
//! Stored as a contiguous frontier per client plus the sequence numbers
//! that arrived ahead of a gap. Once a gap fills, the out-of-order numbers
//! fold into the frontier, so memory stays proportional to the number of
//! outstanding gaps rather than to the history length.

use crate::clock::SeqNo;
use crate::lattice::Lattice;
use crate::version_vector::VersionVector;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ClientWindow {
    contiguous: SeqNo,
    ahead: BTreeSet<SeqNo>,
}

impl ClientWindow {
    fn contains(&self, seq: SeqNo) -> bool {
        seq <= self.contiguous || self.ahead.contains(&seq)
    }

    fn insert(&mut self, seq: SeqNo) -> bool {
        if self.contains(seq) {
            return false;
        }
        if seq == self.contiguous + 1 {
            self.contiguous = seq;
            while self.ahead.remove(&(self.contiguous + 1)) {
                self.contiguous += 1;
            }
        } else {
            self.ahead.insert(seq);
        }
        true
    }
}

/// Set of operation ids already applied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenSet {
    clients: BTreeMap<String, ClientWindow>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, client: &str, seq: SeqNo) -> bool {
        self.clients
            .get(client)
            .map(|w| w.contains(seq))
            .unwrap_or(false)
    }

    /// Record `(client, seq)`. Returns `false` if it was already present.
    pub fn insert(&mut self, client: &str, seq: SeqNo) -> bool {
        if seq == 0 {
            return false;
        }
        self.clients
            .entry(client.to_string())
            .or_default()
            .insert(seq)
    }

    /// Contiguous frontier per client.
    pub fn frontier(&self) -> VersionVector {
        VersionVector::from_entries(
            self.clients
                .iter()
                .map(|(client, w)| (client.clone(), w.contiguous)),
        )
    }

    /// Number of sequence numbers held beyond a gap, across all clients.
    pub fn pending_gaps(&self) -> usize {
        self.clients.values().map(|w| w.ahead.len()).sum()
    }
}

impl Lattice for SeenSet {
    fn bottom() -> Self {
        Self::new()
    }

    fn join(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (client, window) in &other.clients {
            for seq in 1..=window.contiguous {
                result.insert(client, seq);
            }
            for &seq in &window.ahead {
                result.insert(client, seq);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_in_order() {
        let mut seen = SeenSet::new();
        assert!(seen.insert("a", 1));
        assert!(seen.insert("a", 2));
        assert!(!seen.insert("a", 2));
        assert_eq!(seen.frontier().get("a"), 2);
    }

    #[test]
    fn test_out_of_order_fills_gap() {
        let mut seen = SeenSet::new();
        assert!(seen.insert("a", 3));
        assert!(seen.insert("a", 2));
        assert_eq!(seen.frontier().get("a"), 0);
        assert_eq!(seen.pending_gaps(), 2);

        assert!(seen.insert("a", 1));
        assert_eq!(seen.frontier().get("a"), 3);
        assert_eq!(seen.pending_gaps(), 0);
        assert!(seen.contains("a", 2));
    }

    #[test]
    fn test_zero_seq_is_rejected() {
        let mut seen = SeenSet::new();
        assert!(!seen.insert("a", 0));
        assert!(seen.frontier().is_empty());
    }

    #[test]
    fn test_join_unions_windows() {
        let mut left = SeenSet::new();
        left.insert("a", 1);
        left.insert("a", 3);
        let mut right = SeenSet::new();
        right.insert("a", 1);
        right.insert("a", 2);
        right.insert("b", 1);

        let joined = left.join(&right);
        assert_eq!(joined.frontier().get("a"), 3);
        assert_eq!(joined.frontier().get("b"), 1);
        assert_eq!(joined, right.join(&left));
    }
}
