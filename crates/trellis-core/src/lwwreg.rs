//! Last-Write-Wins (LWW) Register CRDT
//!
//! The register keeps the value written under the highest [`Stamp`].
//! Stamps are unique per operation, so two writes with the same stamp carry
//! the same value and the tie never needs to look at the value itself.

use crate::clock::Stamp;
use crate::lattice::Lattice;
use serde::{Deserialize, Serialize};

/// A Last-Write-Wins Register keyed by `(clock, client)` stamps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LWWRegister<T> {
    value: Option<T>,
    stamp: Stamp,
}

impl<T: Clone + PartialEq> LWWRegister<T> {
    /// Create an empty register.
    pub fn new() -> Self {
        Self {
            value: None,
            stamp: Stamp::default(),
        }
    }

    /// Write `value` if `stamp` beats the current stamp.
    ///
    /// Returns `true` when the register changed.
    pub fn set(&mut self, value: T, stamp: &Stamp) -> bool {
        if self.value.is_none() || stamp.beats(&self.stamp) {
            self.value = Some(value);
            self.stamp = stamp.clone();
            true
        } else {
            false
        }
    }

    /// Get the current value if it exists
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Stamp of the winning write.
    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    /// Check if the register is empty (no value set)
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

impl<T: Clone + PartialEq> Default for LWWRegister<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + PartialEq> Lattice for LWWRegister<T> {
    fn bottom() -> Self {
        Self::new()
    }

    fn join(&self, other: &Self) -> Self {
        match (&self.value, &other.value) {
            (None, _) => other.clone(),
            (_, None) => self.clone(),
            _ if other.stamp.beats(&self.stamp) => other.clone(),
            _ => self.clone(),
        }
    }
}
