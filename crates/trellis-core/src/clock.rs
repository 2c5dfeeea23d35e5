//! Lamport clocks and the write stamps derived from them.
//!
//! Every operation carries a Lamport clock value and the id of the client
//! that produced it. The pair `(clock, client)` is the [`Stamp`] used to
//! resolve concurrent writes: the higher clock wins, and on equal clocks the
//! lexicographically greater client id wins.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Client identifier. Also the tie-break component of a [`Stamp`].
pub type ClientId = String;

/// Per-client sequence number. The first operation of a client is `1`.
pub type SeqNo = u64;

/// Totally ordered write stamp: `(clock, client)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub clock: u64,
    pub client: ClientId,
}

impl Stamp {
    pub fn new(clock: u64, client: impl Into<ClientId>) -> Self {
        Self {
            clock,
            client: client.into(),
        }
    }

    /// Whether a write stamped `self` overwrites a write stamped `other`.
    pub fn beats(&self, other: &Stamp) -> bool {
        self > other
    }
}

impl Ord for Stamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.clock
            .cmp(&other.clock)
            .then_with(|| self.client.cmp(&other.client))
    }
}

impl PartialOrd for Stamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.clock, self.client)
    }
}

/// A Lamport logical clock.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LamportClock {
    time: u64,
}

impl LamportClock {
    pub fn new() -> Self {
        Self { time: 0 }
    }

    /// Current time without advancing.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Advance for a local event and return the new time.
    pub fn tick(&mut self) -> u64 {
        self.time += 1;
        self.time
    }

    /// Fold in a clock value observed on a remote event.
    ///
    /// The next [`tick`](Self::tick) is then strictly greater than `remote`.
    pub fn observe(&mut self, remote: u64) {
        self.time = self.time.max(remote);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_orders_by_clock_first() {
        let early = Stamp::new(1, "zed");
        let late = Stamp::new(2, "amy");
        assert!(late.beats(&early));
        assert!(!early.beats(&late));
    }

    #[test]
    fn test_stamp_tie_breaks_on_client() {
        let a = Stamp::new(7, "client-a");
        let b = Stamp::new(7, "client-b");
        assert!(b.beats(&a));
        assert!(!a.beats(&b));
        assert!(!a.beats(&a));
    }

    #[test]
    fn test_lamport_tick_is_strictly_increasing() {
        let mut clock = LamportClock::new();
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.tick(), 2);
    }

    #[test]
    fn test_lamport_observe_jumps_forward() {
        let mut clock = LamportClock::new();
        clock.tick();
        clock.observe(10);
        assert_eq!(clock.tick(), 11);

        // Older remote clocks never move us back
        clock.observe(3);
        assert_eq!(clock.tick(), 12);
    }
}
