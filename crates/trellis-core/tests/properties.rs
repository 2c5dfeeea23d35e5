//! Property-based tests for the mergeable building blocks
//!
//! These tests verify the lattice laws that guarantee convergence:
//!  - Commutativity: a ⊔ b = b ⊔ a
//!  - Associativity: (a ⊔ b) ⊔ c = a ⊔ (b ⊔ c)
//!  - Idempotence:  a ⊔ a = a
//!  - Bottom is identity: a ⊔ ⊥ = a

use proptest::prelude::*;
use trellis_core::clock::Stamp;
use trellis_core::lattice::Lattice;
use trellis_core::lwwreg::LWWRegister;
use trellis_core::seen::SeenSet;
use trellis_core::version_vector::VersionVector;

const CLIENTS: [&str; 3] = ["alice", "bob", "carol"];

/// A register written by one operation. The value is derived from the stamp,
/// matching the invariant that one stamp always carries one value.
fn lwwreg_strategy() -> impl Strategy<Value = LWWRegister<String>> {
    (0u64..20, 0usize..CLIENTS.len()).prop_map(|(clock, client)| {
        let mut reg = LWWRegister::new();
        if clock > 0 {
            let stamp = Stamp::new(clock, CLIENTS[client]);
            reg.set(stamp.to_string(), &stamp);
        }
        reg
    })
}

fn version_vector_strategy() -> impl Strategy<Value = VersionVector> {
    prop::collection::vec((0usize..CLIENTS.len(), 0u64..50), 0..6).prop_map(|entries| {
        let mut vv = VersionVector::new();
        for (client, seq) in entries {
            let current = vv.get(CLIENTS[client]);
            vv.set(CLIENTS[client], current.max(seq));
        }
        vv
    })
}

fn seen_set_strategy() -> impl Strategy<Value = SeenSet> {
    prop::collection::vec((0usize..CLIENTS.len(), 1u64..12), 0..20).prop_map(|ids| {
        let mut seen = SeenSet::new();
        for (client, seq) in ids {
            seen.insert(CLIENTS[client], seq);
        }
        seen
    })
}

// ============================================================================
// LWWRegister Property Tests
// ============================================================================

proptest! {
    #[test]
    fn lwwreg_join_is_commutative(a in lwwreg_strategy(), b in lwwreg_strategy()) {
        prop_assert_eq!(a.join(&b), b.join(&a));
    }

    #[test]
    fn lwwreg_join_is_associative(
        a in lwwreg_strategy(),
        b in lwwreg_strategy(),
        c in lwwreg_strategy()
    ) {
        let left = a.join(&b).join(&c);
        let right = a.join(&b.join(&c));
        prop_assert_eq!(left, right);
    }

    #[test]
    fn lwwreg_join_is_idempotent(a in lwwreg_strategy()) {
        prop_assert_eq!(a.join(&a), a);
    }

    #[test]
    fn lwwreg_bottom_is_identity(a in lwwreg_strategy()) {
        let bottom = LWWRegister::bottom();
        prop_assert_eq!(a.join(&bottom), a.clone());
        prop_assert_eq!(bottom.join(&a), a);
    }

    #[test]
    fn lwwreg_set_matches_join(a in lwwreg_strategy(), b in lwwreg_strategy()) {
        // Applying b's write to a must land where the join lands
        let mut applied = a.clone();
        if let Some(value) = b.get() {
            applied.set(value.clone(), b.stamp());
        }
        let joined = a.join(&b);
        prop_assert_eq!(applied.get(), joined.get());
    }
}

// ============================================================================
// VersionVector Property Tests
// ============================================================================

proptest! {
    #[test]
    fn version_vector_join_is_commutative(
        a in version_vector_strategy(),
        b in version_vector_strategy()
    ) {
        prop_assert_eq!(a.join(&b), b.join(&a));
    }

    #[test]
    fn version_vector_join_is_idempotent(a in version_vector_strategy()) {
        prop_assert_eq!(a.join(&a), a);
    }

    #[test]
    fn version_vector_join_dominates_inputs(
        a in version_vector_strategy(),
        b in version_vector_strategy()
    ) {
        let joined = a.join(&b);
        prop_assert!(joined.dominates(&a));
        prop_assert!(joined.dominates(&b));
    }
}

// ============================================================================
// SeenSet Property Tests
// ============================================================================

proptest! {
    #[test]
    fn seen_set_join_is_commutative(a in seen_set_strategy(), b in seen_set_strategy()) {
        prop_assert_eq!(a.join(&b), b.join(&a));
    }

    #[test]
    fn seen_set_join_is_associative(
        a in seen_set_strategy(),
        b in seen_set_strategy(),
        c in seen_set_strategy()
    ) {
        let left = a.join(&b).join(&c);
        let right = a.join(&b.join(&c));
        prop_assert_eq!(left, right);
    }

    #[test]
    fn seen_set_join_is_idempotent(a in seen_set_strategy()) {
        prop_assert_eq!(a.join(&a), a);
    }

    #[test]
    fn seen_set_insert_order_is_irrelevant(
        ids in prop::collection::vec((0usize..CLIENTS.len(), 1u64..12), 0..20)
    ) {
        let mut forward = SeenSet::new();
        for (client, seq) in &ids {
            forward.insert(CLIENTS[*client], *seq);
        }
        let mut backward = SeenSet::new();
        for (client, seq) in ids.iter().rev() {
            backward.insert(CLIENTS[*client], *seq);
        }
        prop_assert_eq!(forward, backward);
    }
}
