//! Property-Based Tests for the core types
//!
//! 1. Edge pairs are unordered: `{A,B}` and `{B,A}` are the same transport key
//! 2. A signature is bound to exactly one nonce
//!
//! Uses proptest for property-based testing with arbitrary inputs.

use discovery_core::{EdgePair, KeyPair, Nonce};
use proptest::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

// =============================================================================
// Edge pairs are unordered
// =============================================================================

proptest! {
    #[test]
    fn prop_edge_pair_order_insensitive(
        a in any::<[u8; 32]>(),
        b in any::<[u8; 32]>(),
    ) {
        prop_assume!(a != b);
        let a = KeyPair::from_bytes(&a).identity();
        let b = KeyPair::from_bytes(&b).identity();

        let ab = EdgePair::new(a, b).unwrap();
        let ba = EdgePair::new(b, a).unwrap();

        prop_assert_eq!(ab, ba);
        prop_assert_eq!(hash_of(&ab), hash_of(&ba));
        prop_assert_eq!(ab.pair_key(), ba.pair_key());
        prop_assert_eq!(ab.canonical(), ba.canonical());
    }

    #[test]
    fn prop_distinct_pairs_have_distinct_keys(
        seeds in prop::collection::hash_set(any::<[u8; 32]>(), 3),
    ) {
        let ids: Vec<_> = seeds.iter().map(|s| KeyPair::from_bytes(s).identity()).collect();

        let ab = EdgePair::new(ids[0], ids[1]).unwrap();
        let ac = EdgePair::new(ids[0], ids[2]).unwrap();

        prop_assert_ne!(ab, ac);
        prop_assert_ne!(ab.pair_key(), ac.pair_key());
    }
}

// =============================================================================
// Signatures are bound to one nonce
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_signature_bound_to_nonce(
        body in prop::collection::vec(any::<u8>(), 0..256),
        nonce in 0..u64::MAX,
    ) {
        let kp = KeyPair::generate();
        let sig = kp.sign_request(&body, Nonce(nonce));

        prop_assert!(kp.identity().verify_request(&body, Nonce(nonce), &sig).is_ok());
        prop_assert!(kp.identity().verify_request(&body, Nonce(nonce).next().unwrap(), &sig).is_err());
    }
}
