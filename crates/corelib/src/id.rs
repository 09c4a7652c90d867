//! Identifier-space arithmetic for the ring.
//!
//! All routing in the DHT happens over the circular identifier space
//! `[0, 2^m)` where `m` is the configured bit width. A string key is
//! mapped onto the ring by hashing it with SHA-256 and interpreting the
//! digest as an unsigned little-endian integer mod `2^m`. Node
//! identifiers are derived from the node's `"ip:port"` string the same
//! way.
//!
//! # Interval predicates
//!
//! Routing decisions are expressed as membership tests against circular
//! intervals. The callers need four distinct flavours, so each one is an
//! explicit method here rather than an ad-hoc combination at the call
//! site:
//!
//! - [`KeySpace::in_range`]: inclusive `[a, b]`
//! - [`KeySpace::in_range_open_closed`]: `(a, b]`, used for key
//!   ownership and predecessor search
//! - [`KeySpace::in_range_closed_open`]: `[a, b)`, used for finger
//!   initialization during a join
//! - [`KeySpace::in_range_open`]: `(a, b)`, used when scanning for the
//!   closest preceding finger
//!
//! `in_range(a, a, k)` holds for every `k`: an interval whose endpoints
//! coincide denotes the full ring, which is what a single-node ring
//! relies on.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// A position on the identifier ring.
///
/// Always strictly below the modulus of the [`KeySpace`] it was produced
/// by.
pub type KeyId = u64;

/// The circular identifier space `[0, 2^m)`.
///
/// Cheap to copy; every component that needs to hash a key or test an
/// interval holds one by value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpace {
    num_bits: u32,
}

impl KeySpace {
    /// Upper bound on the configurable bit width. Typical deployments
    /// use 5-8 bits.
    pub const MAX_BITS: u32 = 32;

    /// Create a key space of `2^num_bits` identifiers.
    pub fn new(num_bits: u32) -> Result<Self> {
        if num_bits == 0 || num_bits > Self::MAX_BITS {
            return Err(Error::Config(format!(
                "num_bits must be in 1..={}, got {}",
                Self::MAX_BITS,
                num_bits
            )));
        }
        Ok(Self { num_bits })
    }

    /// The configured bit width `m`.
    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    /// The ring modulus `M = 2^m`.
    pub fn modulus(&self) -> u64 {
        1u64 << self.num_bits
    }

    fn mask(&self) -> u64 {
        self.modulus() - 1
    }

    /// Hash a string key onto the ring.
    ///
    /// SHA-256 of the key, interpreted as an unsigned little-endian
    /// integer mod `2^m`. For `m <= 64` that reduction only ever reads
    /// the first eight digest bytes.
    pub fn hash(&self, key: &str) -> KeyId {
        let digest = Sha256::digest(key.as_bytes());
        let mut low = [0u8; 8];
        low.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(low) & self.mask()
    }

    /// Identifier of the node listening at `ip:port`.
    pub fn node_id(&self, ip: &str, port: u16) -> KeyId {
        self.hash(&format!("{}:{}", ip, port))
    }

    /// `(id + offset) mod M`.
    pub fn add(&self, id: KeyId, offset: u64) -> KeyId {
        id.wrapping_add(offset) & self.mask()
    }

    /// `(id - offset) mod M`.
    pub fn sub(&self, id: KeyId, offset: u64) -> KeyId {
        id.wrapping_sub(offset) & self.mask()
    }

    /// Start of the `i`-th finger interval: `(id + 2^i) mod M`.
    pub fn finger_start(&self, id: KeyId, i: u32) -> KeyId {
        self.add(id, 1u64 << i)
    }

    /// Inclusive membership test for the circular interval `[start, end]`.
    ///
    /// When `start <= end` this is the ordinary `start <= k <= end`;
    /// otherwise the interval wraps through zero. `start == end` denotes
    /// the full ring.
    pub fn in_range(&self, start: KeyId, end: KeyId, k: KeyId) -> bool {
        if k >= start && k <= end {
            return true;
        }
        start >= end && (k >= start || k <= end)
    }

    /// Membership test for `(start, end]`.
    pub fn in_range_open_closed(&self, start: KeyId, end: KeyId, k: KeyId) -> bool {
        self.in_range(self.add(start, 1), end, k)
    }

    /// Membership test for `[start, end)`.
    pub fn in_range_closed_open(&self, start: KeyId, end: KeyId, k: KeyId) -> bool {
        self.in_range(start, end, k) && k != end
    }

    /// Membership test for the open interval `(start, end)`.
    pub fn in_range_open(&self, start: KeyId, end: KeyId, k: KeyId) -> bool {
        self.in_range(start, end, k) && k != start && k != end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_zero_and_oversized_bit_widths() {
        assert!(KeySpace::new(0).is_err());
        assert!(KeySpace::new(KeySpace::MAX_BITS + 1).is_err());
        assert!(KeySpace::new(5).is_ok());
    }

    #[test]
    fn hash_is_below_modulus_and_deterministic() {
        let space = KeySpace::new(5).unwrap();
        for word in ["apple", "pear", "127.0.0.1:9090", ""] {
            let id = space.hash(word);
            assert!(id < space.modulus(), "{} hashed out of range", word);
            assert_eq!(id, space.hash(word), "hash must be deterministic");
        }
    }

    #[test]
    fn node_id_matches_hash_of_endpoint_string() {
        let space = KeySpace::new(8).unwrap();
        assert_eq!(space.node_id("10.0.0.1", 9090), space.hash("10.0.0.1:9090"));
    }

    #[test]
    fn wrapping_arithmetic() {
        let space = KeySpace::new(5).unwrap();
        assert_eq!(space.add(30, 4), 2);
        assert_eq!(space.sub(2, 4), 30);
        assert_eq!(space.finger_start(30, 2), 2);
        assert_eq!(space.finger_start(3, 0), 4);
    }

    #[test]
    fn in_range_basic_and_wraparound() {
        let space = KeySpace::new(5).unwrap();
        // Plain interval.
        assert!(space.in_range(3, 14, 3));
        assert!(space.in_range(3, 14, 14));
        assert!(space.in_range(3, 14, 9));
        assert!(!space.in_range(3, 14, 22));
        // Wrapping interval.
        assert!(space.in_range(27, 3, 31));
        assert!(space.in_range(27, 3, 0));
        assert!(space.in_range(27, 3, 3));
        assert!(!space.in_range(27, 3, 14));
        // Degenerate interval is the full ring.
        for k in 0..32 {
            assert!(space.in_range(7, 7, k));
        }
    }

    #[test]
    fn half_open_variants_exclude_their_endpoint() {
        let space = KeySpace::new(5).unwrap();
        assert!(!space.in_range_open_closed(3, 14, 3));
        assert!(space.in_range_open_closed(3, 14, 14));
        assert!(space.in_range_closed_open(3, 14, 3));
        assert!(!space.in_range_closed_open(3, 14, 14));
        assert!(!space.in_range_open(3, 14, 3));
        assert!(!space.in_range_open(3, 14, 14));
        assert!(space.in_range_open(3, 14, 4));
        // Adjacent endpoints leave the open interval empty.
        for k in 0..32 {
            assert!(!space.in_range_open(5, 6, k));
        }
        // A single-node ring owns every key, its own id included.
        let owner = 22;
        for k in 0..32 {
            assert!(space.in_range_open_closed(owner, owner, k));
        }
    }

    // Exhaustive equivalence with the clockwise-walk formulation: k lies
    // in [a, b] iff walking clockwise from a reaches k within
    // (b - a) mod M steps, where coinciding endpoints mean a full lap.
    #[test]
    fn in_range_matches_clockwise_walk_exhaustively() {
        let space = KeySpace::new(5).unwrap();
        let modulus = space.modulus();
        for a in 0..modulus {
            for b in 0..modulus {
                let steps = if a == b {
                    modulus
                } else {
                    b.wrapping_sub(a) & (modulus - 1)
                };
                for k in 0..modulus {
                    let walked = k.wrapping_sub(a) & (modulus - 1);
                    assert_eq!(
                        space.in_range(a, b, k),
                        walked <= steps,
                        "a={} b={} k={}",
                        a,
                        b,
                        k
                    );
                }
            }
        }
    }

    proptest! {
        #[test]
        fn hash_stays_in_space(bits in 1u32..=16, key in ".*") {
            let space = KeySpace::new(bits).unwrap();
            prop_assert!(space.hash(&key) < space.modulus());
        }

        #[test]
        fn open_interval_is_subset_of_inclusive(
            a in 0u64..256, b in 0u64..256, k in 0u64..256
        ) {
            let space = KeySpace::new(8).unwrap();
            if space.in_range_open(a, b, k) {
                prop_assert!(space.in_range(a, b, k));
                prop_assert!(k != a && k != b);
            }
            if space.in_range_open_closed(a, b, k) || space.in_range_closed_open(a, b, k) {
                prop_assert!(space.in_range(a, b, k) || k == a || k == b);
            }
        }

        #[test]
        fn add_sub_roundtrip(id in 0u64..256, offset in 0u64..1024) {
            let space = KeySpace::new(8).unwrap();
            let id = id & (space.modulus() - 1);
            prop_assert_eq!(space.sub(space.add(id, offset), offset), id);
        }
    }
}
