//! Lookup keys and the key fingerprint function.
//!
//! Every key carries a 64-bit fingerprint computed exactly once. Stored
//! entries keep the fingerprint alongside the key bytes, and lookups
//! compare fingerprints before touching the bytes, so the hasher never
//! runs again after construction (not even during a rehash).

use std::sync::OnceLock;

use ahash::RandomState;

// Fixed seeds: fingerprints must be identical for the lifetime of a
// store, and entries outlive any single call site.
const SEEDS: [u64; 4] = [
    0x9e37_79b9_7f4a_7c15,
    0xf39c_c060_5ced_c834,
    0x1082_276b_f3a2_7251,
    0x7109_87c8_cca7_b2eb,
];

/// Computes the 64-bit fingerprint of a key.
///
/// Lookups and stored entries must use the same function; this is the
/// default one. A command layer that hashes keys elsewhere (e.g. when
/// routing) can pass its own value through [`LookupKey::with_fingerprint`].
pub fn fingerprint(key: &[u8]) -> u64 {
    static STATE: OnceLock<RandomState> = OnceLock::new();
    STATE
        .get_or_init(|| RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]))
        .hash_one(key)
}

/// A borrowed key plus its precomputed fingerprint.
///
/// Equality against a stored entry requires fingerprint equality and
/// then full byte equality.
#[derive(Debug, Clone, Copy)]
pub struct LookupKey<'a> {
    bytes: &'a [u8],
    fingerprint: u64,
}

impl<'a> LookupKey<'a> {
    /// Builds a lookup key, computing the fingerprint with [`fingerprint`].
    pub fn new(bytes: &'a [u8]) -> Self {
        debug_assert!(!bytes.is_empty(), "keys must be at least one byte");
        Self {
            bytes,
            fingerprint: fingerprint(bytes),
        }
    }

    /// Builds a lookup key from an already-computed fingerprint.
    pub fn with_fingerprint(bytes: &'a [u8], fingerprint: u64) -> Self {
        debug_assert!(!bytes.is_empty(), "keys must be at least one byte");
        Self { bytes, fingerprint }
    }

    /// The key bytes.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The precomputed 64-bit fingerprint.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}
