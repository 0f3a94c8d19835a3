//! Deterministic hashing of attribute values into PRNG seeds.
//!
//! Codeword generation needs a seed that depends only on the attribute
//! value's bytes, not on iteration order or process state, so that the
//! same value always produces the same codeword. `fnv::FnvHasher` gives
//! a fast, non-randomized (no per-process seed) hash well suited to
//! that role.

use std::hash::Hasher;

use fnv::FnvHasher;

/// Hashes `attr`'s bytes into a 64-bit seed for [`crate::codeword::codeword`].
pub fn hash_attr(attr: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(attr.as_bytes());
    hasher.finish()
}
