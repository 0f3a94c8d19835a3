//! Codeword generation: a per-attribute-value bit pattern that gets
//! OR'd (simc) or banded-and-OR'd (catc) into a tuple's signature.

use rand_core::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::bits::BitString;
use crate::hash::hash_attr;
use crate::tuple::WILDCARD;

/// Builds an `m`-bit codeword with `k` bits set, scattered over the low
/// `u` bits (`u <= m`). The value's hash seeds a private PRNG, so the
/// same attribute value always yields the same codeword and concurrent
/// callers never share mutable RNG state. An unknown/wildcard value
/// produces an all-zero codeword: it must not narrow a query down.
pub fn codeword(attr: &str, u: usize, k: usize, m: usize) -> BitString {
    assert!(u <= m, "codeword band width {u} exceeds signature length {m}");
    let mut b = BitString::new(m);
    if attr == WILDCARD {
        return b;
    }

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(hash_attr(attr));
    let mut nbits = 0;
    while nbits < k {
        let i = (rng.next_u32() as usize) % u;
        if !b.get(i) {
            b.set(i);
            nbits += 1;
        }
    }
    b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sets_exactly_k_bits() {
        let b = codeword("waterloo", 32, 5, 32);
        let count = (0..32).filter(|&i| b.get(i)).count();
        assert_eq!(count, 5);
    }

    #[test]
    fn bits_stay_within_band() {
        let b = codeword("kitchener", 10, 4, 32);
        for i in 10..32 {
            assert!(!b.get(i));
        }
    }

    #[test]
    fn same_value_produces_same_codeword() {
        let a = codeword("guelph", 16, 3, 16);
        let b = codeword("guelph", 16, 3, 16);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn wildcard_is_all_zero() {
        let b = codeword(WILDCARD, 16, 3, 16);
        assert!((0..16).all(|i| !b.get(i)));
    }

    #[test]
    fn k_greater_than_u_still_terminates() {
        let b = codeword("cambridge", 4, 4, 8);
        let count = (0..4).filter(|&i| b.get(i)).count();
        assert_eq!(count, 4);
    }
}
