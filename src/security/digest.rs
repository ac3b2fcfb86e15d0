//! Full-domain hashing on top of SHA-256.
//!
//! RSA signatures in this crate sign a digest that is as long as the modulus
//! allows, so the digest is stretched with a counter in the MGF1 manner.

use num_bigint_dig::BigUint;
use sha2::{Digest, Sha256};

/// Output size of the underlying SHA-256 compression, in bytes.
pub const SHA256_OUTPUT_SIZE: usize = 32;

/// Number of digest bytes to use with modulus `n`: one byte less than `n`
/// occupies, so the digest read as an integer is always smaller than `n`.
pub fn hash_length(n: &BigUint) -> usize {
    let bits = n.bits();
    if bits % 8 == 0 {
        bits / 8 - 1
    } else {
        bits / 8
    }
}

/// Stretch SHA-256 over `msg` to exactly `len` bytes.
///
/// Block `i` is `SHA256(msg || i)` with `i` a big-endian `u32`.
pub fn expand_digest(msg: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + SHA256_OUTPUT_SIZE);
    let mut counter: u32 = 0;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(msg);
        hasher.update(counter.to_be_bytes());
        out.extend_from_slice(&hasher.finalize());
        counter = counter.wrapping_add(1);
    }
    out.truncate(len);
    out
}

/// The digest of `msg` as an integer below `n`.
pub fn digest_below(msg: &[u8], n: &BigUint) -> BigUint {
    BigUint::from_bytes_be(&expand_digest(msg, hash_length(n)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_length_stays_below_modulus() {
        // 512-bit modulus: 63 bytes
        let n = BigUint::from(1u8) << 511usize;
        assert_eq!(hash_length(&n), 63);
        // 129 bits: 16 bytes
        let n = (BigUint::from(1u8) << 128usize) + BigUint::from(7u8);
        assert_eq!(hash_length(&n), 16);

        let h = digest_below(b"anything", &n);
        assert!(h < n);
    }

    #[test]
    fn test_expand_digest_prefix_is_sha256() {
        let long = expand_digest(b"abc", 80);
        assert_eq!(long.len(), 80);

        let mut hasher = Sha256::new();
        hasher.update(b"abc");
        hasher.update(0u32.to_be_bytes());
        assert_eq!(&long[..32], hasher.finalize().as_slice());

        // Shorter outputs are prefixes of longer ones.
        assert_eq!(expand_digest(b"abc", 40), long[..40].to_vec());
        assert_ne!(expand_digest(b"abd", 40), long[..40].to_vec());
    }
}
