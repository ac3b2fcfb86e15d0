//! DISCLAIMER: This is a teaching implementation of finite-field Diffie-Hellman in pure Rust.
//! It is *EXCLUSIVELY* for demonstration and educational purposes.
//! Absolutely DO NOT use it for real cryptographic or security-sensitive operations.
//!
//! Besides the raw exchange this module holds the two helpers the
//! Station-to-Station protocol builds on: the derivation of a symmetric key from
//! the shared secret, and the fixed-width transcript binding both parties sign.

use num_bigint_dig::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};

use super::bignum::{from_hex, to_fixed_bytes};
use super::cipher::{SessionKey, SESSION_KEY_SIZE};
use crate::error::HandshakeError;

/// 2^127 + 29, the modulus the lab channel was built on.
const LAB_128_PRIME: &str = "0x8000000000000000000000000000001D";

/// A 512-bit safe prime p = 2q + 1 with p = 3 (mod 8), so 2 generates the
/// whole multiplicative group.
const SAFE_PRIME_512: &str = "0xa31224c6684198022ad27ece24351a597673a5997b07fd9f1aedb14231aa960b\
2ad4a12fcb51ed85c88e8488921e58469c82a2c227b94c760e1b681add07ffa3";

/// `DiffieHellmanParams` in the toy library: a prime modulus `p` and generator `g`.
///
/// Process-wide constants, shared read-only by every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupParams {
    /// A large prime modulus.
    pub p: BigUint,
    /// A generator base.
    pub g: BigUint,
}

impl GroupParams {
    /// The 128-bit group the lab channel used. Fast, and far too small.
    pub fn lab_128() -> Self {
        Self::from_constants(LAB_128_PRIME)
    }

    /// The 512-bit safe-prime group with generator 2.
    pub fn safe_prime_512() -> Self {
        Self::from_constants(SAFE_PRIME_512)
    }

    fn from_constants(p_hex: &str) -> Self {
        GroupParams {
            // The constants above are valid hex; an empty modulus would only
            // make every peer value fail the range check.
            p: from_hex(p_hex).unwrap_or_else(BigUint::zero),
            g: BigUint::from(2u8),
        }
    }

    /// Bit length of `p`; also the width of each half of a transcript binding.
    pub fn bits(&self) -> usize {
        self.p.bits()
    }

    /// Default exponent size: one bit less than `p`.
    pub fn exponent_bits(&self) -> usize {
        self.bits().saturating_sub(1).max(2)
    }

    /// g^exponent mod p
    pub fn dh_value(&self, exponent: &BigUint) -> BigUint {
        self.g.modpow(exponent, &self.p)
    }

    /// peer_value^own_exponent mod p
    ///
    /// No checks here; run [`check_peer_value`](Self::check_peer_value) on
    /// anything that came off the wire first.
    pub fn shared_secret(&self, own_exponent: &BigUint, peer_value: &BigUint) -> BigUint {
        peer_value.modpow(own_exponent, &self.p)
    }

    /// Reject peer values outside `[2, p-2]`.
    ///
    /// `0`, `1` and `p-1` collapse the shared secret to a known constant, and
    /// anything `>= p` is not a group element at all.
    pub fn check_peer_value(&self, value: &BigUint) -> Result<(), HandshakeError> {
        let two = BigUint::from(2u8);
        if self.p <= BigUint::from(3u8) {
            return Err(HandshakeError::malformed("group modulus is too small"));
        }
        let upper = &self.p - &two;
        if value < &two || value > &upper {
            return Err(HandshakeError::malformed(
                "Diffie-Hellman value outside [2, p-2]",
            ));
        }
        Ok(())
    }

    /// Concatenate `first || second`, each on exactly `bits(p)` bits.
    ///
    /// Fixed width rather than length-prefixed: both halves are reduced mod p,
    /// so the boundary is always at the same place.
    pub fn bind(&self, first: &BigUint, second: &BigUint) -> BigUint {
        (first << self.bits()) + second
    }

    /// Big-endian bytes of [`bind`](Self::bind) at a fixed `ceil(2*bits(p)/8)`
    /// width. This is the message that gets signed.
    pub fn transcript_bytes(&self, first: &BigUint, second: &BigUint) -> Vec<u8> {
        let width = (2 * self.bits() + 7) / 8;
        let bound = self.bind(first, second);
        // Inputs that overflow the width were never reduced; sign them as-is.
        to_fixed_bytes(&bound, width).unwrap_or_else(|| bound.to_bytes_be())
    }
}

impl Default for GroupParams {
    fn default() -> Self {
        GroupParams::safe_prime_512()
    }
}

/// Draw a random exponent of at most `security_bits` bits, re-sampling until it
/// is greater than 1.
pub fn init_exponent<R: RngCore + CryptoRng + ?Sized>(
    rng: &mut R,
    security_bits: usize,
) -> BigUint {
    let bits = security_bits.max(2);
    loop {
        let a = rng.gen_biguint(bits);
        if a > BigUint::one() {
            return a;
        }
    }
}

/// Serialize the shared secret big-endian and keep the first 16 bytes,
/// zero-padding on the right when the secret is shorter.
///
/// Both parties compute the same `g^(ab) mod p`, so both derive the same key.
pub fn derive_symmetric_key(shared_secret: &BigUint) -> SessionKey {
    let bytes = shared_secret.to_bytes_be();
    let mut key = [0u8; SESSION_KEY_SIZE];
    let take = bytes.len().min(SESSION_KEY_SIZE);
    key[..take].copy_from_slice(&bytes[..take]);
    SessionKey::from_bytes(key)
}

/// One side's ephemeral contribution to an exchange: the secret exponent and
/// the public value `g^exponent mod p`.
pub struct EphemeralKey {
    exponent: BigUint,
    public_value: BigUint,
}

impl EphemeralKey {
    pub fn generate<R: RngCore + CryptoRng + ?Sized>(group: &GroupParams, rng: &mut R) -> Self {
        let exponent = init_exponent(rng, group.exponent_bits());
        let public_value = group.dh_value(&exponent);
        EphemeralKey {
            exponent,
            public_value,
        }
    }

    pub fn public_value(&self) -> &BigUint {
        &self.public_value
    }

    /// Range-check the peer value, then derive the shared secret.
    pub fn agree(
        &self,
        group: &GroupParams,
        peer_value: &BigUint,
    ) -> Result<BigUint, HandshakeError> {
        group.check_peer_value(peer_value)?;
        Ok(group.shared_secret(&self.exponent, peer_value))
    }
}

impl std::fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKey")
            .field("public_value", &self.public_value)
            .finish_non_exhaustive()
    }
}
