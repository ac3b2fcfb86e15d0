//! DISCLAIMER: This is a teaching implementation of RSA signatures in pure Rust.
//! It is *EXCLUSIVELY* for demonstration and educational purposes.
//! Absolutely DO NOT use it for real cryptographic or security-sensitive operations.
//! It is not audited, not vetted, and very likely insecure in practice.
//!
//! Signatures are "full-domain hash" RSA: the message is hashed to one byte less
//! than the modulus and the digest is exponentiated directly. Keys are stored in
//! the lab's two-line text format:
//!
//! ```text
//! #RSA Public key (512 bits):
//! N = 0x...
//! e = 0x...
//! ```

use std::fs;
use std::path::Path;

use num_bigint_dig::{BigInt, BigUint, RandPrime, Sign, ToBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};

use super::bignum::{from_hex, to_hex};
use super::digest::digest_below;
use super::seeded_rng;
use crate::error::{Error, Result};

/// Smallest modulus we agree to generate. The full-domain digest needs room.
pub const MIN_KEY_BITS: usize = 128;

/// Structure for an RSA public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    pub n: BigUint,
    pub e: BigUint,
}

/// Structure for an RSA secret key, as stored in a `*_sec.txt` file.
/// DO NOT use this for real cryptographic operations.
#[derive(Clone, PartialEq, Eq)]
pub struct RsaPrivateKey {
    pub n: BigUint,
    pub d: BigUint,
}

// The secret exponent stays out of logs.
impl std::fmt::Debug for RsaPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaPrivateKey")
            .field("n", &self.n)
            .field("d", &"<redacted>")
            .finish()
    }
}

/// RSA KeyPair holds both public and private keys.
#[derive(Debug, Clone)]
pub struct RsaKeyPair {
    pub public_key: RsaPublicKey,
    pub private_key: RsaPrivateKey,
}

/// Configuration for RSA key generation (toy parameters).
pub struct RsaKeyGenConfig {
    /// Key size in bits (e.g. 512, 1024).
    pub key_size: usize,
    /// Public exponent. 65537 unless you are playing with small-exponent attacks.
    pub public_exponent: u64,
    /// Optional RNG seed for reproducibility.
    pub seed: Option<u64>,
}

impl Default for RsaKeyGenConfig {
    fn default() -> Self {
        RsaKeyGenConfig {
            key_size: 1024,
            public_exponent: 65537,
            seed: None,
        }
    }
}

impl RsaKeyPair {
    /// Generate an RSA key pair with the given (TOY) configuration.
    pub fn generate(config: &RsaKeyGenConfig) -> Result<Self> {
        if config.key_size < MIN_KEY_BITS {
            return Err(Error::crypto(format!(
                "RSA key size {} is below the minimum of {} bits",
                config.key_size, MIN_KEY_BITS
            )));
        }
        if config.public_exponent < 3 || config.public_exponent % 2 == 0 {
            return Err(Error::crypto(format!(
                "public exponent {} must be odd and at least 3",
                config.public_exponent
            )));
        }

        let mut rng = seeded_rng(config.seed);
        let prime_bits = config.key_size / 2;
        let e = BigUint::from(config.public_exponent);

        // Keep generating primes until e is invertible modulo phi(n).
        let (p, q, d) = loop {
            let p: BigUint = rng.gen_prime(prime_bits);
            let q: BigUint = rng.gen_prime(prime_bits);
            if p == q {
                continue;
            }

            let phi = (&p - BigUint::one()) * (&q - BigUint::one());
            if let Some(d) = mod_inverse(&e, &phi) {
                break (p, q, d);
            }
        };

        let n = &p * &q;
        log::debug!("generated {}-bit RSA modulus", n.bits());

        Ok(RsaKeyPair {
            public_key: RsaPublicKey { n: n.clone(), e },
            private_key: RsaPrivateKey { n, d },
        })
    }

    /// Write `<prefix>_pub.txt` and `<prefix>_sec.txt`.
    pub fn save(&self, prefix: &str) -> Result<()> {
        self.public_key.save(format!("{}_pub.txt", prefix))?;
        self.private_key.save(format!("{}_sec.txt", prefix))
    }
}

/// signature = H(msg)^d mod n
pub fn rsa_sign(private_key: &RsaPrivateKey, msg: &[u8]) -> BigUint {
    let digest = digest_below(msg, &private_key.n);
    digest.modpow(&private_key.d, &private_key.n)
}

/// Accepts iff `signature < n` and `signature^e mod n == H(msg)`.
pub fn rsa_verify(public_key: &RsaPublicKey, msg: &[u8], signature: &BigUint) -> bool {
    if public_key.n.is_zero() || signature >= &public_key.n {
        return false;
    }
    let expected = digest_below(msg, &public_key.n);
    signature.modpow(&public_key.e, &public_key.n) == expected
}

impl RsaPublicKey {
    pub fn to_key_file(&self) -> String {
        format!(
            "#RSA Public key ({} bits):\nN = {}\ne = {}\n",
            self.n.bits(),
            to_hex(&self.n),
            to_hex(&self.e)
        )
    }

    pub fn from_key_file(text: &str) -> Result<Self> {
        let (n, e) = parse_key_file(text, "e")?;
        Ok(RsaPublicKey { n, e })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_key_file(&fs::read_to_string(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_key_file())?;
        Ok(())
    }
}

impl RsaPrivateKey {
    pub fn to_key_file(&self) -> String {
        format!(
            "#RSA Secret key ({} bits):\nN = {}\nd = {}\n",
            self.n.bits(),
            to_hex(&self.n),
            to_hex(&self.d)
        )
    }

    pub fn from_key_file(text: &str) -> Result<Self> {
        let (n, d) = parse_key_file(text, "d")?;
        Ok(RsaPrivateKey { n, d })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_key_file(&fs::read_to_string(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_key_file())?;
        Ok(())
    }
}

/// Header comment, `N = <hex>`, then `<exponent_tag> = <hex>`.
fn parse_key_file(text: &str, exponent_tag: &str) -> Result<(BigUint, BigUint)> {
    let mut lines = text.lines();

    match lines.next() {
        Some(header) if header.starts_with('#') => {}
        _ => return Err(Error::parse("key file must start with a '#' header line")),
    }

    let n = key_line(lines.next(), "N")?;
    let exponent = key_line(lines.next(), exponent_tag)?;
    if n.is_zero() {
        return Err(Error::parse("key file has a zero modulus"));
    }
    Ok((n, exponent))
}

fn key_line(line: Option<&str>, tag: &str) -> Result<BigUint> {
    let prefix = format!("{} = ", tag);
    let value = line
        .and_then(|l| l.strip_prefix(prefix.as_str()))
        .ok_or_else(|| Error::parse(format!("missing '{}' line in key file", prefix.trim_end())))?;
    from_hex(value).ok_or_else(|| Error::parse(format!("malformed hex for '{}' in key file", tag)))
}

/// Finds the modular inverse of `a` modulo `m` using the Extended Euclidean Algorithm.
/// Returns `Some(x)` where x satisfies (a*x) mod m = 1, or `None` if no inverse exists.
fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    let a_int = a.to_bigint()?;
    let m_int = m.to_bigint()?;
    let (g, x, _) = extended_gcd(&a_int, &m_int);
    if !g.is_one() {
        return None;
    }
    // Make sure we return a value in [0, m-1]
    let mut result = x % &m_int;
    if result.sign() == Sign::Minus {
        result += &m_int;
    }
    result.to_biguint()
}

/// Extended Euclidean Algorithm in BigInts.
/// Returns (gcd(a, b), x, y) such that a*x + b*y = gcd(a,b).
fn extended_gcd(a: &BigInt, b: &BigInt) -> (BigInt, BigInt, BigInt) {
    if b.is_zero() {
        (a.clone(), BigInt::one(), BigInt::zero())
    } else {
        let (q, r) = a.div_rem(b);
        let (g, x, y) = extended_gcd(b, &r);
        (g, y.clone(), x - &q * y)
    }
}
