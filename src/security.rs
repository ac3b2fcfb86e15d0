pub mod bignum;
pub mod cipher;
pub mod diffie_hellman;
pub mod digest;
pub mod rsa;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

// Re-export RSA functionality
pub use rsa::{rsa_sign, rsa_verify, RsaKeyGenConfig, RsaKeyPair, RsaPrivateKey, RsaPublicKey};

// Re-export Diffie-Hellman functionality
pub use diffie_hellman::{derive_symmetric_key, init_exponent, EphemeralKey, GroupParams};

// Re-export the authenticated cipher
pub use cipher::{SessionKey, SESSION_KEY_SIZE};

/// The RNG every randomized operation in the crate runs on.
pub type SessionRng = ChaCha20Rng;

/// A ChaCha20 stream: reproducible when seeded, entropy-backed otherwise.
pub fn seeded_rng(seed: Option<u64>) -> SessionRng {
    match seed {
        Some(s) => ChaCha20Rng::seed_from_u64(s),
        None => ChaCha20Rng::from_entropy(),
    }
}
