//! Authenticated symmetric encryption with the 128-bit session key.
//!
//! Sealed messages are `nonce || ciphertext || tag` (AES-128-GCM), and travel
//! base64-encoded inside protocol messages.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Symmetric key length in bytes (AES-128).
pub const SESSION_KEY_SIZE: usize = 16;

/// AES-GCM nonce length in bytes.
pub const NONCE_SIZE: usize = 12;

/// A symmetric key derived from a Diffie-Hellman shared secret.
///
/// The bytes are wiped on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    pub fn from_bytes(bytes: [u8; SESSION_KEY_SIZE]) -> Self {
        SessionKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> Result<Aes128Gcm> {
        Aes128Gcm::new_from_slice(&self.0)
            .map_err(|e| Error::crypto(format!("cannot key AES-128-GCM: {}", e)))
    }

    /// Encrypt and authenticate `plaintext` under a fresh random nonce.
    pub fn seal<R: RngCore + CryptoRng + ?Sized>(
        &self,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| Error::crypto(format!("encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Check the tag and decrypt. Fails on truncation, tampering or a wrong key.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_SIZE {
            return Err(Error::crypto("sealed message shorter than its nonce"));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| Error::crypto("authenticated decryption failed"))
    }

    /// [`seal`](Self::seal) followed by base64.
    pub fn seal_base64<R: RngCore + CryptoRng + ?Sized>(
        &self,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<String> {
        Ok(STANDARD.encode(self.seal(plaintext, rng)?))
    }

    /// base64 decoding followed by [`open`](Self::open).
    pub fn open_base64(&self, encoded: &str) -> Result<Vec<u8>> {
        let sealed = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::parse(format!("invalid base64: {}", e)))?;
        self.open(&sealed)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}
