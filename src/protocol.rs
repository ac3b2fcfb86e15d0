//! Station-to-Station handshake engine.
//!
//! [`Initiator`] and [`Responder`] are sans-IO state machines: they consume one
//! [`StsMessage`] at a time and hand back the messages to send, so every
//! suspension point lives in whatever drives them (see [`crate::client`] and
//! [`crate::server`]).

pub mod config;
pub mod initiator;
pub mod message;
pub mod responder;
pub mod session;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use num_bigint_dig::BigUint;
use rand::{CryptoRng, RngCore};

use crate::certificate::Certificate;
use crate::error::HandshakeError;
use crate::security::{rsa_verify, RsaPublicKey, SessionKey};

pub use config::PartyConfig;
pub use initiator::{Initiator, InitiatorState};
pub use message::{SessionId, Step, StsMessage};
pub use responder::{Responder, ResponderState};
pub use session::{EstablishedSession, Role};

/// What one step of a state machine produced.
#[derive(Debug, Default)]
pub struct Advance {
    /// Messages to send, in order.
    pub outgoing: Vec<StsMessage>,
    /// Set exactly once, on the step that completes the handshake.
    pub established: Option<EstablishedSession>,
}

/// Certificate validity first, then the optional pinned identity.
pub(crate) fn check_peer_certificate(
    config: &PartyConfig,
    peer: &Certificate,
    expected_peer: Option<&str>,
) -> Result<(), HandshakeError> {
    if !peer.is_valid_at(&config.authority_key, Utc::now().timestamp()) {
        return Err(HandshakeError::InvalidPeerCertificate);
    }
    if let Some(expected) = expected_peer {
        if peer.subject() != expected {
            return Err(HandshakeError::IdentityMismatch {
                expected: expected.to_string(),
                presented: peer.subject().to_string(),
            });
        }
    }
    Ok(())
}

pub(crate) fn decode_sealed(payload: &str) -> Result<Vec<u8>, HandshakeError> {
    STANDARD
        .decode(payload.trim())
        .map_err(|_| HandshakeError::malformed("sealed signature is not base64"))
}

pub(crate) fn seal_signature<R: RngCore + CryptoRng + ?Sized>(
    key: &SessionKey,
    signature: &BigUint,
    rng: &mut R,
) -> Result<String, HandshakeError> {
    key.seal_base64(&signature.to_bytes_be(), rng)
        .map_err(|e| HandshakeError::malformed(format!("cannot seal signature: {}", e)))
}

/// Decrypt the peer's sealed transcript signature and check it.
///
/// A wrong key (the peer saw different DH values) fails the decryption; that is
/// reported the same as a bad signature.
pub(crate) fn open_signature(
    key: &SessionKey,
    sealed: &[u8],
    signer: &RsaPublicKey,
    transcript: &[u8],
) -> Result<(), HandshakeError> {
    let plain = key
        .open(sealed)
        .map_err(|_| HandshakeError::SignatureMismatch)?;
    let signature = BigUint::from_bytes_be(&plain);
    if rsa_verify(signer, transcript, &signature) {
        Ok(())
    } else {
        Err(HandshakeError::SignatureMismatch)
    }
}
