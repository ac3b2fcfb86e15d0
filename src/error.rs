//! Error types shared by every module of the crate.
//!
//! [`HandshakeError`] is the failure taxonomy of the key exchange itself. It is
//! kept apart from [`Error`] so callers of the protocol engine can match on the
//! exact abort reason without caring about I/O or parsing failures.

use thiserror::Error;

/// Why a handshake was abandoned.
///
/// The detail carried by these variants is for local diagnostics only and is
/// never sent back to the peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Wrong tag, truncated field, unparsable number or certificate, or a
    /// degenerate Diffie-Hellman value.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Peer certificate expired, not yet valid, or not signed by the authority.
    #[error("peer certificate is not valid")]
    InvalidPeerCertificate,

    /// The peer certificate is valid but was issued to someone else.
    #[error("identity mismatch: expected {expected:?}, certificate names {presented:?}")]
    IdentityMismatch { expected: String, presented: String },

    /// The transcript signature did not verify (or could not be decrypted).
    #[error("transcript signature mismatch")]
    SignatureMismatch,

    /// No protocol message arrived within the bound.
    #[error("timed out waiting for the peer")]
    Timeout,

    /// The final acknowledgment never arrived or did not decrypt to `OK`.
    #[error("peer never confirmed the handshake")]
    NoConfirmation,
}

impl HandshakeError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        HandshakeError::MalformedMessage(detail.into())
    }
}

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// A certificate, key file or wire envelope could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid input to a cryptographic primitive (bad key length, too small
    /// modulus, failed authenticated decryption, ...).
    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn parse(detail: impl Into<String>) -> Self {
        Error::Parse(detail.into())
    }

    pub(crate) fn crypto(detail: impl Into<String>) -> Self {
        Error::Crypto(detail.into())
    }

    pub(crate) fn transport(detail: impl Into<String>) -> Self {
        Error::Transport(detail.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
