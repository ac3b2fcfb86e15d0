//! Station-to-Station (STS) key exchange: ephemeral Diffie-Hellman whose values
//! are bound to long-term identities through certificate-backed signatures.
//!
//! Layers, leaves first:
//!
//! - [`security`]: RSA signatures, Diffie-Hellman, AES-GCM session keys.
//! - [`certificate`]: identity certificates issued by an authority.
//! - [`transport`]: best-effort text messages between endpoints.
//! - [`protocol`]: the handshake state machines.
//! - [`client`] / [`server`]: blocking drivers and the lab demo modes.
//!
//! DISCLAIMER: teaching code. Do not protect anything real with it.

pub mod certificate;
pub mod client;
pub mod demo;
pub mod error;
pub mod protocol;
pub mod security;
pub mod server;
pub mod transport;

pub use certificate::Certificate;
pub use error::{Error, HandshakeError, Result};
pub use protocol::{EstablishedSession, Initiator, PartyConfig, Responder};
