use rand::{CryptoRng, RngCore};

use super::message::SessionId;
use crate::certificate::Certificate;
use crate::error::Result;
use crate::security::SessionKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// The outcome of a successful handshake.
///
/// Only ever built after the peer certificate and the peer transcript signature
/// both verified, so holding one means the key is authenticated.
#[derive(Debug, Clone)]
pub struct EstablishedSession {
    id: SessionId,
    role: Role,
    key: SessionKey,
    peer: Certificate,
}

impl EstablishedSession {
    pub(crate) fn new(id: SessionId, role: Role, key: SessionKey, peer: Certificate) -> Self {
        EstablishedSession {
            id,
            role,
            key,
            peer,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The authenticated peer certificate.
    pub fn peer(&self) -> &Certificate {
        &self.peer
    }

    pub fn peer_name(&self) -> &str {
        self.peer.subject()
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Encrypt an application message under the session key, base64 encoded.
    pub fn seal<R: RngCore + CryptoRng + ?Sized>(
        &self,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<String> {
        self.key.seal_base64(plaintext, rng)
    }

    pub fn open(&self, sealed: &str) -> Result<Vec<u8>> {
        self.key.open_base64(sealed)
    }
}
