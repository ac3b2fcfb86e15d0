use std::path::Path;
use std::time::Duration;

use log::debug;

use crate::certificate::Certificate;
use crate::error::{Error, Result};
use crate::security::{GroupParams, RsaPrivateKey, RsaPublicKey};

/// How long to wait for each expected peer message.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the initiator waits for CONNECT4.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a server keeps an idle, unfinished handshake.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Long-term identity and parameters of one protocol party.
///
/// Built once at start-up and shared read-only (usually through an `Arc`) by
/// every handshake the party runs.
#[derive(Debug, Clone)]
pub struct PartyConfig {
    /// Our own certificate, sent to the peer.
    pub certificate: Certificate,
    /// Secret half of the key the certificate binds.
    pub secret_key: RsaPrivateKey,
    /// Public key of the issuing authority, used to check the peer certificate.
    pub authority_key: RsaPublicKey,
    pub group: GroupParams,
    pub response_timeout: Duration,
    /// `None` waits for the confirmation forever.
    pub confirm_timeout: Option<Duration>,
}

impl PartyConfig {
    /// Pair a certificate with its secret key. The moduli must match.
    pub fn new(
        certificate: Certificate,
        secret_key: RsaPrivateKey,
        authority_key: RsaPublicKey,
    ) -> Result<Self> {
        if certificate.public_key().n != secret_key.n {
            return Err(Error::crypto(format!(
                "certificate for {:?} does not match the secret key",
                certificate.subject()
            )));
        }
        Ok(PartyConfig {
            certificate,
            secret_key,
            authority_key,
            group: GroupParams::default(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            confirm_timeout: Some(DEFAULT_CONFIRM_TIMEOUT),
        })
    }

    /// Load `<certificate> <secret key> <authority public key>` from files.
    pub fn load(
        certificate: impl AsRef<Path>,
        secret_key: impl AsRef<Path>,
        authority_key: impl AsRef<Path>,
    ) -> Result<Self> {
        let cert = Certificate::load(certificate)?;
        let sk = RsaPrivateKey::load(secret_key)?;
        let authority = RsaPublicKey::load(authority_key)?;
        debug!("loaded identity {:?} issued by {:?}", cert.subject(), cert.issuer());
        Self::new(cert, sk, authority)
    }

    pub fn with_group(mut self, group: GroupParams) -> Self {
        self.group = group;
        self
    }

    pub fn with_timeouts(mut self, response: Duration, confirm: Option<Duration>) -> Self {
        self.response_timeout = response;
        self.confirm_timeout = confirm;
        self
    }

    /// Subject name of our own certificate.
    pub fn name(&self) -> &str {
        self.certificate.subject()
    }
}
