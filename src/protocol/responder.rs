//! The side that answers ("Bob").
//!
//! A responder is created from the CONNECT1 it answers; it then collects the
//! initiator's sealed signature and certificate and, only if both check out,
//! sends the sealed confirmation. Every failure is silent towards the peer.

use std::sync::Arc;

use log::{debug, info, warn};
use num_bigint_dig::BigUint;
use rand::{CryptoRng, RngCore};

use super::config::PartyConfig;
use super::message::{SessionId, Step, StsMessage, CONFIRMATION};
use super::session::{EstablishedSession, Role};
use super::{check_peer_certificate, decode_sealed, open_signature, seal_signature, Advance};
use crate::error::HandshakeError;
use crate::security::{derive_symmetric_key, rsa_sign, EphemeralKey, SessionKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderState {
    /// CONNECT2 sent; collecting the sealed signature then `CA`.
    AwaitFinish,
    Established,
    Aborted(HandshakeError),
}

pub struct Responder {
    config: Arc<PartyConfig>,
    session: SessionId,
    expected_peer: Option<String>,
    state: ResponderState,
    /// `g^a` as received in CONNECT1.
    initiator_value: BigUint,
    /// Our own `g^b`; the exponent is dropped once the key is derived.
    own_value: BigUint,
    key: Option<SessionKey>,
    sealed_signature: Option<Vec<u8>>,
}

impl Responder {
    /// Answer a CONNECT1: returns the responder and the three CONNECT2 parts
    /// (sealed signature, `gb`, certificate) to send in that order.
    pub fn accept<R: RngCore + CryptoRng + ?Sized>(
        config: Arc<PartyConfig>,
        connect1: &StsMessage,
        expected_peer: Option<String>,
        rng: &mut R,
    ) -> Result<(Self, Vec<StsMessage>), HandshakeError> {
        if connect1.step != Step::Connect1 {
            return Err(HandshakeError::malformed(format!(
                "expected CONNECT1, got {:?}",
                connect1.step
            )));
        }
        let session = connect1.session;
        let ga = connect1.parse_dh_value()?;

        let group = &config.group;
        let ephemeral = EphemeralKey::generate(group, rng);
        let shared = ephemeral.agree(group, &ga)?;
        let key = derive_symmetric_key(&shared);
        let gb = ephemeral.public_value().clone();

        let signature = rsa_sign(&config.secret_key, &group.transcript_bytes(&gb, &ga));
        let outgoing = vec![
            StsMessage::new(Step::Connect2, session, seal_signature(&key, &signature, rng)?),
            StsMessage::dh_value(Step::Connect2, session, &gb),
            StsMessage::certificate(Step::Connect2, session, &config.certificate),
        ];
        debug!("[{}] answering CONNECT1", session);

        let responder = Responder {
            config,
            session,
            expected_peer,
            state: ResponderState::AwaitFinish,
            initiator_value: ga,
            own_value: gb,
            key: Some(key),
            sealed_signature: None,
        };
        Ok((responder, outgoing))
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn state(&self) -> &ResponderState {
        &self.state
    }

    /// Feed one CONNECT3 part. On success the outgoing list holds CONNECT4 and
    /// `established` is set; on failure nothing is ever sent.
    pub fn handle<R: RngCore + CryptoRng + ?Sized>(
        &mut self,
        message: &StsMessage,
        rng: &mut R,
    ) -> Result<Advance, HandshakeError> {
        if message.session != self.session {
            debug!(
                "[{}] ignoring message for session {}",
                self.session, message.session
            );
            return Ok(Advance::default());
        }

        let result = match self.state {
            ResponderState::AwaitFinish => self.on_finish(message, rng),
            ResponderState::Aborted(ref reason) => return Err(reason.clone()),
            ResponderState::Established => {
                debug!("[{}] already established, ignoring {:?}", self.session, message.step);
                return Ok(Advance::default());
            }
        };

        if let Err(reason) = &result {
            self.abort(reason.clone());
        }
        result
    }

    /// The initiator went quiet.
    pub fn timed_out(&mut self) -> HandshakeError {
        if let ResponderState::Aborted(reason) = &self.state {
            return reason.clone();
        }
        self.abort(HandshakeError::Timeout);
        HandshakeError::Timeout
    }

    fn abort(&mut self, reason: HandshakeError) {
        warn!("[{}] responder aborted: {}", self.session, reason);
        self.key = None;
        self.sealed_signature = None;
        self.state = ResponderState::Aborted(reason);
    }

    fn on_finish<R: RngCore + CryptoRng + ?Sized>(
        &mut self,
        message: &StsMessage,
        rng: &mut R,
    ) -> Result<Advance, HandshakeError> {
        if message.step != Step::Connect3 {
            return Err(HandshakeError::malformed(format!(
                "expected CONNECT3, got {:?}",
                message.step
            )));
        }

        let Some(sealed) = self.sealed_signature.take() else {
            self.sealed_signature = Some(decode_sealed(&message.payload)?);
            return Ok(Advance::default());
        };

        let peer = message.parse_certificate()?;
        check_peer_certificate(&self.config, &peer, self.expected_peer.as_deref())?;

        let key = self
            .key
            .take()
            .ok_or_else(|| HandshakeError::malformed("session key already consumed"))?;
        let transcript = self
            .config
            .group
            .transcript_bytes(&self.initiator_value, &self.own_value);
        open_signature(&key, &sealed, peer.public_key(), &transcript)?;

        let confirmation = key
            .seal_base64(CONFIRMATION, rng)
            .map_err(|e| HandshakeError::malformed(format!("cannot seal confirmation: {}", e)))?;

        info!("[{}] established with {:?}", self.session, peer.subject());
        self.state = ResponderState::Established;
        Ok(Advance {
            outgoing: vec![StsMessage::new(Step::Connect4, self.session, confirmation)],
            established: Some(EstablishedSession::new(
                self.session,
                Role::Responder,
                key,
                peer,
            )),
        })
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("session", &self.session)
            .field("state", &self.state)
            .field("expected_peer", &self.expected_peer)
            .finish_non_exhaustive()
    }
}
