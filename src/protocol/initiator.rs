//! The side that opens the exchange ("Alice").
//!
//! ```text
//! Start --CONNECT1--> AwaitResponse --(y, gb, CB)--> AwaitConfirm --CONNECT4--> Established
//!                          |                             |
//!                          +------------ Aborted <-------+
//! ```

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use num_bigint_dig::BigUint;
use rand::{CryptoRng, RngCore};

use super::config::PartyConfig;
use super::message::{SessionId, Step, StsMessage, CONFIRMATION};
use super::session::{EstablishedSession, Role};
use super::{check_peer_certificate, decode_sealed, open_signature, seal_signature, Advance};
use crate::error::HandshakeError;
use crate::security::{derive_symmetric_key, rsa_sign, EphemeralKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiatorState {
    /// Nothing sent yet.
    Start,
    /// CONNECT1 sent; collecting the sealed signature, `gb` and `CB`, in order.
    AwaitResponse,
    /// CONNECT3 sent; waiting for the sealed confirmation.
    AwaitConfirm,
    Established,
    Aborted(HandshakeError),
}

pub struct Initiator {
    config: Arc<PartyConfig>,
    session: SessionId,
    expected_peer: Option<String>,
    ephemeral: EphemeralKey,
    state: InitiatorState,
    sealed_signature: Option<Vec<u8>>,
    peer_value: Option<BigUint>,
    /// Fully verified session, released once the peer confirms.
    pending: Option<EstablishedSession>,
}

impl Initiator {
    /// A fresh handshake under a random session id.
    ///
    /// With `expected_peer` set, a responder certificate issued to any other
    /// subject aborts with [`HandshakeError::IdentityMismatch`].
    pub fn new<R: RngCore + CryptoRng + ?Sized>(
        config: Arc<PartyConfig>,
        expected_peer: Option<String>,
        rng: &mut R,
    ) -> Self {
        let session = SessionId::random(rng);
        Self::with_session(config, session, expected_peer, rng)
    }

    /// Like [`new`](Self::new) but under a session id the caller already
    /// announced to the peer.
    pub fn with_session<R: RngCore + CryptoRng + ?Sized>(
        config: Arc<PartyConfig>,
        session: SessionId,
        expected_peer: Option<String>,
        rng: &mut R,
    ) -> Self {
        let ephemeral = EphemeralKey::generate(&config.group, rng);
        Initiator {
            config,
            session,
            expected_peer,
            ephemeral,
            state: InitiatorState::Start,
            sealed_signature: None,
            peer_value: None,
            pending: None,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn state(&self) -> &InitiatorState {
        &self.state
    }

    /// Move to `AwaitResponse` and produce CONNECT1.
    pub fn start(&mut self) -> Result<StsMessage, HandshakeError> {
        match &self.state {
            InitiatorState::Start => {}
            InitiatorState::Aborted(reason) => return Err(reason.clone()),
            other => {
                return Err(HandshakeError::malformed(format!(
                    "start called in state {:?}",
                    other
                )))
            }
        }
        debug!("[{}] sending CONNECT1", self.session);
        self.state = InitiatorState::AwaitResponse;
        Ok(StsMessage::dh_value(
            Step::Connect1,
            self.session,
            self.ephemeral.public_value(),
        ))
    }

    /// Feed one inbound message. Any error leaves the machine `Aborted` with
    /// that reason.
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
            InitiatorState::AwaitResponse => self.on_response(message, rng),
            InitiatorState::AwaitConfirm => self.on_confirm(message),
            InitiatorState::Aborted(ref reason) => return Err(reason.clone()),
            InitiatorState::Established => {
                debug!("[{}] already established, ignoring {:?}", self.session, message.step);
                return Ok(Advance::default());
            }
            InitiatorState::Start => Err(HandshakeError::malformed("message before CONNECT1")),
        };

        if let Err(reason) = &result {
            self.abort(reason.clone());
        }
        result
    }

    /// Decode a raw transport message and [`handle`](Self::handle) it. Text that
    /// is not a well-formed STS message aborts the handshake.
    pub fn handle_text<R: RngCore + CryptoRng + ?Sized>(
        &mut self,
        text: &str,
        rng: &mut R,
    ) -> Result<Advance, HandshakeError> {
        match StsMessage::decode(text) {
            Ok(message) => self.handle(&message, rng),
            Err(reason) => {
                if let InitiatorState::Aborted(earlier) = &self.state {
                    return Err(earlier.clone());
                }
                self.abort(reason.clone());
                Err(reason)
            }
        }
    }

    /// How long the driver should wait for the next message in this state.
    pub fn next_timeout(&self) -> Option<Duration> {
        match self.state {
            InitiatorState::AwaitConfirm => self.config.confirm_timeout,
            _ => Some(self.config.response_timeout),
        }
    }

    /// The bounded wait for the next message ran out.
    ///
    /// While collecting the response this is [`HandshakeError::Timeout`];
    /// while waiting for CONNECT4 it is [`HandshakeError::NoConfirmation`].
    pub fn timed_out(&mut self) -> HandshakeError {
        let reason = match &self.state {
            InitiatorState::AwaitConfirm => HandshakeError::NoConfirmation,
            InitiatorState::Aborted(reason) => return reason.clone(),
            _ => HandshakeError::Timeout,
        };
        self.abort(reason.clone());
        reason
    }

    fn abort(&mut self, reason: HandshakeError) {
        warn!("[{}] initiator aborted: {}", self.session, reason);
        self.pending = None;
        self.sealed_signature = None;
        self.peer_value = None;
        self.state = InitiatorState::Aborted(reason);
    }

    fn on_response<R: RngCore + CryptoRng + ?Sized>(
        &mut self,
        message: &StsMessage,
        rng: &mut R,
    ) -> Result<Advance, HandshakeError> {
        if message.step != Step::Connect2 {
            return Err(HandshakeError::malformed(format!(
                "expected CONNECT2, got {:?}",
                message.step
            )));
        }

        if self.sealed_signature.is_none() {
            self.sealed_signature = Some(decode_sealed(&message.payload)?);
            return Ok(Advance::default());
        }
        if self.peer_value.is_none() {
            let gb = message.parse_dh_value()?;
            self.config.group.check_peer_value(&gb)?;
            self.peer_value = Some(gb);
            return Ok(Advance::default());
        }

        let (Some(sealed), Some(gb)) = (self.sealed_signature.take(), self.peer_value.take())
        else {
            return Err(HandshakeError::malformed("response parts out of order"));
        };
        let peer = message.parse_certificate()?;
        let config = Arc::clone(&self.config);
        let group = &config.group;

        check_peer_certificate(&config, &peer, self.expected_peer.as_deref())?;

        let shared = self.ephemeral.agree(group, &gb)?;
        let key = derive_symmetric_key(&shared);
        let ga = self.ephemeral.public_value();

        open_signature(&key, &sealed, peer.public_key(), &group.transcript_bytes(&gb, ga))?;
        debug!("[{}] responder signature verified", self.session);

        let own_signature = rsa_sign(&config.secret_key, &group.transcript_bytes(ga, &gb));
        let outgoing = vec![
            StsMessage::new(
                Step::Connect3,
                self.session,
                seal_signature(&key, &own_signature, rng)?,
            ),
            StsMessage::certificate(Step::Connect3, self.session, &config.certificate),
        ];

        self.pending = Some(EstablishedSession::new(
            self.session,
            Role::Initiator,
            key,
            peer,
        ));
        self.state = InitiatorState::AwaitConfirm;
        Ok(Advance {
            outgoing,
            established: None,
        })
    }

    fn on_confirm(&mut self, message: &StsMessage) -> Result<Advance, HandshakeError> {
        if message.step != Step::Connect4 {
            return Err(HandshakeError::malformed(format!(
                "expected CONNECT4, got {:?}",
                message.step
            )));
        }
        let session = self.pending.take().ok_or(HandshakeError::NoConfirmation)?;
        match session.open(&message.payload) {
            Ok(plain) if plain == CONFIRMATION => {}
            _ => return Err(HandshakeError::NoConfirmation),
        }

        info!(
            "[{}] established with {:?}",
            self.session,
            session.peer_name()
        );
        self.state = InitiatorState::Established;
        Ok(Advance {
            outgoing: Vec::new(),
            established: Some(session),
        })
    }
}

impl std::fmt::Debug for Initiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initiator")
            .field("session", &self.session)
            .field("state", &self.state)
            .field("expected_peer", &self.expected_peer)
            .finish_non_exhaustive()
    }
}
