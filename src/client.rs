//! Blocking client: drives an [`Initiator`] over a [`Transport`] and runs the
//! lab demo modes against a server.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::demo::{self, parse_tagged, tagged};
use crate::error::{Error, HandshakeError, Result};
use crate::protocol::config::DEFAULT_RESPONSE_TIMEOUT;
use crate::protocol::message::is_sts;
use crate::protocol::{EstablishedSession, Initiator, PartyConfig, SessionId};
use crate::security::bignum::{from_hex, to_hex};
use crate::security::{
    derive_symmetric_key, seeded_rng, EphemeralKey, GroupParams, SessionKey, SessionRng,
};
use crate::transport::{Endpoint, Envelope, Transport};

/// Run an initiator to completion against `server`.
///
/// Each wait is bounded by the initiator's own timeouts; running out aborts
/// with [`HandshakeError::Timeout`] or [`HandshakeError::NoConfirmation`].
/// Traffic from other endpoints is ignored.
pub fn run_initiator<T: Transport + ?Sized>(
    transport: &T,
    server: &Endpoint,
    initiator: &mut Initiator,
    rng: &mut SessionRng,
) -> Result<EstablishedSession> {
    let connect1 = initiator.start()?;
    transport.send(server, &connect1.encode())?;

    loop {
        let Some(envelope) = transport.recv(initiator.next_timeout())? else {
            return Err(initiator.timed_out().into());
        };
        if envelope.from != *server {
            debug!("ignoring message from {} during handshake", envelope.from);
            continue;
        }
        if !is_sts(&envelope.message) {
            warn!("unexpected non-STS message from {}", envelope.from);
        }

        let advance = initiator.handle_text(&envelope.message, rng)?;
        for message in &advance.outgoing {
            transport.send(server, &message.encode())?;
        }
        if let Some(session) = advance.established {
            return Ok(session);
        }
    }
}

/// A client bound to one server.
pub struct Client<T: Transport> {
    transport: T,
    server: Endpoint,
    rng: SessionRng,
    response_timeout: Duration,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T, server: Endpoint, seed: Option<u64>) -> Self {
        Client {
            transport,
            server,
            rng: seeded_rng(seed),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn server(&self) -> &Endpoint {
        &self.server
    }

    /// Next message from the server, or `Timeout`.
    fn await_server(&self, timeout: Option<Duration>) -> Result<Envelope> {
        loop {
            match self.transport.recv(timeout)? {
                Some(envelope) if envelope.from == self.server => return Ok(envelope),
                Some(envelope) => debug!("ignoring message from {}", envelope.from),
                None => return Err(HandshakeError::Timeout.into()),
            }
        }
    }

    /// `try_send`: introduce ourselves and return the server's greeting.
    pub fn hello(&mut self, name: &str) -> Result<String> {
        let local_host = self.transport.local_endpoint().host.clone();
        self.transport
            .send(&self.server, &demo::hello(name, &local_host))?;
        let reply = self.await_server(Some(self.response_timeout))?;
        info!("received {:?} from {}", reply.message, reply.from);
        Ok(reply.message)
    }

    /// `try_send_aes`: send a message sealed under the demo key. `true` when
    /// the server could open it.
    pub fn send_aes(&mut self, plaintext: &str) -> Result<bool> {
        let sealed = demo::demo_aes_key().seal_base64(plaintext.as_bytes(), &mut self.rng)?;
        self.transport
            .send(&self.server, &format!("{}{}", demo::AES_PREFIX, sealed))?;

        let reply = self.await_server(Some(self.response_timeout))?;
        match reply.message.as_str() {
            demo::AES_OK => Ok(true),
            demo::AES_FAILED => Ok(false),
            other => Err(Error::parse(format!("unexpected AES reply {:?}", other))),
        }
    }

    /// `try_DH`: unauthenticated Diffie-Hellman, then one message sealed under
    /// the derived key. Returns the key once the server acknowledges.
    pub fn diffie_hellman(&mut self, group: &GroupParams) -> Result<SessionKey> {
        let session = SessionId::random(&mut self.rng);
        let ephemeral = EphemeralKey::generate(group, &mut self.rng);
        self.transport.send(
            &self.server,
            &tagged(demo::DH_CONNECT1, session, &to_hex(ephemeral.public_value())),
        )?;

        let reply = self.await_server(Some(self.response_timeout))?;
        let gb = match parse_tagged(&reply.message, demo::DH_CONNECT2) {
            Some((sid, payload)) if sid == session => {
                from_hex(payload).ok_or_else(|| HandshakeError::malformed("bad DH value"))?
            }
            _ => return Err(HandshakeError::malformed("expected DH CONNECT2").into()),
        };
        let key = derive_symmetric_key(&ephemeral.agree(group, &gb)?);

        let sealed = key.seal_base64(demo::DEMO_PLAINTEXT.as_bytes(), &mut self.rng)?;
        self.transport
            .send(&self.server, &tagged(demo::DH_CONNECT3, session, &sealed))?;

        let ack = self.await_server(Some(self.response_timeout))?;
        match parse_tagged(&ack.message, demo::DH_OK) {
            Some((sid, _)) if sid == session => Ok(key),
            _ => Err(HandshakeError::NoConfirmation.into()),
        }
    }

    /// `try_STS`: full handshake. With `expected_peer`, the server certificate
    /// must be issued to that name.
    pub fn station_to_station(
        &mut self,
        config: Arc<PartyConfig>,
        expected_peer: Option<String>,
    ) -> Result<EstablishedSession> {
        let mut initiator = Initiator::new(config, expected_peer, &mut self.rng);
        run_initiator(&self.transport, &self.server, &mut initiator, &mut self.rng)
    }

    /// `try_CTF`: ask for the flag prepared for `name`, prove we are `name`
    /// through STS, and open the flag sealed under the session key.
    pub fn capture_the_flag(&mut self, config: Arc<PartyConfig>, name: &str) -> Result<String> {
        let session = SessionId::random(&mut self.rng);
        let timeout = config.response_timeout;
        self.transport
            .send(&self.server, &tagged(demo::CTF_CONNECT, session, name))?;

        let mut initiator = Initiator::with_session(config, session, None, &mut self.rng);
        let established =
            run_initiator(&self.transport, &self.server, &mut initiator, &mut self.rng)?;

        let envelope = match self.transport.recv(Some(timeout))? {
            Some(envelope) => envelope,
            None => return Err(HandshakeError::Timeout.into()),
        };
        // The flag must come from the host we called, not whoever answers.
        if envelope.from.host != self.server.host {
            return Err(Error::transport(format!(
                "flag arrived from {} instead of {}",
                envelope.from, self.server
            )));
        }
        let sealed = match parse_tagged(&envelope.message, demo::CTF_FLAG) {
            Some((sid, payload)) if sid == session => payload,
            _ => return Err(HandshakeError::malformed("expected CTF FLAG").into()),
        };
        let flag = established.open(sealed)?;
        String::from_utf8(flag).map_err(|_| Error::parse("flag is not UTF-8"))
    }
}

/// `try_aes`: local round trip under the demo key; nothing is sent.
pub fn aes_round_trip(plaintext: &str, rng: &mut SessionRng) -> Result<bool> {
    let key = demo::demo_aes_key();
    let sealed = key.seal(plaintext.as_bytes(), rng)?;
    Ok(key.open(&sealed)? == plaintext.as_bytes())
}
