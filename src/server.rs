//! Blocking server loop.
//!
//! One inbound message is handled at a time, but handshakes are not: every
//! message names its session, so any number of clients can be half way through
//! STS (or the DH demo) at once. Sessions idle for longer than the session
//! timeout are dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::RngCore;

use crate::demo::{self, parse_tagged, tagged};
use crate::error::Result;
use crate::protocol::config::DEFAULT_SESSION_TIMEOUT;
use crate::protocol::message::is_sts;
use crate::protocol::{EstablishedSession, PartyConfig, Responder, SessionId, Step, StsMessage};
use crate::security::bignum::{from_hex, to_hex};
use crate::security::{
    derive_symmetric_key, seeded_rng, EphemeralKey, GroupParams, SessionKey, SessionRng,
};
use crate::transport::{Endpoint, Envelope, Transport};

/// How often an idle `run` loop wakes up to expire sessions.
const TICK: Duration = Duration::from_secs(1);

/// One unfinished exchange.
struct Pending {
    peer: Endpoint,
    last_seen: Instant,
    kind: PendingKind,
}

enum PendingKind {
    /// `CTF: CONNECT` seen; the STS run that proves the name comes next.
    FlagClaim { name: String },
    Sts { responder: Responder, flag: bool },
    Dh { key: SessionKey },
}

pub struct Server<T: Transport> {
    transport: T,
    party: Option<Arc<PartyConfig>>,
    dh_group: GroupParams,
    sessions: HashMap<SessionId, Pending>,
    session_timeout: Duration,
    rng: SessionRng,
}

impl<T: Transport> Server<T> {
    /// Without a `party` the server still answers the hello, AES and DH demos
    /// but ignores STS and CTF traffic.
    pub fn new(transport: T, party: Option<Arc<PartyConfig>>, seed: Option<u64>) -> Self {
        let dh_group = party
            .as_ref()
            .map(|p| p.group.clone())
            .unwrap_or_default();
        Server {
            transport,
            party,
            dh_group,
            sessions: HashMap::new(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            rng: seeded_rng(seed),
        }
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_dh_group(mut self, group: GroupParams) -> Self {
        self.dh_group = group;
        self
    }

    pub fn local_endpoint(&self) -> &Endpoint {
        self.transport.local_endpoint()
    }

    /// Number of handshakes in flight.
    pub fn pending_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Serve forever.
    pub fn run(&mut self) -> Result<()> {
        info!("serving on {}", self.transport.local_endpoint());
        loop {
            self.serve_once(Some(TICK))?;
        }
    }

    /// Expire idle sessions, then handle at most one inbound message.
    pub fn serve_once(&mut self, timeout: Option<Duration>) -> Result<Option<EstablishedSession>> {
        self.expire_idle(Instant::now());
        match self.transport.recv(timeout)? {
            Some(envelope) => Ok(self.handle_envelope(envelope)),
            None => Ok(None),
        }
    }

    /// Drop every session idle since before `now - session_timeout`.
    pub fn expire_idle(&mut self, now: Instant) -> usize {
        let timeout = self.session_timeout;
        let before = self.sessions.len();
        self.sessions.retain(|sid, pending| {
            let alive = now.saturating_duration_since(pending.last_seen) <= timeout;
            if !alive {
                if let PendingKind::Sts { responder, .. } = &mut pending.kind {
                    responder.timed_out();
                }
                debug!("[{}] expired session with {}", sid, pending.peer);
            }
            alive
        });
        before - self.sessions.len()
    }

    /// Route one message. Returns the session when it completes an STS
    /// handshake.
    pub fn handle_envelope(&mut self, envelope: Envelope) -> Option<EstablishedSession> {
        let Envelope { from, message } = envelope;
        if is_sts(&message) {
            self.on_sts(from, &message)
        } else if message.starts_with(demo::CTF_PREFIX) {
            self.on_ctf(from, &message);
            None
        } else if message.starts_with(demo::DH_PREFIX) {
            self.on_dh(from, &message);
            None
        } else if message.starts_with("AES") {
            self.on_aes(from, &message);
            None
        } else {
            info!("{} says {:?}", from, message);
            self.reply(&from, &demo::hello_reply(&from.host));
            None
        }
    }

    /// Sends are best effort; a vanished client must not stop the server.
    fn reply(&self, to: &Endpoint, text: &str) {
        if let Err(e) = self.transport.send(to, text) {
            warn!("cannot reply to {}: {}", to, e);
        }
    }

    fn on_aes(&mut self, from: Endpoint, message: &str) {
        let sealed = message.strip_prefix(demo::AES_PREFIX).unwrap_or("");
        match demo::demo_aes_key().open_base64(sealed) {
            Ok(plain) => {
                info!("AES from {}: {:?}", from, String::from_utf8_lossy(&plain));
                self.reply(&from, demo::AES_OK);
            }
            Err(e) => {
                warn!("AES from {} failed: {}", from, e);
                self.reply(&from, demo::AES_FAILED);
            }
        }
    }

    fn on_dh(&mut self, from: Endpoint, message: &str) {
        if let Some((sid, payload)) = parse_tagged(message, demo::DH_CONNECT1) {
            if self.in_use(sid) {
                return;
            }
            let Some(ga) = from_hex(payload) else {
                warn!("[{}] bad DH value from {}", sid, from);
                return;
            };
            if let Err(e) = self.dh_group.check_peer_value(&ga) {
                warn!("[{}] {}", sid, e);
                return;
            }
            let ephemeral = EphemeralKey::generate(&self.dh_group, &mut self.rng);
            let key = match ephemeral.agree(&self.dh_group, &ga) {
                Ok(shared) => derive_symmetric_key(&shared),
                Err(e) => {
                    warn!("[{}] {}", sid, e);
                    return;
                }
            };
            self.reply(
                &from,
                &tagged(demo::DH_CONNECT2, sid, &to_hex(ephemeral.public_value())),
            );
            self.insert(sid, from, PendingKind::Dh { key });
        } else if let Some((sid, payload)) = parse_tagged(message, demo::DH_CONNECT3) {
            let Some(PendingKind::Dh { key }) = self.take(sid, &from) else {
                debug!("[{}] DH CONNECT3 without a matching CONNECT1", sid);
                return;
            };
            match key.open_base64(payload) {
                Ok(plain) => {
                    info!("[{}] DH check: {:?}", sid, String::from_utf8_lossy(&plain));
                    self.reply(&from, &tagged(demo::DH_OK, sid, ""));
                }
                Err(e) => warn!("[{}] DH check failed: {}", sid, e),
            }
        } else {
            warn!("unknown DH message from {}", from);
        }
    }

    fn on_ctf(&mut self, from: Endpoint, message: &str) {
        if self.party.is_none() {
            warn!("CTF request from {} but no identity is loaded", from);
            return;
        }
        match parse_tagged(message, demo::CTF_CONNECT) {
            Some((sid, name)) if !name.trim().is_empty() => {
                if self.in_use(sid) {
                    return;
                }
                info!("[{}] {} claims to be {:?}", sid, from, name.trim());
                let name = name.trim().to_string();
                self.insert(sid, from, PendingKind::FlagClaim { name });
            }
            _ => warn!("malformed CTF request from {}", from),
        }
    }

    fn on_sts(&mut self, from: Endpoint, text: &str) -> Option<EstablishedSession> {
        let Some(party) = self.party.clone() else {
            warn!("STS message from {} but no identity is loaded", from);
            return None;
        };
        let message = match StsMessage::decode(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("dropping STS message from {}: {}", from, e);
                return None;
            }
        };
        let sid = message.session;

        if message.step == Step::Connect1 {
            let claimed = matches!(
                self.sessions.get(&sid),
                Some(Pending { peer, kind: PendingKind::FlagClaim { .. }, .. }) if *peer == from
            );
            if !claimed && self.in_use(sid) {
                return None;
            }
            let (expected_peer, flag) = match self.take(sid, &from) {
                None => (None, false),
                Some(PendingKind::FlagClaim { name }) => (Some(name), true),
                Some(_) => {
                    warn!("[{}] CONNECT1 reuses a live session id", sid);
                    return None;
                }
            };
            match Responder::accept(party, &message, expected_peer, &mut self.rng) {
                Ok((responder, outgoing)) => {
                    for m in &outgoing {
                        self.reply(&from, &m.encode());
                    }
                    self.insert(sid, from, PendingKind::Sts { responder, flag });
                }
                Err(e) => warn!("[{}] refusing CONNECT1 from {}: {}", sid, from, e),
            }
            return None;
        }

        let Some(PendingKind::Sts { mut responder, flag }) = self.take(sid, &from) else {
            debug!("[{}] no handshake in progress with {}", sid, from);
            return None;
        };
        match responder.handle(&message, &mut self.rng) {
            Ok(advance) => {
                for m in &advance.outgoing {
                    self.reply(&from, &m.encode());
                }
                match advance.established {
                    Some(session) => {
                        if flag {
                            self.send_flag(&from, &session);
                        }
                        Some(session)
                    }
                    None => {
                        self.insert(sid, from, PendingKind::Sts { responder, flag });
                        None
                    }
                }
            }
            // The responder already logged why; nothing goes back to the peer.
            Err(_) => None,
        }
    }

    fn send_flag(&mut self, to: &Endpoint, session: &EstablishedSession) {
        let mut raw = [0u8; 16];
        self.rng.fill_bytes(&mut raw);
        let flag = format!("0x{}", hex::encode(raw));
        match session.seal(flag.as_bytes(), &mut self.rng) {
            Ok(sealed) => {
                info!("[{}] flag sent to {:?}", session.id(), session.peer_name());
                self.reply(to, &tagged(demo::CTF_FLAG, session.id(), &sealed));
            }
            Err(e) => warn!("[{}] cannot seal flag: {}", session.id(), e),
        }
    }

    fn insert(&mut self, sid: SessionId, peer: Endpoint, kind: PendingKind) {
        self.sessions.insert(
            sid,
            Pending {
                peer,
                last_seen: Instant::now(),
                kind,
            },
        );
    }

    /// A new exchange may not reuse the id of one already in flight.
    fn in_use(&self, sid: SessionId) -> bool {
        match self.sessions.get(&sid) {
            Some(pending) => {
                warn!("[{}] id already in use by {}", sid, pending.peer);
                true
            }
            None => false,
        }
    }

    /// Remove and return the session `sid` if it belongs to `from`.
    fn take(&mut self, sid: SessionId, from: &Endpoint) -> Option<PendingKind> {
        match self.sessions.get(&sid) {
            Some(pending) if pending.peer == *from => {
                self.sessions.remove(&sid).map(|p| p.kind)
            }
            Some(pending) => {
                warn!(
                    "[{}] message from {} for a session owned by {}",
                    sid, from, pending.peer
                );
                None
            }
            None => None,
        }
    }
}
