//! STS wire messages.
//!
//! ```text
//! STS: ALICE/BOB CONNECT1 <sid> <hex DH value>
//! STS: BOB/ALICE CONNECT2 <sid> <base64 sealed signature>
//! STS: BOB/ALICE CONNECT2 <sid> <hex DH value>
//! STS: BOB/ALICE CONNECT2 <sid> <certificate>
//! STS: ALICE/BOB CONNECT3 <sid> <base64 sealed signature>
//! STS: ALICE/BOB CONNECT3 <sid> <certificate>
//! STS: BOB/ALICE CONNECT4 <sid> <base64 sealed "OK">
//! ```
//!
//! The three CONNECT2 parts share a tag and are told apart only by arrival
//! order; the state machines know which one comes next.

use std::fmt;
use std::str::FromStr;

use num_bigint_dig::BigUint;
use rand::RngCore;

use crate::certificate::Certificate;
use crate::error::HandshakeError;
use crate::security::bignum::{from_hex, to_hex};

/// Prefix shared by every STS message.
pub const STS_PREFIX: &str = "STS: ";

/// Literal the responder seals into CONNECT4.
pub const CONFIRMATION: &[u8] = b"OK";

/// Identifies one handshake; carried by every message that belongs to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(raw: u64) -> Self {
        SessionId(raw)
    }

    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        SessionId(rng.next_u64())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_be_bytes()))
    }
}

impl FromStr for SessionId {
    type Err = HandshakeError;

    /// Exactly sixteen hex digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut raw = [0u8; 8];
        hex::decode_to_slice(s, &mut raw)
            .map_err(|_| HandshakeError::malformed(format!("bad session id {:?}", s)))?;
        Ok(SessionId(u64::from_be_bytes(raw)))
    }
}

/// Which leg of the exchange a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Connect1,
    Connect2,
    Connect3,
    Connect4,
}

impl Step {
    const ALL: [Step; 4] = [Step::Connect1, Step::Connect2, Step::Connect3, Step::Connect4];

    pub fn tag(self) -> &'static str {
        match self {
            Step::Connect1 => "STS: ALICE/BOB CONNECT1",
            Step::Connect2 => "STS: BOB/ALICE CONNECT2",
            Step::Connect3 => "STS: ALICE/BOB CONNECT3",
            Step::Connect4 => "STS: BOB/ALICE CONNECT4",
        }
    }
}

/// One STS message: step tag, session id and an uninterpreted payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StsMessage {
    pub step: Step,
    pub session: SessionId,
    pub payload: String,
}

impl StsMessage {
    pub fn new(step: Step, session: SessionId, payload: impl Into<String>) -> Self {
        StsMessage {
            step,
            session,
            payload: payload.into(),
        }
    }

    pub fn dh_value(step: Step, session: SessionId, value: &BigUint) -> Self {
        Self::new(step, session, to_hex(value))
    }

    pub fn certificate(step: Step, session: SessionId, certificate: &Certificate) -> Self {
        Self::new(step, session, certificate.to_string())
    }

    pub fn encode(&self) -> String {
        format!("{} {} {}", self.step.tag(), self.session, self.payload)
    }

    /// Fixed-prefix match on the tag, then the session id, then the payload.
    pub fn decode(text: &str) -> Result<Self, HandshakeError> {
        let (step, rest) = Step::ALL
            .iter()
            .find_map(|&step| {
                text.strip_prefix(step.tag())
                    .and_then(|rest| rest.strip_prefix(' '))
                    .map(|rest| (step, rest))
            })
            .ok_or_else(|| HandshakeError::malformed("unknown STS tag"))?;

        let (session, payload) = rest
            .split_once(' ')
            .ok_or_else(|| HandshakeError::malformed("missing session id or payload"))?;
        let session = session.parse()?;
        if payload.trim().is_empty() {
            return Err(HandshakeError::malformed("empty payload"));
        }

        Ok(StsMessage::new(step, session, payload))
    }

    pub fn parse_dh_value(&self) -> Result<BigUint, HandshakeError> {
        from_hex(&self.payload).ok_or_else(|| HandshakeError::malformed("bad Diffie-Hellman value"))
    }

    pub fn parse_certificate(&self) -> Result<Certificate, HandshakeError> {
        Certificate::parse(&self.payload)
            .map_err(|e| HandshakeError::malformed(format!("bad certificate: {}", e)))
    }
}

impl fmt::Display for StsMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// True for anything that should be routed to the STS engine.
pub fn is_sts(text: &str) -> bool {
    text.starts_with(STS_PREFIX)
}
