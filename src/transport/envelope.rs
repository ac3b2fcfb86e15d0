//! `<sender-host>;<sender-port>;<message-length>;<message>`

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Largest message the transport will carry, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 1 << 20;

/// A host name and port pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One received message with the return address it was sent from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: Endpoint,
    pub message: String,
}

impl Envelope {
    pub fn new(from: Endpoint, message: impl Into<String>) -> Self {
        Envelope {
            from,
            message: message.into(),
        }
    }

    /// Wire form. Fails if the host would break the field separators or the
    /// message is too large.
    pub fn encode(&self) -> Result<String> {
        if self.from.host.is_empty() || self.from.host.contains([';', '\n']) {
            return Err(Error::transport(format!(
                "host {:?} cannot be used as a return address",
                self.from.host
            )));
        }
        if self.message.len() > MAX_MESSAGE_SIZE {
            return Err(Error::transport(format!(
                "message of {} bytes exceeds the {} byte limit",
                self.message.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        Ok(format!(
            "{};{};{};{}",
            self.from.host,
            self.from.port,
            self.message.len(),
            self.message
        ))
    }

    /// Parse the wire form. The declared length must match the message exactly.
    pub fn decode(packet: &str) -> Result<Self> {
        let mut fields = packet.splitn(4, ';');
        let (host, port, len, message) =
            match (fields.next(), fields.next(), fields.next(), fields.next()) {
                (Some(h), Some(p), Some(l), Some(m)) => (h, p, l, m),
                _ => return Err(Error::parse("envelope needs host;port;length;message")),
            };

        if host.is_empty() {
            return Err(Error::parse("envelope has an empty host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| Error::parse(format!("bad envelope port {:?}", port)))?;
        let len = len
            .parse::<usize>()
            .map_err(|_| Error::parse(format!("bad envelope length {:?}", len)))?;
        if len != message.len() {
            return Err(Error::parse(format!(
                "envelope announces {} bytes but carries {}",
                len,
                message.len()
            )));
        }

        Ok(Envelope::new(Endpoint::new(host, port), message))
    }
}

impl FromStr for Envelope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Envelope::decode(s)
    }
}
