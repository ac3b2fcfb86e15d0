//! Best-effort, connectionless message transport.
//!
//! A message is a line of text addressed to an [`Endpoint`] and labelled with
//! the sender's return address. Delivery is not guaranteed and independent
//! messages may arrive in any order; the protocol layer copes with both.

pub mod envelope;
pub mod memory;
pub mod tcp;

use std::time::Duration;

use crate::error::Result;

pub use envelope::{Endpoint, Envelope, MAX_MESSAGE_SIZE};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use tcp::TcpTransport;

/// Send a message to an endpoint, or take the next one addressed to us.
pub trait Transport: Send {
    /// The return address stamped on every outgoing envelope.
    fn local_endpoint(&self) -> &Endpoint;

    /// Blocking send of one message.
    fn send(&self, to: &Endpoint, message: &str) -> Result<()>;

    /// Next pending message, waiting at most `timeout`; `None` waits forever.
    ///
    /// `Ok(None)` means nothing arrived in time.
    fn recv(&self, timeout: Option<Duration>) -> Result<Option<Envelope>>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn local_endpoint(&self) -> &Endpoint {
        (**self).local_endpoint()
    }

    fn send(&self, to: &Endpoint, message: &str) -> Result<()> {
        (**self).send(to, message)
    }

    fn recv(&self, timeout: Option<Duration>) -> Result<Option<Envelope>> {
        (**self).recv(timeout)
    }
}
