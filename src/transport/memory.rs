//! In-process transport: every attached endpoint owns a channel inbox.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::trace;

use super::envelope::{Endpoint, Envelope};
use super::Transport;
use crate::error::{Error, Result};

/// A switchboard of in-memory inboxes. Cheap to clone; clones share the same
/// set of endpoints.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inboxes: Arc<Mutex<HashMap<Endpoint, Sender<Envelope>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `endpoint` and hand back the transport that receives for it.
    /// Re-attaching an endpoint replaces the previous inbox.
    pub fn attach(&self, endpoint: Endpoint) -> Result<MemoryTransport> {
        let (tx, inbox) = mpsc::channel();
        self.lock()?.insert(endpoint.clone(), tx);
        Ok(MemoryTransport {
            local: endpoint,
            network: self.clone(),
            inbox,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Endpoint, Sender<Envelope>>>> {
        self.inboxes
            .lock()
            .map_err(|_| Error::transport("memory network lock poisoned"))
    }
}

pub struct MemoryTransport {
    local: Endpoint,
    network: MemoryNetwork,
    inbox: Receiver<Envelope>,
}

impl Transport for MemoryTransport {
    fn local_endpoint(&self) -> &Endpoint {
        &self.local
    }

    fn send(&self, to: &Endpoint, message: &str) -> Result<()> {
        let envelope = Envelope::new(self.local.clone(), message);
        // Same validation as the wire, so tests see the same failures.
        envelope.encode()?;

        let inboxes = self.network.lock()?;
        let tx = inboxes
            .get(to)
            .ok_or_else(|| Error::transport(format!("no endpoint at {}", to)))?;
        tx.send(envelope)
            .map_err(|_| Error::transport(format!("{} is gone", to)))?;
        trace!("{} -> {} {:?}", self.local, to, message);
        Ok(())
    }

    fn recv(&self, timeout: Option<Duration>) -> Result<Option<Envelope>> {
        match timeout {
            Some(t) => match self.inbox.recv_timeout(t) {
                Ok(envelope) => Ok(Some(envelope)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    Err(Error::transport("detached from the memory network"))
                }
            },
            None => self
                .inbox
                .recv()
                .map(Some)
                .map_err(|_| Error::transport("detached from the memory network")),
        }
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        if let Ok(mut inboxes) = self.network.inboxes.lock() {
            inboxes.remove(&self.local);
        }
    }
}
