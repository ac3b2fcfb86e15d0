//! One TCP connection per message: a 4-byte big-endian length followed by the
//! envelope text.
//!
//! A background thread accepts connections and hands each one to a short-lived
//! reader thread, which decodes the envelope and pushes it onto a channel, so
//! [`Transport::recv`] is a bounded channel wait.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};

use super::envelope::{Endpoint, Envelope, MAX_MESSAGE_SIZE};
use super::Transport;
use crate::error::{Error, Result};

/// Bound on connecting to a peer and on writing one message.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on reading one inbound message once its connection is accepted.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TcpTransport {
    local: Endpoint,
    listen_addr: SocketAddr,
    inbox: Receiver<Envelope>,
    shutdown: Arc<AtomicBool>,
}

impl TcpTransport {
    /// Listen on every interface at `local.port` and advertise `local` as the
    /// return address. Port 0 picks a free port and updates the endpoint.
    pub fn bind(local: Endpoint) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", local.port))?;
        let listen_addr = listener.local_addr()?;
        let local = Endpoint::new(local.host, listen_addr.port());

        let (tx, inbox) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        thread::Builder::new()
            .name(format!("accept-{}", listen_addr.port()))
            .spawn(move || accept_loop(listener, tx, stop))?;

        debug!("listening on {} as {}", listen_addr, local);
        Ok(TcpTransport {
            local,
            listen_addr,
            inbox,
            shutdown,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }
}

fn accept_loop(listener: TcpListener, tx: Sender<Envelope>, stop: Arc<AtomicBool>) {
    for stream in listener.incoming() {
        if stop.load(Ordering::Acquire) {
            break;
        }
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };
        // A peer that connects and stays silent must not hold up the others.
        let tx = tx.clone();
        let spawned = thread::Builder::new()
            .name("tcp-reader".into())
            .spawn(move || deliver(stream, tx));
        if let Err(e) = spawned {
            warn!("cannot start reader thread: {}", e);
        }
    }
    debug!("accept loop finished");
}

fn deliver(stream: TcpStream, tx: Sender<Envelope>) {
    match read_envelope(stream) {
        Ok(envelope) => {
            trace!("<- {} {:?}", envelope.from, envelope.message);
            if tx.send(envelope).is_err() {
                debug!("transport dropped before delivery");
            }
        }
        Err(e) => warn!("dropping inbound packet: {}", e),
    }
}

fn read_envelope(mut stream: TcpStream) -> Result<Envelope> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    // Envelope header plus the message itself.
    if len > MAX_MESSAGE_SIZE + 64 {
        return Err(Error::transport(format!("{} byte packet is too large", len)));
    }

    let mut packet = vec![0u8; len];
    stream.read_exact(&mut packet)?;
    let packet =
        String::from_utf8(packet).map_err(|_| Error::parse("packet is not valid UTF-8"))?;
    Envelope::decode(&packet)
}

fn connect(to: &Endpoint) -> Result<TcpStream> {
    let mut last_err = None;
    for addr in (to.host.as_str(), to.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(match last_err {
        Some(e) => Error::transport(format!("cannot reach {}: {}", to, e)),
        None => Error::transport(format!("{} does not resolve", to)),
    })
}

impl Transport for TcpTransport {
    fn local_endpoint(&self) -> &Endpoint {
        &self.local
    }

    fn send(&self, to: &Endpoint, message: &str) -> Result<()> {
        let packet = Envelope::new(self.local.clone(), message).encode()?;
        let len = u32::try_from(packet.len())
            .map_err(|_| Error::transport("packet length does not fit in 32 bits"))?;

        let mut stream = connect(to)?;
        stream.set_write_timeout(Some(CONNECT_TIMEOUT))?;
        stream.write_all(&len.to_be_bytes())?;
        stream.write_all(packet.as_bytes())?;
        stream.flush()?;
        trace!("-> {} {:?}", to, message);
        Ok(())
    }

    fn recv(&self, timeout: Option<Duration>) -> Result<Option<Envelope>> {
        match timeout {
            Some(t) => match self.inbox.recv_timeout(t) {
                Ok(envelope) => Ok(Some(envelope)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    Err(Error::transport("listener thread stopped"))
                }
            },
            None => self
                .inbox
                .recv()
                .map(Some)
                .map_err(|_| Error::transport("listener thread stopped")),
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        // Wake the blocking accept so the thread sees the flag.
        let wake = SocketAddr::from(([127, 0, 0, 1], self.listen_addr.port()));
        let _ = TcpStream::connect_timeout(&wake, Duration::from_millis(200));
    }
}
