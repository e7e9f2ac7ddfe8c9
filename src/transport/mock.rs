//! Scripted in-memory transport for tests and simulations.

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::Transport;

/// Callback producing the datagrams a simulated peer sends back for each
/// datagram the session sends. Each reply carries its source address.
pub type Responder = Box<dyn FnMut(&[u8], SocketAddr) -> Vec<(Vec<u8>, SocketAddr)> + Send>;

/// Mock transport; clones share the same state
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    inbound: VecDeque<(Vec<u8>, SocketAddr)>,
    sent: Vec<(Vec<u8>, SocketAddr)>,
    responder: Option<Responder>,
    send_error: Option<io::ErrorKind>,
    polls: usize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock with no scripted peer
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner {
                inbound: VecDeque::new(),
                sent: Vec::new(),
                responder: None,
                send_error: None,
                polls: 0,
            })),
        }
    }

    /// Create a mock whose peer answers through `responder`
    #[must_use]
    pub fn with_responder(
        responder: impl FnMut(&[u8], SocketAddr) -> Vec<(Vec<u8>, SocketAddr)> + Send + 'static,
    ) -> Self {
        let mock = Self::new();
        mock.lock().responder = Some(Box::new(responder));
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a datagram to be received
    pub fn inject(&self, data: impl Into<Vec<u8>>, from: SocketAddr) {
        self.lock().inbound.push_back((data.into(), from));
    }

    /// Every datagram sent so far, with its destination
    #[must_use]
    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.lock().sent.clone()
    }

    /// Number of datagrams sent so far
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.lock().sent.len()
    }

    /// Forget recorded sends
    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    /// Number of receive calls that found no datagram
    #[must_use]
    pub fn empty_polls(&self) -> usize {
        self.lock().polls
    }

    /// Make every following send fail with `kind`
    pub fn fail_sends(&self, kind: io::ErrorKind) {
        self.lock().send_error = Some(kind);
    }
}

impl Transport for MockTransport {
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        let mut inner = self.lock();
        if let Some(kind) = inner.send_error {
            return Err(io::Error::from(kind));
        }
        inner.sent.push((buf.to_vec(), addr));
        if let Some(mut responder) = inner.responder.take() {
            let replies = responder(buf, addr);
            inner.inbound.extend(replies);
            inner.responder = Some(responder);
        }
        Ok(buf.len())
    }

    fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        let next = {
            let mut inner = self.lock();
            let next = inner.inbound.pop_front();
            if next.is_none() {
                inner.polls += 1;
            }
            next
        };
        match next {
            Some((data, from)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(Some((len, from)))
            }
            None => {
                // nothing queued: behave like a quiet network
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 55555)))
    }
}
