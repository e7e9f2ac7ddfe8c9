//! Datagram transport used by the session.
//!
//! The session needs exactly two primitives: send a datagram to an address,
//! and wait a bounded time for one datagram. Anything that provides them can
//! carry SMCP1 traffic.

mod mock;
mod socket;

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

pub use mock::{MockTransport, Responder};
pub use socket::UdpTransport;

/// Datagram send/receive primitives
pub trait Transport: Send {
    /// Send one datagram, returning the number of bytes sent
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;

    /// Wait up to `timeout` for one datagram.
    ///
    /// Returns `Ok(None)` when the timeout elapsed without traffic. A zero
    /// timeout polls without blocking.
    fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>>;

    /// Local address the transport is bound to
    fn local_addr(&self) -> io::Result<SocketAddr>;
}
