//! UDP socket transport.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, instrument, trace};

use super::Transport;

/// Blocking mode the socket was last put in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMode {
    Poll,
    Wait(Duration),
}

/// UDP transport bound to the SMCP1 port.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    mode: Option<ReadMode>,
}

impl UdpTransport {
    /// Open a socket for talking to `target`.
    ///
    /// Address reuse is always enabled. A target ending in .255 enables
    /// broadcast, a 224.x target joins that multicast group. The local port
    /// equals the target port, or the target port minus two for loopback
    /// targets so a device simulator can run on the same host. When the port
    /// is taken the bind is retried once on a dynamic port.
    #[instrument(level = "debug")]
    pub fn open(target: SocketAddrV4) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;

        let ip = *target.ip();
        if ip.octets()[0] == 224 {
            socket.join_multicast_v4(&ip, &Ipv4Addr::UNSPECIFIED)?;
            debug!(group = %ip, "joined multicast group");
        }
        if ip.octets()[3] == 0xff {
            socket.set_broadcast(true)?;
        }

        let local_port = if ip.is_loopback() {
            target.port().saturating_sub(2)
        } else {
            target.port()
        };
        let local = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, local_port);
        if let Err(err) = socket.bind(&SocketAddr::V4(local).into()) {
            if err.kind() != io::ErrorKind::AddrInUse {
                return Err(err);
            }
            debug!(port = local_port, "port in use, binding a dynamic port");
            let dynamic = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
            socket.bind(&SocketAddr::V4(dynamic).into())?;
        }

        let socket: UdpSocket = socket.into();
        debug!(local = ?socket.local_addr().ok(), %target, "udp transport open");
        Ok(Self { socket, mode: None })
    }

    fn set_mode(&mut self, mode: ReadMode) -> io::Result<()> {
        if self.mode == Some(mode) {
            return Ok(());
        }
        match mode {
            ReadMode::Poll => self.socket.set_nonblocking(true)?,
            ReadMode::Wait(timeout) => {
                self.socket.set_nonblocking(false)?;
                self.socket.set_read_timeout(Some(timeout))?;
            }
        }
        self.mode = Some(mode);
        Ok(())
    }
}

impl Transport for UdpTransport {
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        trace!(len = buf.len(), %addr, "send");
        self.socket.send_to(buf, addr)
    }

    fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        let mode = if timeout.is_zero() {
            ReadMode::Poll
        } else {
            ReadMode::Wait(timeout)
        };
        self.set_mode(mode)?;
        match self.socket.recv_from(buf) {
            Ok((len, from)) => {
                trace!(len, %from, "recv");
                Ok(Some((len, from)))
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_exchange() {
        // port 0 target keeps the bind dynamic
        let mut a = UdpTransport::open(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let mut b = UdpTransport::open(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let b_port = b.local_addr().unwrap().port();
        let b_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, b_port));

        a.send_to(b"ping", b_addr).unwrap();
        let mut buf = [0u8; 16];
        let (len, _) = b
            .recv_from(&mut buf, Duration::from_millis(500))
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], b"ping");
    }

    #[test]
    fn test_recv_timeout_is_none() {
        let mut socket = UdpTransport::open(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let mut buf = [0u8; 16];
        assert!(socket.recv_from(&mut buf, Duration::ZERO).unwrap().is_none());
        assert!(
            socket
                .recv_from(&mut buf, Duration::from_millis(5))
                .unwrap()
                .is_none()
        );
    }
}
