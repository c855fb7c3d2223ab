//! Raw-socket transport: IP-header-included send socket plus an ICMPv4 receive socket.
//!
//! Both need CAP_NET_RAW (or root).

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::SocketAddrV4;
use std::time::Duration;

use super::packet::{self, ProbeSpec};
use super::ProbeTransport;

/// IPPROTO_RAW: the kernel expects the IP header from us.
const IPPROTO_RAW: i32 = 255;

pub struct RawProbeSocket {
    send: Socket,
    recv: Socket,
}

impl RawProbeSocket {
    pub fn open() -> io::Result<Self> {
        let recv = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
        let send = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(IPPROTO_RAW)))?;
        Ok(Self { send, recv })
    }
}

impl ProbeTransport for RawProbeSocket {
    fn send(&mut self, probe: &ProbeSpec) -> io::Result<()> {
        let datagram = packet::encode_probe(probe);
        let addr = SockAddr::from(SocketAddrV4::new(probe.dst, probe.dst_port));
        let n = self.send.send_to(&datagram, &addr)?;
        if n != datagram.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short probe send: {} of {}", n, datagram.len()),
            ));
        }
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match (&self.recv).read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.recv.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))
    }
}
