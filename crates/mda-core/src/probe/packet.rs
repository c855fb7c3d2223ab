//! Byte-level layout of probe datagrams and ICMP replies.
//!
//! Probes are IPv4 + UDP + an 8-byte payload, built by hand because the send
//! socket includes the IP header. All multi-byte fields are big-endian.

use std::net::Ipv4Addr;

pub const IP_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;
pub const PAYLOAD_LEN: usize = 8;
pub const PROBE_LEN: usize = IP_HEADER_LEN + UDP_HEADER_LEN + PAYLOAD_LEN;

const ICMP_MIN_LEN: usize = 8;
const IPPROTO_UDP: u8 = 17;

const ICMP_UNREACH: u8 = 3;
const ICMP_TIME_EXCEEDED: u8 = 11;
const ICMP_TIMXCEED_INTRANS: u8 = 0;

/// ICMP destination-unreachable code for "port unreachable".
pub const UNREACH_PORT: u8 = 3;

/// Everything that varies between two probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSpec {
    pub dst: Ipv4Addr,
    pub ttl: u8,
    pub ip_id: u16,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u8,
    /// Send time in ms since an arbitrary epoch; only the low 48 bits are kept.
    pub sent_ms: u64,
}

/// Replies the prober can interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpKind {
    /// Time-exceeded in transit: the TTL ran out before the host.
    TimeExceeded,
    /// Destination unreachable with the given code.
    Unreachable(u8),
}

/// A decoded ICMP error quoting one of our UDP datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpReply {
    pub kind: IcmpKind,
    /// Router or host that sent the ICMP message.
    pub responder: Ipv4Addr,
    /// Original destination of the quoted datagram.
    pub quoted_dst: Ipv4Addr,
    pub quoted_src_port: u16,
    pub quoted_dst_port: u16,
}

/// Internet checksum (RFC 1071) over `data`.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for pair in &mut chunks {
        sum += u16::from_be_bytes([pair[0], pair[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Builds a probe datagram. The source address is left zero for the kernel to fill in.
pub fn encode_probe(spec: &ProbeSpec) -> [u8; PROBE_LEN] {
    let mut buf = [0u8; PROBE_LEN];

    let ip = &mut buf[..IP_HEADER_LEN];
    ip[0] = 0x45; // version 4, IHL 5
    ip[2..4].copy_from_slice(&(PROBE_LEN as u16).to_be_bytes());
    ip[4..6].copy_from_slice(&spec.ip_id.to_be_bytes());
    ip[8] = spec.ttl;
    ip[9] = IPPROTO_UDP;
    ip[16..20].copy_from_slice(&spec.dst.octets());
    let sum = checksum(ip);
    ip[10..12].copy_from_slice(&sum.to_be_bytes());

    let udp = &mut buf[IP_HEADER_LEN..IP_HEADER_LEN + UDP_HEADER_LEN];
    udp[0..2].copy_from_slice(&spec.src_port.to_be_bytes());
    udp[2..4].copy_from_slice(&spec.dst_port.to_be_bytes());
    udp[4..6].copy_from_slice(&((UDP_HEADER_LEN + PAYLOAD_LEN) as u16).to_be_bytes());

    let payload = &mut buf[IP_HEADER_LEN + UDP_HEADER_LEN..];
    payload[0] = spec.seq;
    payload[1] = spec.ttl;
    payload[2..8].copy_from_slice(&spec.sent_ms.to_be_bytes()[2..8]);

    buf
}

fn ipv4_at(buf: &[u8], at: usize) -> Option<Ipv4Addr> {
    let b = buf.get(at..at + 4)?;
    Some(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
}

fn u16_at(buf: &[u8], at: usize) -> Option<u16> {
    let b = buf.get(at..at + 2)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

/// Header length of the IPv4 header at the start of `buf`, if it looks valid.
fn ipv4_header_len(buf: &[u8]) -> Option<usize> {
    let first = *buf.first()?;
    if first >> 4 != 4 {
        return None;
    }
    let hlen = ((first & 0x0f) as usize) * 4;
    (hlen >= IP_HEADER_LEN && buf.len() >= hlen).then_some(hlen)
}

/// Decodes a datagram read from the raw ICMP socket (IP header included).
///
/// Returns `None` for anything that is not a time-exceeded-in-transit or
/// destination-unreachable message quoting a UDP datagram.
pub fn decode_reply(buf: &[u8]) -> Option<IcmpReply> {
    let hlen = ipv4_header_len(buf)?;
    if buf.len() < hlen + ICMP_MIN_LEN {
        return None;
    }
    let responder = ipv4_at(buf, 12)?;

    let icmp = &buf[hlen..];
    let kind = match (icmp[0], icmp[1]) {
        (ICMP_TIME_EXCEEDED, ICMP_TIMXCEED_INTRANS) => IcmpKind::TimeExceeded,
        (ICMP_UNREACH, code) => IcmpKind::Unreachable(code),
        _ => return None,
    };

    let quoted = &icmp[ICMP_MIN_LEN..];
    let qhlen = ipv4_header_len(quoted)?;
    if quoted[9] != IPPROTO_UDP || quoted.len() < qhlen + UDP_HEADER_LEN {
        return None;
    }
    Some(IcmpReply {
        kind,
        responder,
        quoted_dst: ipv4_at(quoted, 16)?,
        quoted_src_port: u16_at(quoted, qhlen)?,
        quoted_dst_port: u16_at(quoted, qhlen + 2)?,
    })
}

/// Builds the ICMP error a router or host would send back for `original`.
/// Used by the simulated network in tests.
#[cfg(test)]
pub(crate) fn encode_reply(kind: IcmpKind, responder: Ipv4Addr, original: &[u8]) -> Vec<u8> {
    let quoted_len = original.len().min(IP_HEADER_LEN + UDP_HEADER_LEN);
    let total = IP_HEADER_LEN + ICMP_MIN_LEN + quoted_len;
    let mut buf = vec![0u8; total];
    buf[0] = 0x45;
    buf[2..4].copy_from_slice(&(total as u16).to_be_bytes());
    buf[8] = 64;
    buf[9] = 1; // ICMP
    buf[12..16].copy_from_slice(&responder.octets());
    let (ty, code) = match kind {
        IcmpKind::TimeExceeded => (ICMP_TIME_EXCEEDED, ICMP_TIMXCEED_INTRANS),
        IcmpKind::Unreachable(code) => (ICMP_UNREACH, code),
    };
    buf[IP_HEADER_LEN] = ty;
    buf[IP_HEADER_LEN + 1] = code;
    buf[IP_HEADER_LEN + ICMP_MIN_LEN..].copy_from_slice(&original[..quoted_len]);
    let sum = checksum(&buf[IP_HEADER_LEN..]);
    buf[IP_HEADER_LEN + 2..IP_HEADER_LEN + 4].copy_from_slice(&sum.to_be_bytes());
    buf
}
