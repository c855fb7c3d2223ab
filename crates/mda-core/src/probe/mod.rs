//! Hop and latency probing, traceroute style.
//!
//! UDP datagrams with a chosen TTL are fired at each host; a time-exceeded
//! reply means the TTL was too low, a port-unreachable reply means the
//! datagram arrived. Each host keeps a `[hops_more_than, hops_less_than]`
//! interval that is binary-searched towards the true hop distance, and every
//! arrival contributes a round-trip lag sample.
//!
//! The sequence number of the last probe to a host is carried in the IP ID and
//! the UDP destination port so replies can be matched from the quoted header.

pub mod packet;
mod socket;

#[cfg(test)]
mod tests;

use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::hosts::{HostRecord, HostTable};
use packet::{IcmpKind, IcmpReply, ProbeSpec, UNREACH_PORT};

pub use socket::RawProbeSocket;

/// Largest datagram we care about; ICMP errors quote only a few dozen bytes.
const RECV_BUF_LEN: usize = 512;
/// Lag estimate before any sample is in; the first real sample below it tightens the timeout.
const INITIAL_BEST_LAG: Duration = Duration::from_millis(100);

/// Socket used by the prober: send one probe, receive one datagram.
pub trait ProbeTransport {
    fn send(&mut self, probe: &ProbeSpec) -> io::Result<()>;
    /// Blocks up to the current timeout; `Ok(None)` means nothing arrived.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Successful round-trips after which a host is considered measured.
    pub min_tries: u32,
    /// Hosts beyond this many hops are discarded.
    pub max_ttl: u8,
    /// Consecutive unanswered probes before a host is discarded.
    pub max_retries: u32,
    /// An unanswered probe younger than this is still considered in flight.
    pub resend_threshold: Duration,
    /// Initial receive timeout.
    pub recv_timeout: Duration,
    /// Lags at or below this are too noisy to tighten the receive timeout.
    pub min_lag_sample: Duration,
    pub base_port: u16,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            min_tries: 10,
            max_ttl: 30,
            max_retries: 3,
            resend_threshold: Duration::from_millis(3000),
            recv_timeout: Duration::from_millis(50),
            min_lag_sample: Duration::from_millis(10),
            base_port: 32768 + 666,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("cannot open raw ICMP/IP sockets (CAP_NET_RAW required): {0}")]
    Socket(#[source] io::Error),
    #[error("sending probe to {host} failed: {source}")]
    Send {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("receiving ICMP reply failed: {0}")]
    Recv(#[source] io::Error),
}

/// Totals for one probing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub rounds: u32,
    pub sent: u32,
    pub replies: u32,
    pub discarded: usize,
}

/// Probe identifier placed in the UDP source port: `(pid & 0xffff) | 0x8000`.
pub fn process_ident() -> u16 {
    (std::process::id() & 0xffff) as u16 | 0x8000
}

/// Opens the raw sockets and probes every host in `table`.
pub fn probe_table(
    table: &mut HostTable,
    settings: ProbeSettings,
    tick: &mut dyn FnMut(),
) -> Result<ProbeSummary, ProbeError> {
    let mut socket = RawProbeSocket::open().map_err(ProbeError::Socket)?;
    Prober::new(settings, process_ident()).run(table, &mut socket, tick)
}

/// Send errors that say the host cannot be reached at all.
#[cfg(unix)]
fn is_unreachable(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::ENETDOWN | libc::ENETUNREACH | libc::EHOSTDOWN | libc::EHOSTUNREACH)
    )
}

#[cfg(not(unix))]
fn is_unreachable(_e: &io::Error) -> bool {
    false
}

pub struct Prober {
    settings: ProbeSettings,
    ident: u16,
    seq: u8,
    /// Host that sent last; the next round starts after it.
    cursor: usize,
    best_lag: Duration,
    recv_timeout: Duration,
    epoch: Instant,
    summary: ProbeSummary,
}

impl Prober {
    pub fn new(settings: ProbeSettings, ident: u16) -> Self {
        let recv_timeout = settings.recv_timeout;
        Self {
            settings,
            ident,
            seq: 0,
            cursor: 0,
            best_lag: INITIAL_BEST_LAG,
            recv_timeout,
            epoch: Instant::now(),
            summary: ProbeSummary::default(),
        }
    }

    /// Current receive timeout (tightens as faster hosts answer).
    pub fn recv_timeout(&self) -> Duration {
        self.recv_timeout
    }

    /// Probes until fewer than half the hosts are still undecided.
    /// `tick` runs once per round (the CLI prints a dot).
    pub fn run<T: ProbeTransport>(
        &mut self,
        table: &mut HostTable,
        transport: &mut T,
        tick: &mut dyn FnMut(),
    ) -> Result<ProbeSummary, ProbeError> {
        let total = table.len();
        if total == 0 {
            return Ok(self.summary.clone());
        }
        transport
            .set_timeout(self.recv_timeout)
            .map_err(ProbeError::Recv)?;
        self.cursor = total - 1;

        loop {
            let undone = self.step(table, transport)?;
            tick();
            if undone == 0 || undone < total / 2 {
                break;
            }
        }

        for host in table.records_mut() {
            if !host.invalid {
                host.done = true;
            }
        }
        self.summary.discarded = total - table.valid_count();
        tracing::debug!(
            rounds = self.summary.rounds,
            sent = self.summary.sent,
            replies = self.summary.replies,
            discarded = self.summary.discarded,
            "probing finished"
        );
        Ok(self.summary.clone())
    }

    /// One round: update host states, send at most one probe, wait for one reply.
    /// Returns the number of hosts still undecided at the start of the round.
    pub fn step<T: ProbeTransport>(
        &mut self,
        table: &mut HostTable,
        transport: &mut T,
    ) -> Result<usize, ProbeError> {
        let undone = self.send_round(table, transport)?;
        self.receive(table, transport)?;
        self.summary.rounds += 1;
        Ok(undone)
    }

    fn is_measured(&self, host: &HostRecord) -> bool {
        (host.hop_gap() <= 2 && host.num_in > 0) || host.num_in >= self.settings.min_tries
    }

    fn send_round<T: ProbeTransport>(
        &mut self,
        table: &mut HostTable,
        transport: &mut T,
    ) -> Result<usize, ProbeError> {
        let n = table.len();
        let start = self.cursor % n;
        let mut idx = start;
        let mut undone = 0;
        let mut sent = false;
        let now = Instant::now();

        loop {
            idx = (idx + 1) % n;
            let host = &mut table.records_mut()[idx];

            if !host.invalid && host.awaiting && host.since_last_send(now) >= self.settings.resend_threshold {
                host.awaiting = false;
                tracing::debug!(host = %host.server, retries = host.retries, "probe timed out");
                if host.retries >= self.settings.max_retries {
                    tracing::debug!(host = %host.server, "no reply after retries, discarding host");
                    host.invalid = true;
                }
            }

            if !host.invalid && !host.done && self.is_measured(host) {
                host.done = true;
            }

            if !host.invalid && !host.done {
                undone += 1;
                if !sent && !host.awaiting {
                    sent = self.send_probe(host, transport, now)?;
                    if sent {
                        self.cursor = idx;
                    }
                }
            }

            if idx == start {
                break;
            }
        }
        Ok(undone)
    }

    /// Returns false when the host turned out to be unreachable and was discarded.
    fn send_probe<T: ProbeTransport>(
        &mut self,
        host: &mut HostRecord,
        transport: &mut T,
        now: Instant,
    ) -> Result<bool, ProbeError> {
        self.seq = self.seq.wrapping_add(1);
        let ttl = host.choose_ttl();
        host.seq = self.seq;
        host.last_ttl = ttl;
        host.num_out += 1;
        host.retries += 1;
        host.last_send = Some(now);
        host.awaiting = true;

        let spec = ProbeSpec {
            dst: host.address,
            ttl,
            ip_id: self.ident.wrapping_add(self.seq as u16),
            src_port: self.ident,
            dst_port: self.settings.base_port.wrapping_add(self.seq as u16),
            seq: self.seq,
            sent_ms: now.duration_since(self.epoch).as_millis() as u64,
        };
        match transport.send(&spec) {
            Ok(()) => {
                self.summary.sent += 1;
                tracing::trace!(host = %host.server, ttl, seq = self.seq, num_out = host.num_out, "probe sent");
                Ok(true)
            }
            Err(e) if is_unreachable(&e) => {
                tracing::debug!(host = %host.server, "unreachable on send: {}", e);
                host.invalid = true;
                host.awaiting = false;
                Ok(false)
            }
            Err(e) => Err(ProbeError::Send {
                host: host.server.clone(),
                source: e,
            }),
        }
    }

    fn receive<T: ProbeTransport>(
        &mut self,
        table: &mut HostTable,
        transport: &mut T,
    ) -> Result<(), ProbeError> {
        let mut buf = [0u8; RECV_BUF_LEN];
        let Some(len) = transport.recv(&mut buf).map_err(ProbeError::Recv)? else {
            return Ok(());
        };
        let now = Instant::now();
        let Some(reply) = packet::decode_reply(&buf[..len]) else {
            return Ok(());
        };
        if reply.quoted_src_port != self.ident {
            return Ok(());
        }
        let base_port = self.settings.base_port;
        let Some(host) = table.records_mut().iter_mut().find(|h| {
            !h.invalid && h.awaiting && base_port.wrapping_add(h.seq as u16) == reply.quoted_dst_port
        }) else {
            tracing::trace!(port = reply.quoted_dst_port, "unattributed ICMP reply");
            return Ok(());
        };
        self.summary.replies += 1;
        self.apply_reply(host, &reply, now, transport)
    }

    fn apply_reply<T: ProbeTransport>(
        &mut self,
        host: &mut HostRecord,
        reply: &IcmpReply,
        now: Instant,
        transport: &mut T,
    ) -> Result<(), ProbeError> {
        host.awaiting = false;
        let ttl = host.last_ttl;
        match reply.kind {
            IcmpKind::TimeExceeded if ttl >= self.settings.max_ttl => {
                tracing::debug!(host = %host.server, ttl, "farther than max ttl, discarding host");
                host.invalid = true;
            }
            IcmpKind::TimeExceeded => {
                if ttl >= host.hops_less_than {
                    host.hops_less_than = ttl + 1;
                }
                host.num_out = host.num_out.saturating_sub(1);
                host.retries = 0;
                host.hops_more_than = ttl;
                tracing::trace!(host = %host.server, ttl, "ttl too low");
            }
            IcmpKind::Unreachable(UNREACH_PORT) => {
                host.num_in += 1;
                host.retries = 0;
                host.hops_less_than = ttl;
                let lag = host.since_last_send(now);
                if lag > self.settings.min_lag_sample && lag < self.best_lag {
                    self.best_lag = lag;
                    self.recv_timeout = (lag / 2).max(Duration::from_millis(1));
                    transport
                        .set_timeout(self.recv_timeout)
                        .map_err(ProbeError::Recv)?;
                }
                host.total_lag += lag.as_millis() as u64;
                tracing::trace!(host = %host.server, ttl, lag_ms = lag.as_millis() as u64, "reached host");
            }
            IcmpKind::Unreachable(code) => {
                tracing::debug!(host = %host.server, code, "host unreachable, discarding");
                host.invalid = true;
            }
        }
        Ok(())
    }
}
