use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Currently-known information about one mirror host.
#[derive(Debug, Clone)]
pub struct HostRecord {
    /// Probing finished for this host.
    pub done: bool,
    /// Host discarded; never probed or selected again.
    pub invalid: bool,
    /// Probes sent (time-exceeded replies are taken back out).
    pub num_out: u32,
    /// Port-unreachable replies attributed to this host.
    pub num_in: u32,
    /// Sum of round-trip lags over `num_in` replies, in ms.
    pub total_lag: u64,
    /// Upper bound on the hop distance.
    pub hops_less_than: u8,
    /// Lower bound on the hop distance.
    pub hops_more_than: u8,
    /// Consecutive probes without a reply.
    pub retries: u32,
    pub last_send: Option<Instant>,
    /// Sequence number of the last probe (wraps at 256).
    pub seq: u8,
    /// TTL carried by the last probe.
    pub last_ttl: u8,
    /// A probe is in flight and has not been attributed yet.
    pub awaiting: bool,
    pub address: Ipv4Addr,
    pub server: String,
    pub url: String,
}

impl HostRecord {
    pub fn new(url: &str, server: &str, address: Ipv4Addr, max_ttl: u8) -> Self {
        Self {
            done: false,
            invalid: false,
            num_out: 0,
            num_in: 0,
            total_lag: 0,
            hops_less_than: max_ttl,
            hops_more_than: 0,
            retries: 0,
            last_send: None,
            seq: 0,
            last_ttl: 0,
            awaiting: false,
            address,
            server: server.to_string(),
            url: url.to_string(),
        }
    }

    /// Next trial TTL: halfway between the bounds, rounded towards `hops_less_than`.
    pub fn choose_ttl(&self) -> u8 {
        self.hops_less_than - (self.hops_less_than - self.hops_more_than) / 2
    }

    /// Width of the hop interval.
    pub fn hop_gap(&self) -> u8 {
        self.hops_less_than - self.hops_more_than
    }

    /// Time since the last probe, zero if none was ever sent.
    pub fn since_last_send(&self, now: Instant) -> Duration {
        self.last_send
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or(Duration::ZERO)
    }

    /// Mean lag over successful replies, if any.
    pub fn avg_lag_ms(&self) -> Option<u64> {
        (self.num_in > 0).then(|| self.total_lag / self.num_in as u64)
    }
}
