use std::time::Duration;

/// Retry-relevant class of a connection error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect or read timed out.
    Timeout,
    /// Server asked us to back off (429, 503).
    Throttled,
    /// Refused, reset, DNS failure and similar.
    Connection,
    /// Other 5xx status.
    Http5xx(u16),
    /// Not worth retrying on the same host.
    Other,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        !matches!(self, ErrorKind::Other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Exponential backoff with a cap, configured through `[retry]` in config.toml.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per host, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// `attempt` is 1-based. Delay is `base * 2^(attempt-1)`, capped at `max_delay`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts || !kind.is_transient() {
            return RetryDecision::NoRetry;
        }
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        RetryDecision::RetryAfter(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }
}
