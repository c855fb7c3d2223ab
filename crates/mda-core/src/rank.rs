//! Host scoring and the preference list handed to the transfer coordinator.

use serde::Serialize;

use crate::hosts::{HostRecord, HostTable};

/// Composite latency/hop score; lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Score(pub u64);

impl Score {
    /// Hosts that never answered.
    pub const WORST: Score = Score(u64::MAX);

    pub fn is_worst(self) -> bool {
        self == Self::WORST
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_worst() {
            f.write_str("-")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// `total_lag * num_out / num_in²`, then weighted up by 10% per hop.
pub fn score(host: &HostRecord) -> Score {
    if host.num_in == 0 {
        return Score::WORST;
    }
    let num_in = host.num_in as u64;
    let base = host
        .total_lag
        .saturating_mul(host.num_out as u64)
        / num_in.saturating_mul(num_in);
    let weighted = base.saturating_add(base.saturating_mul(host.hops_less_than as u64) / 10);
    Score(weighted.min(u64::MAX - 1))
}

/// Ordered table indices of the usable hosts, best first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferenceList {
    order: Vec<usize>,
}

impl PreferenceList {
    pub fn indices(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn first(&self) -> Option<usize> {
        self.order.first().copied()
    }

    /// Records in preference order.
    pub fn hosts<'a>(&'a self, table: &'a HostTable) -> impl Iterator<Item = &'a HostRecord> + 'a {
        self.order.iter().filter_map(move |&i| table.get(i))
    }
}

/// Stable sort of the non-invalid hosts by `(score, index)`.
pub fn rank(table: &HostTable) -> PreferenceList {
    let mut scored: Vec<(Score, usize)> = table
        .records()
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.invalid)
        .map(|(i, h)| (score(h), i))
        .collect();
    scored.sort();
    PreferenceList {
        order: scored.into_iter().map(|(_, i)| i).collect(),
    }
}

/// Per-host statistics for `mda probe` and the debug log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostReport {
    pub rank: Option<usize>,
    pub server: String,
    pub address: String,
    pub url: String,
    pub hops_more_than: u8,
    pub hops_less_than: u8,
    pub sent: u32,
    pub replies: u32,
    pub avg_lag_ms: Option<u64>,
    /// `None` for hosts that never answered.
    pub score: Option<Score>,
    pub invalid: bool,
}

impl HostReport {
    fn from_record(host: &HostRecord, rank: Option<usize>) -> Self {
        let s = score(host);
        Self {
            rank,
            server: host.server.clone(),
            address: host.address.to_string(),
            url: host.url.clone(),
            hops_more_than: host.hops_more_than,
            hops_less_than: host.hops_less_than,
            sent: host.num_out,
            replies: host.num_in,
            avg_lag_ms: host.avg_lag_ms(),
            score: (!s.is_worst()).then_some(s),
            invalid: host.invalid,
        }
    }
}

/// Ranked hosts first (in order), then the discarded ones in table order.
pub fn report(table: &HostTable, prefs: &PreferenceList) -> Vec<HostReport> {
    let mut out: Vec<HostReport> = prefs
        .indices()
        .iter()
        .enumerate()
        .filter_map(|(pos, &i)| table.get(i).map(|h| HostReport::from_record(h, Some(pos + 1))))
        .collect();
    out.extend(
        table
            .records()
            .iter()
            .filter(|h| h.invalid)
            .map(|h| HostReport::from_record(h, None)),
    );
    out
}
