//! Splitting the remaining byte range into per-worker chunks.

/// Half-open byte range `[start, end)` of the remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Worker count actually used: bounded by the request, the usable hosts and
/// the remaining bytes, and at least one.
pub fn effective_workers(requested: usize, hosts: usize, remaining: u64) -> usize {
    let by_bytes = usize::try_from(remaining).unwrap_or(usize::MAX);
    requested.min(hosts).min(by_bytes).max(1)
}

/// Equal chunks covering `[local, total)`; the last one absorbs the remainder.
/// Empty when there is nothing left to fetch.
pub fn plan_chunks(local: u64, total: u64, workers: usize, hosts: usize) -> Vec<Chunk> {
    if total <= local {
        return Vec::new();
    }
    let remaining = total - local;
    let n = effective_workers(workers, hosts, remaining);
    let size = remaining / n as u64;
    (0..n)
        .map(|i| {
            let start = local + i as u64 * size;
            let end = if i + 1 == n { total } else { start + size };
            Chunk { index: i, start, end }
        })
        .collect()
}
