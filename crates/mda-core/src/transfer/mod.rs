//! Parallel chunked transfer into a memory-mapped destination.
//!
//! The coordinator opens the first mirror that accepts a connection at the
//! resume offset, learns the total size from it, splits the rest of the file
//! into one chunk per worker and hands each chunk a disjoint slice of the
//! mapping. Chunk 0 reuses the coordinator's connection on the calling
//! thread; the others run on scoped threads. Hosts that fail are retired on
//! a shared board and the affected worker moves to the next free one.

mod board;
mod plan;
mod worker;


use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::fetch::{Endpoint, OpenedStream, RangeSource};
use crate::progress::ProgressReporter;
use crate::retry::{self, RetryPolicy};
use crate::storage::{Destination, StorageError};
use board::Board;
use worker::{ChunkJob, Shared};

pub use plan::{effective_workers, plan_chunks, Chunk};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("no mirror accepted a data connection ({tried} tried)")]
    NoUsableMirror { tried: usize },
    #[error("local file ({local} bytes) is larger than the remote file ({total} bytes)")]
    LocalLarger { local: u64, total: u64 },
    #[error("every mirror failed for chunk {chunk} (last tried: {last_host})")]
    Exhausted { chunk: usize, last_host: String },
    #[error("chunk {chunk} ended early: expected {expected} bytes, received {received}")]
    ShortRead {
        chunk: usize,
        expected: u64,
        received: u64,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("transfer worker panicked")]
    WorkerPanic,
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Draw the progress bar at this interval (when stdout is a terminal).
    pub progress: Option<Duration>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            retry: RetryPolicy::default(),
            progress: Some(Duration::from_secs(1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub total_size: u64,
    pub resumed_from: u64,
    pub transferred: u64,
    pub workers: usize,
    /// Server of the first mirror that accepted a connection.
    pub primary: String,
}

/// Downloads `[dest.local_size(), total)` from `endpoints` (best first).
///
/// `received` is bumped as bytes land and can be shared with other
/// observers. On failure the file is cut back to the contiguous prefix that
/// was actually written.
pub fn run<S: RangeSource + ?Sized>(
    dest: &Destination,
    endpoints: &[Endpoint],
    source: &S,
    opts: &TransferOptions,
    received: Arc<AtomicU64>,
) -> Result<TransferOutcome, TransferError> {
    let local = dest.local_size();
    let board = Board::new(endpoints.len());
    let (home, stream) = open_first(endpoints, source, &board, &opts.retry, local)?;
    let total = stream.total_size;
    let primary = endpoints[home].server.clone();

    if total < local {
        return Err(TransferError::LocalLarger { local, total });
    }
    if total == local {
        tracing::info!(total, "destination already complete");
        return Ok(TransferOutcome {
            total_size: total,
            resumed_from: local,
            transferred: 0,
            workers: 0,
            primary,
        });
    }

    let chunks = plan_chunks(local, total, opts.workers, board.usable());
    tracing::info!(
        total,
        resume = local,
        workers = chunks.len(),
        host = %primary,
        "starting transfer"
    );

    // The file length is the next run's resume point, so it must not stay
    // grown past `local` unless the mapped region is actually written.
    let mut region = match dest.preallocate(total).and_then(|()| dest.map_from(local, total)) {
        Ok(region) => region,
        Err(e) => {
            if let Err(t) = dest.truncate(local) {
                tracing::warn!("cannot restore original length: {}", t);
            }
            return Err(e.into());
        }
    };
    let mut jobs = carve(region.tail_mut(local), &chunks, &board, home);

    let reporter = opts
        .progress
        .and_then(|interval| ProgressReporter::start(local, total, Arc::clone(&received), interval));

    let shared = Shared {
        source,
        endpoints,
        board: &board,
        retry: opts.retry,
        received: &received,
        home,
        total,
    };
    let results = run_jobs(&mut jobs, &shared, stream);

    if let Some(r) = reporter {
        r.stop();
    }
    let prefix = contiguous_prefix(&jobs);
    drop(jobs);
    let flushed = region.flush();
    drop(region);

    if let Some(err) = results.into_iter().find_map(Result::err) {
        tracing::warn!(keep = local + prefix, "transfer failed, truncating to written prefix");
        dest.truncate(local + prefix)?;
        return Err(err);
    }
    flushed?;

    Ok(TransferOutcome {
        total_size: total,
        resumed_from: local,
        transferred: total - local,
        workers: chunks.len(),
        primary,
    })
}

/// First endpoint (in preference order) that opens at `offset`; the ones
/// that refuse are marked failed.
fn open_first<S: RangeSource + ?Sized>(
    endpoints: &[Endpoint],
    source: &S,
    board: &Board,
    policy: &RetryPolicy,
    offset: u64,
) -> Result<(usize, OpenedStream), TransferError> {
    for (pos, endpoint) in endpoints.iter().enumerate() {
        match retry::run_with_retry(policy, retry::classify, |_| source.open(endpoint, offset)) {
            Ok(stream) => {
                board.mark_busy(pos);
                return Ok((pos, stream));
            }
            Err(e) => {
                tracing::warn!(host = %endpoint.server, "cannot download from host: {}", e);
                board.mark_failed(pos);
            }
        }
    }
    Err(TransferError::NoUsableMirror {
        tried: endpoints.len(),
    })
}

/// Splits the mapped tail into one slice per chunk and assigns hosts: chunk 0
/// keeps `home`, the rest take the next free entries in order.
fn carve<'m>(mut tail: &'m mut [u8], chunks: &[Chunk], board: &Board, home: usize) -> Vec<ChunkJob<'m>> {
    let mut jobs = Vec::with_capacity(chunks.len());
    let mut prev = home;
    for (i, chunk) in chunks.iter().enumerate() {
        let (buf, rest) = std::mem::take(&mut tail).split_at_mut(chunk.len() as usize);
        tail = rest;
        let position = if i == 0 {
            home
        } else {
            board.claim(prev, home).unwrap_or(home)
        };
        prev = position;
        jobs.push(ChunkJob::new(*chunk, position, buf));
    }
    jobs
}

fn run_jobs<S: RangeSource + ?Sized>(
    jobs: &mut [ChunkJob<'_>],
    shared: &Shared<'_, S>,
    first_stream: OpenedStream,
) -> Vec<Result<(), TransferError>> {
    let Some((first, rest)) = jobs.split_first_mut() else {
        return Vec::new();
    };
    std::thread::scope(|scope| {
        let handles: Vec<_> = rest
            .iter_mut()
            .map(|job| scope.spawn(move || job.run(shared, None)))
            .collect();
        let mut results = vec![first.run(shared, Some(first_stream))];
        results.extend(
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(Err(TransferError::WorkerPanic))),
        );
        results
    })
}

/// Bytes written without a gap from the first chunk's start.
fn contiguous_prefix(jobs: &[ChunkJob<'_>]) -> u64 {
    let mut prefix = 0;
    for job in jobs {
        prefix += job.filled as u64;
        if job.filled as u64 != job.chunk.len() {
            break;
        }
    }
    prefix
}
