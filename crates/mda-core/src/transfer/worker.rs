//! One chunk: open, read into its slice of the mapping, fail over on errors.

use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};

use super::board::Board;
use super::plan::Chunk;
use super::TransferError;
use crate::fetch::{Endpoint, FetchError, OpenedStream, RangeSource};
use crate::retry::{self, RetryPolicy};

/// State shared by every worker of one transfer.
pub(super) struct Shared<'a, S: ?Sized> {
    pub source: &'a S,
    pub endpoints: &'a [Endpoint],
    pub board: &'a Board,
    pub retry: RetryPolicy,
    pub received: &'a AtomicU64,
    /// Position of the entry the coordinator opened first.
    pub home: usize,
    pub total: u64,
}

/// A chunk, the entry serving it, and the slice it writes into.
pub(super) struct ChunkJob<'m> {
    pub chunk: Chunk,
    pub position: usize,
    pub buf: &'m mut [u8],
    /// Bytes of `buf` written so far, from its start.
    pub filled: usize,
}

enum Attempt {
    Done,
    /// The host misbehaved; try another.
    HostFailed,
}

impl<'m> ChunkJob<'m> {
    pub fn new(chunk: Chunk, position: usize, buf: &'m mut [u8]) -> Self {
        Self {
            chunk,
            position,
            buf,
            filled: 0,
        }
    }

    /// Runs the chunk to completion. `stream`, if given, is already open at
    /// the chunk's start on `self.position`.
    pub fn run<S: RangeSource + ?Sized>(
        &mut self,
        shared: &Shared<'_, S>,
        mut stream: Option<OpenedStream>,
    ) -> Result<(), TransferError> {
        loop {
            let endpoint = &shared.endpoints[self.position];
            let opened = match stream.take() {
                Some(s) => Ok(s),
                None => self.open(shared, endpoint),
            };
            let outcome = match opened {
                Ok(s) if s.total_size != shared.total => {
                    tracing::warn!(
                        host = %endpoint.server,
                        chunk = self.chunk.index,
                        size = s.total_size,
                        expected = shared.total,
                        "mirror reports a different file size"
                    );
                    Attempt::HostFailed
                }
                Ok(s) => self.fill(s, shared, endpoint)?,
                Err(e) => {
                    tracing::warn!(host = %endpoint.server, chunk = self.chunk.index, "cannot open data connection: {}", e);
                    Attempt::HostFailed
                }
            };
            match outcome {
                Attempt::Done => return Ok(()),
                Attempt::HostFailed => {
                    let failed = self.position;
                    self.position = shared.board.fail_over(failed, shared.home).ok_or_else(|| {
                        TransferError::Exhausted {
                            chunk: self.chunk.index,
                            last_host: endpoint.server.clone(),
                        }
                    })?;
                    tracing::info!(
                        chunk = self.chunk.index,
                        from = %endpoint.server,
                        to = %shared.endpoints[self.position].server,
                        "switching mirror"
                    );
                }
            }
        }
    }

    fn open<S: RangeSource + ?Sized>(
        &self,
        shared: &Shared<'_, S>,
        endpoint: &Endpoint,
    ) -> Result<OpenedStream, FetchError> {
        let offset = self.chunk.start + self.filled as u64;
        retry::run_with_retry(&shared.retry, retry::classify, |attempt| {
            if attempt > 1 {
                tracing::debug!(host = %endpoint.server, chunk = self.chunk.index, attempt, "retrying open");
            }
            shared.source.open(endpoint, offset)
        })
    }

    /// Reads until the slice is full. EOF before that is fatal; a read error
    /// hands the chunk to another host at the current fill level.
    fn fill<S: RangeSource + ?Sized>(
        &mut self,
        mut stream: OpenedStream,
        shared: &Shared<'_, S>,
        endpoint: &Endpoint,
    ) -> Result<Attempt, TransferError> {
        while self.filled < self.buf.len() {
            match stream.reader.read(&mut self.buf[self.filled..]) {
                Ok(0) => {
                    return Err(TransferError::ShortRead {
                        chunk: self.chunk.index,
                        expected: self.chunk.len(),
                        received: self.filled as u64,
                    });
                }
                Ok(n) => {
                    self.filled += n;
                    shared.received.fetch_add(n as u64, Ordering::Relaxed);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!(
                        host = %endpoint.server,
                        chunk = self.chunk.index,
                        at = self.chunk.start + self.filled as u64,
                        "read failed: {}",
                        e
                    );
                    return Ok(Attempt::HostFailed);
                }
            }
        }
        tracing::debug!(host = %endpoint.server, chunk = self.chunk.index, bytes = self.filled, "chunk complete");
        Ok(Attempt::Done)
    }
}
