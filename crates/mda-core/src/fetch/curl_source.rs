//! libcurl data source.
//!
//! Each opened stream runs its transfer on a helper thread. The body is handed
//! to the reader through a bounded channel; the total size is reported back as
//! soon as the first body bytes arrive (headers are complete by then) or when
//! the transfer ends without a body.

use std::cell::RefCell;
use std::io::{self, Read};
use std::str;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;
use std::time::Duration;

use curl::easy::{Easy, List};

use super::parse::parse_headers;
use super::{Endpoint, FetchError, OpenedStream, RangeSource};
use crate::url_model::Target;

/// Body blocks buffered between the curl thread and the reader.
const CHANNEL_DEPTH: usize = 64;

type OpenResult = Result<u64, FetchError>;

#[derive(Debug, Clone)]
pub struct CurlSource {
    connect_timeout: Duration,
    user_agent: String,
}

impl Default for CurlSource {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl CurlSource {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            user_agent: format!("mda/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    fn build(&self, endpoint: &Endpoint, offset: u64) -> Result<Easy, curl::Error> {
        let mut easy = Easy::new();
        easy.url(&endpoint.url)?;
        easy.follow_location(true)?;
        easy.useragent(&self.user_agent)?;
        easy.connect_timeout(self.connect_timeout)?;
        // Abort below 1 KiB/s for a minute instead of a wall-clock limit.
        easy.low_speed_limit(1024)?;
        easy.low_speed_time(Duration::from_secs(60))?;
        if offset > 0 {
            easy.resume_from(offset)?;
        }
        if let (Some(addr), Ok(target)) = (endpoint.address, Target::parse(&endpoint.url)) {
            let mut pins = List::new();
            pins.append(&format!("{}:{}:{}", target.server, target.port, addr))?;
            easy.resolve(pins)?;
        }
        Ok(easy)
    }
}

impl RangeSource for CurlSource {
    fn open(&self, endpoint: &Endpoint, offset: u64) -> Result<OpenedStream, FetchError> {
        let easy = self.build(endpoint, offset)?;
        let (open_tx, open_rx) = mpsc::sync_channel::<OpenResult>(1);
        let (data_tx, data_rx) = mpsc::sync_channel::<io::Result<Vec<u8>>>(CHANNEL_DEPTH);

        let server = endpoint.server.clone();
        thread::Builder::new()
            .name(format!("curl-{}", endpoint.server))
            .spawn(move || drive(easy, offset, open_tx, data_tx, &server))?;

        match open_rx.recv() {
            Ok(Ok(total_size)) => {
                tracing::debug!(host = %endpoint.server, offset, total_size, "data connection open");
                Ok(OpenedStream {
                    total_size,
                    reader: Box::new(ChannelReader::new(data_rx)),
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(FetchError::NoResponse),
        }
    }
}

fn drive(
    mut easy: Easy,
    offset: u64,
    open_tx: SyncSender<OpenResult>,
    data_tx: SyncSender<io::Result<Vec<u8>>>,
    server: &str,
) {
    let headers = RefCell::new(Vec::<String>::new());
    let pending = RefCell::new(Some(open_tx));
    let outcome = perform(&mut easy, offset, &headers, &pending, &data_tx);

    let unopened = pending.borrow_mut().take();
    match (unopened, outcome) {
        (Some(tx), outcome) => {
            // No body arrived: either an empty remainder or a failure.
            let sized = parse_headers(&headers.borrow()).total_size(offset);
            let result = match (sized, outcome) {
                (Ok(total), _) if total == offset => Ok(total),
                (_, Err(e)) => Err(FetchError::Curl(e)),
                (Ok(_), Ok(())) => Err(FetchError::NoResponse),
                (Err(e), Ok(())) => Err(e),
            };
            let _ = tx.send(result);
        }
        (None, Err(e)) if !e.is_write_error() => {
            tracing::debug!(host = %server, "transfer failed mid-stream: {}", e);
            let _ = data_tx.send(Err(io::Error::new(io::ErrorKind::Other, e)));
        }
        (None, _) => {}
    }
}

fn perform(
    easy: &mut Easy,
    offset: u64,
    headers: &RefCell<Vec<String>>,
    pending: &RefCell<Option<SyncSender<OpenResult>>>,
    data_tx: &SyncSender<io::Result<Vec<u8>>>,
) -> Result<(), curl::Error> {
    let mut transfer = easy.transfer();
    transfer.header_function(|data| {
        if let Ok(s) = str::from_utf8(data) {
            headers.borrow_mut().push(s.trim_end().to_string());
        }
        true
    })?;
    transfer.write_function(|data| {
        if let Some(tx) = pending.borrow_mut().take() {
            let sized = parse_headers(&headers.borrow()).total_size(offset);
            let ok = sized.is_ok();
            if tx.send(sized).is_err() || !ok {
                // Accepting fewer bytes than offered aborts the transfer.
                return Ok(0);
            }
        }
        match data_tx.send(Ok(data.to_vec())) {
            Ok(()) => Ok(data.len()),
            Err(_) => Ok(0),
        }
    })?;
    transfer.perform()
}

/// Reader side of the body channel. A closed channel is end of stream.
struct ChannelReader {
    rx: Receiver<io::Result<Vec<u8>>>,
    block: Vec<u8>,
    pos: usize,
}

impl ChannelReader {
    fn new(rx: Receiver<io::Result<Vec<u8>>>) -> Self {
        Self {
            rx,
            block: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos == self.block.len() {
            match self.rx.recv() {
                Ok(Ok(block)) => {
                    self.block = block;
                    self.pos = 0;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.block.len() - self.pos);
        buf[..n].copy_from_slice(&self.block[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
