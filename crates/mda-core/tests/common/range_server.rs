//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves one static body at any path. `Range: bytes=N-` and `bytes=N-M`
//! get 206 with a Content-Range; a start at or past the end gets 416 with
//! `bytes */total`.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// If false, Range is ignored and the full body comes back with 200.
    pub support_ranges: bool,
    /// Close the connection after this many body bytes of each response.
    pub drop_after: Option<usize>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            drop_after: None,
        }
    }
}

pub struct RangeServer {
    pub port: u16,
    requests: Arc<AtomicUsize>,
}

impl RangeServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}/{}", self.port, path.trim_start_matches('/'))
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, ServerOptions::default())
}

/// Serves `body` from a background thread until the process exits.
pub fn start_with_options(body: Vec<u8>, opts: ServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            counter.fetch_add(1, Ordering::SeqCst);
            thread::spawn(move || handle(stream, &body, opts));
        }
    });
    RangeServer { port, requests }
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().unwrap().port()
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return None,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
        if head.len() > 64 * 1024 {
            return None;
        }
    }
    String::from_utf8(head).ok()
}

fn handle(mut stream: TcpStream, body: &[u8], opts: ServerOptions) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(request) = read_head(&mut stream) else {
        return;
    };
    let (method, range) = parse_request(&request);
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }
    let total = body.len() as u64;
    let (status, content_range, slice) = match range.filter(|_| opts.support_ranges) {
        Some((start, _)) if start >= total => ("416 Range Not Satisfiable", Some(format!("bytes */{}", total)), &body[0..0]),
        Some((start, end_incl)) => {
            let end_excl = end_incl.saturating_add(1).min(total).max(start + 1);
            (
                "206 Partial Content",
                Some(format!("bytes {}-{}/{}", start, end_excl - 1, total)),
                &body[start as usize..end_excl as usize],
            )
        }
        None => ("200 OK", None, body),
    };
    let mut head = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n", status, slice.len());
    if opts.support_ranges {
        head.push_str("Accept-Ranges: bytes\r\n");
    }
    if let Some(cr) = content_range {
        head.push_str(&format!("Content-Range: {}\r\n", cr));
    }
    head.push_str("\r\n");
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    let sent = opts.drop_after.map_or(slice.len(), |n| n.min(slice.len()));
    let _ = stream.write_all(&slice[..sent]);
    let _ = stream.flush();
}

/// Method and `(start, end_inclusive)` of a `Range: bytes=` header.
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut lines = request.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("");
    let range = lines
        .take_while(|l| !l.trim().is_empty())
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("range"))
        .and_then(|(_, value)| {
            let spec = value.trim().strip_prefix("bytes=")?;
            let (a, b) = spec.split_once('-')?;
            let start = a.trim().parse::<u64>().ok()?;
            let end = match b.trim() {
                "" => u64::MAX,
                e => e.parse::<u64>().ok()?,
            };
            Some((start, end))
        });
    (method, range)
}
