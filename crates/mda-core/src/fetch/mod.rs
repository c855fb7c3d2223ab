//! Range-capable data sources.
//!
//! The coordinator only needs "open a stream at byte offset O and tell me the
//! total size"; [`CurlSource`] provides it over libcurl.

mod curl_source;
mod parse;

use std::io::{self, Read};
use std::net::Ipv4Addr;
use thiserror::Error;

use crate::hosts::HostRecord;

pub use curl_source::CurlSource;
pub use parse::{ContentRange, ResponseMeta};

/// Where to fetch from: the mirror URL plus, when probed, the address to pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub server: String,
    pub url: String,
    pub address: Option<Ipv4Addr>,
}

impl Endpoint {
    /// The supplied URL, resolved by curl itself.
    pub fn direct(url: &str) -> Self {
        let server = crate::url_model::Target::parse(url)
            .map(|t| t.server)
            .unwrap_or_else(|_| url.to_string());
        Self {
            server,
            url: url.to_string(),
            address: None,
        }
    }
}

impl From<&HostRecord> for Endpoint {
    fn from(host: &HostRecord) -> Self {
        Self {
            server: host.server.clone(),
            url: host.url.clone(),
            address: Some(host.address),
        }
    }
}

/// An open data connection. Reading yields bytes from the requested offset on.
pub struct OpenedStream {
    pub total_size: u64,
    pub reader: Box<dyn Read + Send>,
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("total_size", &self.total_size)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Curl(#[from] curl::Error),
    #[error("HTTP {0}")]
    Http(u32),
    #[error("server ignored the range request at offset {offset}")]
    RangeNotSupported { offset: u64 },
    #[error("response does not state the file size")]
    UnknownSize,
    #[error("connection closed before a response arrived")]
    NoResponse,
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Opens data connections at a byte offset.
pub trait RangeSource: Sync {
    fn open(&self, endpoint: &Endpoint, offset: u64) -> Result<OpenedStream, FetchError>;
}
