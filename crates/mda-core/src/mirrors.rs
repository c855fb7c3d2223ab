//! Mirror discovery.
//!
//! A mirror index is any HTTP endpoint that, given a filename, returns a page
//! mentioning URLs of that file. Candidates are pulled out of the body by
//! scanning for absolute http/https/ftp URLs whose last path segment matches.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use crate::url_model::last_segment;

/// Largest index page read.
const MAX_INDEX_BYTES: usize = 4 * 1024 * 1024;

/// Returns candidate mirror URLs for a filename.
pub trait MirrorLookup {
    fn lookup(&self, filename: &str) -> Result<Vec<String>>;
}

/// Mirrors given on the command line.
#[derive(Debug, Clone, Default)]
pub struct StaticMirrors {
    urls: Vec<String>,
}

impl StaticMirrors {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }
}

impl MirrorLookup for StaticMirrors {
    fn lookup(&self, filename: &str) -> Result<Vec<String>> {
        for u in &self.urls {
            if last_segment(u).as_deref() != Some(filename) {
                tracing::warn!(mirror = %u, filename, "mirror URL names a different file, using it anyway");
            }
        }
        Ok(self.urls.clone())
    }
}

/// HTTP mirror index; `{filename}` in the template is replaced by the
/// URL-encoded filename.
#[derive(Debug, Clone)]
pub struct IndexLookup {
    template: String,
    timeout: Duration,
}

impl IndexLookup {
    pub fn new(template: impl Into<String>, timeout: Duration) -> Self {
        Self {
            template: template.into(),
            timeout,
        }
    }

    /// `filename` comes from a URL path and may already be percent-encoded;
    /// it is decoded once before being form-encoded into the query.
    pub fn query_url(&self, filename: &str) -> String {
        let raw: Vec<u8> = percent_encoding::percent_decode_str(filename).collect();
        let encoded: String = url::form_urlencoded::byte_serialize(&raw).collect();
        self.template.replace("{filename}", &encoded)
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        let mut easy = curl::easy::Easy::new();
        easy.url(url).context("invalid mirror index URL")?;
        easy.follow_location(true)?;
        easy.connect_timeout(self.timeout)?;
        easy.timeout(self.timeout * 2)?;
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| {
                if body.len() + data.len() > MAX_INDEX_BYTES {
                    return Ok(0);
                }
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform().context("mirror index request failed")?;
        }
        let code = easy.response_code().context("no response code")?;
        if !(200..300).contains(&code) {
            anyhow::bail!("mirror index {} returned HTTP {}", url, code);
        }
        Ok(body)
    }
}

impl MirrorLookup for IndexLookup {
    fn lookup(&self, filename: &str) -> Result<Vec<String>> {
        let url = self.query_url(filename);
        tracing::debug!(index = %url, "querying mirror index");
        let body = self.fetch(&url)?;
        let found = extract_mirror_urls(&String::from_utf8_lossy(&body), filename);
        tracing::info!(count = found.len(), "mirror index returned candidates");
        Ok(found)
    }
}

/// Absolute http/https/ftp URLs in `text` whose last segment is `filename`,
/// in order of first appearance.
pub fn extract_mirror_urls(text: &str, filename: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>' | '(' | ')' | '[' | ']'))
        .filter(|tok| !tok.is_empty())
        .filter_map(|tok| {
            let tok = tok.trim_end_matches(|c| matches!(c, ',' | ';' | '.'));
            let parsed = Url::parse(tok).ok()?;
            if !matches!(parsed.scheme(), "http" | "https" | "ftp") || parsed.host_str().is_none() {
                return None;
            }
            (last_segment(tok).as_deref() == Some(filename)).then(|| tok.to_string())
        })
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

/// Candidates from every source, in order, without duplicates. A failing
/// source is logged and skipped.
pub fn gather(sources: &[&dyn MirrorLookup], filename: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for source in sources {
        match source.lookup(filename) {
            Ok(urls) => out.extend(urls.into_iter().filter(|u| seen.insert(u.clone()))),
            Err(e) => tracing::warn!("mirror lookup failed: {:#}", e),
        }
    }
    out
}
