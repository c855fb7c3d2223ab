//! URL handling for mirror targets.
//!
//! Derives the local filename from the target URL (last path segment, or the
//! hostname when the path has none) and splits mirror URLs into the pieces the
//! prober and the transfer layer need.

use anyhow::{Context, Result};
use url::Url;

/// Linux NAME_MAX.
const NAME_MAX: usize = 255;

/// Server/path view of a mirror URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Full URL as supplied.
    pub url: String,
    /// Hostname (no port).
    pub server: String,
    /// Port, or the scheme default.
    pub port: u16,
    /// URL path (always starts with `/`).
    pub path: String,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self> {
        let parsed = Url::parse(raw).with_context(|| format!("invalid URL: {}", raw))?;
        let server = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .with_context(|| format!("URL has no host: {}", raw))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .with_context(|| format!("URL has no known port: {}", raw))?;
        Ok(Self {
            url: raw.to_string(),
            server,
            port,
            path: parsed.path().to_string(),
        })
    }
}

/// Last non-empty path segment of `url`, if any.
pub fn last_segment(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// Local filename for a download: the last path segment, falling back to the
/// hostname, sanitized for Linux.
pub fn derive_filename(url: &str) -> Result<String> {
    let target = Target::parse(url)?;
    let raw = last_segment(url).unwrap_or(target.server);
    let name = sanitize(&raw);
    if name.is_empty() {
        anyhow::bail!("cannot derive a filename from {}", url);
    }
    Ok(name)
}

/// Replaces `/`, `\`, NUL, whitespace and control characters with `_`, trims
/// leading/trailing dots and underscores, and caps the length at NAME_MAX bytes.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let bad = c == '/' || c == '\\' || c.is_control() || c.is_whitespace();
        let c = if bad { '_' } else { c };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let mut take = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}
