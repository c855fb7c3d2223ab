//! Parse response header lines into the bits needed to size a transfer.

use super::FetchError;

/// `Content-Range: bytes <start>-<end>/<total>`; `*` parts are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: Option<u64>,
    pub total: Option<u64>,
}

/// Headers of the final response (earlier redirect/1xx responses are dropped).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status: Option<u32>,
    pub content_length: Option<u64>,
    pub content_range: Option<ContentRange>,
    /// FTP `213 <size>` reply to SIZE.
    pub ftp_size: Option<u64>,
}

pub(crate) fn parse_headers(lines: &[String]) -> ResponseMeta {
    let mut meta = ResponseMeta::default();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("HTTP/")) {
            meta = ResponseMeta {
                status: line.split_whitespace().nth(1).and_then(|c| c.parse().ok()),
                ..ResponseMeta::default()
            };
            continue;
        }
        if let Some(size) = line.strip_prefix("213 ") {
            if meta.status.is_none() {
                meta.ftp_size = size.trim().parse().ok();
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                meta.content_length = value.parse().ok();
            } else if name.eq_ignore_ascii_case("content-range") {
                meta.content_range = parse_content_range(value);
            }
        }
    }
    meta
}

fn parse_content_range(value: &str) -> Option<ContentRange> {
    let value = value.trim();
    let rest = match value.get(..5) {
        Some(unit) if unit.eq_ignore_ascii_case("bytes") => value[5..].trim_start(),
        _ => value,
    };
    let (range, total) = rest.split_once('/')?;
    let start = match range.trim() {
        "*" => None,
        r => Some(r.split_once('-')?.0.trim().parse().ok()?),
    };
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some(ContentRange { start, total })
}

impl ResponseMeta {
    /// Total file size for a stream requested at `offset`.
    ///
    /// 416 with `*/total` where `total == offset` means there is nothing left
    /// to send and yields `total`.
    pub fn total_size(&self, offset: u64) -> Result<u64, FetchError> {
        match self.status {
            Some(206) => {
                if let Some(cr) = self.content_range {
                    if cr.start.is_some_and(|s| s != offset) {
                        return Err(FetchError::RangeNotSupported { offset });
                    }
                    if let Some(total) = cr.total {
                        return Ok(total);
                    }
                }
                self.content_length
                    .map(|len| offset + len)
                    .ok_or(FetchError::UnknownSize)
            }
            Some(200..=299) if offset > 0 => Err(FetchError::RangeNotSupported { offset }),
            Some(200..=299) => self.content_length.ok_or(FetchError::UnknownSize),
            Some(416) => match self.content_range.and_then(|cr| cr.total) {
                Some(total) if total == offset => Ok(total),
                _ => Err(FetchError::Http(416)),
            },
            Some(code) => Err(FetchError::Http(code)),
            None => self.ftp_size.ok_or(FetchError::UnknownSize),
        }
    }
}
