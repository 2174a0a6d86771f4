//! Length probe: a libcurl `HEAD` against the locator at fresh task init.
//!
//! The probe is best effort. When it fails the task starts with an unknown
//! length and the first ranged response establishes it.

mod parse;

use crate::resolver::ResolvedLocator;
use anyhow::{Context, Result};
use std::str;
use std::time::Duration;

/// Headers of interest from a `HEAD` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadResult {
    /// Total size in bytes, if `Content-Length` is present.
    pub content_length: Option<u64>,
    /// True if the server sent `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
}

/// `HEAD` the locator with its headers. Runs on the calling thread.
pub fn probe(locator: &ResolvedLocator, user_agent: &str, timeout: Duration) -> Result<HeadResult> {
    let mut lines: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(&locator.url).context("invalid URL")?;
    easy.nobody(true)?;
    easy.useragent(user_agent)?;
    easy.connect_timeout(timeout)?;
    easy.timeout(timeout * 2)?;

    let mut list = curl::easy::List::new();
    for (k, v) in &locator.headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    if !locator.headers.is_empty() {
        easy.http_headers(list)?;
    }

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                lines.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.perform().context("HEAD request failed")?;
    }

    let code = easy.response_code().context("no response code")?;
    if code != 200 {
        anyhow::bail!("HEAD {} returned HTTP {}", locator.url, code);
    }
    Ok(parse::parse_headers(&lines))
}

/// Length reported by [`probe`], or `None` (logged) when the probe fails.
pub fn probe_length(locator: &ResolvedLocator, user_agent: &str, timeout: Duration) -> Option<u64> {
    match probe(locator, user_agent, timeout) {
        Ok(head) => {
            if !head.accept_ranges {
                tracing::debug!(url = %locator.url, "server did not advertise byte ranges");
            }
            head.content_length
        }
        Err(e) => {
            tracing::info!(url = %locator.url, "length probe failed, starting unbounded: {:#}", e);
            None
        }
    }
}
