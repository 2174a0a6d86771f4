//! Request template for open-ended `Range: bytes=N-` reads.

use anyhow::{Context, Result};
use std::io::{self, Write};

use crate::resolver::ResolvedLocator;

/// Host and port the ranged request is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub host: String,
    pub port: u16,
}

impl RequestTarget {
    /// `host:port` authority, as used by tunnel CONNECT.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Pre-rendered request for one locator.
///
/// `head` ends with `Range: bytes=`; rendering appends the decimal offset and
/// `-\r\n\r\n`. The template itself is immutable, so concurrent workers each
/// render into their own buffer.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    target: RequestTarget,
    head: Vec<u8>,
    connect: Vec<u8>,
}

impl RequestTemplate {
    /// Build the template for `locator`. Requests are always plain HTTP/1.1;
    /// a missing port means 80 regardless of scheme.
    pub fn new(
        locator: &ResolvedLocator,
        user_agent: &str,
        referer: Option<&str>,
        proxy_headers: &[String],
    ) -> Result<Self> {
        let url = url::Url::parse(&locator.url)
            .with_context(|| format!("invalid locator URL: {}", locator.url))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .with_context(|| format!("locator has no host: {}", locator.url))?
            .to_string();
        let port = url.port().unwrap_or(80);
        let mut path = url.path().to_string();
        if let Some(q) = url.query() {
            path.push('?');
            path.push_str(q);
        }

        let host_header = if port == 80 {
            host.clone()
        } else {
            format!("{}:{}", host, port)
        };
        let referer = locator
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("referer"))
            .map(|(_, v)| v.as_str())
            .or(referer);

        let mut head = Vec::with_capacity(512);
        write!(head, "GET {} HTTP/1.1\r\n", path)?;
        write!(head, "Host: {}\r\n", host_header)?;
        write!(head, "User-Agent: {}\r\n", user_agent)?;
        if let Some(r) = referer {
            write!(head, "Referer: {}\r\n", r)?;
        }
        let mut extra: Vec<_> = locator
            .headers
            .iter()
            .filter(|(k, _)| !is_managed_header(k))
            .collect();
        extra.sort();
        for (k, v) in extra {
            write!(head, "{}: {}\r\n", k.trim(), v.trim())?;
        }
        head.extend_from_slice(b"Connection: close\r\n");
        head.extend_from_slice(b"Range: bytes=");

        let target = RequestTarget { host, port };
        let mut connect = Vec::with_capacity(128);
        write!(connect, "CONNECT {} HTTP/1.1\r\n", target.authority())?;
        write!(connect, "Host: {}\r\n", target.authority())?;
        for line in proxy_headers {
            write!(connect, "{}\r\n", line.trim())?;
        }
        connect.extend_from_slice(b"\r\n");

        Ok(Self {
            target,
            head,
            connect,
        })
    }

    pub fn target(&self) -> &RequestTarget {
        &self.target
    }

    /// Full request bytes for a read starting at `offset`.
    pub fn render(&self, offset: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.head.len() + 28);
        buf.extend_from_slice(&self.head);
        buf.extend_from_slice(offset.to_string().as_bytes());
        buf.extend_from_slice(b"-\r\n\r\n");
        buf
    }

    pub fn write_request<W: Write>(&self, w: &mut W, offset: u64) -> io::Result<()> {
        w.write_all(&self.render(offset))?;
        w.flush()
    }

    /// Tunnel preamble sent to a forward proxy before the ranged GET.
    pub fn write_connect<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.connect)?;
        w.flush()
    }
}

fn is_managed_header(name: &str) -> bool {
    ["host", "user-agent", "referer", "connection", "range"]
        .iter()
        .any(|m| name.trim().eq_ignore_ascii_case(m))
}
