//! Upstream paths: the distinct network routes workers fetch through.
//!
//! Each line of the upstream list names one path:
//!
//! - `203.0.113.7` or `203.0.113.7:8080`: dial that address directly (an
//!   alternate edge address for the locator's host)
//! - `direct`: dial the locator's own host
//! - `proxy://host:port`: dial a forward proxy and `CONNECT` through it
//!
//! Blank lines and `#` comments are ignored.

use crate::wire::RequestTarget;
use anyhow::{Context, Result};
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

const PROXY_SCHEME: &str = "proxy://";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamParseError {
    #[error("not an IP address or ip:port: {0}")]
    InvalidAddress(String),
    #[error("proxy entry needs host:port: {0}")]
    InvalidProxy(String),
}

/// One network route to the resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upstream {
    /// Connect to this address; the request still names the locator's host.
    Direct(SocketAddr),
    /// Connect to the locator's host via normal name resolution.
    Resolve,
    /// Connect to a forward proxy (`host:port`) and tunnel to the locator.
    Tunnel(String),
}

impl Upstream {
    pub fn is_tunnel(&self) -> bool {
        matches!(self, Upstream::Tunnel(_))
    }

    /// Open a TCP connection for a request addressed to `target`.
    pub fn connect(&self, target: &RequestTarget, timeout: Duration) -> io::Result<TcpStream> {
        let stream = match self {
            Upstream::Direct(addr) => TcpStream::connect_timeout(addr, timeout)?,
            Upstream::Resolve => connect_any((target.host.as_str(), target.port), timeout)?,
            Upstream::Tunnel(proxy) => connect_any(proxy.as_str(), timeout)?,
        };
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Upstream::Direct(addr) => write!(f, "{}", addr),
            Upstream::Resolve => f.write_str("direct"),
            Upstream::Tunnel(proxy) => write!(f, "{}{}", PROXY_SCHEME, proxy),
        }
    }
}

fn connect_any<A: ToSocketAddrs>(addr: A, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for candidate in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(s) => return Ok(s),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses to connect to")
    }))
}

/// Parse one upstream list line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str, default_port: u16) -> Result<Option<Upstream>, UpstreamParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    if line.eq_ignore_ascii_case("direct") {
        return Ok(Some(Upstream::Resolve));
    }
    if let Some(rest) = line.strip_prefix(PROXY_SCHEME) {
        let authority = rest.trim_end_matches('/');
        let valid = authority
            .rsplit_once(':')
            .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
            .unwrap_or(false);
        if !valid {
            return Err(UpstreamParseError::InvalidProxy(line.to_string()));
        }
        return Ok(Some(Upstream::Tunnel(authority.to_string())));
    }
    if let Ok(addr) = line.parse::<SocketAddr>() {
        return Ok(Some(Upstream::Direct(addr)));
    }
    match line.parse::<IpAddr>() {
        Ok(ip) => Ok(Some(Upstream::Direct(SocketAddr::new(ip, default_port)))),
        Err(_) => Err(UpstreamParseError::InvalidAddress(line.to_string())),
    }
}

/// Parse a whole upstream list, logging and skipping malformed lines.
pub fn parse_list(text: &str, default_port: u16) -> Vec<Upstream> {
    let mut out = Vec::new();
    for (n, line) in text.lines().enumerate() {
        match parse_line(line, default_port) {
            Ok(Some(u)) => out.push(u),
            Ok(None) => {}
            Err(e) => tracing::warn!(line = n + 1, "skipping upstream entry: {}", e),
        }
    }
    out
}

/// Load the upstream list file. Fails if it yields no usable path.
pub fn load_upstreams(path: &Path, default_port: u16) -> Result<Vec<Upstream>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read upstream list {}", path.display()))?;
    let upstreams = parse_list(&text, default_port);
    if upstreams.is_empty() {
        anyhow::bail!("no usable upstream paths in {}", path.display());
    }
    tracing::info!(count = upstreams.len(), "loaded upstream paths");
    Ok(upstreams)
}
