//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves static bodies by path. `HEAD` answers with the length; `GET` with
//! an open-ended `Range: bytes=N-` answers `206` with the remaining bytes.
//! Paths under an expired prefix answer `200` with the full body, the way an
//! origin ignores ranges once a signed link has gone stale.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405 so the client cannot learn the length up front.
    pub head_allowed: bool,
    /// Paths starting with one of these answer ranged GETs with 200.
    pub expired_prefixes: Vec<String>,
    /// Pause between body chunks, to keep several transfers in flight.
    pub chunk_delay: Option<Duration>,
}

impl RangeServerOptions {
    pub fn new() -> Self {
        Self {
            head_allowed: true,
            ..Self::default()
        }
    }
}

/// Handle to a running server. The server runs until the process exits.
pub struct RangeServer {
    pub addr: SocketAddr,
    log: Arc<Mutex<Vec<(String, Option<u64>)>>>,
    gets: Arc<AtomicUsize>,
}

impl RangeServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// `(path, range start)` of every GET served so far.
    pub fn requests(&self) -> Vec<(String, Option<u64>)> {
        self.log.lock().unwrap().clone()
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

const CHUNK: usize = 16 * 1024;

pub fn start(resources: Vec<(&str, Vec<u8>)>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().unwrap();
    let resources: Arc<HashMap<String, Arc<Vec<u8>>>> = Arc::new(
        resources
            .into_iter()
            .map(|(p, b)| (p.to_string(), Arc::new(b)))
            .collect(),
    );
    let opts = Arc::new(opts);
    let log = Arc::new(Mutex::new(Vec::new()));
    let gets = Arc::new(AtomicUsize::new(0));
    {
        let log = Arc::clone(&log);
        let gets = Arc::clone(&gets);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let resources = Arc::clone(&resources);
                let opts = Arc::clone(&opts);
                let log = Arc::clone(&log);
                let gets = Arc::clone(&gets);
                thread::spawn(move || handle(stream, &resources, &opts, &log, &gets));
            }
        });
    }
    RangeServer { addr, log, gets }
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 || buf.len() > 16 * 1024 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8(buf).ok()
}

fn handle(
    mut stream: TcpStream,
    resources: &HashMap<String, Arc<Vec<u8>>>,
    opts: &RangeServerOptions,
    log: &Mutex<Vec<(String, Option<u64>)>>,
    gets: &AtomicUsize,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(request) = read_head(&mut stream) else {
        return;
    };
    let (method, path, range) = parse_request(&request);
    let lookup = path.split('?').next().unwrap_or(&path).to_string();
    let body = resources.iter().find_map(|(p, b)| {
        let plain = lookup == *p;
        let versioned = lookup.ends_with(p.as_str()) && lookup.starts_with("/v");
        (plain || versioned).then(|| Arc::clone(b))
    });
    let Some(body) = body else {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        return;
    };
    let total = body.len() as u64;

    if method == "HEAD" {
        let reply = if opts.head_allowed {
            format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\n\r\n",
                total
            )
        } else {
            "HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n".to_string()
        };
        let _ = stream.write_all(reply.as_bytes());
        return;
    }
    if method != "GET" {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
        return;
    }

    gets.fetch_add(1, Ordering::SeqCst);
    log.lock().unwrap().push((path.clone(), range));
    let expired = opts.expired_prefixes.iter().any(|p| path.starts_with(p));
    let (head, start) = match range {
        Some(start) if !expired && start < total => (
            format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\n\r\n",
                total - start,
                start,
                total - 1,
                total
            ),
            start as usize,
        ),
        Some(start) if !expired => (
            format!(
                "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\n\r\n",
                total
            ),
            start.min(total) as usize,
        ),
        _ => (
            format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", total),
            0,
        ),
    };
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    if head.contains(" 416 ") {
        return;
    }
    for chunk in body[start..].chunks(CHUNK) {
        if stream.write_all(chunk).is_err() {
            return;
        }
        if let Some(d) = opts.chunk_delay {
            thread::sleep(d);
        }
    }
}

/// `(method, path, open-ended range start)`.
fn parse_request(request: &str) -> (String, String, Option<u64>) {
    let mut lines = request.lines();
    let mut first = lines.next().unwrap_or("").split_whitespace();
    let method = first.next().unwrap_or("").to_string();
    let path = first.next().unwrap_or("/").to_string();
    let mut range = None;
    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                range = value
                    .trim()
                    .strip_prefix("bytes=")
                    .and_then(|v| v.strip_suffix('-'))
                    .and_then(|v| v.parse::<u64>().ok());
            }
        }
    }
    (method, path, range)
}
