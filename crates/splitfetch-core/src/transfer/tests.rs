use super::*;
use crate::ledger::{Lease, RangeLedger, UNKNOWN_END};
use crate::resolver::ResolvedLocator;
use crate::retry::ErrorKind;
use crate::upstream::Upstream;
use crate::wire::RequestTemplate;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn read_head(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte) {
            Ok(0) | Err(_) => break,
            Ok(_) => buf.push(byte[0]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Accept one connection and play `replies`, one per request head received.
fn serve(replies: Vec<Vec<u8>>, linger: Duration) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut heads = Vec::new();
        for reply in replies {
            heads.push(read_head(&mut stream));
            let _ = stream.write_all(&reply);
        }
        thread::sleep(linger);
        heads
    });
    (addr, handle)
}

fn partial(body: &[u8], offset: usize, total: usize) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\n\r\n",
        total - offset,
        offset,
        total - 1,
        total
    )
    .into_bytes();
    out.extend_from_slice(&body[offset..]);
    out
}

fn template(port: u16) -> RequestTemplate {
    let locator = ResolvedLocator::new(format!("http://127.0.0.1:{}/dl/file.bin", port));
    RequestTemplate::new(&locator, "splitfetch-test", None, &[]).unwrap()
}

fn timeouts() -> Timeouts {
    Timeouts {
        connect: Duration::from_secs(2),
        stall: Duration::from_secs(2),
    }
}

fn lease(ledger: &RangeLedger) -> Arc<crate::ledger::Range> {
    match ledger.lease() {
        Lease::Granted(r) => r,
        other => panic!("expected a lease, got {:?}", other),
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    output: StorageWriter,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let output = StorageWriter::open_or_create(&dir.path().join("file.bin")).unwrap();
    Fixture { _dir: dir, output }
}

fn fetch_unknown_length(copier: &dyn BodyCopier) {
    let body = pattern(300_000);
    let (addr, server) = serve(vec![partial(&body, 0, body.len())], Duration::ZERO);
    let fx = fixture();
    let ledger = RangeLedger::seed(None, 1024);
    let range = lease(&ledger);
    assert_eq!(range.end(), UNKNOWN_END);

    let n = run_lease(
        &Upstream::Direct(addr),
        &template(addr.port()),
        &range,
        &ledger,
        &fx.output,
        copier,
        timeouts(),
    )
    .unwrap();

    assert_eq!(n, body.len() as u64);
    assert_eq!(ledger.length(), Some(body.len() as u64));
    assert!(range.is_finished());
    assert_eq!(std::fs::read(fx.output.path()).unwrap(), body);
    let heads = server.join().unwrap();
    assert!(heads[0].starts_with("GET /dl/file.bin HTTP/1.1\r\n"));
    assert!(heads[0].contains("Range: bytes=0-\r\n"));
}

#[test]
fn buffered_fetch_adopts_length_and_fills_file() {
    fetch_unknown_length(&BufferedCopy);
}

#[cfg(target_os = "linux")]
#[test]
fn splice_fetch_adopts_length_and_fills_file() {
    fetch_unknown_length(&SpliceCopy);
}

#[test]
fn resumes_at_range_offset() {
    let body = pattern(10_000);
    let (addr, server) = serve(vec![partial(&body, 4_000, body.len())], Duration::ZERO);
    let fx = fixture();
    fx.output.preallocate(body.len() as u64).unwrap();
    let ledger = RangeLedger::new(vec![(4_000, 10_000)], Some(10_000), 1024);
    let range = lease(&ledger);

    let n = run_lease(
        &Upstream::Direct(addr),
        &template(addr.port()),
        &range,
        &ledger,
        &fx.output,
        &BufferedCopy,
        timeouts(),
    )
    .unwrap();
    assert_eq!(n, 6_000);
    let on_disk = std::fs::read(fx.output.path()).unwrap();
    assert_eq!(&on_disk[4_000..], &body[4_000..]);
    assert!(on_disk[..4_000].iter().all(|b| *b == 0));
    assert!(server.join().unwrap()[0].contains("Range: bytes=4000-\r\n"));
}

#[test]
fn stops_at_shrunken_end() {
    // The server would send everything; the range only wants the first half.
    let body = pattern(8_192);
    let (addr, _server) = serve(vec![partial(&body, 0, body.len())], Duration::ZERO);
    let fx = fixture();
    let ledger = RangeLedger::new(vec![(0, 4_096)], Some(8_192), 1024);
    let range = lease(&ledger);

    let n = run_lease(
        &Upstream::Direct(addr),
        &template(addr.port()),
        &range,
        &ledger,
        &fx.output,
        &BufferedCopy,
        timeouts(),
    )
    .unwrap();
    assert_eq!(n, 4_096);
    assert_eq!(range.cur(), 4_096);
}

#[test]
fn full_response_means_link_expired() {
    let reply = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello".to_vec();
    let (addr, _server) = serve(vec![reply], Duration::ZERO);
    let fx = fixture();
    let ledger = RangeLedger::seed(Some(100), 10);
    let range = lease(&ledger);

    let err = run_lease(
        &Upstream::Direct(addr),
        &template(addr.port()),
        &range,
        &ledger,
        &fx.output,
        &BufferedCopy,
        timeouts(),
    )
    .unwrap_err();
    assert!(matches!(err, TransferError::LinkExpired));
    assert_eq!(err.kind(), ErrorKind::LinkExpiry);
    assert_eq!(range.cur(), 0);
}

#[test]
fn other_status_is_protocol_error() {
    let reply = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_vec();
    let (addr, _server) = serve(vec![reply], Duration::ZERO);
    let fx = fixture();
    let ledger = RangeLedger::seed(Some(100), 10);
    let range = lease(&ledger);

    let err = run_lease(
        &Upstream::Direct(addr),
        &template(addr.port()),
        &range,
        &ledger,
        &fx.output,
        &BufferedCopy,
        timeouts(),
    )
    .unwrap_err();
    match &err {
        TransferError::Status { status, detail } => {
            assert_eq!(*status, 404);
            assert_eq!(detail, "Not Found");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[test]
fn length_disagreement_is_consistency_error() {
    let body = pattern(2_000);
    let (addr, _server) = serve(vec![partial(&body, 0, body.len())], Duration::ZERO);
    let fx = fixture();
    let ledger = RangeLedger::seed(Some(1_000), 10);
    let range = lease(&ledger);

    let err = run_lease(
        &Upstream::Direct(addr),
        &template(addr.port()),
        &range,
        &ledger,
        &fx.output,
        &BufferedCopy,
        timeouts(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Consistency);
    assert_eq!(range.cur(), 0);
    assert_eq!(ledger.length(), Some(1_000));
}

#[test]
fn early_close_is_transport_error_and_keeps_progress() {
    let body = pattern(1_000);
    let mut reply = partial(&body, 0, body.len());
    reply.truncate(reply.len() - 400);
    let (addr, _server) = serve(vec![reply], Duration::ZERO);
    let fx = fixture();
    let ledger = RangeLedger::seed(Some(1_000), 10);
    let range = lease(&ledger);

    let err = run_lease(
        &Upstream::Direct(addr),
        &template(addr.port()),
        &range,
        &ledger,
        &fx.output,
        &BufferedCopy,
        timeouts(),
    )
    .unwrap_err();
    assert!(matches!(err, TransferError::UnexpectedEof { at: 600, end: 1_000 }));
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(range.cur(), 600);
}

#[test]
fn silent_server_stalls() {
    let head = b"HTTP/1.1 206 Partial Content\r\nContent-Length: 100\r\n\r\n".to_vec();
    let (addr, _server) = serve(vec![head], Duration::from_secs(3));
    let fx = fixture();
    let ledger = RangeLedger::seed(Some(100), 10);
    let range = lease(&ledger);

    let err = run_lease(
        &Upstream::Direct(addr),
        &template(addr.port()),
        &range,
        &ledger,
        &fx.output,
        &BufferedCopy,
        Timeouts {
            connect: Duration::from_secs(2),
            stall: Duration::from_millis(300),
        },
    )
    .unwrap_err();
    assert!(matches!(err, TransferError::Stalled(_)), "{:?}", err);
}

#[test]
fn tunnel_connects_before_ranged_get() {
    let body = pattern(5_000);
    let established = b"HTTP/1.1 200 Connection established\r\n\r\n".to_vec();
    let (addr, server) = serve(
        vec![established, partial(&body, 0, body.len())],
        Duration::ZERO,
    );
    let fx = fixture();
    let ledger = RangeLedger::seed(Some(5_000), 1024);
    let range = lease(&ledger);
    let locator = ResolvedLocator::new("http://origin.test/file.bin");
    let template =
        RequestTemplate::new(&locator, "ua", None, &["Proxy-Authorization: Basic eA==".into()])
            .unwrap();

    run_lease(
        &Upstream::Tunnel(addr.to_string()),
        &template,
        &range,
        &ledger,
        &fx.output,
        &BufferedCopy,
        timeouts(),
    )
    .unwrap();
    assert_eq!(std::fs::read(fx.output.path()).unwrap(), body);

    let heads = server.join().unwrap();
    assert!(heads[0].starts_with("CONNECT origin.test:80 HTTP/1.1\r\n"));
    assert!(heads[0].contains("Proxy-Authorization: Basic eA==\r\n"));
    assert!(heads[1].starts_with("GET /file.bin HTTP/1.1\r\n"));
    assert!(heads[1].contains("Host: origin.test\r\n"));
}

#[test]
fn tunnel_refusal_reports_proxy_error() {
    let refused =
        b"HTTP/1.1 403 Forbidden\r\nX-Squid-Error: ERR_ACCESS_DENIED 0\r\n\r\n".to_vec();
    let (addr, _server) = serve(vec![refused], Duration::ZERO);
    let fx = fixture();
    let ledger = RangeLedger::seed(Some(5_000), 1024);
    let range = lease(&ledger);
    let locator = ResolvedLocator::new("http://origin.test/file.bin");
    let template = RequestTemplate::new(&locator, "ua", None, &[]).unwrap();

    let err = run_lease(
        &Upstream::Tunnel(addr.to_string()),
        &template,
        &range,
        &ledger,
        &fx.output,
        &BufferedCopy,
        timeouts(),
    )
    .unwrap_err();
    match err {
        TransferError::Tunnel { status, detail } => {
            assert_eq!(status, 403);
            assert_eq!(detail, "ERR_ACCESS_DENIED 0");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn backend_selection() {
    assert_eq!(copier_for(TransferBackend::Buffered).name(), "buffered");
    #[cfg(target_os = "linux")]
    assert_eq!(copier_for(TransferBackend::Splice).name(), "splice");
}
