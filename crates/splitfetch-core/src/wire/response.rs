//! Status line and header block parsing.

use std::io::{self, BufRead, Read};

/// Header blocks larger than this are treated as malformed.
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Header set by squid-style proxies to explain a refusal.
const PROXY_ERROR_HEADER: &str = "x-squid-error";

/// Failure to read a well-formed response head. Distinct from a status code
/// the caller does not accept.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("connection closed before response head was complete")]
    Truncated,
    #[error("malformed status line: {0:?}")]
    StatusLine(String),
    #[error("malformed header line: {0:?}")]
    HeaderLine(String),
    #[error("response head exceeds 16 KiB")]
    TooLarge,
    #[error("read response head: {0}")]
    Io(#[from] io::Error),
}

/// Parsed status line plus the few headers the transfer engine acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    /// `Content-Length`: bytes the server will send after the head.
    pub content_length: Option<u64>,
    /// Complete length from `Content-Range: bytes a-b/total`, if given.
    pub range_total: Option<u64>,
    /// Proxy error text, which supersedes `reason` when present.
    pub proxy_error: Option<String>,
}

impl ResponseHead {
    /// Most specific text for log lines and error reports.
    pub fn detail(&self) -> &str {
        self.proxy_error.as_deref().unwrap_or(&self.reason)
    }

    /// Total resource length implied by a 206 answer to a read starting at
    /// `offset`: the length header counts only the bytes being sent.
    pub fn total_length(&self, offset: u64) -> Option<u64> {
        self.content_length
            .and_then(|len| len.checked_add(offset))
            .or(self.range_total)
    }
}

/// Read one response head from `r`, leaving any body bytes buffered in it.
pub fn read_response_head<R: BufRead>(r: &mut R) -> Result<ResponseHead, ParseError> {
    let mut consumed = 0usize;
    let status_line = read_line(r, &mut consumed)?.ok_or(ParseError::Truncated)?;
    let (status, reason) = parse_status_line(&status_line)?;

    let mut head = ResponseHead {
        status,
        reason,
        content_length: None,
        range_total: None,
        proxy_error: None,
    };

    loop {
        let line = read_line(r, &mut consumed)?.ok_or(ParseError::Truncated)?;
        if line.is_empty() {
            return Ok(head);
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ParseError::HeaderLine(line.clone()))?;
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            let n = value
                .parse::<u64>()
                .map_err(|_| ParseError::HeaderLine(line.clone()))?;
            head.content_length = Some(n);
        } else if name.eq_ignore_ascii_case("content-range") {
            head.range_total = parse_range_total(value);
        } else if name.eq_ignore_ascii_case(PROXY_ERROR_HEADER) {
            head.proxy_error = Some(value.to_string());
        }
    }
}

/// Read a CRLF- (or LF-) terminated line without its terminator.
/// `Ok(None)` means the stream ended before a terminator.
fn read_line<R: BufRead>(r: &mut R, consumed: &mut usize) -> Result<Option<String>, ParseError> {
    let mut buf = Vec::with_capacity(128);
    let limit = (MAX_HEAD_BYTES - *consumed) as u64;
    let n = Read::take(&mut *r, limit).read_until(b'\n', &mut buf)?;
    *consumed += n;
    if buf.last() != Some(&b'\n') {
        if *consumed >= MAX_HEAD_BYTES {
            return Err(ParseError::TooLarge);
        }
        return Ok(None);
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

fn parse_status_line(line: &str) -> Result<(u16, String), ParseError> {
    let bad = || ParseError::StatusLine(line.to_string());
    let mut parts = line.splitn(3, ' ');
    let proto = parts.next().ok_or_else(bad)?;
    if !proto.starts_with("HTTP/") {
        return Err(bad());
    }
    let code = parts.next().ok_or_else(bad)?;
    if code.len() != 3 {
        return Err(bad());
    }
    let status = code.parse::<u16>().map_err(|_| bad())?;
    let reason = parts.next().unwrap_or("").trim().to_string();
    Ok((status, reason))
}

/// `bytes 100-999/1000` → 1000; `bytes */1000` → 1000; `*` total → None.
fn parse_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor, Read};

    fn parse(raw: &str) -> Result<ResponseHead, ParseError> {
        read_response_head(&mut BufReader::new(Cursor::new(raw.as_bytes().to_vec())))
    }

    #[test]
    fn partial_content_with_length() {
        let h = parse("HTTP/1.1 206 Partial Content\r\nContent-Length: 600\r\nAccept-Ranges: bytes\r\n\r\n")
            .unwrap();
        assert_eq!(h.status, 206);
        assert_eq!(h.reason, "Partial Content");
        assert_eq!(h.content_length, Some(600));
        assert_eq!(h.total_length(400), Some(1000));
    }

    #[test]
    fn content_range_total_used_without_length() {
        let h = parse("HTTP/1.1 206 Partial Content\r\nContent-Range: bytes 10-99/100\r\n\r\n").unwrap();
        assert_eq!(h.content_length, None);
        assert_eq!(h.range_total, Some(100));
        assert_eq!(h.total_length(10), Some(100));
    }

    #[test]
    fn ok_status_is_reported_not_rejected() {
        let h = parse("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n").unwrap();
        assert_eq!(h.status, 200);
        assert_eq!(h.detail(), "OK");
    }

    #[test]
    fn proxy_error_supersedes_reason() {
        let h = parse(
            "HTTP/1.1 503 Service Unavailable\r\nX-Squid-Error: ERR_CONNECT_FAIL 111\r\nServer: squid\r\n\r\n",
        )
        .unwrap();
        assert_eq!(h.status, 503);
        assert_eq!(h.detail(), "ERR_CONNECT_FAIL 111");
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let h = parse("HTTP/1.0 206 x\r\ncontent-length:42\r\n\r\n").unwrap();
        assert_eq!(h.content_length, Some(42));
    }

    #[test]
    fn body_bytes_stay_in_reader() {
        let raw = b"HTTP/1.1 206 Partial Content\r\nContent-Length: 4\r\n\r\nBODY".to_vec();
        let mut r = BufReader::new(Cursor::new(raw));
        read_response_head(&mut r).unwrap();
        let mut body = String::new();
        r.read_to_string(&mut body).unwrap();
        assert_eq!(body, "BODY");
    }

    #[test]
    fn truncated_head_is_parse_failure() {
        assert!(matches!(
            parse("HTTP/1.1 206 Partial Content\r\nContent-Length: 4\r\n"),
            Err(ParseError::Truncated)
        ));
        assert!(matches!(parse(""), Err(ParseError::Truncated)));
    }

    #[test]
    fn malformed_lines_are_parse_failures() {
        assert!(matches!(
            parse("garbage\r\n\r\n"),
            Err(ParseError::StatusLine(_))
        ));
        assert!(matches!(
            parse("HTTP/1.1 2x6 Partial\r\n\r\n"),
            Err(ParseError::StatusLine(_))
        ));
        assert!(matches!(
            parse("HTTP/1.1 206 Partial\r\nno colon here\r\n\r\n"),
            Err(ParseError::HeaderLine(_))
        ));
        assert!(matches!(
            parse("HTTP/1.1 206 Partial\r\nContent-Length: abc\r\n\r\n"),
            Err(ParseError::HeaderLine(_))
        ));
    }

    #[test]
    fn oversized_head_is_rejected() {
        let mut raw = String::from("HTTP/1.1 206 Partial Content\r\n");
        while raw.len() < MAX_HEAD_BYTES + 100 {
            raw.push_str("X-Filler: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n");
        }
        raw.push_str("\r\n");
        assert!(matches!(parse(&raw), Err(ParseError::TooLarge)));
    }

    #[test]
    fn consecutive_heads_share_one_reader() {
        // A tunnel answers CONNECT, then the origin answers the GET on the same stream.
        let mut raw: &[u8] =
            b"HTTP/1.1 200 Connection established\r\n\r\nHTTP/1.1 206 Partial Content\r\nContent-Length: 3\r\n\r\nabc";
        let first = read_response_head(&mut raw).unwrap();
        assert_eq!(first.status, 200);
        let second = read_response_head(&mut raw).unwrap();
        assert_eq!(second.status, 206);
        assert_eq!(second.content_length, Some(3));
        assert_eq!(raw, b"abc");
    }
}
