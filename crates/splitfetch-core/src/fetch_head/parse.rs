//! Parse `HEAD` response header lines into a [`HeadResult`].

use super::HeadResult;

/// Later header blocks (after a redirect or `100 Continue`) override earlier ones.
pub(crate) fn parse_headers(lines: &[String]) -> HeadResult {
    let mut out = HeadResult::default();
    for line in lines {
        let line = line.trim();
        if line.starts_with("HTTP/") {
            out = HeadResult::default();
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            out.content_length = value.parse::<u64>().ok();
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            out.accept_ranges = value.eq_ignore_ascii_case("bytes");
        }
    }
    out
}
