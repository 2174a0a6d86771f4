//! Destination filename derivation.
//!
//! Output files are named after the last path segment of a URL (or an
//! explicit name from the task list), sanitized for Linux filesystems.

mod sanitize;

pub use sanitize::sanitize_filename_for_linux;

/// Name used when neither the explicit name nor the URL yields anything usable.
pub const DEFAULT_FILENAME: &str = "download.bin";

/// Last non-empty path segment of `url`, without the query string.
///
/// Falls back to the text after the last `/` when `url` does not parse.
pub fn last_path_segment(url: &str) -> Option<String> {
    let segment = match url::Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()?
            .filter(|s| !s.is_empty())
            .last()?
            .to_string(),
        Err(_) => {
            let no_query = url.split(['?', '#']).next().unwrap_or(url);
            no_query.rsplit('/').find(|s| !s.is_empty())?.to_string()
        }
    };
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment)
}

/// Filename for a task: `explicit` if given, else derived from `url`.
///
/// # Examples
///
/// - `derive_filename("http://h/dl/archive.rar?k=1", None)` → `"archive.rar"`
/// - `derive_filename("http://h/dl/x", Some("mine.bin"))` → `"mine.bin"`
pub fn derive_filename(url: &str, explicit: Option<&str>) -> String {
    let raw = explicit
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| last_path_segment(url));

    let Some(raw) = raw else {
        return DEFAULT_FILENAME.to_string();
    };
    let sanitized = sanitize_filename_for_linux(&raw);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}
