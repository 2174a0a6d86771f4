//! Checkpoint store: the sidecar file of pending ranges.
//!
//! The sidecar sits next to the output file (`<dest>.ranges`) and holds one
//! `cur:end` line per pending range. It is rewritten wholesale on every tick
//! and deleted when the task completes; at startup it is the only source of
//! resume state.

mod status;
mod ticker;

pub use status::{format_size, StatusSnapshot};
pub use ticker::{spawn_ticker, TickOutcome, Ticker};

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Suffix appended to the output path to name its sidecar.
pub const SIDECAR_SUFFIX: &str = ".ranges";

/// Sidecar path for an output file: `file.iso` → `file.iso.ranges`.
pub fn sidecar_path(dest: &Path) -> PathBuf {
    let mut o = dest.as_os_str().to_owned();
    o.push(SIDECAR_SUFFIX);
    PathBuf::from(o)
}

/// Render pending spans in sidecar format.
pub fn serialize(spans: &[(u64, u64)]) -> String {
    let mut out = String::with_capacity(spans.len() * 24);
    for (cur, end) in spans {
        out.push_str(&format!("{}:{}\n", cur, end));
    }
    out
}

/// Parse one sidecar line. Only `cur:end` with `cur < end` is accepted.
pub fn parse_line(line: &str) -> Option<(u64, u64)> {
    let (cur, end) = line.trim().split_once(':')?;
    let cur = cur.parse::<u64>().ok()?;
    let end = end.parse::<u64>().ok()?;
    (cur < end).then_some((cur, end))
}

/// Parse a whole sidecar, skipping lines that do not parse cleanly.
pub fn parse<R: BufRead>(reader: R) -> Vec<(u64, u64)> {
    let mut spans = Vec::new();
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Some(span) => spans.push(span),
            None => tracing::debug!(line = %line, "ignoring unusable sidecar line"),
        }
    }
    spans
}

/// Read the pending spans from a sidecar path (empty if missing).
pub fn read_spans(path: &Path) -> Result<Vec<(u64, u64)>> {
    match File::open(path) {
        Ok(f) => Ok(parse(BufReader::new(f))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e).with_context(|| format!("open sidecar {}", path.display())),
    }
}

/// Scratch file a new sidecar is written to before it replaces the old one.
fn staging_path(path: &Path) -> PathBuf {
    let mut o = path.as_os_str().to_owned();
    o.push(".tmp");
    PathBuf::from(o)
}

/// Sidecar of the active task.
///
/// Every rewrite goes to `<sidecar>.tmp`, is synced, and then renamed over
/// the sidecar, so a crash leaves either the previous or the new contents.
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    /// Open (creating if needed) the sidecar at `path`. Contents are kept.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open sidecar: {}", path.display()))?;
        file.sync_all()
            .with_context(|| format!("sync sidecar {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Pending spans currently recorded in the sidecar.
    pub fn read_spans(&self) -> Result<Vec<(u64, u64)>> {
        read_spans(&self.path)
    }

    /// Replace the sidecar contents with `spans`.
    pub fn rewrite(&self, spans: &[(u64, u64)]) -> Result<()> {
        let staging = staging_path(&self.path);
        let mut file = File::create(&staging)
            .with_context(|| format!("create {}", staging.display()))?;
        file.write_all(serialize(spans).as_bytes())
            .with_context(|| format!("write {}", staging.display()))?;
        file.sync_data()
            .with_context(|| format!("sync {}", staging.display()))?;
        drop(file);
        std::fs::rename(&staging, &self.path).with_context(|| {
            format!("replace {} with {}", self.path.display(), staging.display())
        })?;
        sync_parent(&self.path);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the sidecar and any leftover staging file.
    pub fn remove(self) -> Result<()> {
        let _ = std::fs::remove_file(staging_path(&self.path));
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove sidecar {}", self.path.display())),
        }
    }
}

/// Persist the rename itself. Best effort.
#[cfg(unix)]
fn sync_parent(path: &Path) {
    let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!(dir = %dir.display(), "directory sync failed: {}", e);
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}
