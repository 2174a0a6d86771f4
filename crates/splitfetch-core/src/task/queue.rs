//! Lazily read descriptor list.

use crate::checkpoint::sidecar_path;
use crate::url_model::derive_filename;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One line of the descriptor list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEntry {
    pub descriptor: String,
    /// Explicit output filename (second token on the line).
    pub name: Option<String>,
}

impl TaskEntry {
    /// Destination name known before resolution.
    pub fn provisional_name(&self) -> String {
        derive_filename(&self.descriptor, self.name.as_deref())
    }
}

/// Parse one list line. Short lines and `#` comments yield `None`.
pub fn parse_entry(line: &str, min_len: usize) -> Option<TaskEntry> {
    let line = line.trim();
    if line.len() < min_len || line.starts_with('#') {
        return None;
    }
    let mut tokens = line.split_whitespace();
    let descriptor = tokens.next()?.to_string();
    let name = tokens.next().map(str::to_string);
    Some(TaskEntry { descriptor, name })
}

/// Descriptor source for the scheduler. Lines are read only when the next
/// task is needed, so the list may be appended to while the pool runs.
pub struct TaskQueue {
    lines: Box<dyn BufRead + Send>,
    dir: PathBuf,
    min_len: usize,
}

impl TaskQueue {
    pub fn open(path: &Path, dir: &Path, min_len: usize) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open task list {}", path.display()))?;
        Ok(Self::from_reader(BufReader::new(file), dir, min_len))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(reader: R, dir: &Path, min_len: usize) -> Self {
        Self {
            lines: Box::new(reader),
            dir: dir.to_path_buf(),
            min_len,
        }
    }

    /// Destination exists and no sidecar marks it unfinished. Only the
    /// pre-resolution name is known here; initialization repeats the check
    /// under the locator's name.
    fn already_done(&self, entry: &TaskEntry) -> bool {
        let dest = self.dir.join(entry.provisional_name());
        dest.exists() && !sidecar_path(&dest).exists()
    }
}

impl Iterator for TaskQueue {
    type Item = TaskEntry;

    fn next(&mut self) -> Option<TaskEntry> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.lines.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("task list read failed: {}", e);
                    return None;
                }
            }
            let Some(entry) = parse_entry(&line, self.min_len) else {
                continue;
            };
            if self.already_done(&entry) {
                tracing::info!(descriptor = %entry.descriptor, "destination complete, skipping");
                continue;
            }
            return Some(entry);
        }
    }
}
