//! Operator status line: bytes done / total, rate, active workers.

use std::fmt;

const UNITS: [&str; 5] = [" B", "KB", "MB", "GB", "TB"];

/// Human-readable size with three decimals (`1.500MB`).
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value > 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.3}{}", value, UNITS[unit])
}

/// One checkpoint tick's view of the active task.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    /// Output file name of the task.
    pub name: String,
    /// Bytes already on disk (0 while the length is unknown).
    pub done: u64,
    /// Resource length, once known.
    pub total: Option<u64>,
    /// Bytes still pending across all ranges.
    pub remaining: u64,
    /// Throughput since the previous tick, bytes per second.
    pub bytes_per_sec: u64,
    /// Ranges currently receiving body bytes.
    pub active: usize,
}

impl StatusSnapshot {
    /// Fraction complete in [0.0, 1.0] (0 while the length is unknown).
    pub fn fraction(&self) -> f64 {
        match self.total {
            Some(0) => 1.0,
            Some(total) => (self.done as f64 / total as f64).min(1.0),
            None => 0.0,
        }
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = match self.total {
            Some(t) => format_size(t),
            None => "?".to_string(),
        };
        write!(
            f,
            "{}/{} {}/s #{}",
            format_size(self.done),
            total,
            format_size(self.bytes_per_sec),
            self.active
        )
    }
}
