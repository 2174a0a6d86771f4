//! Per-worker pauses after a lease ends.

use super::policy::ErrorKind;
use crate::config::FetchConfig;
use std::time::Duration;

/// Pauses a worker observes around a failed or idle lease cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldowns {
    /// Pause after any failed transfer, once the range is released.
    pub failure: Duration,
    /// Extra hold on the lease before a consistency failure is released.
    pub consistency_hold: Duration,
    /// Pause when the ledger has nothing to lease.
    pub idle: Duration,
}

impl Default for Cooldowns {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for Cooldowns {
    fn from(cfg: &FetchConfig) -> Self {
        Self {
            failure: Duration::from_secs(cfg.failure_cooldown_secs),
            consistency_hold: Duration::from_secs(cfg.consistency_cooldown_secs),
            idle: cfg.idle_backoff(),
        }
    }
}

impl Cooldowns {
    /// Time to keep holding the lease before releasing it.
    pub fn hold_before_release(&self, kind: ErrorKind) -> Option<Duration> {
        match kind {
            ErrorKind::Consistency if !self.consistency_hold.is_zero() => {
                Some(self.consistency_hold)
            }
            _ => None,
        }
    }

    /// Pause after the range has been released.
    pub fn after_release(&self, kind: Option<ErrorKind>) -> Option<Duration> {
        match kind {
            None => None,
            Some(_) if self.failure.is_zero() => None,
            Some(_) => Some(self.failure),
        }
    }
}
