//! Retry and backoff policy.
//!
//! Failures are classified into an [`ErrorKind`]. Descriptor resolution is
//! retried with exponential backoff; ranged transfers are not retried on the
//! same lease, instead the worker releases its range and sits out a cooldown
//! chosen from the kind.

mod cooldown;
mod policy;
mod run;

pub use cooldown::Cooldowns;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
