//! Retry loop: run a closure until success or policy says stop.

use super::policy::{ErrorKind, RetryDecision, RetryPolicy};
use std::fmt::Display;

/// Runs `f` until it succeeds or the retry policy says to stop.
/// `classify` maps each failure to an [`ErrorKind`]; on a retryable failure the
/// thread sleeps for the backoff duration and tries again.
pub fn run_with_retry<T, E, F, C>(policy: &RetryPolicy, classify: C, mut f: F) -> Result<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
    C: Fn(&E) -> ErrorKind,
    E: Display,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => match policy.decide(attempt, classify(&e)) {
                RetryDecision::NoRetry => return Err(e),
                RetryDecision::RetryAfter(d) => {
                    tracing::debug!(attempt, delay = ?d, "retrying after error: {}", e);
                    std::thread::sleep(d);
                    attempt += 1;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let r: Result<u32, String> = run_with_retry(
            &fast(5),
            |_| ErrorKind::Transport,
            |attempt| {
                if attempt < 3 {
                    Err(format!("fail {}", attempt))
                } else {
                    Ok(attempt)
                }
            },
        );
        assert_eq!(r, Ok(3));
    }

    #[test]
    fn gives_up_at_max_attempts() {
        let mut calls = 0;
        let r: Result<(), String> = run_with_retry(
            &fast(3),
            |_| ErrorKind::Protocol,
            |_| {
                calls += 1;
                Err("nope".to_string())
            },
        );
        assert!(r.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn non_retryable_stops_immediately() {
        let mut calls = 0;
        let r: Result<(), String> = run_with_retry(
            &fast(5),
            |_| ErrorKind::Storage,
            |_| {
                calls += 1;
                Err("disk full".to_string())
            },
        );
        assert!(r.is_err());
        assert_eq!(calls, 1);
    }
}
