//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap upstream dials and dispatches with an optional deadline
//! - Report expiry distinctly from other failures
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - `None` means no deadline; the future runs to completion
//! - Timed-out requests return 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

/// The deadline elapsed before the operation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExceeded(pub Duration);

impl std::fmt::Display for DeadlineExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "deadline of {:?} exceeded", self.0)
    }
}

impl std::error::Error for DeadlineExceeded {}

/// Run `future`, bounded by `deadline` when one is set.
pub async fn with_deadline<F>(deadline: Option<Duration>, future: F) -> Result<F::Output, DeadlineExceeded>
where
    F: Future,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| DeadlineExceeded(limit)),
        None => Ok(future.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_deadline_runs_to_completion() {
        let out = with_deadline(None, async { 7 }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_off_slow_future() {
        let out = with_deadline(Some(Duration::from_secs(1)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;
        assert_eq!(out, Err(DeadlineExceeded(Duration::from_secs(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_future_beats_deadline() {
        let out = with_deadline(Some(Duration::from_secs(5)), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            "done"
        })
        .await;
        assert_eq!(out, Ok("done"));
    }
}
