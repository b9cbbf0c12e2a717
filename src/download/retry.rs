//! Bounded retry with a fixed, counted-down delay.

use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::constants::{MAX_DOWNLOAD_RETRIES, RETRY_DELAY};
use crate::core::UpdateError;

/// Status reported between attempts so a UI can show "retrying in N seconds".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStatus {
    /// A transient failure occurred and retry number `retry` will follow after `delay`.
    Scheduled {
        retry: u32,
        max_retries: u32,
        delay: Duration,
        reason: String,
    },
    /// Whole seconds left before retry number `retry` starts.
    Countdown {
        retry: u32,
        seconds_left: u64,
    },
}

impl RetryStatus {
    /// One-line status suitable for a progress bar.
    pub fn message(&self) -> String {
        match self {
            Self::Scheduled {
                retry,
                max_retries,
                delay,
                reason,
            } => format!(
                "Connection problem ({reason}), retry {retry}/{max_retries} in {} seconds",
                delay.as_secs()
            ),
            Self::Countdown {
                seconds_left,
                ..
            } => format!("Retrying in {seconds_left} seconds..."),
        }
    }
}

/// Retries transient failures a fixed number of times with a fixed delay.
///
/// Only errors classified as transient are retried. Any other error, including
/// [`UpdateError::Cancelled`], propagates after the attempt that produced it.
/// When the budget runs out, the last error propagates. Cancelling the token
/// during a delay ends the loop with [`UpdateError::Cancelled`] immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_DOWNLOAD_RETRIES, RETRY_DELAY)
    }
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
        }
    }

    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `operation` until it succeeds, fails fatally, or the retry budget is spent.
    ///
    /// `operation` receives the zero-based attempt number. `on_status` receives a
    /// [`RetryStatus::Scheduled`] after each transient failure followed by one
    /// [`RetryStatus::Countdown`] per remaining second of the delay.
    pub async fn run<T, Op, Fut, S>(
        &self,
        cancel: &CancellationToken,
        mut operation: Op,
        mut on_status: S,
    ) -> Result<T, UpdateError>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, UpdateError>>,
        S: FnMut(RetryStatus),
    {
        let mut delays = FixedInterval::new(self.delay).take(self.max_retries as usize);
        let mut attempt = 0u32;

        loop {
            let error = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() => error,
                Err(error) => return Err(error),
            };

            let Some(delay) = delays.next() else {
                warn!("Giving up after {} retries: {}", self.max_retries, error);
                return Err(error);
            };

            attempt += 1;
            warn!("Attempt {} failed with transient error: {}", attempt, error);
            on_status(RetryStatus::Scheduled {
                retry: attempt,
                max_retries: self.max_retries,
                delay,
                reason: error.to_string(),
            });

            countdown(attempt, delay, cancel, &mut on_status).await?;
        }
    }
}

async fn countdown<S: FnMut(RetryStatus)>(
    retry: u32,
    delay: Duration,
    cancel: &CancellationToken,
    on_status: &mut S,
) -> Result<(), UpdateError> {
    let whole = delay.as_secs();
    for seconds_left in (1..=whole).rev() {
        on_status(RetryStatus::Countdown {
            retry,
            seconds_left,
        });
        sleep_or_cancel(Duration::from_secs(1), cancel).await?;
    }

    let rest = delay.saturating_sub(Duration::from_secs(whole));
    if !rest.is_zero() {
        sleep_or_cancel(rest, cancel).await?;
    }
    Ok(())
}

async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<(), UpdateError> {
    tokio::select! {
        () = cancel.cancelled() => {
            debug!("Retry countdown cancelled");
            Err(UpdateError::Cancelled)
        }
        () = tokio::time::sleep(duration) => Ok(()),
    }
}
