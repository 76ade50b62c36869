//! Bounded polling for asynchronous provider operations
//!
//! Builds and function activation finish on the provider side some time
//! after the request returns. [`poll_until`] checks on a fixed interval for a
//! fixed number of attempts and can be aborted through a [`CancelToken`].

use crate::error::{CloudError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

/// Interval and attempt budget for one polling step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollConfig {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Image build: every 15 seconds, up to 30 times
    pub fn build() -> Self {
        Self::new(Duration::from_secs(15), 30)
    }

    /// Function activation: every 5 seconds, up to 15 times
    pub fn function() -> Self {
        Self::new(Duration::from_secs(5), 15)
    }
}

/// Result of a single check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Pending(String),
    Done(String),
    /// Terminal failure, no further attempts
    Failed(String),
}

/// Sending half of a cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving half of a cancellation signal
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Create a linked cancel handle and token
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelToken {
    /// A token that is never cancelled
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Sender gone without cancelling: never resolves
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Call `check` until it reports `Done`, a terminal failure, or the budget runs out.
///
/// Returns the number of checks made. An `Err` from `check` is treated as a
/// transient pending attempt.
pub async fn poll_until<F, Fut>(
    step: &str,
    config: &PollConfig,
    cancel: &CancelToken,
    mut check: F,
) -> Result<u32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Progress>>,
{
    let mut cancel = cancel.clone();
    let mut last_state = String::from("unknown");

    for attempt in 1..=config.max_attempts {
        if cancel.is_cancelled() {
            return Err(CloudError::Cancelled(step.to_string()));
        }

        match check().await {
            Ok(Progress::Done(state)) => {
                tracing::debug!(step, attempt, %state, "Poll finished");
                return Ok(attempt);
            }
            Ok(Progress::Failed(state)) => {
                return Err(CloudError::DefinitiveFailure {
                    step: step.to_string(),
                    state,
                });
            }
            Ok(Progress::Pending(state)) => {
                tracing::debug!(step, attempt, %state, "Still waiting");
                last_state = state;
            }
            Err(e) => {
                tracing::warn!(step, attempt, "Transient error while polling: {}", e);
                last_state = e.to_string();
            }
        }

        // No wait after the final attempt
        if attempt < config.max_attempts {
            tokio::select! {
                _ = sleep(config.interval) => {}
                _ = cancel.cancelled() => {
                    return Err(CloudError::Cancelled(step.to_string()));
                }
            }
        }
    }

    Err(CloudError::Timeout {
        step: step.to_string(),
        attempts: config.max_attempts,
        last_state,
    })
}
