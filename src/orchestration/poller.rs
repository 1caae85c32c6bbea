//! # Remote Convergence Poller
//!
//! Calls a remote status check until a predicate over its value holds. Errors
//! from the check are counted, not fatal, until they exceed the tolerance. Every
//! poll is bounded by attempts or by wall time, and a converged check returns
//! at once without sleeping.
//!
//! Used for data-move completion, load-balancer settling and server readiness.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::config::PollerConfig;
use crate::error::{CommissionerError, Result};

/// Completion threshold for percentage-based checks
pub const PERCENT_COMPLETE: f64 = 100.0;

/// Anything at or above 100 counts as done, so rounding cannot stall a poll
pub fn percent_complete(percent: &f64) -> bool {
    *percent >= PERCENT_COMPLETE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollBound {
    MaxAttempts(u32),
    MaxDuration(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome<T> {
    pub value: T,
    pub attempts: u32,
    pub errors: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct ConvergencePoller {
    operation: String,
    delay: Duration,
    max_errors: u32,
    bound: PollBound,
    log_every: u32,
}

impl ConvergencePoller {
    pub fn new(operation: impl Into<String>, delay: Duration, bound: PollBound) -> Self {
        Self {
            operation: operation.into(),
            delay,
            max_errors: 0,
            bound,
            log_every: 100,
        }
    }

    /// Poller bounded by the configured total wait
    pub fn from_config(operation: impl Into<String>, config: &PollerConfig) -> Self {
        Self::new(
            operation,
            config.wait_each_attempt(),
            PollBound::MaxDuration(config.max_wait()),
        )
        .with_error_tolerance(config.max_errors_to_ignore)
        .with_log_every(config.log_every_num_iters)
    }

    /// Number of failed checks tolerated; one more fails the poll
    pub fn with_error_tolerance(mut self, max_errors: u32) -> Self {
        self.max_errors = max_errors;
        self
    }

    pub fn with_log_every(mut self, iterations: u32) -> Self {
        self.log_every = iterations.max(1);
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub async fn poll<T, F, Fut, P>(&self, mut check: F, converged: P) -> Result<PollOutcome<T>>
    where
        T: Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&T) -> bool,
    {
        let started = Instant::now();
        let mut attempts: u32 = 0;
        let mut errors: u32 = 0;
        let mut last_progress: Option<String> = None;

        loop {
            attempts += 1;
            match check().await {
                Ok(value) => {
                    if converged(&value) {
                        debug!(
                            operation = %self.operation,
                            attempts = attempts,
                            errors = errors,
                            "Poll converged"
                        );
                        return Ok(PollOutcome {
                            value,
                            attempts,
                            errors,
                            elapsed: started.elapsed(),
                        });
                    }
                    last_progress = Some(format!("{value:?}"));
                }
                Err(e) => {
                    errors += 1;
                    if errors > self.max_errors {
                        return Err(CommissionerError::TooManyErrors {
                            operation: self.operation.clone(),
                            errors,
                            last_error: e.to_string(),
                        });
                    }
                    debug!(
                        operation = %self.operation,
                        errors = errors,
                        error = %e,
                        "Poll check failed, tolerating"
                    );
                }
            }

            if attempts % self.log_every == 0 {
                info!(
                    operation = %self.operation,
                    attempts = attempts,
                    errors = errors,
                    progress = last_progress.as_deref().unwrap_or("none"),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "⏳ Waiting for convergence"
                );
            }

            let exhausted = match self.bound {
                PollBound::MaxAttempts(max) => attempts >= max,
                PollBound::MaxDuration(max) => started.elapsed() >= max,
            };
            if exhausted {
                return Err(CommissionerError::Timeout {
                    operation: self.operation.clone(),
                    attempts,
                    elapsed: started.elapsed(),
                    last_progress,
                });
            }

            sleep(self.delay).await;
        }
    }
}
