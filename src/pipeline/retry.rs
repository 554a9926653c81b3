// src/pipeline/retry.rs

//! Failure classification and per-task retry.
//!
//! Wraps one full task execution (session open through pagination
//! completion). Transient conditions are retried with capped exponential
//! backoff; structural ones fail the task immediately. A task that
//! exhausts its attempts is marked permanently failed and surfaced with
//! the last failure reason; it never aborts the rest of the run.

use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::{AppError, Result};
use crate::models::{CrawlTask, CrawlerConfig, RawRecord, TaskOutcome, TaskResult};

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth retrying with a fresh session
    Transient,
    /// No amount of retrying will help
    Permanent,
}

/// Classify an error from a task attempt.
pub fn classify(err: &AppError) -> FailureClass {
    match err {
        AppError::SessionTransient(_) => FailureClass::Transient,
        AppError::ElementTimeout { .. } => FailureClass::Transient,
        AppError::Http(e) => {
            if e.is_timeout() || e.is_connect() {
                FailureClass::Transient
            } else if let Some(status) = e.status() {
                // A server-side hiccup may clear; a client error will not
                if status.is_server_error() {
                    FailureClass::Transient
                } else {
                    FailureClass::Permanent
                }
            } else {
                FailureClass::Transient
            }
        }
        _ => FailureClass::Permanent,
    }
}

/// Retry schedule for one task execution.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.retry_delay_ms),
            Duration::from_millis(config.max_retry_delay_ms),
        )
    }

    /// Delay before the next attempt: base × 2^(attempt−1), capped.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << (attempt - 1).min(16);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Run `attempt_fn` until it succeeds, fails permanently, or the
    /// attempt budget is spent.
    pub async fn run<'f, F>(&self, task: &CrawlTask, mut attempt_fn: F) -> TaskResult
    where
        F: FnMut(u32) -> BoxFuture<'f, Result<Vec<RawRecord>>>,
    {
        let mut last_reason = String::new();

        for attempt in 1..=self.max_attempts {
            match attempt_fn(attempt).await {
                Ok(records) => {
                    return TaskResult {
                        task: task.clone(),
                        records,
                        attempts: attempt,
                        outcome: TaskOutcome::Succeeded,
                    };
                }
                Err(err) => {
                    let class = classify(&err);
                    last_reason = err.to_string();

                    if class == FailureClass::Permanent {
                        log::warn!("{}: permanent failure: {}", task.label(), last_reason);
                        return TaskResult {
                            task: task.clone(),
                            records: vec![],
                            attempts: attempt,
                            outcome: TaskOutcome::FailedPermanently(last_reason),
                        };
                    }

                    if attempt < self.max_attempts {
                        let delay = self.backoff(attempt);
                        log::warn!(
                            "{}: attempt {}/{} failed ({}), retrying in {:?}",
                            task.label(),
                            attempt,
                            self.max_attempts,
                            last_reason,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        log::warn!(
            "{}: giving up after {} attempts: {}",
            task.label(),
            self.max_attempts,
            last_reason
        );
        TaskResult {
            task: task.clone(),
            records: vec![],
            attempts: self.max_attempts,
            outcome: TaskOutcome::FailedPermanently(last_reason),
        }
    }
}
