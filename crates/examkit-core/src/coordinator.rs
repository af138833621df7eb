//! Submission coordinator.
//!
//! Sends a frozen [`Submission`] to the gateway with bounded exponential
//! backoff, and refuses to start a second request while one is outstanding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{GatewayError, SubmitError};
use crate::model::GradeResult;
use crate::traits::{ExamGateway, Submission};

/// Retry and timeout settings for submission attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Timeout for each gateway request, distinct from the exam countdown.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// A submission the gateway accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub result: GradeResult,
    /// Gateway calls made, including the successful one.
    pub attempts: u32,
}

/// Guarantees at most one in-flight submission per session.
pub struct SubmissionCoordinator {
    gateway: Arc<dyn ExamGateway>,
    policy: RetryPolicy,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the submit future finishes or is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SubmissionCoordinator {
    pub fn new(gateway: Arc<dyn ExamGateway>, policy: RetryPolicy) -> Self {
        Self {
            gateway,
            policy,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Whether a submission is currently outstanding.
    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Submit `submission`, retrying transient failures.
    ///
    /// Every attempt sends the same payload. Permanent gateway errors fail
    /// immediately; a per-attempt timeout counts as transient.
    pub async fn submit(&self, submission: &Submission) -> Result<Accepted, SubmitError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(
                attempt_id = %submission.attempt_id,
                "submit called while a submission is in flight, rejecting"
            );
            return Err(SubmitError::AlreadySubmitting);
        }
        let _guard = InFlight(&self.in_flight);

        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.policy.delay_for(attempt - 1);
                debug!(attempt, ?delay, "backing off before retrying submission");
                tokio::time::sleep(delay).await;
            }

            let outcome =
                match tokio::time::timeout(self.policy.attempt_timeout, self.gateway.submit(submission))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(GatewayError::Timeout(self.policy.attempt_timeout.as_secs())),
                };

            match outcome {
                Ok(result) => {
                    info!(
                        assessment_id = %submission.assessment_id,
                        attempt_id = %submission.attempt_id,
                        attempt,
                        score = result.score,
                        "submission accepted"
                    );
                    return Ok(Accepted {
                        result,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_permanent() => {
                    warn!(attempt, error = %e, "submission rejected, not retrying");
                    return Err(SubmitError::Failed {
                        last_error: e,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "transient submission failure");
                    last_error = Some(e);
                }
            }
        }

        Err(SubmitError::Failed {
            last_error: last_error
                .unwrap_or_else(|| GatewayError::Network("no attempt was made".into())),
            attempts: max_attempts,
        })
    }
}
