//! Session state machine.
//!
//! One [`Session`] is one student's attempt at an assessment:
//!
//! ```text
//! Idle -> Loading -> InProgress -> Submitting -> Completed
//!            |                          |
//!            +--------> Failed <--------+
//! ```
//!
//! The machine is synchronous and does no I/O. Callers feed it the fetch
//! result, clock deltas, student commands and the coordinator's verdict; it
//! hands back the frozen [`Submission`] to send when `Submitting` is entered.
//! Triggers that arrive in the wrong state are logged and ignored.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::answers::AnswerStore;
use crate::coordinator::Accepted;
use crate::error::{AnswerError, AssessmentError, GatewayError, GatewayErrorKind, SubmitError};
use crate::model::{AnswerValue, Assessment, GradeResult, Question};
use crate::traits::Submission;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Loading,
    InProgress,
    Submitting,
    Completed,
    Failed,
}

impl SessionState {
    /// `Completed` and `Failed` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Loading => "loading",
            SessionState::InProgress => "in_progress",
            SessionState::Submitting => "submitting",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What caused the session to enter `Submitting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    /// The student pressed submit.
    Manual,
    /// The countdown reached zero.
    TimeExpired,
}

/// Why loading the assessment failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadFailure {
    NotFound,
    Forbidden,
    Network,
    EmptyAssessment,
    InvalidAssessment,
}

impl From<&GatewayError> for LoadFailure {
    fn from(e: &GatewayError) -> Self {
        match e {
            GatewayError::NotFound(_) => LoadFailure::NotFound,
            GatewayError::Forbidden(_) | GatewayError::Unauthorized(_) | GatewayError::Duplicate(_) => {
                LoadFailure::Forbidden
            }
            GatewayError::Server { .. } | GatewayError::Timeout(_) | GatewayError::Network(_) => {
                LoadFailure::Network
            }
            GatewayError::Validation(_) | GatewayError::InvalidResponse(_) => {
                LoadFailure::InvalidAssessment
            }
        }
    }
}

/// Distinguishable reason attached to a `Failed` session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    Load(LoadFailure),
    SubmissionFailed {
        cause: GatewayErrorKind,
        attempts: u32,
    },
}

/// What the host UI should offer the student after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    ContactSupport,
    ReturnToCourse,
}

/// A terminal failure: reason plus the underlying error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub reason: FailureReason,
    pub message: String,
}

impl Failure {
    pub fn recovery(&self) -> RecoveryAction {
        match self.reason {
            FailureReason::Load(LoadFailure::Network) => RecoveryAction::Retry,
            FailureReason::Load(LoadFailure::Forbidden | LoadFailure::InvalidAssessment) => {
                RecoveryAction::ContactSupport
            }
            FailureReason::Load(LoadFailure::NotFound | LoadFailure::EmptyAssessment) => {
                RecoveryAction::ReturnToCourse
            }
            FailureReason::SubmissionFailed { cause, .. } => match cause {
                GatewayErrorKind::Network
                | GatewayErrorKind::Timeout
                | GatewayErrorKind::Server
                | GatewayErrorKind::InvalidResponse => RecoveryAction::Retry,
                GatewayErrorKind::Forbidden
                | GatewayErrorKind::Unauthorized
                | GatewayErrorKind::Validation => RecoveryAction::ContactSupport,
                GatewayErrorKind::Duplicate | GatewayErrorKind::NotFound => {
                    RecoveryAction::ReturnToCourse
                }
            },
        }
    }
}

/// The graded result of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub result: GradeResult,
    pub trigger: SubmitTrigger,
    pub elapsed_seconds: u64,
    /// Gateway calls made by the attempt that was accepted.
    pub attempts: u32,
    pub completed_at: DateTime<Utc>,
}

/// Observable view of a session, published to the host UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub assessment_id: String,
    pub state: SessionState,
    pub current_question_index: usize,
    pub remaining_seconds: u64,
    pub total_questions: usize,
    pub answered_questions: usize,
    pub trigger: Option<SubmitTrigger>,
    pub outcome: Option<Outcome>,
    pub failure: Option<Failure>,
}

/// One live attempt at an assessment.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    assessment_id: String,
    state: SessionState,
    assessment: Option<Arc<Assessment>>,
    answers: Option<AnswerStore>,
    current_index: usize,
    remaining: Duration,
    trigger: Option<SubmitTrigger>,
    submission: Option<Arc<Submission>>,
    outcome: Option<Outcome>,
    failure: Option<Failure>,
}

impl Session {
    /// Create an idle session with a fresh attempt id.
    pub fn new(assessment_id: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), assessment_id)
    }

    pub fn with_id(id: Uuid, assessment_id: impl Into<String>) -> Self {
        Self {
            id,
            assessment_id: assessment_id.into(),
            state: SessionState::Idle,
            assessment: None,
            answers: None,
            current_index: 0,
            remaining: Duration::ZERO,
            trigger: None,
            submission: None,
            outcome: None,
            failure: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn assessment_id(&self) -> &str {
        &self.assessment_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn assessment(&self) -> Option<&Arc<Assessment>> {
        self.assessment.as_ref()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.assessment
            .as_ref()
            .and_then(|a| a.questions.get(self.current_index))
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Remaining time rounded up to whole seconds.
    pub fn remaining_seconds(&self) -> u64 {
        self.remaining.as_secs() + u64::from(self.remaining.subsec_nanos() > 0)
    }

    pub fn trigger(&self) -> Option<SubmitTrigger> {
        self.trigger
    }

    pub fn answer(&self, question_id: &str) -> Option<&AnswerValue> {
        self.answers.as_ref().and_then(|a| a.get(question_id))
    }

    /// The frozen payload, once `Submitting` has been entered.
    pub fn submission(&self) -> Option<&Arc<Submission>> {
        self.submission.as_ref()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// Whether the clock should be ticking.
    pub fn is_running(&self) -> bool {
        self.state == SessionState::InProgress
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            assessment_id: self.assessment_id.clone(),
            state: self.state,
            current_question_index: self.current_index,
            remaining_seconds: self.remaining_seconds(),
            total_questions: self.assessment.as_ref().map_or(0, |a| a.question_count()),
            answered_questions: self.answers.as_ref().map_or(0, |a| a.answered_count()),
            trigger: self.trigger,
            outcome: self.outcome.clone(),
            failure: self.failure.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// `Idle -> Loading`. Returns whether the transition happened.
    pub fn start(&mut self) -> bool {
        if self.state != SessionState::Idle {
            warn!(session_id = %self.id, state = %self.state, "start ignored");
            return false;
        }
        self.state = SessionState::Loading;
        debug!(session_id = %self.id, assessment_id = %self.assessment_id, "loading assessment");
        true
    }

    /// Apply the fetch result. Returns `true` when the session entered
    /// `InProgress` and the clock should start.
    pub fn on_loaded(&mut self, result: Result<Assessment, GatewayError>) -> bool {
        if self.state != SessionState::Loading {
            warn!(session_id = %self.id, state = %self.state, "fetch result ignored");
            return false;
        }

        let assessment = match result {
            Ok(assessment) => assessment,
            Err(e) => {
                self.fail(FailureReason::Load(LoadFailure::from(&e)), e.to_string());
                return false;
            }
        };

        if let Err(e) = assessment.validate() {
            let failure = match e {
                AssessmentError::Empty => LoadFailure::EmptyAssessment,
                _ => LoadFailure::InvalidAssessment,
            };
            self.fail(FailureReason::Load(failure), e.to_string());
            return false;
        }

        let assessment = Arc::new(assessment);
        self.remaining = assessment.duration();
        self.current_index = 0;
        self.answers = Some(AnswerStore::new(Arc::clone(&assessment)));
        info!(
            session_id = %self.id,
            assessment_id = %assessment.id,
            questions = assessment.question_count(),
            duration_secs = assessment.duration_seconds,
            "session in progress"
        );
        self.assessment = Some(assessment);
        self.state = SessionState::InProgress;
        true
    }

    // -----------------------------------------------------------------------
    // In progress
    // -----------------------------------------------------------------------

    /// Charge `delta` against the countdown.
    ///
    /// Reaching zero enters `Submitting` with `TimeExpired` before this call
    /// returns, so no later tick can observe an expired `InProgress` session.
    pub fn tick(&mut self, delta: Duration) -> Option<Arc<Submission>> {
        if self.state != SessionState::InProgress {
            debug!(session_id = %self.id, state = %self.state, "tick ignored");
            return None;
        }
        self.remaining = self.remaining.saturating_sub(delta);
        if self.remaining.is_zero() {
            info!(session_id = %self.id, "time expired, submitting");
            return self.begin_submitting(SubmitTrigger::TimeExpired);
        }
        None
    }

    /// Move to question `index`. Out-of-range indices are ignored.
    pub fn select_question(&mut self, index: usize) -> bool {
        if self.state != SessionState::InProgress {
            debug!(session_id = %self.id, state = %self.state, "navigation ignored");
            return false;
        }
        let count = self.assessment.as_ref().map_or(0, |a| a.question_count());
        if index >= count {
            debug!(session_id = %self.id, index, count, "navigation out of range ignored");
            return false;
        }
        self.current_index = index;
        true
    }

    pub fn next_question(&mut self) -> bool {
        match self.current_index.checked_add(1) {
            Some(index) => self.select_question(index),
            None => false,
        }
    }

    pub fn previous_question(&mut self) -> bool {
        match self.current_index.checked_sub(1) {
            Some(index) => self.select_question(index),
            None => {
                debug!(session_id = %self.id, "already at first question");
                false
            }
        }
    }

    /// Record an answer. Outside `InProgress` this is a no-op returning `Ok(false)`.
    pub fn set_answer(&mut self, question_id: &str, value: AnswerValue) -> Result<bool, AnswerError> {
        match (self.state, self.answers.as_mut()) {
            (SessionState::InProgress, Some(answers)) => answers.set_answer(question_id, value),
            _ => {
                debug!(session_id = %self.id, state = %self.state, question_id, "answer ignored");
                Ok(false)
            }
        }
    }

    /// Remove an answer. Outside `InProgress` this is a no-op returning `Ok(false)`.
    pub fn clear_answer(&mut self, question_id: &str) -> Result<bool, AnswerError> {
        match (self.state, self.answers.as_mut()) {
            (SessionState::InProgress, Some(answers)) => answers.clear_answer(question_id),
            _ => {
                debug!(session_id = %self.id, state = %self.state, question_id, "clear ignored");
                Ok(false)
            }
        }
    }

    /// Explicit student submit. Returns the payload to send, or `None` if the
    /// session is not `InProgress` (including when already `Submitting`).
    pub fn request_submit(&mut self) -> Option<Arc<Submission>> {
        self.begin_submitting(SubmitTrigger::Manual)
    }

    fn begin_submitting(&mut self, trigger: SubmitTrigger) -> Option<Arc<Submission>> {
        match self.state {
            SessionState::InProgress => {}
            SessionState::Submitting => {
                debug!(session_id = %self.id, ?trigger, "already submitting, trigger ignored");
                return None;
            }
            state => {
                warn!(session_id = %self.id, %state, ?trigger, "submit ignored");
                return None;
            }
        }

        let duration = self.assessment.as_ref().map_or(Duration::ZERO, |a| a.duration());
        let elapsed = duration.saturating_sub(self.remaining);
        let submission = Arc::new(Submission {
            assessment_id: self.assessment_id.clone(),
            attempt_id: self.id,
            answers: self.answers.as_ref().map(|a| a.snapshot()).unwrap_or_default(),
            elapsed_seconds: elapsed.as_secs(),
        });

        self.state = SessionState::Submitting;
        self.trigger = Some(trigger);
        self.submission = Some(Arc::clone(&submission));
        info!(
            session_id = %self.id,
            ?trigger,
            answered = submission.answers.len(),
            elapsed_secs = submission.elapsed_seconds,
            "submitting"
        );
        Some(submission)
    }

    // -----------------------------------------------------------------------
    // Submitting
    // -----------------------------------------------------------------------

    /// Apply the coordinator's verdict.
    pub fn on_submission_resolved(&mut self, result: Result<Accepted, SubmitError>) {
        if self.state != SessionState::Submitting {
            warn!(session_id = %self.id, state = %self.state, "submission result ignored");
            return;
        }

        match result {
            Ok(accepted) => {
                if self.outcome.is_some() {
                    error!(session_id = %self.id, "outcome already recorded, ignoring second acceptance");
                    return;
                }
                let elapsed_seconds = self.submission.as_ref().map_or(0, |s| s.elapsed_seconds);
                self.outcome = Some(Outcome {
                    result: accepted.result,
                    trigger: self.trigger.unwrap_or(SubmitTrigger::Manual),
                    elapsed_seconds,
                    attempts: accepted.attempts,
                    completed_at: Utc::now(),
                });
                self.state = SessionState::Completed;
                info!(session_id = %self.id, attempts = accepted.attempts, "session completed");
            }
            Err(SubmitError::AlreadySubmitting) => {
                debug!(session_id = %self.id, "coordinator rejected duplicate submit");
            }
            Err(SubmitError::Failed {
                last_error,
                attempts,
            }) => {
                self.fail(
                    FailureReason::SubmissionFailed {
                        cause: last_error.kind(),
                        attempts,
                    },
                    last_error.to_string(),
                );
            }
        }
    }

    /// Re-enter `Submitting` after a submission failure, reusing the frozen
    /// payload. Returns `None` unless the session failed during submission.
    pub fn retry_submission(&mut self) -> Option<Arc<Submission>> {
        let retryable = self.state == SessionState::Failed
            && matches!(
                self.failure.as_ref().map(|f| f.reason),
                Some(FailureReason::SubmissionFailed { .. })
            );
        let submission = match (&self.submission, retryable) {
            (Some(submission), true) => Arc::clone(submission),
            _ => {
                warn!(session_id = %self.id, state = %self.state, "submission retry ignored");
                return None;
            }
        };
        self.state = SessionState::Submitting;
        self.failure = None;
        info!(session_id = %self.id, "retrying submission with frozen answers");
        Some(submission)
    }

    fn fail(&mut self, reason: FailureReason, message: String) {
        warn!(session_id = %self.id, ?reason, %message, "session failed");
        self.state = SessionState::Failed;
        self.failure = Some(Failure { reason, message });
    }
}
