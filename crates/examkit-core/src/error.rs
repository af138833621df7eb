//! Error types for the session engine.
//!
//! `GatewayError` is defined here rather than in `examkit-gateway` so the
//! submission coordinator can classify failures for retry decisions without
//! string matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when talking to the Exam Gateway.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// The assessment (or attempt) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The student is not enrolled or not allowed to take this assessment.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Credentials were missing or rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The server already holds an accepted submission for this attempt.
    #[error("duplicate submission: {0}")]
    Duplicate(String),

    /// The server rejected the payload.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The server failed with a 5xx-equivalent status.
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// The request did not complete within the per-attempt timeout.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            GatewayError::NotFound(_)
                | GatewayError::Forbidden(_)
                | GatewayError::Unauthorized(_)
                | GatewayError::Duplicate(_)
                | GatewayError::Validation(_)
        )
    }

    /// Machine-readable classification of this error.
    pub fn kind(&self) -> GatewayErrorKind {
        match self {
            GatewayError::NotFound(_) => GatewayErrorKind::NotFound,
            GatewayError::Forbidden(_) => GatewayErrorKind::Forbidden,
            GatewayError::Unauthorized(_) => GatewayErrorKind::Unauthorized,
            GatewayError::Duplicate(_) => GatewayErrorKind::Duplicate,
            GatewayError::Validation(_) => GatewayErrorKind::Validation,
            GatewayError::Server { .. } => GatewayErrorKind::Server,
            GatewayError::Timeout(_) => GatewayErrorKind::Timeout,
            GatewayError::Network(_) => GatewayErrorKind::Network,
            GatewayError::InvalidResponse(_) => GatewayErrorKind::InvalidResponse,
        }
    }
}

/// `Copy` classification of a [`GatewayError`], safe to keep in snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorKind {
    NotFound,
    Forbidden,
    Unauthorized,
    Duplicate,
    Validation,
    Server,
    Timeout,
    Network,
    InvalidResponse,
}

/// Structural problems with an assessment definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssessmentError {
    #[error("assessment has no questions")]
    Empty,

    #[error("assessment duration must be greater than zero")]
    ZeroDuration,

    #[error("passing threshold {0} is outside 0..=100")]
    ThresholdOutOfRange(f64),

    #[error("duplicate question id: {0}")]
    DuplicateQuestion(String),

    #[error("single-choice question {0} has no options")]
    NoOptions(String),

    #[error("question {question_id} has duplicate option id {option_id}")]
    DuplicateOption {
        question_id: String,
        option_id: String,
    },
}

/// Rejected answer writes. These are caller defects: a UI driven by the loaded
/// assessment never produces them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    #[error("question {0} is not part of this assessment")]
    UnknownQuestion(String),

    #[error("question {question_id} expects a {expected} answer, got {actual}")]
    KindMismatch {
        question_id: String,
        expected: crate::model::QuestionKind,
        actual: crate::model::QuestionKind,
    },

    #[error("question {question_id} has no option {option_id}")]
    UnknownOption {
        question_id: String,
        option_id: String,
    },
}

/// Outcome of a failed `SubmissionCoordinator::submit` call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    /// Another submission for this session is still outstanding.
    #[error("a submission is already in flight for this session")]
    AlreadySubmitting,

    /// Retries were exhausted or the gateway rejected the submission outright.
    #[error("submission failed after {attempts} attempt(s): {last_error}")]
    Failed {
        last_error: GatewayError,
        attempts: u32,
    },
}

/// Errors returned by a [`SessionHandle`](crate::engine::SessionHandle).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The session task has exited; the session is finished or abandoned.
    #[error("session {0} is no longer running")]
    SessionClosed(uuid::Uuid),

    /// The answer was rejected by the answer store.
    #[error(transparent)]
    Answer(#[from] AnswerError),
}
