//! Core trait definitions for the Exam Gateway and Clock Source seams.
//!
//! The gateway is implemented by `examkit-gateway`; clocks live in
//! [`crate::clock`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::model::{AnswerEntry, Assessment, GradeResult};

// ---------------------------------------------------------------------------
// Exam Gateway trait
// ---------------------------------------------------------------------------

/// Remote service that serves assessments and grades submissions.
#[async_trait]
pub trait ExamGateway: Send + Sync {
    /// Human-readable gateway name (e.g. "http").
    fn name(&self) -> &str;

    /// Fetch an assessment by id.
    async fn fetch_assessment(&self, assessment_id: &str) -> Result<Assessment, GatewayError>;

    /// Submit a frozen answer set for grading.
    async fn submit(&self, submission: &Submission) -> Result<GradeResult, GatewayError>;
}

/// The payload sent to the gateway when a session enters `Submitting`.
///
/// Built once per session from the answer store snapshot and shared behind an
/// `Arc`; every retry sends this exact value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Assessment being submitted.
    pub assessment_id: String,
    /// Attempt identifier (the session id); the server rejects a second
    /// accepted submission for the same attempt.
    pub attempt_id: Uuid,
    /// Answered questions in assessment order. Unanswered questions are omitted.
    pub answers: Vec<AnswerEntry>,
    /// Whole seconds the student spent before submission.
    pub elapsed_seconds: u64,
}

impl Submission {
    /// Answer recorded for `question_id`, if any.
    pub fn answer_for(&self, question_id: &str) -> Option<&crate::model::AnswerValue> {
        self.answers
            .iter()
            .find(|entry| entry.question_id == question_id)
            .map(|entry| &entry.answer)
    }
}

// ---------------------------------------------------------------------------
// Clock Source trait
// ---------------------------------------------------------------------------

/// Source of countdown ticks.
///
/// Each tick reports the elapsed time since the previous tick (or since
/// [`start`](ClockSource::start)), not the nominal interval, so a throttled
/// host still charges the student for the real time that passed.
#[async_trait]
pub trait ClockSource: Send {
    /// Restart elapsed-time measurement from now.
    fn start(&mut self);

    /// Wait for the next tick and return the elapsed delta.
    ///
    /// Must be cancel-safe: dropping the future before it resolves loses no
    /// elapsed time.
    async fn tick(&mut self) -> Duration;
}
