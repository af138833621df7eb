//! Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::model::{AnswerEntry, AnswerValue, Assessment, ChoiceOption, GradeResult, Question, QuestionKind};
use crate::traits::{ExamGateway, Submission};

pub(crate) fn sample_assessment() -> Assessment {
    Assessment {
        id: "algebra-1".into(),
        title: "Algebra I".into(),
        duration_seconds: 60,
        questions: vec![
            Question {
                id: "q1".into(),
                prompt: "2 + 2 = ?".into(),
                kind: QuestionKind::SingleChoice,
                options: vec![
                    ChoiceOption {
                        id: "a".into(),
                        label: "3".into(),
                    },
                    ChoiceOption {
                        id: "b".into(),
                        label: "4".into(),
                    },
                ],
            },
            Question {
                id: "q2".into(),
                prompt: "Zero is even.".into(),
                kind: QuestionKind::Boolean,
                options: vec![],
            },
            Question {
                id: "q3".into(),
                prompt: "Name a prime number.".into(),
                kind: QuestionKind::FreeText,
                options: vec![],
            },
        ],
        passing_threshold: 50.0,
    }
}

pub(crate) fn sample_grade() -> GradeResult {
    GradeResult {
        score: 2.0,
        max_score: 3.0,
        percentage: 67.0,
        passed: true,
        grade: Some("C".into()),
    }
}

pub(crate) fn sample_submission() -> Submission {
    Submission {
        assessment_id: "algebra-1".into(),
        attempt_id: Uuid::nil(),
        answers: vec![AnswerEntry {
            question_id: "q2".into(),
            answer: AnswerValue::Boolean(true),
        }],
        elapsed_seconds: 12,
    }
}

/// Gateway that replays scripted submit results and records every payload.
pub(crate) struct ScriptedGateway {
    assessment: Assessment,
    results: Mutex<VecDeque<Result<GradeResult, GatewayError>>>,
    submissions: Mutex<Vec<Submission>>,
    first_call_delay: Option<Duration>,
}

impl ScriptedGateway {
    pub(crate) fn new(results: Vec<Result<GradeResult, GatewayError>>) -> Self {
        Self {
            assessment: sample_assessment(),
            results: Mutex::new(results.into()),
            submissions: Mutex::new(Vec::new()),
            first_call_delay: None,
        }
    }

    pub(crate) fn with_first_call_delay(mut self, delay: Duration) -> Self {
        self.first_call_delay = Some(delay);
        self
    }

    pub(crate) fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExamGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_assessment(&self, assessment_id: &str) -> Result<Assessment, GatewayError> {
        if assessment_id == self.assessment.id {
            Ok(self.assessment.clone())
        } else {
            Err(GatewayError::NotFound(assessment_id.to_string()))
        }
    }

    async fn submit(&self, submission: &Submission) -> Result<GradeResult, GatewayError> {
        let call_index = {
            let mut seen = self.submissions.lock().unwrap();
            seen.push(submission.clone());
            seen.len()
        };
        let result = self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Server {
                status: 500,
                message: "script exhausted".into(),
            }));
        if call_index == 1 {
            if let Some(delay) = self.first_call_delay {
                tokio::time::sleep(delay).await;
            }
        }
        result
    }
}
