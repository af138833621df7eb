//! In-memory gateway for tests and offline demos.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use examkit_core::error::GatewayError;
use examkit_core::model::{Assessment, GradeResult};
use examkit_core::traits::{ExamGateway, Submission};

/// A scriptable Exam Gateway that never touches the network.
///
/// Submissions are answered from a queue of scripted results; once the queue
/// is empty every further call gets the default result.
pub struct MockGateway {
    assessments: HashMap<String, Assessment>,
    fetch_errors: HashMap<String, GatewayError>,
    submit_script: Mutex<VecDeque<Result<GradeResult, GatewayError>>>,
    default_result: Result<GradeResult, GatewayError>,
    latency: Duration,
    fetch_count: AtomicU32,
    submit_count: AtomicU32,
    submissions: Mutex<Vec<Submission>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            assessments: HashMap::new(),
            fetch_errors: HashMap::new(),
            submit_script: Mutex::new(VecDeque::new()),
            default_result: Ok(GradeResult {
                score: 0.0,
                max_score: 0.0,
                percentage: 0.0,
                passed: false,
                grade: None,
            }),
            latency: Duration::ZERO,
            fetch_count: AtomicU32::new(0),
            submit_count: AtomicU32::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Serve `assessment` under its own id.
    pub fn with_assessment(mut self, assessment: Assessment) -> Self {
        self.assessments.insert(assessment.id.clone(), assessment);
        self
    }

    /// Fail fetches of `assessment_id` with `error`.
    pub fn with_fetch_error(mut self, assessment_id: &str, error: GatewayError) -> Self {
        self.fetch_errors.insert(assessment_id.to_string(), error);
        self
    }

    /// Queue the result of the next unscripted submit call.
    pub fn then_submit(self, result: Result<GradeResult, GatewayError>) -> Self {
        self.lock_script().push_back(result);
        self
    }

    /// Result returned once the script runs out.
    pub fn with_default_result(mut self, result: Result<GradeResult, GatewayError>) -> Self {
        self.default_result = result;
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    pub fn submit_count(&self) -> u32 {
        self.submit_count.load(Ordering::Relaxed)
    }

    /// Every payload received, in call order.
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<GradeResult, GatewayError>>> {
        self.submit_script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl ExamGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_assessment(&self, assessment_id: &str) -> Result<Assessment, GatewayError> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;

        if let Some(error) = self.fetch_errors.get(assessment_id) {
            return Err(error.clone());
        }
        self.assessments
            .get(assessment_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(assessment_id.to_string()))
    }

    async fn submit(&self, submission: &Submission) -> Result<GradeResult, GatewayError> {
        self.submit_count.fetch_add(1, Ordering::Relaxed);
        self.submissions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(submission.clone());
        self.simulate_latency().await;

        let scripted = self.lock_script().pop_front();
        scripted.unwrap_or_else(|| self.default_result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use examkit_core::model::{Question, QuestionKind};

    fn quiz() -> Assessment {
        Assessment {
            id: "quiz".into(),
            title: "Quiz".into(),
            duration_seconds: 30,
            questions: vec![Question {
                id: "q1".into(),
                prompt: "Say hi".into(),
                kind: QuestionKind::FreeText,
                options: vec![],
            }],
            passing_threshold: 50.0,
        }
    }

    fn submission() -> Submission {
        Submission {
            assessment_id: "quiz".into(),
            attempt_id: Default::default(),
            answers: vec![],
            elapsed_seconds: 3,
        }
    }

    #[tokio::test]
    async fn serves_known_assessments() {
        let gateway = MockGateway::new()
            .with_assessment(quiz())
            .with_fetch_error("locked", GatewayError::Forbidden("not enrolled".into()));

        assert_eq!(gateway.fetch_assessment("quiz").await.unwrap().id, "quiz");
        assert_eq!(
            gateway.fetch_assessment("locked").await.unwrap_err(),
            GatewayError::Forbidden("not enrolled".into())
        );
        assert_eq!(
            gateway.fetch_assessment("missing").await.unwrap_err(),
            GatewayError::NotFound("missing".into())
        );
        assert_eq!(gateway.fetch_count(), 3);
    }

    #[tokio::test]
    async fn script_then_default() {
        let gateway = MockGateway::new()
            .then_submit(Err(GatewayError::Network("reset".into())))
            .with_default_result(Err(GatewayError::Duplicate("again".into())));

        assert!(matches!(
            gateway.submit(&submission()).await,
            Err(GatewayError::Network(_))
        ));
        assert!(matches!(
            gateway.submit(&submission()).await,
            Err(GatewayError::Duplicate(_))
        ));
        assert_eq!(gateway.submit_count(), 2);
        assert_eq!(gateway.submissions().len(), 2);
        assert_eq!(gateway.submissions()[0].elapsed_seconds, 3);
    }
}
