//! HTTP Exam Gateway implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use examkit_core::error::GatewayError;
use examkit_core::model::{Assessment, GradeResult};
use examkit_core::traits::{ExamGateway, Submission};

use crate::error::{error_from_reason, error_from_response, error_from_transport};

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Exam Gateway reached over HTTP/JSON.
pub struct HttpExamGateway {
    base_url: String,
    auth_token: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpExamGateway {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, reqwest::Error> {
        Self::with_timeout(base_url, auth_token, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: &str,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.filter(|t| !t.is_empty()),
            timeout_secs: timeout.as_secs(),
            client,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn assessment_url(&self, assessment_id: &str) -> String {
        format!("{}/assessments/{}", self.base_url, assessment_id)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    accepted: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    max_score: Option<f64>,
    #[serde(default)]
    percentage: Option<f64>,
    #[serde(default)]
    passed: Option<bool>,
    #[serde(default)]
    grade: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl SubmitResponse {
    fn into_result(self, status: u16) -> Result<GradeResult, GatewayError> {
        if !self.accepted {
            let message = self
                .message
                .unwrap_or_else(|| "submission was not accepted".to_string());
            return Err(self
                .reason
                .as_deref()
                .and_then(|reason| error_from_reason(reason, status, message.clone()))
                .unwrap_or(GatewayError::Validation(message)));
        }

        match (self.score, self.max_score, self.percentage, self.passed) {
            (Some(score), Some(max_score), Some(percentage), Some(passed)) => Ok(GradeResult {
                score,
                max_score,
                percentage,
                passed,
                grade: self.grade,
            }),
            _ => Err(GatewayError::InvalidResponse(
                "accepted submission is missing grading fields".into(),
            )),
        }
    }
}

#[async_trait]
impl ExamGateway for HttpExamGateway {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self))]
    async fn fetch_assessment(&self, assessment_id: &str) -> Result<Assessment, GatewayError> {
        let response = self
            .authorize(self.client.get(self.assessment_url(assessment_id)))
            .send()
            .await
            .map_err(|e| error_from_transport(&e, self.timeout_secs))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response(status, &body, assessment_id));
        }

        let assessment: Assessment = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("failed to parse assessment: {e}")))?;
        debug!(questions = assessment.question_count(), "assessment fetched");
        Ok(assessment)
    }

    #[instrument(skip(self, submission), fields(
        assessment_id = %submission.assessment_id,
        attempt_id = %submission.attempt_id,
    ))]
    async fn submit(&self, submission: &Submission) -> Result<GradeResult, GatewayError> {
        let url = format!("{}/submissions", self.assessment_url(&submission.assessment_id));
        let response = self
            .authorize(self.client.post(url))
            .json(submission)
            .send()
            .await
            .map_err(|e| error_from_transport(&e, self.timeout_secs))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response(status, &body, &submission.assessment_id));
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("failed to parse grade: {e}")))?;
        body.into_result(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use examkit_core::model::{AnswerEntry, AnswerValue, QuestionKind};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // Nil attempt id keeps the expected request body stable.
    fn submission() -> Submission {
        Submission {
            assessment_id: "algebra-1".into(),
            attempt_id: Default::default(),
            answers: vec![
                AnswerEntry {
                    question_id: "q1".into(),
                    answer: AnswerValue::Choice("b".into()),
                },
                AnswerEntry {
                    question_id: "q2".into(),
                    answer: AnswerValue::Boolean(true),
                },
            ],
            elapsed_seconds: 10,
        }
    }

    #[tokio::test]
    async fn fetches_assessment_with_bearer_token() {
        let server = MockServer::start().await;

        let body = serde_json::json!({
            "id": "algebra-1",
            "title": "Algebra I",
            "durationSeconds": 60,
            "passingThreshold": 50,
            "questions": [
                {"id": "q1", "prompt": "2 + 2 = ?", "kind": "single_choice",
                 "options": [{"id": "a", "label": "3"}, {"id": "b", "label": "4"}]},
                {"id": "q2", "prompt": "Zero is even.", "kind": "boolean"}
            ]
        });

        Mock::given(method("GET"))
            .and(path("/assessments/algebra-1"))
            .and(header("authorization", "Bearer student-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let gateway = HttpExamGateway::new(&server.uri(), Some("student-token".into())).unwrap();
        let assessment = gateway.fetch_assessment("algebra-1").await.unwrap();
        assert_eq!(assessment.question_count(), 2);
        assert_eq!(assessment.questions[0].kind, QuestionKind::SingleChoice);
        assert_eq!(assessment.duration_seconds, 60);
    }

    #[tokio::test]
    async fn missing_assessment_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/assessments/nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let gateway = HttpExamGateway::new(&server.uri(), None).unwrap();
        let err = gateway.fetch_assessment("nope").await.unwrap_err();
        assert_eq!(err, GatewayError::NotFound("nope".into()));
    }

    #[tokio::test]
    async fn submits_camel_case_payload() {
        let server = MockServer::start().await;

        let expected = serde_json::json!({
            "assessmentId": "algebra-1",
            "attemptId": "00000000-0000-0000-0000-000000000000",
            "answers": [
                {"questionId": "q1", "answer": "b"},
                {"questionId": "q2", "answer": true}
            ],
            "elapsedSeconds": 10
        });

        Mock::given(method("POST"))
            .and(path("/assessments/algebra-1/submissions"))
            .and(body_json(&expected))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accepted": true, "score": 2, "maxScore": 3, "percentage": 67,
                "passed": true, "grade": "C"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = HttpExamGateway::new(&server.uri(), None).unwrap();
        let grade = gateway.submit(&submission()).await.unwrap();
        assert_eq!(grade.score, 2.0);
        assert_eq!(grade.max_score, 3.0);
        assert_eq!(grade.percentage, 67.0);
        assert!(grade.passed);
        assert_eq!(grade.grade.as_deref(), Some("C"));
    }

    #[tokio::test]
    async fn duplicate_submission_is_permanent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/assessments/algebra-1/submissions"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "reason": "duplicate", "message": "attempt already graded"
            })))
            .mount(&server)
            .await;

        let gateway = HttpExamGateway::new(&server.uri(), None).unwrap();
        let err = gateway.submit(&submission()).await.unwrap_err();
        assert_eq!(err, GatewayError::Duplicate("attempt already graded".into()));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/assessments/algebra-1/submissions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let gateway = HttpExamGateway::new(&server.uri(), None).unwrap();
        let err = gateway.submit(&submission()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Server { status: 503, .. }));
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn rejected_body_maps_reason() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/assessments/algebra-1/submissions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accepted": false, "reason": "validation", "message": "unknown question q9"
            })))
            .mount(&server)
            .await;

        let gateway = HttpExamGateway::new(&server.uri(), None).unwrap();
        let err = gateway.submit(&submission()).await.unwrap_err();
        assert_eq!(err, GatewayError::Validation("unknown question q9".into()));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/assessments/algebra-1"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let gateway =
            HttpExamGateway::with_timeout(&server.uri(), None, Duration::from_secs(1)).unwrap();
        let err = gateway.fetch_assessment("algebra-1").await.unwrap_err();
        assert_eq!(err, GatewayError::Timeout(1));
    }
}
