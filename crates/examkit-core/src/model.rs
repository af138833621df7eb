//! Core data model types for examkit.
//!
//! These are the immutable exam definitions served by the Exam Gateway and the
//! answer values a student records against them.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AssessmentError;

/// An exam definition. Immutable once loaded into a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    /// Unique identifier for this assessment.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Time limit in whole seconds.
    pub duration_seconds: u64,
    /// Questions in presentation order.
    #[serde(default)]
    pub questions: Vec<Question>,
    /// Minimum percentage (0..=100) needed to pass.
    #[serde(default)]
    pub passing_threshold: f64,
}

impl Assessment {
    /// The time limit as a `Duration`.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_seconds)
    }

    /// Number of questions.
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// Look up a question by its identifier.
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// Check the structural rules a session relies on.
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), AssessmentError> {
        if self.questions.is_empty() {
            return Err(AssessmentError::Empty);
        }
        if self.duration_seconds == 0 {
            return Err(AssessmentError::ZeroDuration);
        }
        if !(0.0..=100.0).contains(&self.passing_threshold) {
            return Err(AssessmentError::ThresholdOutOfRange(self.passing_threshold));
        }

        let mut seen = HashSet::new();
        for question in &self.questions {
            if !seen.insert(question.id.as_str()) {
                return Err(AssessmentError::DuplicateQuestion(question.id.clone()));
            }
            if question.kind == QuestionKind::SingleChoice {
                if question.options.is_empty() {
                    return Err(AssessmentError::NoOptions(question.id.clone()));
                }
                let mut option_ids = HashSet::new();
                for option in &question.options {
                    if !option_ids.insert(option.id.as_str()) {
                        return Err(AssessmentError::DuplicateOption {
                            question_id: question.id.clone(),
                            option_id: option.id.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// A single question. Never carries the correct answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Identifier, unique within the assessment.
    pub id: String,
    /// Prompt text shown to the student.
    pub prompt: String,
    /// What kind of answer this question takes.
    pub kind: QuestionKind,
    /// Ordered options (single-choice only).
    #[serde(default)]
    pub options: Vec<ChoiceOption>,
}

impl Question {
    /// Whether `option_id` names one of this question's options.
    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }
}

/// One selectable option of a single-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    pub label: String,
}

/// Supported question kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    Boolean,
    FreeText,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionKind::SingleChoice => write!(f, "single_choice"),
            QuestionKind::Boolean => write!(f, "boolean"),
            QuestionKind::FreeText => write!(f, "free_text"),
        }
    }
}

impl FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_choice" | "single-choice" | "choice" => Ok(QuestionKind::SingleChoice),
            "boolean" | "bool" | "true_false" => Ok(QuestionKind::Boolean),
            "free_text" | "free-text" | "text" => Ok(QuestionKind::FreeText),
            other => Err(format!("unknown question kind: {other}")),
        }
    }
}

/// A student's answer to one question.
///
/// Serialized untagged, so on the wire a choice and a free-text answer are both
/// plain strings; the question kind disambiguates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// Selected option identifier.
    Choice(String),
    /// True/false answer.
    Boolean(bool),
    /// Free-form text.
    Text(String),
}

impl AnswerValue {
    /// The question kind this value answers.
    pub fn kind(&self) -> QuestionKind {
        match self {
            AnswerValue::Choice(_) => QuestionKind::SingleChoice,
            AnswerValue::Boolean(_) => QuestionKind::Boolean,
            AnswerValue::Text(_) => QuestionKind::FreeText,
        }
    }

    /// Parse raw user input into a value of the given kind.
    pub fn parse_for(kind: QuestionKind, input: &str) -> Result<Self, String> {
        let input = input.trim();
        match kind {
            QuestionKind::SingleChoice => Ok(AnswerValue::Choice(input.to_string())),
            QuestionKind::FreeText => Ok(AnswerValue::Text(input.to_string())),
            QuestionKind::Boolean => match input.to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Ok(AnswerValue::Boolean(true)),
                "false" | "f" | "no" | "n" | "0" => Ok(AnswerValue::Boolean(false)),
                other => Err(format!("not a boolean answer: {other}")),
            },
        }
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Choice(id) => write!(f, "{id}"),
            AnswerValue::Boolean(b) => write!(f, "{b}"),
            AnswerValue::Text(t) => write!(f, "{t}"),
        }
    }
}

/// One `{questionId, answer}` pair in a submission payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEntry {
    pub question_id: String,
    pub answer: AnswerValue,
}

/// Grading result returned by the gateway for an accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResult {
    pub score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub passed: bool,
    #[serde(default)]
    pub grade: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_assessment;

    #[test]
    fn question_kind_display_and_parse() {
        assert_eq!(QuestionKind::SingleChoice.to_string(), "single_choice");
        assert_eq!(
            "free-text".parse::<QuestionKind>().unwrap(),
            QuestionKind::FreeText
        );
        assert_eq!("bool".parse::<QuestionKind>().unwrap(), QuestionKind::Boolean);
        assert!("essay".parse::<QuestionKind>().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_assessment() {
        assert!(sample_assessment().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_and_duplicates() {
        let mut empty = sample_assessment();
        empty.questions.clear();
        assert!(matches!(empty.validate(), Err(AssessmentError::Empty)));

        let mut dup = sample_assessment();
        dup.questions[1].id = "q1".into();
        assert!(matches!(
            dup.validate(),
            Err(AssessmentError::DuplicateQuestion(id)) if id == "q1"
        ));

        let mut no_options = sample_assessment();
        no_options.questions[0].options.clear();
        assert!(matches!(
            no_options.validate(),
            Err(AssessmentError::NoOptions(_))
        ));
    }

    #[test]
    fn parse_boolean_answers() {
        assert_eq!(
            AnswerValue::parse_for(QuestionKind::Boolean, " Yes ").unwrap(),
            AnswerValue::Boolean(true)
        );
        assert!(AnswerValue::parse_for(QuestionKind::Boolean, "maybe").is_err());
    }

    #[test]
    fn assessment_deserializes_from_camel_case() {
        let json = r#"{
            "id": "a1",
            "title": "Quiz",
            "durationSeconds": 30,
            "passingThreshold": 60,
            "questions": [
                {"id": "q1", "prompt": "Capital of France?", "kind": "free_text"}
            ]
        }"#;
        let assessment: Assessment = serde_json::from_str(json).unwrap();
        assert_eq!(assessment.duration(), Duration::from_secs(30));
        assert_eq!(assessment.questions[0].kind, QuestionKind::FreeText);
        assert!(assessment.questions[0].options.is_empty());
    }
}
