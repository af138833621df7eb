//! In-memory answer store keyed by question id.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AnswerError;
use crate::model::{AnswerEntry, AnswerValue, Assessment};

/// Current answers for one session, validated against the loaded assessment.
#[derive(Debug, Clone)]
pub struct AnswerStore {
    assessment: Arc<Assessment>,
    answers: HashMap<String, AnswerValue>,
}

impl AnswerStore {
    pub fn new(assessment: Arc<Assessment>) -> Self {
        Self {
            assessment,
            answers: HashMap::new(),
        }
    }

    /// Upsert an answer, last write wins.
    ///
    /// Returns `Ok(false)` when `value` equals the stored answer, so callers can
    /// skip redundant change notifications.
    pub fn set_answer(&mut self, question_id: &str, value: AnswerValue) -> Result<bool, AnswerError> {
        let question = self
            .assessment
            .question(question_id)
            .ok_or_else(|| AnswerError::UnknownQuestion(question_id.to_string()))?;

        if value.kind() != question.kind {
            return Err(AnswerError::KindMismatch {
                question_id: question_id.to_string(),
                expected: question.kind,
                actual: value.kind(),
            });
        }
        if let AnswerValue::Choice(option_id) = &value {
            if !question.has_option(option_id) {
                return Err(AnswerError::UnknownOption {
                    question_id: question_id.to_string(),
                    option_id: option_id.clone(),
                });
            }
        }

        if self.answers.get(question_id) == Some(&value) {
            return Ok(false);
        }
        self.answers.insert(question_id.to_string(), value);
        Ok(true)
    }

    /// Make a question unanswered again. Returns whether an answer was removed.
    pub fn clear_answer(&mut self, question_id: &str) -> Result<bool, AnswerError> {
        if self.assessment.question(question_id).is_none() {
            return Err(AnswerError::UnknownQuestion(question_id.to_string()));
        }
        Ok(self.answers.remove(question_id).is_some())
    }

    pub fn get(&self, question_id: &str) -> Option<&AnswerValue> {
        self.answers.get(question_id)
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    /// Immutable copy of the current answers in assessment order.
    pub fn snapshot(&self) -> Vec<AnswerEntry> {
        self.assessment
            .questions
            .iter()
            .filter_map(|q| {
                self.answers.get(&q.id).map(|answer| AnswerEntry {
                    question_id: q.id.clone(),
                    answer: answer.clone(),
                })
            })
            .collect()
    }

    /// Drop every answer. Only for a brand-new session.
    pub fn clear(&mut self) {
        self.answers.clear();
    }
}
