//! The answer ledger: per-question record of the user's current selection.
//!
//! Source of truth for submit-eligibility. Entries are written only through
//! `set_answer` (direct user selection) and cleared only on full reset, so
//! every key always refers to a question of the batch it was validated
//! against.

use std::collections::HashMap;

use crate::domain::QuestionBatch;
use crate::error::SessionError;
use crate::protocol::AnswerItem;

#[derive(Clone, Debug, Default)]
pub struct AnswerLedger {
  answers: HashMap<String, String>,
}

impl AnswerLedger {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record a selection. Overwrite semantics, last write wins.
  /// Rejects ids not in the batch and values not among the question's
  /// declared options; the ledger is untouched on rejection.
  pub fn set_answer(
    &mut self,
    batch: &QuestionBatch,
    question_id: &str,
    value: &str,
  ) -> Result<(), SessionError> {
    let q = batch.by_id(question_id).ok_or_else(|| {
      SessionError::Validation(format!("unknown question id '{question_id}'"))
    })?;
    if !q.options.iter().any(|o| o == value) {
      return Err(SessionError::InvalidAnswerValue {
        question_id: question_id.to_string(),
        value: value.to_string(),
      });
    }
    self.answers.insert(question_id.to_string(), value.to_string());
    Ok(())
  }

  pub fn answer_for(&self, question_id: &str) -> Option<&str> {
    self.answers.get(question_id).map(String::as_str)
  }

  pub fn answered_count(&self) -> usize {
    self.answers.len()
  }

  /// True iff every question in the batch has an entry.
  pub fn is_complete(&self, batch: &QuestionBatch) -> bool {
    batch.iter().all(|q| self.answers.contains_key(&q.id))
  }

  /// Ledger contents in batch order, shaped for the bulk grading request.
  pub fn answers_in(&self, batch: &QuestionBatch) -> Vec<AnswerItem> {
    batch
      .iter()
      .filter_map(|q| {
        self.answers.get(&q.id).map(|a| AnswerItem {
          question_id: q.id.clone(),
          answer: a.clone(),
        })
      })
      .collect()
  }

  pub fn reset(&mut self) {
    self.answers.clear();
  }
}
