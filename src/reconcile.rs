//! Merging a bulk grading response with the batch and ledger into a
//! per-question review plus an aggregate score.
//!
//! Orphan results (a grading entry whose question id matches nothing in the
//! batch) are logged and skipped; they never abort reconciliation of the
//! remaining entries, and they are excluded from the score denominator.

use tracing::warn;

use crate::domain::{Bilingual, GradingResult, QuestionBatch};
use crate::ledger::AnswerLedger;

/// One graded question, ready for display.
#[derive(Clone, Debug)]
pub struct QuestionReview {
  pub question_id: String,
  pub prompt: String,
  pub grammar_topic: String,
  /// `None` when the ledger had no entry: shown as "no answer given",
  /// with the correct answer still displayed.
  pub user_answer: Option<String>,
  pub correct_answer: String,
  pub is_correct: bool,
  pub feedback: Bilingual,
  pub explanation: Bilingual,
}

#[derive(Clone, Debug)]
pub struct SessionResults {
  pub reviews: Vec<QuestionReview>,
  pub correct: usize,
  pub total: usize,
  /// correct/total as a percentage, standard rounding (0.5 rounds up).
  pub score_percent: u8,
}

pub fn reconcile(
  batch: &QuestionBatch,
  ledger: &AnswerLedger,
  results: &[GradingResult],
) -> SessionResults {
  let mut reviews = Vec::with_capacity(results.len());
  let mut correct = 0usize;

  for r in results {
    let Some(q) = batch.by_id(&r.question_id) else {
      warn!(target: "session", question_id = %r.question_id, "orphan grading result; skipping");
      continue;
    };
    if r.is_correct {
      correct += 1;
    }
    reviews.push(QuestionReview {
      question_id: r.question_id.clone(),
      prompt: q.prompt.clone(),
      grammar_topic: q.grammar_topic.clone(),
      user_answer: ledger.answer_for(&r.question_id).map(str::to_string),
      correct_answer: r.correct_answer.clone(),
      is_correct: r.is_correct,
      feedback: Bilingual { en: r.feedback_en.clone(), id: r.feedback_id.clone() },
      explanation: Bilingual { en: r.explanation_en.clone(), id: r.explanation_id.clone() },
    });
  }

  let total = reviews.len();
  SessionResults { correct, total, score_percent: percent(correct, total), reviews }
}

fn percent(correct: usize, total: usize) -> u8 {
  if total == 0 {
    return 0;
  }
  ((correct as f64 / total as f64) * 100.0).round() as u8
}
