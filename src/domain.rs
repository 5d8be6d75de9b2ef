//! Domain models: questions, batches, audio readiness, and grading results.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Closed difficulty set used by the generation service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

/// Client-side readiness of a question's audio asset.
/// `Absent` means the question carries no audio reference at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AudioState {
  #[default]
  Absent,
  Pending,
  Ready,
  TimedOut,
}

/// One generated question as delivered by the server.
/// No correct-answer field is exposed to the client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub id: String,
  #[serde(rename = "question")]
  pub prompt: String,
  pub options: Vec<String>,
  pub difficulty: Difficulty,
  pub grammar_topic: String,
  #[serde(default)]
  pub audio_url: Option<String>,

  /// Local poll sub-state; never serialized.
  #[serde(skip)]
  pub audio: AudioState,
}

/// The ordered set of questions produced by exactly one generation request.
/// Replaces any prior batch wholesale; there is no incremental merge.
#[derive(Clone, Debug, Default)]
pub struct QuestionBatch {
  questions: Vec<Question>,
}

impl QuestionBatch {
  /// Build a batch, enforcing unique ids and non-empty option lists.
  pub fn try_new(questions: Vec<Question>) -> Result<Self, SessionError> {
    let mut seen = std::collections::HashSet::new();
    for q in &questions {
      if !seen.insert(q.id.as_str()) {
        return Err(SessionError::Application(format!(
          "server returned duplicate question id '{}'",
          q.id
        )));
      }
      if q.options.is_empty() {
        return Err(SessionError::Application(format!(
          "question '{}' has no answer options",
          q.id
        )));
      }
    }
    Ok(Self { questions })
  }

  pub fn len(&self) -> usize {
    self.questions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.questions.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&Question> {
    self.questions.get(index)
  }

  pub fn by_id(&self, id: &str) -> Option<&Question> {
    self.questions.iter().find(|q| q.id == id)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Question> {
    self.questions.iter()
  }

  pub(crate) fn mark_audio(&mut self, id: &str, state: AudioState) {
    if let Some(q) = self.questions.iter_mut().find(|q| q.id == id) {
      q.audio = state;
    }
  }
}

/// English/Indonesian text pair.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bilingual {
  pub en: String,
  pub id: String,
}

/// Per-question grading result as delivered by the bulk grading service.
/// Immutable input to the reconciler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GradingResult {
  pub question_id: String,
  pub is_correct: bool,
  #[serde(default)]
  pub correct_answer: String,
  #[serde(default)]
  pub feedback_en: String,
  #[serde(default)]
  pub feedback_id: String,
  #[serde(default)]
  pub explanation_en: String,
  #[serde(default)]
  pub explanation_id: String,
}

/// Grammar topic reference content (Markdown text, passed through untouched).
#[derive(Clone, Debug)]
pub struct TopicReference {
  pub content: Bilingual,
  pub cached: bool,
}
