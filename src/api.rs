//! HTTP client for the external quiz services.
//!
//! `QuizApi` is the seam the session controller talks through; `HttpQuizApi`
//! is the real reqwest-backed implementation. Calls are instrumented and log
//! endpoint names and basic result info (never full payloads).

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, instrument};

use crate::config::SessionConfig;
use crate::domain::Question;
use crate::error::SessionError;
use crate::protocol::{
  BulkGradeRequest, BulkGradeResponse, CheckAnswerRequest, CheckAnswerResponse,
  CheckAudioResponse, GenerateQuestionsRequest, GenerateQuestionsResponse, TopicInfoRequest,
  TopicInfoResponse,
};
use crate::util::trunc_for_log;

/// Boundary to the external quiz server. Implementations must be cheaply
/// cloneable: the controller hands clones to audio poll tasks.
pub trait QuizApi: Clone + Send + Sync + 'static {
  /// List the stored question bank (startup listing).
  fn list_questions(&self) -> impl Future<Output = Result<Vec<Question>, SessionError>> + Send;

  /// Generate a batch of questions.
  fn generate_questions(
    &self,
    req: GenerateQuestionsRequest,
  ) -> impl Future<Output = Result<GenerateQuestionsResponse, SessionError>> + Send;

  /// Is the audio file for `filename` ready to play yet?
  fn check_audio(
    &self,
    filename: String,
  ) -> impl Future<Output = Result<bool, SessionError>> + Send;

  /// Grade a single answer (legacy path).
  fn check_answer(
    &self,
    req: CheckAnswerRequest,
  ) -> impl Future<Output = Result<CheckAnswerResponse, SessionError>> + Send;

  /// Grade the whole ledger in one request.
  fn check_answers(
    &self,
    req: BulkGradeRequest,
  ) -> impl Future<Output = Result<BulkGradeResponse, SessionError>> + Send;

  /// Look up bilingual reference material for a grammar topic.
  fn topic_info(
    &self,
    topic: String,
  ) -> impl Future<Output = Result<TopicInfoResponse, SessionError>> + Send;
}

#[derive(Clone)]
pub struct HttpQuizApi {
  client: reqwest::Client,
  base_url: String,
}

impl HttpQuizApi {
  pub fn new(cfg: &SessionConfig) -> Result<Self, SessionError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.request_timeout_secs))
      .build()
      .map_err(|e| SessionError::Transport(e.to_string()))?;
    Ok(Self {
      client,
      base_url: cfg.base_url.trim_end_matches('/').to_string(),
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }
}

impl QuizApi for HttpQuizApi {
  #[instrument(level = "info", skip(self))]
  async fn list_questions(&self) -> Result<Vec<Question>, SessionError> {
    let resp = self.client.get(self.url("/api/questions")).send().await?;
    let questions = resp.json::<Vec<Question>>().await?;
    info!(target: "session", count = questions.len(), "Question listing fetched");
    Ok(questions)
  }

  #[instrument(level = "info", skip(self, req), fields(difficulty = %req.difficulty, count = req.count))]
  async fn generate_questions(
    &self,
    req: GenerateQuestionsRequest,
  ) -> Result<GenerateQuestionsResponse, SessionError> {
    let resp = self
      .client
      .post(self.url("/api/generate-questions"))
      .json(&req)
      .send()
      .await?;
    let out = resp.json::<GenerateQuestionsResponse>().await?;
    if let Some(err) = &out.error {
      error!(target: "session", error = %trunc_for_log(err, 200), "Generation reported failure");
    }
    Ok(out)
  }

  #[instrument(level = "debug", skip(self), fields(%filename))]
  async fn check_audio(&self, filename: String) -> Result<bool, SessionError> {
    let resp = self
      .client
      .get(self.url(&format!("/api/check-audio/{filename}")))
      .send()
      .await?;
    let out = resp.json::<CheckAudioResponse>().await?;
    Ok(out.ready)
  }

  #[instrument(level = "info", skip(self, req), fields(question_id = %req.question_id))]
  async fn check_answer(&self, req: CheckAnswerRequest) -> Result<CheckAnswerResponse, SessionError> {
    let resp = self
      .client
      .post(self.url("/api/check-answer"))
      .json(&req)
      .send()
      .await?;
    Ok(resp.json::<CheckAnswerResponse>().await?)
  }

  #[instrument(level = "info", skip(self, req), fields(answers = req.answers.len()))]
  async fn check_answers(&self, req: BulkGradeRequest) -> Result<BulkGradeResponse, SessionError> {
    let resp = self
      .client
      .post(self.url("/api/check-answers"))
      .json(&req)
      .send()
      .await?;
    let out = resp.json::<BulkGradeResponse>().await?;
    info!(target: "session", success = out.success, results = out.results.len(), "Bulk grading response");
    Ok(out)
  }

  #[instrument(level = "info", skip(self), fields(%topic))]
  async fn topic_info(&self, topic: String) -> Result<TopicInfoResponse, SessionError> {
    let resp = self
      .client
      .post(self.url("/api/grammar-topic-info"))
      .json(&TopicInfoRequest { topic })
      .send()
      .await?;
    Ok(resp.json::<TopicInfoResponse>().await?)
  }
}
