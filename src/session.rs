//! Session controller: owns the batch, the ledger, and the poll tasks.
//!
//! This module owns:
//!   - the session state machine (Idle/Generating/BatchReady/Submitting/ResultsShown)
//!   - atomic teardown of prior state before each generation request
//!   - sequence-number tagging so stale responses are discarded
//!   - the render-agnostic event stream a presentation layer subscribes to
//!
//! The batch and ledger are mutated only here (single writer); poll tasks
//! and event consumers read them through the controller's API. Requests are
//! split into begin/apply pairs so hosts that dispatch work themselves get
//! the same last-request-wins guarantees as the bundled async wrappers.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::api::QuizApi;
use crate::config::SessionConfig;
use crate::domain::{AudioState, Bilingual, Difficulty, Question, QuestionBatch, TopicReference};
use crate::error::SessionError;
use crate::ledger::AnswerLedger;
use crate::poller::{PollEvent, ReadinessPoller, ReadyCheck};
use crate::protocol::{
    BulkGradeRequest, BulkGradeResponse, CheckAnswerRequest, CheckAnswerResponse,
    GenerateQuestionsRequest, GenerateQuestionsResponse,
};
use crate::reconcile::{reconcile, SessionResults};
use crate::util::audio_filename;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Generating,
    BatchReady,
    Submitting,
    ResultsShown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// A dismissible, auto-expiring message for the user.
#[derive(Clone, Debug)]
pub struct Notice {
    pub id: Uuid,
    pub kind: NoticeKind,
    pub message: String,
    pub ttl: Duration,
}

/// State-change notifications. The core never renders; a presentation layer
/// subscribes to these and projects them however it likes.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    PhaseChanged { phase: SessionPhase },
    BatchInstalled { total: usize },
    Progress { answered: usize, total: usize, can_submit: bool },
    AudioReady { question_id: String },
    AudioTimedOut { question_id: String },
    Results(SessionResults),
    Notice(Notice),
}

/// User-supplied generation parameters.
#[derive(Clone, Debug)]
pub struct GenerateParams {
    /// `None` means "any".
    pub difficulty: Option<Difficulty>,
    /// Free-text topic filter; empty means unconstrained.
    pub topic: String,
    pub count: usize,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self { difficulty: None, topic: String::new(), count: 1 }
    }
}

pub struct SessionController<A: QuizApi> {
    api: A,
    cfg: SessionConfig,
    phase: SessionPhase,
    batch: QuestionBatch,
    ledger: AnswerLedger,
    poller: ReadinessPoller,
    poll_events: mpsc::UnboundedReceiver<PollEvent>,
    /// asset filename -> question id, captured at poll-task creation time so
    /// a stale tick can never be re-derived against a replaced batch.
    assets: HashMap<String, String>,
    /// Legacy single-question cursor into the current batch.
    cursor: usize,
    results: Option<SessionResults>,
    gen_seq: u64,
    grade_seq: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<A: QuizApi> SessionController<A> {
    pub fn new(api: A, cfg: SessionConfig) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (poller, poll_events) = ReadinessPoller::new(
            Duration::from_millis(cfg.poll_interval_ms),
            cfg.poll_max_attempts,
        );
        (
            Self {
                api,
                cfg,
                phase: SessionPhase::Idle,
                batch: QuestionBatch::default(),
                ledger: AnswerLedger::new(),
                poller,
                poll_events,
                assets: HashMap::new(),
                cursor: 0,
                results: None,
                gen_seq: 0,
                grade_seq: 0,
                events: tx,
            },
            rx,
        )
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn batch(&self) -> &QuestionBatch {
        &self.batch
    }

    pub fn ledger(&self) -> &AnswerLedger {
        &self.ledger
    }

    pub fn results(&self) -> Option<&SessionResults> {
        self.results.as_ref()
    }

    pub fn can_submit(&self) -> bool {
        self.phase == SessionPhase::BatchReady
            && !self.batch.is_empty()
            && self.ledger.is_complete(&self.batch)
    }

    //
    // Generation
    //

    /// Tear down prior state and produce the tagged request for a new batch.
    /// Old poll tasks are cancelled and the ledger cleared BEFORE the request
    /// exists, so a late response for the previous batch has nothing left to
    /// corrupt.
    #[instrument(level = "info", skip(self, params), fields(count = params.count))]
    pub fn begin_generate(
        &mut self,
        params: &GenerateParams,
    ) -> Result<(u64, GenerateQuestionsRequest), SessionError> {
        if params.count == 0 {
            return Err(self.notify_error(SessionError::Validation(
                "question count must be at least 1".into(),
            )));
        }
        self.teardown();
        self.set_phase(SessionPhase::Generating);
        self.gen_seq += 1;
        let req = GenerateQuestionsRequest {
            difficulty: params
                .difficulty
                .map(|d| d.as_str().to_string())
                .unwrap_or_else(|| "any".into()),
            topic: params.topic.trim().to_string(),
            count: params.count,
        };
        Ok((self.gen_seq, req))
    }

    /// Apply a generation outcome. Responses tagged with anything but the
    /// latest issued sequence are discarded (a newer request has superseded
    /// them); this is not an error.
    #[instrument(level = "info", skip(self, outcome))]
    pub fn apply_generation(
        &mut self,
        seq: u64,
        outcome: Result<GenerateQuestionsResponse, SessionError>,
    ) -> Result<(), SessionError> {
        if seq != self.gen_seq {
            info!(target: "session", seq, latest = self.gen_seq, "discarding stale generation response");
            return Ok(());
        }
        match outcome {
            Err(e) => {
                self.set_phase(SessionPhase::Idle);
                Err(self.notify_error(e))
            }
            Ok(resp) if !resp.success => {
                self.set_phase(SessionPhase::Idle);
                let msg = resp.error.unwrap_or_else(|| "failed to generate questions".into());
                Err(self.notify_error(SessionError::Application(msg)))
            }
            Ok(resp) if resp.questions.is_empty() => {
                // Never silently show an empty quiz.
                self.set_phase(SessionPhase::Idle);
                Err(self.notify_error(SessionError::Application(
                    "no questions were generated".into(),
                )))
            }
            Ok(resp) => match QuestionBatch::try_new(resp.questions) {
                Err(e) => {
                    self.set_phase(SessionPhase::Idle);
                    Err(self.notify_error(e))
                }
                Ok(batch) => {
                    self.install_batch(batch);
                    Ok(())
                }
            },
        }
    }

    /// Generate a new batch end-to-end: teardown, request, install.
    pub async fn generate(&mut self, params: GenerateParams) -> Result<(), SessionError> {
        let (seq, req) = self.begin_generate(&params)?;
        let outcome = self.api.generate_questions(req).await;
        self.apply_generation(seq, outcome)
    }

    fn install_batch(&mut self, batch: QuestionBatch) {
        let total = batch.len();
        self.batch = batch;
        self.cursor = 0;
        self.set_phase(SessionPhase::BatchReady);
        let _ = self.events.send(SessionEvent::BatchInstalled { total });
        info!(target: "session", total, "batch installed");

        // One poll task per question that carries an audio reference.
        let audio: Vec<(String, String)> = self
            .batch
            .iter()
            .filter_map(|q| {
                q.audio_url
                    .as_deref()
                    .map(|url| (audio_filename(url).to_string(), q.id.clone()))
            })
            .collect();
        for (filename, question_id) in audio {
            self.batch.mark_audio(&question_id, AudioState::Pending);
            self.assets.insert(filename.clone(), question_id);
            let api = self.api.clone();
            let check: ReadyCheck = Arc::new(move |filename: String| {
                let api = api.clone();
                Box::pin(async move { api.check_audio(filename).await })
                    as Pin<Box<dyn Future<Output = Result<bool, SessionError>> + Send>>
            });
            self.poller.start(&filename, check);
        }
        self.emit_progress();
    }

    //
    // Answer selection
    //

    /// Record the user's selection for one question and re-emit progress.
    pub fn select_answer(&mut self, question_id: &str, value: &str) -> Result<(), SessionError> {
        if self.phase != SessionPhase::BatchReady {
            return Err(self.notify_error(SessionError::Validation(
                "no quiz is currently active".into(),
            )));
        }
        if let Err(e) = self.ledger.set_answer(&self.batch, question_id, value) {
            return Err(self.notify_error(e));
        }
        self.emit_progress();
        Ok(())
    }

    //
    // Bulk submission
    //

    /// Gate submission on a complete ledger and produce the tagged request.
    /// Rejection is local: no request is sent and the message names the
    /// shortfall.
    #[instrument(level = "info", skip(self))]
    pub fn begin_submit(&mut self) -> Result<(u64, BulkGradeRequest), SessionError> {
        if self.phase != SessionPhase::BatchReady {
            return Err(self.notify_error(SessionError::Validation(
                "no quiz is ready to submit".into(),
            )));
        }
        if !self.ledger.is_complete(&self.batch) {
            let missing = self.batch.len() - self.ledger.answered_count();
            return Err(self.notify_error(SessionError::Validation(format!(
                "{missing} question(s) still unanswered"
            ))));
        }
        self.set_phase(SessionPhase::Submitting);
        self.grade_seq += 1;
        Ok((
            self.grade_seq,
            BulkGradeRequest { answers: self.ledger.answers_in(&self.batch) },
        ))
    }

    /// Apply a bulk grading outcome. Failure returns to `BatchReady` with
    /// batch and ledger intact; stale responses are discarded.
    #[instrument(level = "info", skip(self, outcome))]
    pub fn apply_grading(
        &mut self,
        seq: u64,
        outcome: Result<BulkGradeResponse, SessionError>,
    ) -> Result<(), SessionError> {
        if seq != self.grade_seq {
            info!(target: "session", seq, latest = self.grade_seq, "discarding stale grading response");
            return Ok(());
        }
        match outcome {
            Err(e) => {
                self.set_phase(SessionPhase::BatchReady);
                Err(self.notify_error(e))
            }
            Ok(resp) if !resp.success => {
                self.set_phase(SessionPhase::BatchReady);
                let msg = resp.error.unwrap_or_else(|| "failed to check answers".into());
                Err(self.notify_error(SessionError::Application(msg)))
            }
            Ok(resp) => {
                let results = reconcile(&self.batch, &self.ledger, &resp.results);
                info!(
                    target: "session",
                    correct = results.correct,
                    total = results.total,
                    score = results.score_percent,
                    "results reconciled"
                );
                // The quiz view is gone; its audio polls go with it.
                self.poller.stop_all();
                self.assets.clear();
                self.results = Some(results.clone());
                self.set_phase(SessionPhase::ResultsShown);
                let _ = self.events.send(SessionEvent::Results(results));
                Ok(())
            }
        }
    }

    /// Submit the full ledger for grading end-to-end.
    pub async fn submit_all(&mut self) -> Result<(), SessionError> {
        let (seq, req) = self.begin_submit()?;
        let outcome = self.api.check_answers(req).await;
        self.apply_grading(seq, outcome)
    }

    //
    // Legacy single-question flow
    //

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.batch.get(self.cursor)
    }

    /// Move the cursor forward; out-of-range requests are silent no-ops.
    pub fn next_question(&mut self) {
        if self.cursor + 1 < self.batch.len() {
            self.cursor += 1;
        }
    }

    /// Move the cursor back; out-of-range requests are silent no-ops.
    pub fn prev_question(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Grade the question at the cursor via the single-answer endpoint.
    #[instrument(level = "info", skip(self))]
    pub async fn check_current_answer(&mut self) -> Result<CheckAnswerResponse, SessionError> {
        if self.phase != SessionPhase::BatchReady {
            return Err(self.notify_error(SessionError::Validation(
                "no quiz is currently active".into(),
            )));
        }
        let (question_id, answer) = {
            let q = self
                .batch
                .get(self.cursor)
                .ok_or_else(|| SessionError::Validation("no question at cursor".into()))?;
            let answer = self.ledger.answer_for(&q.id).ok_or_else(|| {
                SessionError::Validation("select an answer before checking".into())
            });
            match answer {
                Ok(a) => (q.id.clone(), a.to_string()),
                Err(e) => return Err(self.notify_error(e)),
            }
        };
        let resp = match self
            .api
            .check_answer(CheckAnswerRequest { question_id, answer })
            .await
        {
            Ok(r) => r,
            Err(e) => return Err(self.notify_error(e)),
        };
        if !resp.success {
            let msg = resp.error.clone().unwrap_or_else(|| "failed to check answer".into());
            return Err(self.notify_error(SessionError::Application(msg)));
        }
        Ok(resp)
    }

    //
    // Passthrough lookups (no state retained)
    //

    pub async fn list_questions(&self) -> Result<Vec<Question>, SessionError> {
        match self.api.list_questions().await {
            Ok(qs) => Ok(qs),
            Err(e) => Err(self.notify_error(e)),
        }
    }

    /// Bilingual reference material for a grammar topic (Markdown text).
    pub async fn topic_reference(&self, topic: &str) -> Result<TopicReference, SessionError> {
        let resp = match self.api.topic_info(topic.to_string()).await {
            Ok(r) => r,
            Err(e) => return Err(self.notify_error(e)),
        };
        if !resp.success {
            let msg = resp.error.unwrap_or_else(|| "failed to load topic reference".into());
            return Err(self.notify_error(SessionError::Application(msg)));
        }
        Ok(TopicReference {
            content: Bilingual { en: resp.english_content, id: resp.indonesian_content },
            cached: resp.cached,
        })
    }

    //
    // Audio readiness plumbing
    //

    /// Apply any poll outcomes that have arrived. Hosts call this from their
    /// event loop; it never blocks.
    pub fn drain_audio_events(&mut self) {
        while let Ok(ev) = self.poll_events.try_recv() {
            self.apply_poll_event(ev);
        }
    }

    fn apply_poll_event(&mut self, ev: PollEvent) {
        let (asset, state) = match ev {
            PollEvent::Ready { asset_ref } => (asset_ref, AudioState::Ready),
            PollEvent::TimedOut { asset_ref } => (asset_ref, AudioState::TimedOut),
        };
        let Some(question_id) = self.assets.remove(&asset) else {
            debug!(target: "session", %asset, "poll event for unknown asset; ignoring");
            return;
        };
        self.poller.stop(&asset);
        self.batch.mark_audio(&question_id, state);
        let event = match state {
            AudioState::Ready => SessionEvent::AudioReady { question_id },
            _ => {
                self.notify_info(format!("audio for question {question_id} is unavailable"));
                SessionEvent::AudioTimedOut { question_id }
            }
        };
        let _ = self.events.send(event);
    }

    //
    // Reset
    //

    /// Discard all session state and return to `Idle`.
    #[instrument(level = "info", skip(self))]
    pub fn restart(&mut self) {
        self.teardown();
        self.set_phase(SessionPhase::Idle);
    }

    /// Atomic teardown: cancel every poll task, discard queued poll events,
    /// clear the ledger and batch, drop results.
    fn teardown(&mut self) {
        self.poller.stop_all();
        let (poller, poll_events) = ReadinessPoller::new(
            Duration::from_millis(self.cfg.poll_interval_ms),
            self.cfg.poll_max_attempts,
        );
        self.poller = poller;
        self.poll_events = poll_events;
        self.assets.clear();
        self.ledger.reset();
        self.batch = QuestionBatch::default();
        self.results = None;
        self.cursor = 0;
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            debug!(target: "session", from = ?self.phase, to = ?phase, "phase change");
            self.phase = phase;
            let _ = self.events.send(SessionEvent::PhaseChanged { phase });
        }
    }

    /// Recompute the answered/total counter and submit-eligibility; pure in
    /// (ledger, batch) and safe to call repeatedly.
    fn emit_progress(&self) {
        let _ = self.events.send(SessionEvent::Progress {
            answered: self.ledger.answered_count(),
            total: self.batch.len(),
            can_submit: self.can_submit(),
        });
    }

    /// Surface an informational notice. Used for degradations the user can
    /// keep working through, like missing audio.
    fn notify_info(&self, message: String) {
        info!(target: "session", %message, "surfacing notice to user");
        let _ = self.events.send(SessionEvent::Notice(Notice {
            id: Uuid::new_v4(),
            kind: NoticeKind::Info,
            message,
            ttl: Duration::from_secs(self.cfg.notice_ttl_secs),
        }));
    }

    /// Log the error, surface it as a notice, and hand it back for `?`.
    fn notify_error(&self, err: SessionError) -> SessionError {
        error!(target: "session", error = %err, "surfacing error to user");
        let _ = self.events.send(SessionEvent::Notice(Notice {
            id: Uuid::new_v4(),
            kind: NoticeKind::Error,
            message: err.to_string(),
            ttl: Duration::from_secs(self.cfg.notice_ttl_secs),
        }));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GradingResult;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubState {
        generate_queue: VecDeque<GenerateQuestionsResponse>,
        generate_transport_fail: bool,
        generate_calls: u32,
        grade: Option<BulkGradeResponse>,
        grade_transport_fail: bool,
        grade_calls: u32,
        single: Option<CheckAnswerResponse>,
        audio_ready: bool,
        audio_checks: u32,
    }

    #[derive(Clone, Default)]
    struct StubApi {
        inner: Arc<Mutex<StubState>>,
    }

    impl StubApi {
        fn state(&self) -> std::sync::MutexGuard<'_, StubState> {
            self.inner.lock().unwrap()
        }
    }

    impl QuizApi for StubApi {
        async fn list_questions(&self) -> Result<Vec<Question>, SessionError> {
            Ok(Vec::new())
        }

        async fn generate_questions(
            &self,
            _req: GenerateQuestionsRequest,
        ) -> Result<GenerateQuestionsResponse, SessionError> {
            let mut s = self.state();
            s.generate_calls += 1;
            if s.generate_transport_fail {
                return Err(SessionError::Transport("connection refused".into()));
            }
            s.generate_queue
                .pop_front()
                .ok_or_else(|| SessionError::Transport("no scripted response".into()))
        }

        async fn check_audio(&self, _filename: String) -> Result<bool, SessionError> {
            let mut s = self.state();
            s.audio_checks += 1;
            Ok(s.audio_ready)
        }

        async fn check_answer(
            &self,
            _req: CheckAnswerRequest,
        ) -> Result<CheckAnswerResponse, SessionError> {
            self.state()
                .single
                .clone()
                .ok_or_else(|| SessionError::Transport("no scripted response".into()))
        }

        async fn check_answers(
            &self,
            _req: BulkGradeRequest,
        ) -> Result<BulkGradeResponse, SessionError> {
            let mut s = self.state();
            s.grade_calls += 1;
            if s.grade_transport_fail {
                return Err(SessionError::Transport("connection refused".into()));
            }
            s.grade
                .clone()
                .ok_or_else(|| SessionError::Transport("no scripted response".into()))
        }

        async fn topic_info(&self, topic: String) -> Result<crate::protocol::TopicInfoResponse, SessionError> {
            Ok(crate::protocol::TopicInfoResponse {
                success: true,
                english_content: format!("# {topic}"),
                indonesian_content: format!("# {topic} (id)"),
                cached: true,
                error: None,
            })
        }
    }

    fn question(id: &str, audio: Option<&str>) -> Question {
        Question {
            id: id.to_string(),
            prompt: format!("prompt {id}"),
            options: vec!["a".into(), "b".into()],
            difficulty: Difficulty::Easy,
            grammar_topic: "articles".into(),
            audio_url: audio.map(str::to_string),
            audio: AudioState::Absent,
        }
    }

    fn ok_response(questions: Vec<Question>) -> GenerateQuestionsResponse {
        GenerateQuestionsResponse { success: true, questions, error: None }
    }

    fn grading(id: &str, is_correct: bool) -> GradingResult {
        GradingResult {
            question_id: id.to_string(),
            is_correct,
            correct_answer: "a".into(),
            feedback_en: String::new(),
            feedback_id: String::new(),
            explanation_en: String::new(),
            explanation_id: String::new(),
        }
    }

    fn controller(
        api: &StubApi,
    ) -> (SessionController<StubApi>, mpsc::UnboundedReceiver<SessionEvent>) {
        SessionController::new(api.clone(), SessionConfig::default())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn generation_installs_batch_and_polls_only_audio_questions() {
        let api = StubApi::default();
        api.state().generate_queue.push_back(ok_response(vec![
            question("1", Some("/data/audio/q1.mp3")),
            question("2", None),
        ]));
        api.state().audio_ready = true;

        let (mut c, mut rx) = controller(&api);
        c.generate(GenerateParams { count: 2, ..Default::default() }).await.unwrap();

        assert_eq!(c.phase(), SessionPhase::BatchReady);
        assert_eq!(c.batch().len(), 2);
        assert_eq!(c.batch().by_id("1").unwrap().audio, AudioState::Pending);
        assert_eq!(c.batch().by_id("2").unwrap().audio, AudioState::Absent);

        settle().await;
        c.drain_audio_events();
        assert_eq!(c.batch().by_id("1").unwrap().audio, AudioState::Ready);
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::AudioReady { question_id } if question_id == "1"
        )));
        // Exactly one poll task existed, and it settled after one check.
        assert_eq!(api.state().audio_checks, 1);
    }

    #[tokio::test]
    async fn empty_generation_surfaces_error_and_returns_to_idle() {
        let api = StubApi::default();
        api.state().generate_queue.push_back(ok_response(vec![]));

        let (mut c, mut rx) = controller(&api);
        let err = c.generate(GenerateParams::default()).await.unwrap_err();
        assert!(matches!(err, SessionError::Application(_)));
        assert_eq!(c.phase(), SessionPhase::Idle);
        assert!(c.batch().is_empty());
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Notice(_))));
    }

    #[tokio::test]
    async fn transport_failure_rolls_back_to_idle() {
        let api = StubApi::default();
        api.state().generate_transport_fail = true;

        let (mut c, _rx) = controller(&api);
        let err = c.generate(GenerateParams::default()).await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(c.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn zero_count_is_rejected_locally() {
        let api = StubApi::default();
        let (mut c, _rx) = controller(&api);
        let err = c
            .generate(GenerateParams { count: 0, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(api.state().generate_calls, 0);
    }

    #[tokio::test]
    async fn stale_generation_response_is_discarded() {
        let api = StubApi::default();
        let (mut c, _rx) = controller(&api);

        let (seq1, _req1) = c.begin_generate(&GenerateParams::default()).unwrap();
        let (seq2, _req2) = c.begin_generate(&GenerateParams::default()).unwrap();

        // The first request's response arrives after the second's was issued.
        c.apply_generation(seq1, Ok(ok_response(vec![question("old", None)]))).unwrap();
        assert_eq!(c.phase(), SessionPhase::Generating, "stale response must not install");
        assert!(c.batch().is_empty());

        c.apply_generation(seq2, Ok(ok_response(vec![question("new", None)]))).unwrap();
        assert_eq!(c.phase(), SessionPhase::BatchReady);
        assert!(c.batch().by_id("new").is_some());
        assert!(c.batch().by_id("old").is_none());
    }

    #[tokio::test]
    async fn submit_is_rejected_while_any_answer_is_missing() {
        let api = StubApi::default();
        api.state()
            .generate_queue
            .push_back(ok_response(vec![question("1", None), question("2", None)]));

        let (mut c, _rx) = controller(&api);
        c.generate(GenerateParams { count: 2, ..Default::default() }).await.unwrap();
        c.select_answer("1", "a").unwrap();

        // Exactly one answer missing: still rejected, no request sent.
        let err = c.submit_all().await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert!(err.to_string().contains("1 question(s)"));
        assert_eq!(c.phase(), SessionPhase::BatchReady);
        assert_eq!(api.state().grade_calls, 0);

        c.select_answer("2", "b").unwrap();
        assert!(c.can_submit());
    }

    #[tokio::test]
    async fn full_submit_reconciles_and_shows_results() {
        let api = StubApi::default();
        api.state()
            .generate_queue
            .push_back(ok_response(vec![question("1", None), question("2", None)]));
        api.state().grade = Some(BulkGradeResponse {
            success: true,
            results: vec![grading("1", true), grading("2", false)],
            error: None,
        });

        let (mut c, mut rx) = controller(&api);
        c.generate(GenerateParams { count: 2, ..Default::default() }).await.unwrap();
        c.select_answer("1", "a").unwrap();
        c.select_answer("2", "b").unwrap();
        c.submit_all().await.unwrap();

        assert_eq!(c.phase(), SessionPhase::ResultsShown);
        let results = c.results().unwrap();
        assert_eq!(results.correct, 1);
        assert_eq!(results.total, 2);
        assert_eq!(results.score_percent, 50);
        assert_eq!(results.reviews[0].user_answer.as_deref(), Some("a"));

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Results(_))));
    }

    #[tokio::test]
    async fn grading_failure_returns_to_batch_ready_with_ledger_intact() {
        let api = StubApi::default();
        api.state()
            .generate_queue
            .push_back(ok_response(vec![question("1", None)]));
        api.state().grade_transport_fail = true;

        let (mut c, _rx) = controller(&api);
        c.generate(GenerateParams::default()).await.unwrap();
        c.select_answer("1", "a").unwrap();

        let err = c.submit_all().await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(c.phase(), SessionPhase::BatchReady);
        assert_eq!(c.ledger().answer_for("1"), Some("a"));
        assert!(c.results().is_none());
    }

    #[tokio::test]
    async fn answer_selection_validates_and_reports_progress() {
        let api = StubApi::default();
        api.state()
            .generate_queue
            .push_back(ok_response(vec![question("1", None), question("2", None)]));

        let (mut c, mut rx) = controller(&api);
        c.generate(GenerateParams { count: 2, ..Default::default() }).await.unwrap();
        drain(&mut rx);

        let err = c.select_answer("1", "zzz").unwrap_err();
        assert!(matches!(err, SessionError::InvalidAnswerValue { .. }));

        c.select_answer("1", "b").unwrap();
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Progress { answered: 1, total: 2, can_submit: false }
        )));
    }

    #[tokio::test]
    async fn cursor_navigation_clamps_silently() {
        let api = StubApi::default();
        api.state()
            .generate_queue
            .push_back(ok_response(vec![question("1", None), question("2", None)]));

        let (mut c, _rx) = controller(&api);
        c.generate(GenerateParams { count: 2, ..Default::default() }).await.unwrap();

        assert_eq!(c.cursor(), 0);
        c.prev_question();
        assert_eq!(c.cursor(), 0);
        c.next_question();
        assert_eq!(c.cursor(), 1);
        c.next_question();
        c.next_question();
        assert_eq!(c.cursor(), 1);
        assert_eq!(c.current_question().unwrap().id, "2");
    }

    #[tokio::test]
    async fn legacy_single_answer_check_uses_the_cursor() {
        let api = StubApi::default();
        api.state()
            .generate_queue
            .push_back(ok_response(vec![question("1", None)]));
        api.state().single = Some(CheckAnswerResponse {
            success: true,
            is_correct: true,
            feedback_en: "Well done".into(),
            feedback_id: "Bagus".into(),
            explanation: "Articles precede nouns.".into(),
            error: None,
        });

        let (mut c, _rx) = controller(&api);
        c.generate(GenerateParams::default()).await.unwrap();

        // No answer selected yet: rejected locally.
        let err = c.check_current_answer().await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));

        c.select_answer("1", "a").unwrap();
        let resp = c.check_current_answer().await.unwrap();
        assert!(resp.is_correct);
        assert_eq!(resp.feedback_id, "Bagus");
    }

    #[tokio::test(start_paused = true)]
    async fn audio_timeout_marks_question_and_surfaces_info_notice() {
        let api = StubApi::default();
        api.state().generate_queue.push_back(ok_response(vec![question(
            "1",
            Some("/data/audio/q1.mp3"),
        )]));
        api.state().audio_ready = false;

        let cfg = SessionConfig { poll_max_attempts: Some(2), ..Default::default() };
        let (mut c, mut rx) = SessionController::new(api.clone(), cfg);
        c.generate(GenerateParams::default()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        c.drain_audio_events();

        assert_eq!(c.batch().by_id("1").unwrap().audio, AudioState::TimedOut);
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::AudioTimedOut { question_id } if question_id == "1"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Notice(n) if n.kind == NoticeKind::Info && n.message.contains("audio")
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_cancels_polls_and_discards_stale_events() {
        let api = StubApi::default();
        api.state().generate_queue.push_back(ok_response(vec![question(
            "1",
            Some("/data/audio/q1.mp3"),
        )]));
        // Audio never becomes ready while the batch is alive...
        api.state().audio_ready = false;

        let (mut c, mut rx) = controller(&api);
        c.generate(GenerateParams::default()).await.unwrap();
        settle().await;

        c.restart();
        assert_eq!(c.phase(), SessionPhase::Idle);
        assert!(c.batch().is_empty());

        // ...and flips ready only after the restart. No stale event may
        // reference the torn-down question.
        api.state().audio_ready = true;
        settle().await;
        c.drain_audio_events();
        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(
            e,
            SessionEvent::AudioReady { .. } | SessionEvent::AudioTimedOut { .. }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn new_generation_tears_down_previous_polls_and_ledger() {
        let api = StubApi::default();
        api.state().generate_queue.push_back(ok_response(vec![question(
            "old",
            Some("/data/audio/old.mp3"),
        )]));
        api.state()
            .generate_queue
            .push_back(ok_response(vec![question("new", None)]));

        let (mut c, mut rx) = controller(&api);
        c.generate(GenerateParams::default()).await.unwrap();
        c.select_answer("old", "a").unwrap();

        c.generate(GenerateParams::default()).await.unwrap();
        assert_eq!(c.ledger().answered_count(), 0);
        assert!(c.batch().by_id("old").is_none());

        api.state().audio_ready = true;
        settle().await;
        c.drain_audio_events();
        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(
            e,
            SessionEvent::AudioReady { question_id } if question_id == "old"
        )));
    }

    #[tokio::test]
    async fn topic_reference_passes_content_through() {
        let api = StubApi::default();
        let (c, _rx) = controller(&api);
        let t = c.topic_reference("past tense").await.unwrap();
        assert_eq!(t.content.en, "# past tense");
        assert_eq!(t.content.id, "# past tense (id)");
        assert!(t.cached);
    }
}
