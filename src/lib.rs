//! Tatabahasa · Quiz Session Core
//!
//! Client-side controller for the bilingual (English/Indonesian) grammar
//! trainer: drives batch question generation, tracks per-question answers,
//! polls for asynchronously generated audio assets, and reconciles bulk
//! grading results into per-question feedback and a score.
//!
//! The core is render-agnostic: it emits `SessionEvent`s over a channel and
//! a presentation layer projects them however it likes.
//!
//! Important env variables:
//!   QUIZ_API_BASE_URL   : server base URL (default "http://127.0.0.1:8000")
//!   SESSION_CONFIG_PATH : path to TOML config overriding the defaults
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod poller;
pub mod protocol;
pub mod reconcile;
pub mod session;
pub mod telemetry;
pub mod util;

pub use api::{HttpQuizApi, QuizApi};
pub use config::{load_session_config_from_env, SessionConfig};
pub use domain::{AudioState, Difficulty, Question, QuestionBatch};
pub use error::SessionError;
pub use ledger::AnswerLedger;
pub use poller::{PollEvent, ReadinessPoller};
pub use reconcile::{QuestionReview, SessionResults};
pub use session::{
    GenerateParams, Notice, NoticeKind, SessionController, SessionEvent, SessionPhase,
};
