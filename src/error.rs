//! Shared error taxonomy for the session core.
//!
//! Orphan grading results are deliberately NOT represented here: they are
//! logged and skipped during reconciliation, never returned to the caller.
//! Poll timeouts are surfaced as events, not errors.

use thiserror::Error;

/// Errors surfaced by the session controller and its collaborators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The request failed before a response was received. Always recoverable;
    /// the same action may be retried.
    #[error("could not reach server: {0}")]
    Transport(String),

    /// The server answered but reported failure (or an empty result set where
    /// one was expected).
    #[error("{0}")]
    Application(String),

    /// A local precondition was violated; no request was sent.
    #[error("{0}")]
    Validation(String),

    /// The selected value is not among the question's declared options.
    #[error("'{value}' is not an option of question {question_id}")]
    InvalidAnswerValue { question_id: String, value: String },
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        SessionError::Transport(e.to_string())
    }
}
