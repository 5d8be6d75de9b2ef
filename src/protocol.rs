//! Wire DTOs for the external quiz services (serde ready).
//! Field names mirror the server's JSON exactly; keep this small and stable
//! so the session core and the server can evolve independently.

use serde::{Deserialize, Serialize};

use crate::domain::{GradingResult, Question};

//
// Question Generation Service
//

#[derive(Clone, Debug, Serialize)]
pub struct GenerateQuestionsRequest {
    /// "easy" | "medium" | "hard" | "any"
    pub difficulty: String,
    /// Free-text topic filter; empty means unconstrained.
    pub topic: String,
    pub count: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GenerateQuestionsResponse {
    pub success: bool,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub error: Option<String>,
}

//
// Audio Readiness Service
//

#[derive(Clone, Debug, Deserialize)]
pub struct CheckAudioResponse {
    pub ready: bool,
}

//
// Single-Answer Grading Service (legacy path)
//

#[derive(Clone, Debug, Serialize)]
pub struct CheckAnswerRequest {
    pub question_id: String,
    pub answer: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckAnswerResponse {
    pub success: bool,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub feedback_en: String,
    #[serde(default)]
    pub feedback_id: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub error: Option<String>,
}

//
// Bulk Grading Service
//

#[derive(Clone, Debug, Serialize)]
pub struct AnswerItem {
    pub question_id: String,
    pub answer: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct BulkGradeRequest {
    pub answers: Vec<AnswerItem>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BulkGradeResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Vec<GradingResult>,
    #[serde(default)]
    pub error: Option<String>,
}

//
// Grammar Topic Reference Service
//

#[derive(Clone, Debug, Serialize)]
pub struct TopicInfoRequest {
    pub topic: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TopicInfoResponse {
    pub success: bool,
    #[serde(default)]
    pub english_content: String,
    #[serde(default)]
    pub indonesian_content: String,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub error: Option<String>,
}
