use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::question::QuestionType;
use crate::models::session::{
    CandidateInfo, LoadFailureKind, RemoteResult, SessionStatus, TestInfo,
};
use crate::session::flags::QuestionStatus;
use crate::session::gate::GateState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub status: SessionStatus,
    pub test: Option<TestInfo>,
    pub candidate: Option<CandidateInfo>,
    pub has_questions: bool,
    pub questions: Vec<QuestionView>,
    pub current_index: Option<usize>,
    pub can_go_previous: bool,
    pub can_go_next: bool,
    pub started: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub remaining_seconds: Option<u32>,
    pub remaining_clock: Option<String>,
    pub answered_count: usize,
    pub progress: f64,
    pub submission: SubmissionView,
    pub load_failure: Option<LoadFailureView>,
    pub remote_result: Option<RemoteResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub index: usize,
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub prompt: String,
    pub options: Option<Vec<String>>,
    pub marks: u32,
    pub answer: String,
    pub flagged: bool,
    pub status: QuestionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionView {
    pub state: GateState,
    pub summary: Option<SubmitSummary>,
    pub last_error: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub redirect_pending: bool,
    pub notify_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadFailureView {
    pub kind: LoadFailureKind,
    pub message: String,
    pub retryable: bool,
}

/// Counts shown in the confirm-before-submit dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitSummary {
    pub answered: usize,
    pub flagged: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SetAnswerRequest {
    #[validate(length(max = 100000))]
    pub answer: String,
}

/// Pre-start edit of the candidate's own details. Absent fields are left as
/// loaded.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateCandidateRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigateAction {
    Next,
    Prev,
    Jump,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigateRequest {
    pub action: NavigateAction,
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigateResponse {
    pub current_index: usize,
    pub can_go_previous: bool,
    pub can_go_next: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleFlagResponse {
    pub question_id: String,
    pub flagged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAnswerResponse {
    pub saved: bool,
    pub index: usize,
    pub answered_count: usize,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitRequestResponse {
    AwaitingConfirmation { summary: SubmitSummary },
    Ignored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitConfirmResponse {
    Submitted { message: String },
    Failed { message: String },
    Ignored,
}
