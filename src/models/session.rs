use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotLoaded,
    Loading,
    Ready,
    Expired,
    Error,
    Submitted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::NotLoaded => "not_loaded",
            SessionStatus::Loading => "loading",
            SessionStatus::Ready => "ready",
            SessionStatus::Expired => "expired",
            SessionStatus::Error => "error",
            SessionStatus::Submitted => "submitted",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestInfo {
    pub name: String,
    pub position: String,
    pub duration_seconds: u32,
    pub max_score: Option<f64>,
    pub instructions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadFailureKind {
    Network,
    Parse,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadFailure {
    pub kind: LoadFailureKind,
    pub message: String,
}

impl LoadFailure {
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, LoadFailureKind::NotFound)
    }
}

/// Stored outcome of an assignment that was already submitted elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteResult {
    pub total_score: Option<f64>,
    pub answers: Vec<ReplayAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayAnswer {
    pub question_id: String,
    pub answer: String,
    pub score_awarded: Option<f64>,
}

/// Bearer credentials of the candidate, forwarded on every backend call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    bearer_token: Option<String>,
}

impl Credentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            bearer_token: Some(token).filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }
}
