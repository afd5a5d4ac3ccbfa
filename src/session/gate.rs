use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Idle,
    Confirming,
    Submitting,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    User,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    AwaitConfirmation,
    /// The caller now owns the single submission call.
    Submit,
    Ignored,
}

/// Guards the one network submission a session is allowed.
#[derive(Debug, Clone)]
pub struct SubmissionGate {
    state: GateState,
    last_error: Option<String>,
}

impl Default for SubmissionGate {
    fn default() -> Self {
        Self {
            state: GateState::Idle,
            last_error: None,
        }
    }
}

impl SubmissionGate {
    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True while the session may still be edited and submitted.
    pub fn is_open(&self) -> bool {
        matches!(self.state, GateState::Idle | GateState::Confirming)
    }

    pub fn request(&mut self, trigger: SubmitTrigger) -> GateTransition {
        match (self.state, trigger) {
            (GateState::Idle, SubmitTrigger::User) => {
                self.state = GateState::Confirming;
                GateTransition::AwaitConfirmation
            }
            (GateState::Idle | GateState::Confirming, SubmitTrigger::Timeout) => {
                self.begin()
            }
            _ => GateTransition::Ignored,
        }
    }

    pub fn confirm(&mut self) -> GateTransition {
        match self.state {
            GateState::Confirming => self.begin(),
            _ => GateTransition::Ignored,
        }
    }

    pub fn cancel(&mut self) -> bool {
        if self.state == GateState::Confirming {
            self.state = GateState::Idle;
            true
        } else {
            false
        }
    }

    pub fn succeed(&mut self) {
        if self.state == GateState::Submitting {
            self.state = GateState::Submitted;
            self.last_error = None;
        }
    }

    pub fn fail(&mut self, message: String) {
        if self.state == GateState::Submitting {
            self.state = GateState::Idle;
            self.last_error = Some(message);
        }
    }

    /// Marks a submission recorded by the backend before this session loaded.
    pub fn mark_submitted(&mut self) {
        self.state = GateState::Submitted;
    }

    fn begin(&mut self) -> GateTransition {
        self.state = GateState::Submitting;
        self.last_error = None;
        GateTransition::Submit
    }
}
