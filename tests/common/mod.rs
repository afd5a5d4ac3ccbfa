#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use candidate_test_session::dto::assignment_dto::{FetchAssignmentResponse, SubmitTestRequest};
use candidate_test_session::error::{Error, Result};
use candidate_test_session::models::session::Credentials;
use candidate_test_session::services::assignment_service::AssignmentApi;
use candidate_test_session::session::{SessionSettings, TestSession};
use serde_json::{json, Value};

pub enum FetchStep {
    Payload(Value),
    NotFound,
    Gone,
    Upstream(u16),
}

pub enum SubmitStep {
    Accept,
    Reject(u16),
}

/// Scripted assignment backend. Fetch and submit steps are consumed in
/// order; an exhausted submit script accepts.
#[derive(Default)]
pub struct FakeAssignmentApi {
    fetches: Mutex<VecDeque<FetchStep>>,
    submits: Mutex<VecDeque<SubmitStep>>,
    fetch_delay: Mutex<Duration>,
    submit_delay: Mutex<Duration>,
    pub fetch_count: Mutex<usize>,
    pub submissions: Mutex<Vec<SubmitTestRequest>>,
    pub accepted: Mutex<usize>,
    pub seen_tokens: Mutex<Vec<Option<String>>>,
}

impl FakeAssignmentApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serving(payload: Value) -> Self {
        Self::new().then_fetch(FetchStep::Payload(payload))
    }

    pub fn then_fetch(self, step: FetchStep) -> Self {
        self.fetches.lock().unwrap().push_back(step);
        self
    }

    pub fn then_submit(self, step: SubmitStep) -> Self {
        self.submits.lock().unwrap().push_back(step);
        self
    }

    pub fn with_fetch_delay(self, delay: Duration) -> Self {
        *self.fetch_delay.lock().unwrap() = delay;
        self
    }

    pub fn with_submit_delay(self, delay: Duration) -> Self {
        *self.submit_delay.lock().unwrap() = delay;
        self
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    pub fn accepted_count(&self) -> usize {
        *self.accepted.lock().unwrap()
    }

    pub fn last_submission(&self) -> Option<SubmitTestRequest> {
        self.submissions.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl AssignmentApi for FakeAssignmentApi {
    async fn fetch_assignment(
        &self,
        session_id: &str,
        credentials: &Credentials,
    ) -> Result<FetchAssignmentResponse> {
        *self.fetch_count.lock().unwrap() += 1;
        self.seen_tokens
            .lock()
            .unwrap()
            .push(credentials.bearer_token().map(str::to_string));
        let delay = *self.fetch_delay.lock().unwrap();
        let step = self.fetches.lock().unwrap().pop_front();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match step {
            Some(FetchStep::Payload(value)) => Ok(serde_json::from_value(value)?),
            Some(FetchStep::NotFound) | None => {
                Err(Error::NotFound(format!("Assignment {} not found", session_id)))
            }
            Some(FetchStep::Gone) => Err(Error::Expired("gone".to_string())),
            Some(FetchStep::Upstream(status)) => Err(Error::Upstream {
                status,
                message: "upstream failure".to_string(),
            }),
        }
    }

    async fn submit_answers(
        &self,
        request: &SubmitTestRequest,
        _credentials: &Credentials,
    ) -> Result<()> {
        self.submissions.lock().unwrap().push(request.clone());
        let delay = *self.submit_delay.lock().unwrap();
        let step = self.submits.lock().unwrap().pop_front();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match step {
            Some(SubmitStep::Reject(status)) => Err(Error::Upstream {
                status,
                message: "Submission rejected".to_string(),
            }),
            Some(SubmitStep::Accept) | None => {
                *self.accepted.lock().unwrap() += 1;
                Ok(())
            }
        }
    }
}

/// Wrapped assignment with `count` theory questions `q0..`.
pub fn assignment(duration_minutes: u32, count: usize) -> Value {
    let questions: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "_id": format!("q{}", i),
                "type": "theory",
                "question": format!("Question {}", i),
                "mark": 2
            })
        })
        .collect();
    json!({
        "assignment": {
            "_id": "assign-1",
            "status": "pending",
            "template": {
                "name": "Backend Engineer Screening",
                "position": "Backend Engineer",
                "testDuration": duration_minutes,
                "questions": questions
            },
            "candidate": { "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com" }
        }
    })
}

pub fn session(api: Arc<FakeAssignmentApi>) -> TestSession {
    TestSession::new(
        "assign-1",
        Credentials::bearer("candidate-token"),
        api,
        SessionSettings::default(),
    )
}
