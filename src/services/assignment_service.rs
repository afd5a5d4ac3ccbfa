use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{info, warn};
use url::Url;

use crate::dto::assignment_dto::{FetchAssignmentResponse, SubmitTestRequest};
use crate::error::{Error, Result};
use crate::models::session::Credentials;

/// The assignment/test backend as seen by a test-taking session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssignmentApi: Send + Sync {
    async fn fetch_assignment(
        &self,
        session_id: &str,
        credentials: &Credentials,
    ) -> Result<FetchAssignmentResponse>;

    async fn submit_answers(
        &self,
        request: &SubmitTestRequest,
        credentials: &Credentials,
    ) -> Result<()>;
}

#[derive(Clone)]
pub struct AssignmentService {
    client: Client,
    base_url: Url,
}

impl AssignmentService {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Assignment service URL cannot be used as a base: {}",
                base_url
            )));
        }

        info!("Assignment service at {}", base_url);
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Invalid base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(
        &self,
        builder: reqwest::RequestBuilder,
        credentials: &Credentials,
    ) -> reqwest::RequestBuilder {
        match credentials.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl AssignmentApi for AssignmentService {
    async fn fetch_assignment(
        &self,
        session_id: &str,
        credentials: &Credentials,
    ) -> Result<FetchAssignmentResponse> {
        let url = self.endpoint(&["api", "test", session_id])?;
        let resp = self
            .authorize(self.client.get(url), credentials)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        match status {
            s if s.is_success() => {
                let parsed: FetchAssignmentResponse = serde_json::from_str(&body)?;
                Ok(parsed)
            }
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!(
                "Assignment {} not found",
                session_id
            ))),
            StatusCode::GONE => Err(Error::Expired(format!(
                "Assignment {} is no longer available",
                session_id
            ))),
            other => {
                warn!(
                    "Assignment fetch for {} returned {}: {}",
                    session_id,
                    other.as_u16(),
                    body
                );
                Err(Error::Upstream {
                    status: other.as_u16(),
                    message: extract_message(&body),
                })
            }
        }
    }

    async fn submit_answers(
        &self,
        request: &SubmitTestRequest,
        credentials: &Credentials,
    ) -> Result<()> {
        let url = self.endpoint(&["api", "submit-test"])?;
        let resp = self
            .authorize(self.client.post(url), credentials)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        warn!(
            "Submission for {} rejected with {}: {}",
            request.assignment_id,
            status.as_u16(),
            body
        );
        Err(Error::Upstream {
            status: status.as_u16(),
            message: extract_message(&body),
        })
    }
}

/// Pulls `message`/`error` out of a JSON error body, falling back to the raw text.
fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().chars().take(200).collect())
}
