use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

const WINDOW: Duration = Duration::from_secs(1);
const PRUNE_ABOVE: usize = 1024;
const SESSIONS_PREFIX: &str = "/api/sessions/";

#[derive(Debug)]
struct WindowState {
    start: Instant,
    count: u32,
}

/// One-second request budget per session. Requests outside the session API
/// share a single budget.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    rps: u32,
    windows: Arc<Mutex<HashMap<String, WindowState>>>,
}

impl RateLimiter {
    fn new(rps: u32) -> Self {
        Self {
            rps: rps.max(1),
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn allow(&self, key: &str) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if windows.len() > PRUNE_ABOVE {
            windows.retain(|_, w| now.duration_since(w.start) < WINDOW);
        }
        let window = windows.entry(key.to_string()).or_insert(WindowState {
            start: now,
            count: 0,
        });
        if now.duration_since(window.start) >= WINDOW {
            window.start = now;
            window.count = 0;
        }
        if window.count < self.rps {
            window.count += 1;
            true
        } else {
            false
        }
    }
}

/// `/api/sessions/{id}/...` budgets on `id`.
fn budget_key(path: &str) -> &str {
    path.strip_prefix(SESSIONS_PREFIX)
        .and_then(|rest| rest.split('/').next())
        .filter(|id| !id.is_empty())
        .unwrap_or("")
}

pub async fn rps_middleware(
    State(state): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = budget_key(req.uri().path());
    if !state.allow(key) {
        tracing::warn!("Rate limit exceeded for {}", req.uri().path());
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error":"rate_limit_exceeded"})),
        )
            .into_response();
    }
    next.run(req).await
}

pub fn new_rps_state(rps: u32) -> RateLimiter {
    RateLimiter::new(rps)
}
