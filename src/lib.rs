pub mod config;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;
pub mod utils;

use std::sync::Arc;

use axum::{
    routing::{get, patch, post, put},
    Router,
};

use crate::config::Config;
use crate::services::assignment_service::{AssignmentApi, AssignmentService};
use crate::session::registry::SessionRegistry;
use crate::session::SessionSettings;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(api: Arc<dyn AssignmentApi>, settings: SessionSettings) -> Self {
        Self {
            sessions: SessionRegistry::new(api, settings),
        }
    }

    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        let api = AssignmentService::new(
            config.assignment_api_url.clone(),
            config.request_timeout(),
        )?;
        Ok(Self::new(Arc::new(api), SessionSettings::from_config(config)))
    }
}

/// Session API plus health check. `rps` caps the session routes.
pub fn router(state: AppState, rps: u32) -> Router {
    let session_api = Router::new()
        .route(
            "/api/sessions/:id",
            post(routes::session::open_session)
                .get(routes::session::get_session)
                .delete(routes::session::close_session),
        )
        .route("/api/sessions/:id/retry", post(routes::session::retry_load))
        .route(
            "/api/sessions/:id/candidate",
            patch(routes::session::update_candidate),
        )
        .route("/api/sessions/:id/start", post(routes::session::start_session))
        .route(
            "/api/sessions/:id/answers/:index",
            put(routes::session::save_answer),
        )
        .route("/api/sessions/:id/navigate", post(routes::session::navigate))
        .route(
            "/api/sessions/:id/flags/:question_id",
            post(routes::session::toggle_flag),
        )
        .route("/api/sessions/:id/submit", post(routes::session::request_submit))
        .route(
            "/api/sessions/:id/submit/confirm",
            post(routes::session::confirm_submit),
        )
        .route(
            "/api/sessions/:id/submit/cancel",
            post(routes::session::cancel_submit),
        )
        .route("/api/sessions/:id/events", get(routes::events::session_events))
        .layer(axum::middleware::from_fn(
            crate::middleware::auth::bearer_credentials,
        ))
        .layer(axum::middleware::from_fn_with_state(
            crate::middleware::rate_limit::new_rps_state(rps),
            crate::middleware::rate_limit::rps_middleware,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(session_api)
        .with_state(state)
}
