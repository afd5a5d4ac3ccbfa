use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::json;
use validator::Validate;

use crate::dto::session_dto::{
    NavigateAction, NavigateRequest, NavigateResponse, SaveAnswerResponse, SetAnswerRequest,
    SubmitConfirmResponse, SubmitRequestResponse, ToggleFlagResponse, UpdateCandidateRequest,
};
use crate::error::Error;
use crate::models::session::Credentials;
use crate::session::{SubmissionOutcome, SubmitRequest};
use crate::AppState;

#[axum::debug_handler]
pub async fn open_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(credentials): Extension<Credentials>,
) -> crate::error::Result<Response> {
    let session = state.sessions.open(&id, credentials).await?;
    Ok(Json(session.view()).into_response())
}

#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(credentials): Extension<Credentials>,
) -> crate::error::Result<Response> {
    let session = state.sessions.get(&id, &credentials)?;
    Ok(Json(session.view()).into_response())
}

#[axum::debug_handler]
pub async fn retry_load(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(credentials): Extension<Credentials>,
) -> crate::error::Result<Response> {
    let session = state.sessions.get(&id, &credentials)?;
    session.retry_load().await?;
    Ok(Json(session.view()).into_response())
}

#[axum::debug_handler]
pub async fn update_candidate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(credentials): Extension<Credentials>,
    Json(payload): Json<UpdateCandidateRequest>,
) -> crate::error::Result<Response> {
    payload.validate()?;
    let session = state.sessions.get(&id, &credentials)?;
    let candidate = session.update_candidate(payload.name, payload.phone)?;
    Ok(Json(candidate).into_response())
}

#[axum::debug_handler]
pub async fn start_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(credentials): Extension<Credentials>,
) -> crate::error::Result<Response> {
    let session = state.sessions.get(&id, &credentials)?;
    session.start()?;
    Ok(Json(session.view()).into_response())
}

#[axum::debug_handler]
pub async fn save_answer(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
    Extension(credentials): Extension<Credentials>,
    Json(payload): Json<SetAnswerRequest>,
) -> crate::error::Result<Response> {
    payload.validate()?;
    let session = state.sessions.get(&id, &credentials)?;
    session.set_answer(index, payload.answer)?;
    let view = session.view();
    Ok(Json(SaveAnswerResponse {
        saved: true,
        index,
        answered_count: view.answered_count,
        progress: view.progress,
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn navigate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(credentials): Extension<Credentials>,
    Json(payload): Json<NavigateRequest>,
) -> crate::error::Result<Response> {
    let session = state.sessions.get(&id, &credentials)?;
    let current_index = match payload.action {
        NavigateAction::Next => session.next()?,
        NavigateAction::Prev => session.prev()?,
        NavigateAction::Jump => {
            let index = payload
                .index
                .ok_or_else(|| Error::BadRequest("index is required for jump".to_string()))?;
            session.jump_to(index)?
        }
    };
    Ok(Json(NavigateResponse {
        current_index,
        can_go_previous: session.can_go_previous(),
        can_go_next: session.can_go_next(),
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn toggle_flag(
    State(state): State<AppState>,
    Path((id, question_id)): Path<(String, String)>,
    Extension(credentials): Extension<Credentials>,
) -> crate::error::Result<Response> {
    let session = state.sessions.get(&id, &credentials)?;
    let flagged = session.toggle_flag(&question_id)?;
    Ok(Json(ToggleFlagResponse {
        question_id,
        flagged,
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn request_submit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(credentials): Extension<Credentials>,
) -> crate::error::Result<Response> {
    let session = state.sessions.get(&id, &credentials)?;
    let response = match session.request_submit() {
        SubmitRequest::AwaitingConfirmation(summary) => {
            SubmitRequestResponse::AwaitingConfirmation { summary }
        }
        SubmitRequest::Ignored => SubmitRequestResponse::Ignored,
    };
    Ok(Json(response).into_response())
}

#[axum::debug_handler]
pub async fn confirm_submit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(credentials): Extension<Credentials>,
) -> crate::error::Result<Response> {
    let session = state.sessions.get(&id, &credentials)?;
    let response = match session.confirm_submit().await {
        SubmissionOutcome::Submitted => SubmitConfirmResponse::Submitted {
            message: "Your answers have been submitted.".to_string(),
        },
        SubmissionOutcome::Failed(message) => SubmitConfirmResponse::Failed { message },
        SubmissionOutcome::Ignored => SubmitConfirmResponse::Ignored,
    };
    Ok(Json(response).into_response())
}

#[axum::debug_handler]
pub async fn cancel_submit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(credentials): Extension<Credentials>,
) -> crate::error::Result<Response> {
    let session = state.sessions.get(&id, &credentials)?;
    let cancelled = session.cancel_submit();
    Ok(Json(json!({ "cancelled": cancelled })).into_response())
}

#[axum::debug_handler]
pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(credentials): Extension<Credentials>,
) -> crate::error::Result<Response> {
    state.sessions.close(&id, &credentials)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
