use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::models::session::Credentials;

/// Reads the candidate's bearer token, if any, into a [`Credentials`]
/// extension. A missing header is anonymous; any other scheme is rejected.
pub async fn bearer_credentials(mut req: Request, next: Next) -> Response {
    let credentials = match req.headers().get(AUTHORIZATION) {
        None => Credentials::anonymous(),
        Some(header) => {
            let Ok(value) = header.to_str() else {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error":"bad_authorization"})),
                )
                    .into_response();
            };
            let Some(token) = value.strip_prefix("Bearer ") else {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error":"unsupported_scheme"})),
                )
                    .into_response();
            };
            Credentials::bearer(token.trim())
        }
    };
    req.extensions_mut().insert(credentials);
    next.run(req).await
}
