use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Extension,
};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::{error::RecvError, Receiver};

use crate::models::session::Credentials;
use crate::session::SessionEvent;
use crate::AppState;

/// Streams session events as SSE until the session navigates away or is
/// torn down.
pub async fn session_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(credentials): Extension<Credentials>,
) -> crate::error::Result<Response> {
    let session = state.sessions.get(&id, &credentials)?;
    tracing::info!("Client subscribed to events of session {}", id);
    let stream = event_stream(session.subscribe());
    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}

fn event_stream(
    receiver: Receiver<SessionEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold((receiver, false), |(mut receiver, done)| async move {
        if done {
            return None;
        }
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let last = event.is_final();
                    let sse = match Event::default().event(event.event_name()).json_data(&event) {
                        Ok(sse) => sse,
                        Err(e) => {
                            tracing::warn!("Failed to encode session event: {}", e);
                            continue;
                        }
                    };
                    return Some((Ok::<_, Infallible>(sse), (receiver, last)));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event subscriber lagged by {}", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}
