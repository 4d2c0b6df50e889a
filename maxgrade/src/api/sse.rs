//! Server-Sent Events for session progress

use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use maxgrade_common::sse::grading_event_stream;
use std::convert::Infallible;
use uuid::Uuid;

/// GET /api/sessions/:id/events - SSE stream of one session's events
///
/// Streams FileSelected, FileRejected, GradingStarted, GradingCompleted,
/// GradingFailed and StaleResponseDiscarded. 404 for an unknown session.
pub async fn session_event_stream(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if !state.sessions.read().await.contains_key(&session_id) {
        return Err(ApiError::NotFound(format!("Session not found: {}", session_id)));
    }

    Ok(grading_event_stream(&state.event_bus, Some(session_id)))
}
