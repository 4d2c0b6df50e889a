//! Grading session API handlers
//!
//! POST /api/sessions, GET|DELETE /api/sessions/:id, PUT /api/sessions/:id/submission,
//! POST /api/sessions/:id/grade, GET /api/sessions/:id/preview

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    routing::{get, post, put},
    Json, Router,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::io;
use tokio_util::io::StreamReader;
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    intake::{ensure_supported, FileMeta, IntakeError, MediaKind, FALLBACK_MIME_TYPE},
    session::{Session, SessionSnapshot},
    workflow, AppState,
};

/// PUT /api/sessions/:id/submission query
#[derive(Debug, Deserialize)]
pub struct UploadParams {
    /// Client-side filename; used verbatim in the grading prompt
    pub filename: Option<String>,
}

/// POST /api/sessions/:id/grade response
#[derive(Debug, Serialize)]
pub struct GradeAcceptedResponse {
    pub session_id: Uuid,
    pub token: u64,
}

/// GET /api/sessions/:id/preview response
#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub filename: String,
    pub mime_type: String,
    pub media_kind: Option<MediaKind>,
    pub data_uri: String,
}

/// POST /api/sessions
///
/// Create an idle session. Returns 201 with its snapshot, or 429 once the
/// configured session cap is reached.
pub async fn create_session(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<SessionSnapshot>)> {
    let session_id = Uuid::new_v4();
    let session = Session::new();
    let snapshot = session.snapshot(session_id);

    let mut sessions = state.sessions.write().await;
    if sessions.len() >= state.max_sessions {
        tracing::warn!(limit = state.max_sessions, "Session cap reached; creation refused");
        return Err(ApiError::TooManySessions(state.max_sessions));
    }
    sessions.insert(session_id, session);
    drop(sessions);
    tracing::info!(session_id = %session_id, "Grading session created");

    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionSnapshot>> {
    let sessions = state.sessions.read().await;
    let session = sessions
        .get(&session_id)
        .ok_or_else(|| ApiError::NotFound(format!("Session not found: {}", session_id)))?;

    Ok(Json(session.snapshot(session_id)))
}

/// DELETE /api/sessions/:id
///
/// An outstanding grading call is not cancelled; its outcome is dropped when it returns.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .sessions
        .write()
        .await
        .remove(&session_id)
        .ok_or_else(|| ApiError::NotFound(format!("Session not found: {}", session_id)))?;

    tracing::info!(session_id = %session_id, "Grading session deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/sessions/:id/submission?filename=...
///
/// Raw request body is the file; `Content-Type` is its MIME type. A declared
/// `Content-Length` above the limit is rejected (413) before the body is read.
/// Types other than image/* or video/* are rejected (415).
pub async fn upload_submission(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<Json<SessionSnapshot>> {
    if !state.sessions.read().await.contains_key(&session_id) {
        return Err(ApiError::NotFound(format!("Session not found: {}", session_id)));
    }

    let filename = params
        .filename
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing filename query parameter".to_string()))?;

    let mime_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let declared_size = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);

    debug!(
        session_id = %session_id,
        filename = %filename,
        mime_type = ?mime_type,
        declared_size = declared_size,
        "Submission upload received"
    );

    let meta = FileMeta {
        filename: filename.clone(),
        mime_type: mime_type.clone(),
        declared_size,
    };

    if let Err(e) = state.intake.check(&meta) {
        return Err(reject(&state, session_id, &filename, e).await);
    }

    // Undeclared or generic types are sniffed after the read instead
    if let Some(mime) = mime_type
        .as_deref()
        .filter(|m| !m.eq_ignore_ascii_case(FALLBACK_MIME_TYPE))
    {
        if let Err(e) = ensure_supported(mime) {
            return Err(reject(&state, session_id, &filename, e).await);
        }
    }

    let stream = body
        .into_data_stream()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
    let file = match state.intake.accept(meta, StreamReader::new(stream)).await {
        Ok(file) => file,
        Err(e) => return Err(reject(&state, session_id, &filename, e).await),
    };

    if let Err(e) = ensure_supported(file.mime_type()) {
        return Err(reject(&state, session_id, &filename, e).await);
    }

    let transition = workflow::select_file(&state, session_id, file).await?;
    Ok(Json(transition.session.snapshot(session_id)))
}

/// Record the rejection on the session and convert it to the HTTP error
async fn reject(state: &AppState, session_id: Uuid, filename: &str, err: IntakeError) -> ApiError {
    if let Err(e) = workflow::reject_file(state, session_id, filename, &err).await {
        return e;
    }
    err.into()
}

/// POST /api/sessions/:id/grade
///
/// Issue a grading call for the selected file. Returns 202 Accepted with the call's
/// token; the outcome arrives via the session snapshot and event stream. 409 while a
/// call is outstanding or when no file is selected.
pub async fn grade_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<GradeAcceptedResponse>)> {
    let token = workflow::start_grading(&state, session_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(GradeAcceptedResponse { session_id, token }),
    ))
}

/// GET /api/sessions/:id/preview
pub async fn get_preview(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<PreviewResponse>> {
    let sessions = state.sessions.read().await;
    let session = sessions
        .get(&session_id)
        .ok_or_else(|| ApiError::NotFound(format!("Session not found: {}", session_id)))?;
    let file = session
        .phase()
        .file()
        .ok_or_else(|| ApiError::NotFound("No file selected".to_string()))?;

    Ok(Json(PreviewResponse {
        filename: file.filename().to_string(),
        mime_type: file.mime_type().to_string(),
        media_kind: file.media_kind(),
        data_uri: file.data_uri(),
    }))
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/submission", put(upload_submission))
        .route("/api/sessions/:id/grade", post(grade_session))
        .route("/api/sessions/:id/preview", get(get_preview))
        .route("/api/sessions/:id/events", get(super::session_event_stream))
}
