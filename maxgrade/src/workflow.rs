//! Session orchestration
//!
//! Applies reducer actions to the shared session table, performs the side effects
//! they request (issuing grading calls), and publishes the matching events.
//!
//! Every transition is applied under the table's write lock, so the check that no
//! call is outstanding and the issuing of the next token happen atomically.

use crate::error::{ApiError, ApiResult};
use crate::intake::{IntakeError, SubmissionFile};
use crate::model::GradingResult;
use crate::normalizer::round_score;
use crate::prompt;
use crate::session::{Effect, ErrorNotice, SessionAction, SessionPhase, Transition};
use crate::AppState;
use chrono::Utc;
use maxgrade_common::events::GradingEvent;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Apply one action to a stored session
pub async fn apply(
    state: &AppState,
    session_id: Uuid,
    action: SessionAction,
) -> ApiResult<Transition> {
    let mut sessions = state.sessions.write().await;
    let current = sessions
        .get(&session_id)
        .ok_or_else(|| ApiError::NotFound(format!("Session {}", session_id)))?;

    let transition = current.apply(action)?;
    sessions.insert(session_id, transition.session.clone());
    Ok(transition)
}

/// Record an accepted file; any previous file, result, or notice is replaced
pub async fn select_file(
    state: &AppState,
    session_id: Uuid,
    file: SubmissionFile,
) -> ApiResult<Transition> {
    let file = Arc::new(file);
    let transition = apply(state, session_id, SessionAction::SelectFile(file.clone())).await?;

    info!(session_id = %session_id, filename = %file.filename(), "File selected");
    state.event_bus.emit_lossy(GradingEvent::FileSelected {
        session_id,
        filename: file.filename().to_string(),
        mime_type: file.mime_type().to_string(),
        size_bytes: file.byte_len(),
        timestamp: Utc::now(),
    });

    Ok(transition)
}

/// Record an intake rejection; the session's file and result are left as they were
pub async fn reject_file(
    state: &AppState,
    session_id: Uuid,
    filename: &str,
    err: &IntakeError,
) -> ApiResult<()> {
    let notice = ErrorNotice::new(err.reason(), err.user_message());
    apply(state, session_id, SessionAction::RejectFile(notice.clone())).await?;

    warn!(session_id = %session_id, filename = %filename, "File rejected: {}", err);
    state.event_bus.emit_lossy(GradingEvent::FileRejected {
        session_id,
        filename: filename.to_string(),
        reason: notice.category,
        message: notice.message,
        timestamp: Utc::now(),
    });

    Ok(())
}

/// Start grading the selected file; returns the token of the issued call
///
/// The call itself runs on a spawned task and reports back through
/// [`complete_grading`].
pub async fn start_grading(state: &AppState, session_id: Uuid) -> ApiResult<u64> {
    let transition = apply(state, session_id, SessionAction::StartGrading).await?;

    let Effect::IssueGrading { token, file } = transition.effect else {
        return Err(ApiError::Internal(
            "Grading start produced no grading call".to_string(),
        ));
    };

    info!(
        session_id = %session_id,
        token = token,
        filename = %file.filename(),
        "Grading started"
    );
    state.event_bus.emit_lossy(GradingEvent::GradingStarted {
        session_id,
        token,
        filename: file.filename().to_string(),
        timestamp: Utc::now(),
    });

    let task_state = state.clone();
    tokio::spawn(async move {
        run_grading(task_state, session_id, token, file).await;
    });

    Ok(token)
}

/// Execute one grading call and feed its outcome back into the session
pub async fn run_grading(
    state: AppState,
    session_id: Uuid,
    token: u64,
    file: Arc<SubmissionFile>,
) {
    let prompt = prompt::build(file.filename());
    let outcome = match state.grader.grade(&file, &prompt).await {
        Ok(result) => Ok(result),
        Err(e) => {
            error!(session_id = %session_id, token = token, "Grading failed: {}", e);
            *state.last_error.write().await = Some(e.summary());
            Err(ErrorNotice::new(e.category(), e.user_message()))
        }
    };

    complete_grading(&state, session_id, token, outcome).await;
}

/// Apply a grading completion, discarding it if it no longer matches the session
pub async fn complete_grading(
    state: &AppState,
    session_id: Uuid,
    token: u64,
    outcome: Result<GradingResult, ErrorNotice>,
) {
    let action = match outcome {
        Ok(result) => SessionAction::GradingSucceeded { token, result },
        Err(notice) => SessionAction::GradingFailed { token, notice },
    };

    let transition = match apply(state, session_id, action).await {
        Ok(transition) => transition,
        Err(e) => {
            // Session was deleted while the call was outstanding
            debug!(session_id = %session_id, token = token, "Grading outcome dropped: {}", e);
            return;
        }
    };

    let event = match (&transition.effect, transition.session.phase()) {
        (Effect::StaleDiscarded { .. }, _) => {
            info!(session_id = %session_id, token = token, "Stale grading response discarded");
            GradingEvent::StaleResponseDiscarded {
                session_id,
                token,
                timestamp: Utc::now(),
            }
        }
        (_, SessionPhase::Graded { result, .. }) => GradingEvent::GradingCompleted {
            session_id,
            token,
            overall_score: round_score(result.overall_score),
            timestamp: Utc::now(),
        },
        (_, SessionPhase::Failed { notice, .. }) => GradingEvent::GradingFailed {
            session_id,
            token,
            category: notice.category.clone(),
            message: notice.message.clone(),
            timestamp: Utc::now(),
        },
        (effect, phase) => {
            warn!(
                session_id = %session_id,
                token = token,
                "Unexpected grading completion: effect {:?}, phase {}",
                effect,
                phase.name()
            );
            return;
        }
    };

    state.event_bus.emit_lossy(event);
}
