//! Grading session state machine
//!
//! `Idle → FileSelected → Grading → Graded | Failed`, with every phase accepting a
//! new file selection. Session values are immutable: [`Session::apply`] returns the
//! next value plus the side effect the caller must perform.
//!
//! Each grading call carries a monotonically increasing token. A completion is only
//! applied while the session is still `Grading` with that same token; anything else
//! is a stale response and is discarded.

use crate::intake::{MediaKind, SubmissionFile};
use crate::model::GradingResult;
use crate::normalizer::ScoreReport;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// User-facing error attached to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorNotice {
    /// Category tag (e.g. "FileTooLarge", "TransportOrModelFailure")
    pub category: String,
    /// Localized message
    pub message: String,
}

impl ErrorNotice {
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
        }
    }
}

/// Session phase
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPhase {
    Idle,
    FileSelected {
        file: Arc<SubmissionFile>,
    },
    Grading {
        file: Arc<SubmissionFile>,
        token: u64,
    },
    Graded {
        file: Arc<SubmissionFile>,
        result: Arc<GradingResult>,
    },
    /// Back at "file selected" with the failure attached
    Failed {
        file: Arc<SubmissionFile>,
        notice: ErrorNotice,
    },
}

impl SessionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::FileSelected { .. } => "file_selected",
            SessionPhase::Grading { .. } => "grading",
            SessionPhase::Graded { .. } => "graded",
            SessionPhase::Failed { .. } => "failed",
        }
    }

    /// Currently selected file, if any
    pub fn file(&self) -> Option<&Arc<SubmissionFile>> {
        match self {
            SessionPhase::Idle => None,
            SessionPhase::FileSelected { file }
            | SessionPhase::Grading { file, .. }
            | SessionPhase::Graded { file, .. }
            | SessionPhase::Failed { file, .. } => Some(file),
        }
    }
}

/// Inputs to the reducer
#[derive(Debug, Clone)]
pub enum SessionAction {
    /// A file passed intake; supersedes any previous file and result
    SelectFile(Arc<SubmissionFile>),
    /// A file was rejected by intake; phase, file, and result are untouched
    RejectFile(ErrorNotice),
    /// User triggered grading
    StartGrading,
    /// A grading call returned a result
    GradingSucceeded { token: u64, result: GradingResult },
    /// A grading call failed
    GradingFailed { token: u64, notice: ErrorNotice },
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    /// Caller must issue exactly one grading call for `file` tagged with `token`
    IssueGrading {
        token: u64,
        file: Arc<SubmissionFile>,
    },
    /// A completion for a superseded call was ignored
    StaleDiscarded { token: u64 },
}

/// Result of applying an action
#[derive(Debug, Clone)]
pub struct Transition {
    pub session: Session,
    pub effect: Effect,
}

/// Actions the current phase does not accept
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("No file selected")]
    NoFileSelected,

    #[error("Grading already in progress (token {0})")]
    GradingInProgress(u64),
}

/// Immutable session state value
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    phase: SessionPhase,
    /// Last intake rejection; cleared by the next accepted file or grading start
    rejection: Option<ErrorNotice>,
    /// Last issued grading token
    last_token: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            rejection: None,
            last_token: 0,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn rejection(&self) -> Option<&ErrorNotice> {
        self.rejection.as_ref()
    }

    /// Token of the outstanding grading call, if any
    pub fn in_flight_token(&self) -> Option<u64> {
        match self.phase {
            SessionPhase::Grading { token, .. } => Some(token),
            _ => None,
        }
    }

    /// Whether the grading trigger is enabled
    pub fn can_start_grading(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::FileSelected { .. }
                | SessionPhase::Graded { .. }
                | SessionPhase::Failed { .. }
        )
    }

    /// Apply one action, producing the next session value
    pub fn apply(&self, action: SessionAction) -> Result<Transition, TransitionError> {
        match action {
            SessionAction::SelectFile(file) => Ok(self.next(
                SessionPhase::FileSelected { file },
                None,
                Effect::None,
            )),

            SessionAction::RejectFile(notice) => Ok(Transition {
                session: Session {
                    rejection: Some(notice),
                    ..self.clone()
                },
                effect: Effect::None,
            }),

            SessionAction::StartGrading => {
                let file = match &self.phase {
                    SessionPhase::Idle => return Err(TransitionError::NoFileSelected),
                    SessionPhase::Grading { token, .. } => {
                        return Err(TransitionError::GradingInProgress(*token))
                    }
                    SessionPhase::FileSelected { file }
                    | SessionPhase::Graded { file, .. }
                    | SessionPhase::Failed { file, .. } => file.clone(),
                };

                let token = self.last_token + 1;
                let mut transition = self.next(
                    SessionPhase::Grading {
                        file: file.clone(),
                        token,
                    },
                    None,
                    Effect::IssueGrading { token, file },
                );
                transition.session.last_token = token;
                Ok(transition)
            }

            SessionAction::GradingSucceeded { token, result } => match &self.phase {
                SessionPhase::Grading { file, token: current } if *current == token => Ok(self.next(
                    SessionPhase::Graded {
                        file: file.clone(),
                        result: Arc::new(result),
                    },
                    self.rejection.clone(),
                    Effect::None,
                )),
                _ => Ok(self.discard(token)),
            },

            SessionAction::GradingFailed { token, notice } => match &self.phase {
                SessionPhase::Grading { file, token: current } if *current == token => Ok(self.next(
                    SessionPhase::Failed {
                        file: file.clone(),
                        notice,
                    },
                    self.rejection.clone(),
                    Effect::None,
                )),
                _ => Ok(self.discard(token)),
            },
        }
    }

    fn next(
        &self,
        phase: SessionPhase,
        rejection: Option<ErrorNotice>,
        effect: Effect,
    ) -> Transition {
        Transition {
            session: Session {
                phase,
                rejection,
                last_token: self.last_token,
            },
            effect,
        }
    }

    fn discard(&self, token: u64) -> Transition {
        Transition {
            session: self.clone(),
            effect: Effect::StaleDiscarded { token },
        }
    }

    /// Serializable view for the presentation layer
    pub fn snapshot(&self, session_id: Uuid) -> SessionSnapshot {
        let file = self.phase.file().map(|f| FileInfo::from(f.as_ref()));

        let notice = self.rejection.clone().or_else(|| match &self.phase {
            SessionPhase::Failed { notice, .. } => Some(notice.clone()),
            _ => None,
        });

        let report = match &self.phase {
            SessionPhase::Graded { file, result } => {
                Some(ScoreReport::build(result, file.filename(), file.is_video()))
            }
            _ => None,
        };

        SessionSnapshot {
            session_id,
            phase: self.phase.name(),
            can_grade: self.can_start_grading(),
            grading_token: self.in_flight_token(),
            file,
            notice,
            report,
        }
    }
}

/// Submission file metadata (no payload)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub media_kind: Option<MediaKind>,
}

impl From<&SubmissionFile> for FileInfo {
    fn from(file: &SubmissionFile) -> Self {
        Self {
            filename: file.filename().to_string(),
            mime_type: file.mime_type().to_string(),
            size_bytes: file.byte_len(),
            media_kind: file.media_kind(),
        }
    }
}

/// Presentation snapshot of one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub phase: &'static str,
    pub can_grade: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grading_token: Option<u64>,
    pub file: Option<FileInfo>,
    pub notice: Option<ErrorNotice>,
    pub report: Option<ScoreReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::FileIntake;
    use crate::model::CategoryResult;

    async fn file(name: &str, bytes: &[u8]) -> Arc<SubmissionFile> {
        Arc::new(
            FileIntake::new()
                .accept_bytes(name, Some("video/mp4".to_string()), bytes)
                .await
                .unwrap(),
        )
    }

    fn result(score: f64) -> GradingResult {
        GradingResult {
            overall_score: score,
            student_name_guess: None,
            summary: "ok".to_string(),
            categories: vec![CategoryResult {
                name: "主题内容".to_string(),
                score: 8.0,
                max_score: 10.0,
                feedback: "f".to_string(),
            }],
        }
    }

    fn start(session: &Session) -> (Session, u64, Arc<SubmissionFile>) {
        let t = session.apply(SessionAction::StartGrading).unwrap();
        match t.effect {
            Effect::IssueGrading { token, file } => (t.session, token, file),
            other => panic!("unexpected effect {:?}", other),
        }
    }

    #[test]
    fn test_initial_state_is_idle() {
        let session = Session::new();
        assert_eq!(session.phase(), &SessionPhase::Idle);
        assert!(!session.can_start_grading());
        assert_eq!(
            session.apply(SessionAction::StartGrading).unwrap_err(),
            TransitionError::NoFileSelected
        );
    }

    #[tokio::test]
    async fn test_happy_path() {
        let f = file("a.mp4", b"a").await;
        let s = Session::new()
            .apply(SessionAction::SelectFile(f.clone()))
            .unwrap()
            .session;
        assert_eq!(s.phase().name(), "file_selected");

        let (s, token, issued) = start(&s);
        assert_eq!(token, 1);
        assert_eq!(issued, f);
        assert_eq!(s.in_flight_token(), Some(1));
        assert!(!s.can_start_grading());

        let t = s
            .apply(SessionAction::GradingSucceeded { token, result: result(80.0) })
            .unwrap();
        assert_eq!(t.effect, Effect::None);
        assert_eq!(t.session.phase().name(), "graded");
        assert!(t.session.can_start_grading());
    }

    #[tokio::test]
    async fn test_start_while_grading_is_rejected() {
        let s = Session::new()
            .apply(SessionAction::SelectFile(file("a.mp4", b"a").await))
            .unwrap()
            .session;
        let (s, token, _) = start(&s);
        assert_eq!(
            s.apply(SessionAction::StartGrading).unwrap_err(),
            TransitionError::GradingInProgress(token)
        );
    }

    #[tokio::test]
    async fn test_failure_returns_to_file_selected_with_notice() {
        let f = file("a.mp4", b"a").await;
        let s = Session::new().apply(SessionAction::SelectFile(f.clone())).unwrap().session;
        let (s, token, _) = start(&s);
        let notice =
            ErrorNotice::new("TransportOrModelFailure", "分析失败，请检查网络或文件格式。");

        let s = s
            .apply(SessionAction::GradingFailed { token, notice: notice.clone() })
            .unwrap()
            .session;
        assert_eq!(s.phase(), &SessionPhase::Failed { file: f, notice: notice.clone() });
        assert!(s.can_start_grading());
        assert_eq!(s.snapshot(Uuid::nil()).notice, Some(notice));

        // Retrying clears the failure
        let (s, token2, _) = start(&s);
        assert_eq!(token2, token + 1);
        assert!(s.snapshot(Uuid::nil()).notice.is_none());
    }

    #[tokio::test]
    async fn test_second_selection_supersedes_first() {
        let first = file("first.mp4", b"first").await;
        let second = file("second.mp4", b"second").await;

        let s = Session::new()
            .apply(SessionAction::SelectFile(first))
            .unwrap()
            .session
            .apply(SessionAction::SelectFile(second.clone()))
            .unwrap()
            .session;

        let (_, _, issued) = start(&s);
        assert_eq!(issued.bytes(), b"second");
        assert_eq!(issued, second);
    }

    #[tokio::test]
    async fn test_stale_response_after_reselection_is_discarded() {
        let s = Session::new()
            .apply(SessionAction::SelectFile(file("old.mp4", b"old").await))
            .unwrap()
            .session;
        let (s, old_token, _) = start(&s);

        let newer = file("new.mp4", b"new").await;
        let s = s.apply(SessionAction::SelectFile(newer.clone())).unwrap().session;

        let t = s
            .apply(SessionAction::GradingSucceeded { token: old_token, result: result(99.0) })
            .unwrap();
        assert_eq!(t.effect, Effect::StaleDiscarded { token: old_token });
        assert_eq!(t.session.phase(), &SessionPhase::FileSelected { file: newer });
    }

    #[tokio::test]
    async fn test_stale_token_while_newer_call_in_flight() {
        let s = Session::new()
            .apply(SessionAction::SelectFile(file("a.mp4", b"a").await))
            .unwrap()
            .session;
        let (s, t1, _) = start(&s);
        let s = s.apply(SessionAction::SelectFile(file("b.mp4", b"b").await)).unwrap().session;
        let (s, t2, _) = start(&s);
        assert!(t2 > t1);

        let late = s
            .apply(SessionAction::GradingFailed {
                token: t1,
                notice: ErrorNotice::new("TransportOrModelFailure", "x"),
            })
            .unwrap();
        assert_eq!(late.effect, Effect::StaleDiscarded { token: t1 });
        assert_eq!(late.session.in_flight_token(), Some(t2));
    }

    #[tokio::test]
    async fn test_rejection_leaves_file_and_result_untouched() {
        let f = file("a.mp4", b"a").await;
        let s = Session::new().apply(SessionAction::SelectFile(f.clone())).unwrap().session;
        let (s, token, _) = start(&s);
        let graded = s
            .apply(SessionAction::GradingSucceeded { token, result: result(72.0) })
            .unwrap()
            .session;

        let notice = ErrorNotice::new("FileTooLarge", "文件过大");
        let rejected = graded.apply(SessionAction::RejectFile(notice.clone())).unwrap().session;

        assert_eq!(rejected.phase(), graded.phase());
        assert_eq!(rejected.rejection(), Some(&notice));
        let snapshot = rejected.snapshot(Uuid::nil());
        assert_eq!(snapshot.report.map(|r| r.overall.score), Some(72));
        assert_eq!(snapshot.notice, Some(notice));
    }

    #[tokio::test]
    async fn test_new_selection_discards_result_and_rejection() {
        let s = Session::new()
            .apply(SessionAction::SelectFile(file("a.mp4", b"a").await))
            .unwrap()
            .session;
        let (s, token, _) = start(&s);
        let s = s
            .apply(SessionAction::GradingSucceeded { token, result: result(72.0) })
            .unwrap()
            .session
            .apply(SessionAction::RejectFile(ErrorNotice::new("FileTooLarge", "x")))
            .unwrap()
            .session
            .apply(SessionAction::SelectFile(file("b.mp4", b"b").await))
            .unwrap()
            .session;

        let snapshot = s.snapshot(Uuid::nil());
        assert_eq!(snapshot.phase, "file_selected");
        assert!(snapshot.report.is_none());
        assert!(snapshot.notice.is_none());
        assert_eq!(snapshot.file.unwrap().filename, "b.mp4");
    }

    #[test]
    fn test_rejection_in_idle() {
        let s = Session::new()
            .apply(SessionAction::RejectFile(ErrorNotice::new("FileTooLarge", "x")))
            .unwrap()
            .session;
        assert_eq!(s.phase(), &SessionPhase::Idle);
        assert!(s.rejection().is_some());
    }

    #[tokio::test]
    async fn test_snapshot_of_out_of_range_result() {
        let s = Session::new()
            .apply(SessionAction::SelectFile(file("a.mp4", b"a").await))
            .unwrap()
            .session;
        let (s, token, _) = start(&s);
        let mut huge = result(1e19);
        huge.categories.push(CategoryResult {
            name: "工作量".to_string(),
            score: 1e19,
            max_score: 10.0,
            feedback: "f".to_string(),
        });
        huge.categories[0].score = 1e19;

        let s = s
            .apply(SessionAction::GradingSucceeded { token, result: huge })
            .unwrap()
            .session;
        let report = s.snapshot(Uuid::nil()).report.unwrap();
        assert_eq!(report.overall.score, i64::MAX);
        assert!(report.categories.iter().all(|c| c.exceeds_max));
    }
}
