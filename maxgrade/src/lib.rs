//! maxgrade library interface
//!
//! AI-assisted grading of 3D-animation coursework: file intake, prompt construction,
//! the grading call, result normalization, and the per-session state machine, plus
//! the HTTP surface that drives them.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod intake;
pub mod model;
pub mod normalizer;
pub mod prompt;
pub mod rubric;
pub mod session;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use crate::client::GradingClient;
use crate::intake::FileIntake;
use crate::session::Session;
use axum::Router;
use chrono::{DateTime, Utc};
use maxgrade_common::events::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Event bus capacity for session events
pub const EVENT_BUS_CAPACITY: usize = 100;

/// Default cap on live grading sessions
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Grading sessions by id
    pub sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Grading call runner
    pub grader: GradingClient,
    /// Upload intake (size limit)
    pub intake: FileIntake,
    /// Session creation is refused once this many sessions exist
    pub max_sessions: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(grader: GradingClient, intake: FileIntake, event_bus: EventBus) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            event_bus,
            grader,
            intake,
            max_sessions: DEFAULT_MAX_SESSIONS,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Override the live session cap
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::rubric_routes())
        .merge(api::session_routes())
        .with_state(state)
}
