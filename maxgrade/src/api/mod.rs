//! HTTP API handlers for maxgrade
//!
//! REST endpoints for sessions, uploads, and grading, plus an SSE stream of
//! session events.

pub mod health;
pub mod rubric;
pub mod sessions;
pub mod sse;

pub use health::health_routes;
pub use rubric::rubric_routes;
pub use sessions::session_routes;
pub use sse::session_event_stream;
