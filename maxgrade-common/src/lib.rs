//! # maxgrade Common Library
//!
//! Shared code for the maxgrade grading service including:
//! - Common error type
//! - Configuration file loading and value resolution
//! - Session event types and the event bus
//! - Server-Sent Events helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
