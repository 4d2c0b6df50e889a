//! Service configuration
//!
//! Resolves every setting CLI → ENV → TOML → default using the shared resolvers in
//! `maxgrade_common::config`, and records where the API credential came from so it can be
//! logged without ever logging the value.

use crate::client::{GeminiSettings, DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::intake::{FileIntake, MAX_SUBMISSION_BYTES};
use crate::DEFAULT_MAX_SESSIONS;
use maxgrade_common::config::{resolve_parsed, resolve_string, ConfigSource, TomlConfig};
use maxgrade_common::{Error, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variables searched for the API credential, in order
pub const API_KEY_ENV_VARS: &[&str] = &["MAXGRADE_API_KEY", "GEMINI_API_KEY", "API_KEY"];
pub const MODEL_ENV: &str = "MAXGRADE_MODEL";
pub const ENDPOINT_ENV: &str = "MAXGRADE_ENDPOINT";
pub const BIND_ENV: &str = "MAXGRADE_BIND";
pub const TIMEOUT_ENV: &str = "MAXGRADE_TIMEOUT_SECS";
pub const MAX_UPLOAD_ENV: &str = "MAXGRADE_MAX_UPLOAD_BYTES";
pub const MAX_SESSIONS_ENV: &str = "MAXGRADE_MAX_SESSIONS";

/// Default HTTP bind address
pub const DEFAULT_BIND: &str = "127.0.0.1:5780";

/// Command-line overrides (highest priority tier)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub bind: Option<SocketAddr>,
    pub timeout_secs: Option<u64>,
    pub max_upload_bytes: Option<u64>,
    pub max_sessions: Option<usize>,
}

/// Fully resolved service configuration
#[derive(Clone)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    /// Tier the credential was found in
    pub api_key_source: Option<ConfigSource>,
    pub model: String,
    pub endpoint: String,
    pub bind: SocketAddr,
    /// Transport timeout for the AI call; `None` when unset or zero
    pub timeout: Option<Duration>,
    pub max_upload_bytes: u64,
    /// Live session cap; creation beyond it is refused
    pub max_sessions: usize,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_source", &self.api_key_source)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("bind", &self.bind)
            .field("timeout", &self.timeout)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

impl ServiceConfig {
    /// Resolve all settings from the CLI, environment, and TOML tiers
    pub fn resolve(cli: &CliOverrides, toml: &TomlConfig) -> Result<Self> {
        let api_key = resolve_string(
            cli.api_key.as_deref(),
            API_KEY_ENV_VARS,
            toml.api_key.as_deref(),
        );

        let model = resolve_string(cli.model.as_deref(), &[MODEL_ENV], toml.model.as_deref())
            .map(|r| r.value)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let endpoint = resolve_string(
            cli.endpoint.as_deref(),
            &[ENDPOINT_ENV],
            toml.endpoint.as_deref(),
        )
        .map(|r| r.value)
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let toml_bind = match toml.bind.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(raw.parse::<SocketAddr>().map_err(|e| {
                Error::Config(format!("Invalid bind address in TOML: {} ({})", raw, e))
            })?),
            _ => None,
        };
        let default_bind: SocketAddr = DEFAULT_BIND
            .parse()
            .map_err(|e| Error::Internal(format!("Invalid default bind address: {}", e)))?;
        let bind = resolve_parsed(cli.bind, BIND_ENV, toml_bind, default_bind)?;

        let timeout_secs = resolve_parsed(cli.timeout_secs, TIMEOUT_ENV, toml.timeout_secs, 0u64)?;
        let timeout = (timeout_secs.value > 0).then(|| Duration::from_secs(timeout_secs.value));

        let max_upload = resolve_parsed(
            cli.max_upload_bytes,
            MAX_UPLOAD_ENV,
            toml.max_upload_bytes,
            MAX_SUBMISSION_BYTES,
        )?;
        if max_upload.value > MAX_SUBMISSION_BYTES {
            warn!(
                configured = max_upload.value,
                limit = MAX_SUBMISSION_BYTES,
                "Upload limit cannot be raised above the built-in limit; clamping"
            );
        }
        if max_upload.value == 0 {
            return Err(Error::Config("Upload limit must be greater than zero".to_string()));
        }

        let max_sessions = resolve_parsed(
            cli.max_sessions,
            MAX_SESSIONS_ENV,
            toml.max_sessions,
            DEFAULT_MAX_SESSIONS,
        )?;
        if max_sessions.value == 0 {
            return Err(Error::Config("Session limit must be greater than zero".to_string()));
        }

        Ok(Self {
            api_key_source: api_key.as_ref().map(|r| r.source.clone()),
            api_key: api_key.map(|r| r.value),
            model,
            endpoint,
            bind: bind.value,
            timeout,
            max_upload_bytes: max_upload.value.min(MAX_SUBMISSION_BYTES),
            max_sessions: max_sessions.value,
        })
    }

    /// Log the effective configuration (credential presence only)
    pub fn log_summary(&self) {
        match &self.api_key_source {
            Some(source) => info!("API key found in {}", source),
            None => warn!(
                "No API key configured (set {}); grading requests will fail",
                API_KEY_ENV_VARS.join(" / ")
            ),
        }
        info!(model = %self.model, endpoint = %self.endpoint, "Generation endpoint");
        match self.timeout {
            Some(timeout) => info!("AI call timeout: {}s", timeout.as_secs()),
            None => info!("AI call timeout: none"),
        }
        info!("Upload limit: {} bytes", self.max_upload_bytes);
        info!("Session limit: {}", self.max_sessions);
    }

    pub fn gemini_settings(&self) -> GeminiSettings {
        GeminiSettings {
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
            timeout: self.timeout,
        }
    }

    pub fn intake(&self) -> FileIntake {
        FileIntake::with_limit(self.max_upload_bytes)
    }
}
