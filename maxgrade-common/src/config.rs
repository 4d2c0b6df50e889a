//! Configuration file loading and tiered value resolution
//!
//! Resolution priority for every setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Environment variable that points at an explicit config file
pub const CONFIG_PATH_ENV: &str = "MAXGRADE_CONFIG";

/// TOML configuration file contents
///
/// Every field is optional; absent values fall through to compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// AI service credential
    #[serde(default)]
    pub api_key: Option<String>,

    /// Generative model name (e.g. "gemini-3-flash-preview")
    #[serde(default)]
    pub model: Option<String>,

    /// Base URL of the generation endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    /// HTTP bind address for the service
    #[serde(default)]
    pub bind: Option<String>,

    /// Transport timeout for the AI call, in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Upload limit in bytes (may only lower the built-in limit)
    #[serde(default)]
    pub max_upload_bytes: Option<u64>,

    /// Maximum number of live grading sessions
    #[serde(default)]
    pub max_sessions: Option<usize>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging section of the TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing EnvFilter directive (e.g. "maxgrade=debug")
    #[serde(default)]
    pub filter: Option<String>,
}

/// Where a resolved value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine,
    Environment(String),
    Toml,
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::CommandLine => write!(f, "command line"),
            ConfigSource::Environment(name) => write!(f, "environment ({})", name),
            ConfigSource::Toml => write!(f, "TOML config"),
            ConfigSource::Default => write!(f, "compiled default"),
        }
    }
}

/// A configuration value together with its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ConfigSource,
}

/// Validate a string setting (non-empty, non-whitespace)
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Resolve a string setting from CLI → ENV (first valid of `env_vars`) → TOML
///
/// Blank values at any tier are skipped. Returns `None` when no tier supplies a value.
pub fn resolve_string(
    cli_arg: Option<&str>,
    env_vars: &[&str],
    toml_value: Option<&str>,
) -> Option<Resolved<String>> {
    if let Some(value) = cli_arg.filter(|v| is_valid_value(v)) {
        return Some(Resolved {
            value: value.trim().to_string(),
            source: ConfigSource::CommandLine,
        });
    }

    for name in env_vars {
        if let Ok(value) = std::env::var(name) {
            if is_valid_value(&value) {
                return Some(Resolved {
                    value: value.trim().to_string(),
                    source: ConfigSource::Environment((*name).to_string()),
                });
            }
        }
    }

    toml_value.filter(|v| is_valid_value(v)).map(|value| Resolved {
        value: value.trim().to_string(),
        source: ConfigSource::Toml,
    })
}

/// Resolve a parsed setting from CLI → ENV → TOML → default
///
/// An environment value that fails to parse is a configuration error rather than
/// a silent fallthrough.
pub fn resolve_parsed<T>(
    cli_arg: Option<T>,
    env_var: &str,
    toml_value: Option<T>,
    default: T,
) -> Result<Resolved<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Some(value) = cli_arg {
        return Ok(Resolved {
            value,
            source: ConfigSource::CommandLine,
        });
    }

    if let Ok(raw) = std::env::var(env_var) {
        if is_valid_value(&raw) {
            let value = raw.trim().parse::<T>().map_err(|e| {
                Error::Config(format!("Invalid value for {}: {} ({})", env_var, raw, e))
            })?;
            return Ok(Resolved {
                value,
                source: ConfigSource::Environment(env_var.to_string()),
            });
        }
    }

    if let Some(value) = toml_value {
        return Ok(Resolved {
            value,
            source: ConfigSource::Toml,
        });
    }

    Ok(Resolved {
        value: default,
        source: ConfigSource::Default,
    })
}

/// Locate the config file: explicit path → `MAXGRADE_CONFIG` → platform config dir
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if is_valid_value(&path) {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path()
}

/// Platform default config file path (`<config_dir>/maxgrade/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("maxgrade").join("config.toml"))
}

/// Load the TOML config file
///
/// A missing file is not an error: a warning is logged and defaults are returned.
/// A file that exists but cannot be read or parsed is a `Config` error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    debug!("Loaded config file {}", path.display());
    Ok(config)
}
