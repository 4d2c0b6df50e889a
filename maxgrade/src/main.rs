//! maxgrade - AI grading service for 3D-animation coursework
//!
//! Accepts an image or video submission per session, sends it with the grading rubric
//! to a multimodal generation model, and serves the normalized score report.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use maxgrade::client::{GeminiClient, GradingClient};
use maxgrade::config::{CliOverrides, ServiceConfig};
use maxgrade::{AppState, EVENT_BUS_CAPACITY};
use maxgrade_common::config::{load_toml_config, resolve_config_path, TomlConfig};
use maxgrade_common::events::EventBus;

/// Default tracing filter when RUST_LOG and the config file say nothing
const DEFAULT_LOG_FILTER: &str = "maxgrade=info,tower_http=info";

/// Command-line arguments for maxgrade
#[derive(Parser, Debug)]
#[command(name = "maxgrade")]
#[command(about = "AI grading service for 3D-animation coursework")]
#[command(version)]
struct Args {
    /// Config file path (default: <config_dir>/maxgrade/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Generation model name
    #[arg(long)]
    model: Option<String>,

    /// Generation endpoint base URL
    #[arg(long)]
    endpoint: Option<String>,

    /// AI call timeout in seconds (0 disables)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Upload limit in bytes (can only lower the built-in 20 MiB limit)
    #[arg(long)]
    max_upload_bytes: Option<u64>,

    /// Maximum number of live grading sessions
    #[arg(long)]
    max_sessions: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config file is read before tracing starts so it can supply the log filter
    let config_path = resolve_config_path(args.config.as_deref());
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path).context("Failed to load config file")?,
        None => TomlConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            toml_config
                .logging
                .filter
                .as_deref()
                .unwrap_or(DEFAULT_LOG_FILTER),
        )
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting maxgrade v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    // API key is deliberately not accepted on the command line (shell history)
    let cli = CliOverrides {
        api_key: None,
        model: args.model,
        endpoint: args.endpoint,
        bind: args.bind,
        timeout_secs: args.timeout_secs,
        max_upload_bytes: args.max_upload_bytes,
        max_sessions: args.max_sessions,
    };
    let config = ServiceConfig::resolve(&cli, &toml_config).context("Invalid configuration")?;
    config.log_summary();

    let gemini = GeminiClient::new(config.gemini_settings())
        .context("Failed to initialize generation client")?;
    let grader = GradingClient::new(Arc::new(gemini));

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let state =
        AppState::new(grader, config.intake(), event_bus).with_max_sessions(config.max_sessions);

    let app = maxgrade::build_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;
    info!("Listening on http://{}", config.bind);
    info!("Health check: http://{}/health", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
