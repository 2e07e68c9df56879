#![forbid(unsafe_code)]

//! `feedback-broker`: MCP server that collects human feedback.
//!
//! Loads configuration, serves the `collect_feedback` tool over stdio, and
//! on shutdown terminates every UI process that is still open.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use feedback_broker::config::GlobalConfig;
use feedback_broker::mcp::handler::AppState;
use feedback_broker::mcp::transport;
use feedback_broker::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "feedback-broker", about = "MCP human feedback broker", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json). Logs are written to stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the UI collaborator program.
    #[arg(long)]
    window_command: Option<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("feedback-broker bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(ref path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(command) = args.window_command {
        config.window.command = command;
    }
    if let Ok(exe) = std::env::current_exe() {
        config.resolve_window_command(&exe);
    }
    config.validate()?;

    let config = Arc::new(config);
    info!(window = %config.window.command, "configuration loaded");

    let state = Arc::new(AppState::new(Arc::clone(&config))?);

    // ── Start transport ─────────────────────────────────
    let ct = CancellationToken::new();
    let stdio_ct = ct.clone();
    let stdio_state = Arc::clone(&state);
    let mut stdio_handle = tokio::spawn(async move {
        if let Err(err) = transport::serve_stdio(stdio_state, stdio_ct).await {
            error!(%err, "stdio transport failed");
        }
    });

    info!("MCP server ready");

    // ── Wait for shutdown signal or client disconnect ───
    let transport_done = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            false
        }
        _ = &mut stdio_handle => {
            info!("MCP client disconnected");
            true
        }
    };
    ct.cancel();

    // ── Terminate every live session ────────────────────
    let terminated = state.registry.shutdown_all(config.shutdown_grace()).await;
    info!(terminated, "ui processes terminated");

    if !transport_done {
        let _ = stdio_handle.await;
    }
    info!("feedback-broker shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Stdout carries the MCP transport.
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
