#![forbid(unsafe_code)]

//! `feedback-window`: terminal UI collaborator for `feedback-broker`.
//!
//! Binds the Request Bridge on the port handed over in the environment,
//! announces readiness on stdout, shows the prompt on the controlling
//! terminal, and answers the broker exactly once. Scripted flags make it
//! usable without a human (automation, tests).

use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use feedback_broker::bridge::server::{self, DecisionResult};
use feedback_broker::bridge::READY_PREFIX;
use feedback_broker::models::decision::{Decision, FeedbackRequest};
use feedback_broker::{AppError, Result};

const APPROVED_TEXT: &str = "APPROVED: I approve this action or information.";
const ENOUGH_TEXT: &str = "ENOUGH: The information provided is sufficient. No further details needed.";
const CANCELLED_TEXT: &str = "CANCELLED: Operation cancelled by user.";
const CLOSED_TEXT: &str = "CANCELLED: Window was closed without providing feedback.";

#[cfg(unix)]
const TTY_IN: &str = "/dev/tty";
#[cfg(unix)]
const TTY_OUT: &str = "/dev/tty";
#[cfg(windows)]
const TTY_IN: &str = "CONIN$";
#[cfg(windows)]
const TTY_OUT: &str = "CONOUT$";

#[derive(Debug, Parser)]
#[command(
    name = "feedback-window",
    about = "Terminal feedback collaborator for feedback-broker",
    version,
    long_about = None
)]
struct Cli {
    /// Port to bind; read from the environment variable named by `--port-env` when omitted.
    #[arg(long)]
    port: Option<u16>,

    /// Environment variable carrying the assigned port.
    #[arg(long, default_value = "MCP_SERVER_PORT")]
    port_env: String,

    /// Answer immediately with this text instead of asking.
    #[arg(long, conflicts_with = "cancel")]
    reply: Option<String>,

    /// Attach this image to the scripted reply.
    #[arg(long, requires = "reply")]
    image: Option<PathBuf>,

    /// Decline immediately, optionally with a custom reason.
    #[arg(long, num_args = 0..=1, default_missing_value = CANCELLED_TEXT)]
    cancel: Option<String>,

    /// Auto-submit after this many seconds without input; 0 disables.
    #[arg(long, default_value_t = 0)]
    timeout_secs: u64,

    /// Never open the controlling terminal.
    #[arg(long)]
    headless: bool,
}

impl Cli {
    fn resolve_port(&self) -> Result<u16> {
        if let Some(port) = self.port {
            return Ok(port);
        }
        let raw = std::env::var(&self.port_env)
            .map_err(|_| AppError::Config(format!("{} is not set", self.port_env)))?;
        raw.trim()
            .parse()
            .map_err(|err| AppError::Config(format!("invalid {} '{raw}': {err}", self.port_env)))
    }

    fn inactivity(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// How the decision will be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Reply(Decision),
    Cancel(String),
    Terminal(Option<Duration>),
    Idle(Option<Duration>),
}

impl Mode {
    fn from_cli(cli: &Cli) -> Self {
        if let Some(ref reason) = cli.cancel {
            return Self::Cancel(reason.clone());
        }
        if let Some(ref text) = cli.reply {
            let decision = Decision::text(text.clone());
            return Self::Reply(match cli.image {
                Some(ref path) => decision.with_image(path.to_string_lossy()),
                None => decision,
            });
        }
        if cli.headless {
            Self::Idle(cli.inactivity())
        } else {
            Self::Terminal(cli.inactivity())
        }
    }

    async fn decide(self, request: FeedbackRequest) -> DecisionResult {
        match self {
            Self::Reply(decision) => Ok(decision),
            Self::Cancel(reason) => Err(reason),
            Self::Terminal(inactivity) => ask_on_terminal(&request, inactivity).await,
            Self::Idle(Some(inactivity)) => {
                tokio::time::sleep(inactivity).await;
                Ok(auto_submit(String::new(), None))
            }
            Self::Idle(None) => Err("no reply configured and the terminal is disabled".into()),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;
    let result = runtime.block_on(run(cli));
    // A terminal read may still be parked on a blocking thread.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run(cli: Cli) -> Result<()> {
    let port = cli.resolve_port()?;
    let listener = server::bind(port).await?;

    // Readiness handshake: the broker waits for this exact line.
    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{READY_PREFIX} {port}")?;
        stdout.flush()?;
    }
    info!(port, "bridge bound");

    let mode = Mode::from_cli(&cli);
    tokio::select! {
        result = server::serve_once(listener, move |request| mode.decide(request), CancellationToken::new()) => result,
        () = shutdown_signal() => {
            info!("termination requested, closing window");
            Ok(())
        }
    }
}

/// One line of terminal input.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Submit,
    Approve,
    Enough,
    Cancel,
    Image(&'a str),
    Text(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    match trimmed {
        "" => Input::Submit,
        ":approve" => Input::Approve,
        ":enough" => Input::Enough,
        ":cancel" => Input::Cancel,
        _ => match trimmed.strip_prefix(":image ") {
            Some(path) => Input::Image(path.trim()),
            None => Input::Text(line),
        },
    }
}

fn auto_submit(text: String, image: Option<&str>) -> Decision {
    let mut decision = Decision::text(text);
    if let Some(path) = image {
        decision = decision.with_image(path);
    }
    decision.auto_submitted = true;
    decision
}

fn with_optional_image(text: &str, image: Option<&str>) -> Decision {
    let decision = Decision::text(text);
    match image {
        Some(path) => decision.with_image(path),
        None => decision,
    }
}

async fn ask_on_terminal(request: &FeedbackRequest, inactivity: Option<Duration>) -> DecisionResult {
    let input = tokio::fs::File::open(TTY_IN)
        .await
        .map_err(|err| format!("no terminal available: {err}"))?;
    let mut output = tokio::fs::OpenOptions::new()
        .write(true)
        .open(TTY_OUT)
        .await
        .map_err(|err| format!("no terminal available: {err}"))?;

    let banner = format!(
        "\n=== {} ===\n\n{}\n\nType your feedback and finish with an empty line.\n\
         Commands: :image <path>  :approve  :enough  :cancel\n> ",
        request.title, request.prompt
    );
    say(&mut output, &banner).await;

    let mut lines = BufReader::new(input).lines();
    let mut text = String::new();
    let mut image: Option<String> = None;

    loop {
        let next = match inactivity {
            Some(limit) => match tokio::time::timeout(limit, lines.next_line()).await {
                Ok(next) => next,
                Err(_) => {
                    say(&mut output, "\n(inactivity timeout, submitting)\n").await;
                    return Ok(auto_submit(text, image.as_deref()));
                }
            },
            None => lines.next_line().await,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => return Err(CLOSED_TEXT.into()),
            Err(err) => return Err(format!("terminal read failed: {err}")),
        };

        match parse_input(&line) {
            Input::Approve => return Ok(with_optional_image(APPROVED_TEXT, image.as_deref())),
            Input::Enough => return Ok(with_optional_image(ENOUGH_TEXT, image.as_deref())),
            Input::Cancel => return Err(CANCELLED_TEXT.into()),
            Input::Submit if text.trim().is_empty() => {
                say(&mut output, "Please enter feedback before submitting.\n> ").await;
            }
            Input::Submit => {
                return Ok(with_optional_image(text.trim(), image.as_deref()));
            }
            Input::Image(path) => {
                if std::path::Path::new(path).is_file() {
                    image = Some(path.to_owned());
                    say(&mut output, "(image attached)\n> ").await;
                } else {
                    say(&mut output, "(no such file)\n> ").await;
                }
            }
            Input::Text(chunk) => {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(chunk);
                say(&mut output, "> ").await;
            }
        }
    }
}

async fn say(output: &mut tokio::fs::File, message: &str) {
    if let Err(err) = output.write_all(message.as_bytes()).await {
        warn!(%err, "terminal write failed");
    }
    let _ = output.flush().await;
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
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            warn!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // Stdout is reserved for the readiness line.
    fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
        .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))
}
