//! Supervision of UI processes: launch, readiness, exit watch, termination.
//!
//! Each session gets exactly one child with `kill_on_drop(true)`. The
//! assigned port travels through the environment variable named in
//! `window.port_env`. Stdin is null and stdout is piped: the first stdout
//! line is the readiness handshake, later lines are drained into the log.
//! Stderr is inherited, since the broker's own stderr is its log stream.

use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::slot::OutcomeSlot;
use crate::config::{GlobalConfig, Readiness, WindowConfig};
use crate::models::session::SessionId;
use crate::{AppError, Result};

/// How long an exit observer defers to an in-flight bridge response.
pub const EXIT_SETTLE: Duration = Duration::from_millis(250);

/// Grace period between the termination signal and a forced kill.
const TERM_GRACE: Duration = Duration::from_secs(3);

/// Shared handle used to terminate one supervised child.
///
/// Cloning is cheap; every clone controls the same process.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: Option<u32>,
    kill: CancellationToken,
    terminated: Arc<AtomicBool>,
    exited: watch::Receiver<Option<String>>,
}

impl ProcessHandle {
    /// OS process id, if the child was still running when observed.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Request termination. Returns `true` only for the call that actually
    /// initiated it; repeated calls and calls after exit are no-ops.
    pub fn terminate(&self) -> bool {
        if self.has_exited() {
            return false;
        }
        if self.terminated.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.kill.cancel();
        true
    }

    /// Whether the child has been reaped.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exited.borrow().is_some()
    }

    /// How the child ended, e.g. `exited with code 3`, once it has been reaped.
    #[must_use]
    pub fn exit_reason(&self) -> Option<String> {
        self.exited.borrow().clone()
    }

    /// Wait until the child has been reaped.
    pub async fn wait_exited(&self) {
        let mut rx = self.exited.clone();
        // A closed channel means the supervisor task finished, so the child is gone.
        let _ = rx.wait_for(Option::is_some).await;
    }

    /// Attribute a failed bridge exchange to the child's death when it died.
    ///
    /// A connection dropped by a dying child surfaces before the exit
    /// observer fires, so wait up to [`EXIT_SETTLE`] for the reap. A child
    /// that is still alive keeps the original `BridgeUnreachable`.
    pub async fn explain_bridge_failure(&self, err: AppError) -> AppError {
        if !matches!(err, AppError::BridgeUnreachable(_)) {
            return err;
        }
        if tokio::time::timeout(EXIT_SETTLE, self.wait_exited()).await.is_err() {
            return err;
        }
        match self.exit_reason() {
            Some(reason) if !self.terminated.load(Ordering::SeqCst) => {
                AppError::ProcessExited(format!("ui process {reason} before a decision arrived"))
            }
            _ => err,
        }
    }
}

/// Spawn the collaborator for a session bound to `endpoint`.
///
/// # Errors
///
/// Returns `AppError::ProcessLaunchFailed` if the OS refuses to start it.
pub fn launch(window: &WindowConfig, endpoint: SocketAddr) -> Result<Child> {
    let mut cmd = Command::new(&window.command);
    cmd.args(&window.args)
        .env(&window.port_env, endpoint.port().to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|err| {
        AppError::ProcessLaunchFailed(format!("failed to spawn '{}': {err}", window.command))
    })?;

    info!(
        pid = child.id().unwrap_or(0),
        port = endpoint.port(),
        command = %window.command,
        "ui process spawned"
    );
    Ok(child)
}

/// Wait until the child is ready to accept the prompt.
///
/// With [`Readiness::Handshake`] the first stdout line is the signal; EOF or
/// the startup ceiling means the bridge will never answer. With
/// [`Readiness::GraceDelay`] the broker simply sleeps.
///
/// # Errors
///
/// Returns `AppError::BridgeUnreachable` when the handshake fails.
pub async fn await_ready(
    stdout: ChildStdout,
    config: &GlobalConfig,
    session_id: &SessionId,
) -> Result<()> {
    let mut reader = BufReader::new(stdout);

    if config.window.readiness == Readiness::GraceDelay {
        drain_stdout(session_id.clone(), reader);
        tokio::time::sleep(config.grace_delay()).await;
        return Ok(());
    }

    let mut line = String::new();
    match tokio::time::timeout(config.startup_timeout(), reader.read_line(&mut line)).await {
        Ok(Ok(n)) if n > 0 => {
            info!(%session_id, ready_line = line.trim(), "ui process signalled readiness");
            drain_stdout(session_id.clone(), reader);
            Ok(())
        }
        Ok(Ok(_)) => Err(AppError::BridgeUnreachable(
            "ui process exited before signalling readiness".into(),
        )),
        Ok(Err(err)) => Err(AppError::BridgeUnreachable(format!(
            "failed to read readiness signal: {err}"
        ))),
        Err(_elapsed) => Err(AppError::BridgeUnreachable(format!(
            "ui process did not signal readiness within {:?}",
            config.startup_timeout()
        ))),
    }
}

/// Forward the remaining stdout into the log so the pipe never fills.
fn drain_stdout(session_id: SessionId, mut reader: BufReader<ChildStdout>) {
    tokio::spawn(async move {
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => debug!(%session_id, output = line.trim_end(), "ui process stdout"),
            }
        }
    });
}

/// Take ownership of `child` and watch it on a background task.
///
/// The task resolves `slot` as `ProcessExited` when the child dies on its own
/// (after [`EXIT_SETTLE`]) and as `Cancelled` when it is terminated. Both
/// writes are no-ops if the bridge already resolved the session.
pub fn supervise<T: Send + 'static>(
    session_id: SessionId,
    mut child: Child,
    slot: Arc<OutcomeSlot<T>>,
) -> ProcessHandle {
    let kill = CancellationToken::new();
    let (exited_tx, exited_rx) = watch::channel(None);
    let handle = ProcessHandle {
        pid: child.id(),
        kill: kill.clone(),
        terminated: Arc::new(AtomicBool::new(false)),
        exited: exited_rx,
    };

    tokio::spawn(async move {
        tokio::select! {
            result = child.wait() => {
                let reason = describe_exit(result);
                let _ = exited_tx.send(Some(reason.clone()));
                info!(%session_id, %reason, "ui process exited");

                tokio::time::sleep(EXIT_SETTLE).await;
                if slot.resolve(Err(AppError::ProcessExited(format!(
                    "ui process {reason} before a decision arrived"
                )))) {
                    warn!(%session_id, %reason, "session failed: ui process exited");
                }
            }
            () = kill.cancelled() => {
                // Resolve before signalling so the dropped bridge connection cannot win.
                slot.resolve(Err(AppError::Cancelled("session terminated".into())));
                stop(&session_id, &mut child).await;
                let _ = exited_tx.send(Some("was terminated by the broker".to_owned()));
            }
        }
    });

    handle
}

fn describe_exit(result: std::io::Result<std::process::ExitStatus>) -> String {
    match result {
        Ok(status) => status.code().map_or_else(
            || "was terminated by a signal".to_owned(),
            |code| format!("exited with code {code}"),
        ),
        Err(err) => format!("could not be waited on ({err})"),
    }
}

/// Signal the child, wait briefly, then force-kill.
async fn stop(session_id: &SessionId, child: &mut Child) {
    send_terminate(child);

    match tokio::time::timeout(TERM_GRACE, child.wait()).await {
        Ok(Ok(status)) => info!(%session_id, ?status, "ui process terminated"),
        Ok(Err(err)) => warn!(%session_id, %err, "error waiting for ui process"),
        Err(_) => {
            warn!(%session_id, "ui process ignored termination signal, forcing kill");
            if let Err(err) = child.kill().await {
                warn!(%session_id, %err, "failed to force-kill ui process");
            }
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(raw) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!(pid = raw, %err, "SIGTERM delivery failed");
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        debug!(%err, "termination request failed");
    }
}
