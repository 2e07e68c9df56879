//! Broker façade: one `collect_feedback` call, end to end.
//!
//! allocate → launch → await readiness → deliver → await decision → finalize,
//! with teardown owned by a [`SessionGuard`] so it runs on every exit path,
//! including the caller's future being dropped mid-wait.

use std::sync::Arc;

use tokio::task::AbortHandle;
use tracing::{field, info, info_span, warn, Instrument};

use super::allocator::ChannelAllocator;
use super::registry::SessionRegistry;
use super::slot;
use super::supervisor::{self, ProcessHandle};
use crate::bridge::client::BridgeClient;
use crate::config::GlobalConfig;
use crate::models::decision::{Decision, FeedbackRequest};
use crate::models::session::{SessionId, SessionState};
use crate::{AppError, Result};

/// Orchestrates feedback sessions against a shared registry.
#[derive(Debug, Clone)]
pub struct Broker {
    config: Arc<GlobalConfig>,
    registry: SessionRegistry,
    allocator: ChannelAllocator,
    bridge: BridgeClient,
}

impl Broker {
    /// Build a broker over `registry`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the bridge client cannot be built.
    pub fn new(config: Arc<GlobalConfig>, registry: SessionRegistry) -> Result<Self> {
        let allocator = ChannelAllocator::from_config(&config.ports);
        Ok(Self {
            config,
            registry,
            allocator,
            bridge: BridgeClient::new()?,
        })
    }

    /// Shared configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<GlobalConfig> {
        &self.config
    }

    /// The registry this broker records sessions in.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Show `request` to a human and wait for their decision.
    ///
    /// The returned decision has been finalized: text trimmed and the
    /// inactivity sentinel substituted for an empty auto-submit.
    ///
    /// # Errors
    ///
    /// Any [`AppError`] from the session's lifecycle; see the variant docs.
    pub async fn collect_feedback(&self, request: FeedbackRequest) -> Result<Decision> {
        let span = info_span!("session", session_id = field::Empty, port = field::Empty);
        self.run_session(request, span.clone()).instrument(span).await
    }

    async fn run_session(&self, request: FeedbackRequest, span: tracing::Span) -> Result<Decision> {
        let (session_id, endpoint) = self.registry.reserve(&self.allocator)?;
        span.record("session_id", field::display(&session_id));
        span.record("port", endpoint.port());
        let mut guard = SessionGuard::new(self.registry.clone(), session_id.clone());
        info!("session created");

        let mut child = supervisor::launch(&self.config.window, endpoint)?;
        let stdout = child.stdout.take().ok_or_else(|| {
            AppError::ProcessLaunchFailed("ui process stdout was not captured".into())
        })?;

        let (slot, waiter) = slot::channel::<Decision>();
        let process = supervisor::supervise(session_id.clone(), child, Arc::clone(&slot));
        guard.process = Some(process.clone());
        let watched = process.clone();
        if !self.registry.attach_process(&session_id, process) {
            return Err(AppError::Cancelled("broker is shutting down".into()));
        }

        supervisor::await_ready(stdout, &self.config, &session_id).await?;
        self.registry
            .set_state(&session_id, SessionState::AwaitingResponse);

        let bridge = self.bridge.clone();
        let delivery = tokio::spawn(
            async move {
                let outcome = match bridge.deliver(endpoint, &request).await {
                    Err(err) => Err(watched.explain_bridge_failure(err).await),
                    ok => ok,
                };
                if !slot.resolve(outcome) {
                    info!("bridge reply arrived after the session resolved");
                }
            }
            .instrument(span),
        );
        guard.delivery = Some(delivery.abort_handle());

        let outcome = match self.config.response_timeout() {
            Some(limit) => tokio::time::timeout(limit, waiter.wait())
                .await
                .unwrap_or_else(|_| {
                    Err(AppError::ResponseTimeout(format!(
                        "no decision within {}s",
                        limit.as_secs()
                    )))
                }),
            None => waiter.wait().await,
        };

        let outcome = outcome.and_then(|decision| decision.finalize(&self.config.inactivity_text));
        let state = match &outcome {
            Ok(_) => SessionState::Completed,
            Err(AppError::Cancelled(_)) => SessionState::Cancelled,
            Err(_) => SessionState::Failed,
        };
        self.registry.set_state(&session_id, state);
        match &outcome {
            Ok(_) => info!("decision received"),
            Err(err) => warn!(%err, "session failed"),
        }
        outcome
    }
}

/// Scoped teardown for one session.
///
/// Dropping the guard removes the registry entry, terminates the child
/// (idempotently), and aborts an in-flight delivery.
#[derive(Debug)]
pub struct SessionGuard {
    registry: SessionRegistry,
    session_id: SessionId,
    process: Option<ProcessHandle>,
    delivery: Option<AbortHandle>,
}

impl SessionGuard {
    fn new(registry: SessionRegistry, session_id: SessionId) -> Self {
        Self {
            registry,
            session_id,
            process: None,
            delivery: None,
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(delivery) = self.delivery.take() {
            delivery.abort();
        }
        let entry = self.registry.remove(&self.session_id);
        let terminated = self
            .process
            .as_ref()
            .is_some_and(ProcessHandle::terminate);
        info!(
            session_id = %self.session_id,
            registered = entry.is_some(),
            terminated,
            "session torn down"
        );
    }
}
