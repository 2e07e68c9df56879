//! Session registry, the single source of truth for live sessions.
//!
//! One `std::sync::Mutex` guards the table; it is never held across an
//! `.await`. Endpoint allocation runs under the same lock as insertion so
//! that no two live sessions can ever share a port.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use super::allocator::ChannelAllocator;
use super::supervisor::ProcessHandle;
use crate::models::session::{SessionId, SessionState};
use crate::{AppError, Result};

/// One row of the registry.
#[derive(Debug)]
pub struct SessionEntry {
    /// Loopback endpoint exclusively assigned to the session.
    pub endpoint: SocketAddr,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Supervised child, once launched.
    pub process: Option<ProcessHandle>,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<SessionId, SessionEntry>,
    closed: bool,
}

/// Process-wide session table; clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a session and reserve an endpoint for it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ResourceExhausted` if the allocator gives up, or
    /// `AppError::Cancelled` once [`shutdown_all`](Self::shutdown_all) ran.
    pub fn reserve(&self, allocator: &ChannelAllocator) -> Result<(SessionId, SocketAddr)> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(AppError::Cancelled("broker is shutting down".into()));
        }

        let taken: HashSet<u16> = inner
            .sessions
            .values()
            .map(|entry| entry.endpoint.port())
            .collect();
        let endpoint = allocator.allocate(&taken)?;

        let id = SessionId::new();
        inner.sessions.insert(
            id.clone(),
            SessionEntry {
                endpoint,
                state: SessionState::Launching,
                process: None,
            },
        );
        Ok((id, endpoint))
    }

    /// Record the supervised child for a session.
    ///
    /// Returns `false` when the entry is already gone (torn down or swept),
    /// in which case the caller still owns the process.
    pub fn attach_process(&self, id: &SessionId, process: ProcessHandle) -> bool {
        match self.lock().sessions.get_mut(id) {
            Some(entry) => {
                entry.process = Some(process);
                true
            }
            None => false,
        }
    }

    /// Move a session to `next` if the transition is permitted.
    pub fn set_state(&self, id: &SessionId, next: SessionState) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.sessions.get_mut(id) else {
            return false;
        };
        if entry.state.can_transition_to(next) {
            entry.state = next;
            true
        } else {
            false
        }
    }

    /// Current state of a session.
    #[must_use]
    pub fn state(&self, id: &SessionId) -> Option<SessionState> {
        self.lock().sessions.get(id).map(|entry| entry.state)
    }

    /// Endpoint assigned to a session.
    #[must_use]
    pub fn endpoint(&self, id: &SessionId) -> Option<SocketAddr> {
        self.lock().sessions.get(id).map(|entry| entry.endpoint)
    }

    /// Endpoints of every live session.
    #[must_use]
    pub fn endpoints(&self) -> Vec<SocketAddr> {
        self.lock()
            .sessions
            .values()
            .map(|entry| entry.endpoint)
            .collect()
    }

    /// States of every live session, in no particular order.
    #[must_use]
    pub fn states(&self) -> Vec<SessionState> {
        self.lock()
            .sessions
            .values()
            .map(|entry| entry.state)
            .collect()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Whether no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }

    /// Remove a session, returning its entry if it was still present.
    pub fn remove(&self, id: &SessionId) -> Option<SessionEntry> {
        self.lock().sessions.remove(id)
    }

    /// Terminate every live session and refuse new ones.
    ///
    /// Drains the table, issues one terminate per launched child, then waits
    /// up to `grace` for all of them to be reaped. Returns how many
    /// terminations were issued.
    pub async fn shutdown_all(&self, grace: Duration) -> usize {
        let drained: Vec<(SessionId, SessionEntry)> = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.sessions.drain().collect()
        };

        let mut processes = Vec::new();
        for (id, entry) in drained {
            if let Some(process) = entry.process {
                if process.terminate() {
                    info!(session_id = %id, pid = process.pid().unwrap_or(0), "terminating ui process");
                    processes.push(process);
                }
            }
        }

        let count = processes.len();
        let waits = async {
            for process in &processes {
                process.wait_exited().await;
            }
        };
        if tokio::time::timeout(grace, waits).await.is_err() {
            warn!(count, ?grace, "ui processes still running after shutdown grace");
        }

        count
    }
}
