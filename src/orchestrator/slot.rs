//! Single-assignment result slot shared by every writer of one session.
//!
//! The bridge delivery task, the exit observer, and the terminate path all
//! race to resolve the same slot. Only the first `resolve` lands; the rest
//! return `false` and are otherwise ignored.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::{AppError, Result};

/// Writer half of a pending session result.
#[derive(Debug)]
pub struct OutcomeSlot<T> {
    tx: Mutex<Option<oneshot::Sender<Result<T>>>>,
}

/// Reader half of a pending session result.
#[derive(Debug)]
pub struct OutcomeWaiter<T> {
    rx: oneshot::Receiver<Result<T>>,
}

/// Create a linked slot/waiter pair.
#[must_use]
pub fn channel<T>() -> (Arc<OutcomeSlot<T>>, OutcomeWaiter<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Arc::new(OutcomeSlot {
            tx: Mutex::new(Some(tx)),
        }),
        OutcomeWaiter { rx },
    )
}

impl<T> OutcomeSlot<T> {
    /// Resolve the slot. Returns `true` only for the winning writer.
    pub fn resolve(&self, outcome: Result<T>) -> bool {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            // A dropped waiter still counts as resolved: nobody else may write.
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Whether some writer has already resolved the slot.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl<T> OutcomeWaiter<T> {
    /// Wait for the winning writer.
    ///
    /// # Errors
    ///
    /// Propagates the resolved error, or `AppError::Cancelled` if every
    /// writer went away without resolving.
    pub async fn wait(self) -> Result<T> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(AppError::Cancelled("session dropped before resolving".into())))
    }
}
