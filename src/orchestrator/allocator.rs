//! Channel allocation: picks a free loopback port for each session.
//!
//! Ports are drawn uniformly at random from a configured range. A draw is
//! rejected when a live session already holds the port or when the OS
//! refuses a trial bind (someone outside the broker owns it). The caller
//! performs the draw while holding the registry lock, so rejection by
//! registry membership is race-free across concurrent sessions.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::ops::RangeInclusive;

use rand::Rng;
use tracing::debug;

use crate::config::PortConfig;
use crate::{AppError, Result};

/// Loopback host every session endpoint binds to.
pub const LOOPBACK: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Randomized port allocator with a bounded retry budget.
#[derive(Debug, Clone)]
pub struct ChannelAllocator {
    range: RangeInclusive<u16>,
    max_attempts: u32,
}

impl ChannelAllocator {
    /// Build an allocator over `range` with `max_attempts` draws per request.
    #[must_use]
    pub fn new(range: RangeInclusive<u16>, max_attempts: u32) -> Self {
        Self {
            range,
            max_attempts,
        }
    }

    /// Build an allocator from the `[ports]` configuration table.
    #[must_use]
    pub fn from_config(config: &PortConfig) -> Self {
        Self::new(config.start..=config.end, config.max_attempts)
    }

    /// Draw an endpoint not present in `taken` and currently bindable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ResourceExhausted` once the retry budget is spent.
    pub fn allocate(&self, taken: &HashSet<u16>) -> Result<SocketAddr> {
        let mut rng = rand::rng();
        for attempt in 1..=self.max_attempts {
            let port = rng.random_range(self.range.clone());
            if taken.contains(&port) {
                debug!(port, attempt, "port held by a live session, redrawing");
                continue;
            }
            if !is_bindable(port) {
                debug!(port, attempt, "port bound externally, redrawing");
                continue;
            }
            return Ok(SocketAddr::from((LOOPBACK, port)));
        }

        Err(AppError::ResourceExhausted(format!(
            "no free port in {}-{} after {} attempts",
            self.range.start(),
            self.range.end(),
            self.max_attempts
        )))
    }
}

/// Whether `port` can currently be bound on loopback.
fn is_bindable(port: u16) -> bool {
    TcpListener::bind(SocketAddr::from((LOOPBACK, port))).is_ok()
}
