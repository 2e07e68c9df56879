//! Request bridge: the single-shot prompt/decision exchange.
//!
//! `client` is the broker side; `server` is hosted by the UI collaborator
//! on the endpoint the broker assigned it.

pub mod client;
pub mod server;

/// Well-known path of the exchange.
pub const FEEDBACK_PATH: &str = "/feedback";

/// Line the collaborator prints on stdout once its endpoint is bound.
pub const READY_PREFIX: &str = "listening";
