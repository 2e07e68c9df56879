//! Collaborator side of the bridge.
//!
//! Serves `POST /feedback` on the assigned loopback port and answers it
//! exactly once. A second prompt gets `409`, unknown routes get `404`, and a
//! body that is not a valid request gets `400` without consuming the shot.
//! Once the single decision has been sent, the server shuts down gracefully.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::FEEDBACK_PATH;
use crate::models::decision::{Decision, ErrorReply, FeedbackPayload, FeedbackReply, FeedbackRequest};
use crate::orchestrator::allocator::LOOPBACK;
use crate::{AppError, Result};

/// Outcome produced by the collaborator: a decision, or a reason for declining.
pub type DecisionResult = std::result::Result<Decision, String>;

type DecideFuture = Pin<Box<dyn Future<Output = DecisionResult> + Send>>;
type Decide = Box<dyn FnOnce(FeedbackRequest) -> DecideFuture + Send>;

struct BridgeState {
    decide: Mutex<Option<Decide>>,
    done: CancellationToken,
}

/// Bind the loopback listener for `port`.
///
/// # Errors
///
/// Returns `AppError::Io` if the port cannot be bound.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from((LOOPBACK, port));
    TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Io(format!("failed to bind bridge on {addr}: {err}")))
}

/// Serve a single prompt on `listener`, answering it with `decide`.
///
/// Returns after the decision has been sent, or when `shutdown` fires first.
///
/// # Errors
///
/// Returns `AppError::Io` if the HTTP server fails.
pub async fn serve_once<F, Fut>(
    listener: TcpListener,
    decide: F,
    shutdown: CancellationToken,
) -> Result<()>
where
    F: FnOnce(FeedbackRequest) -> Fut + Send + 'static,
    Fut: Future<Output = DecisionResult> + Send + 'static,
{
    let done = shutdown.child_token();
    let boxed: Decide = Box::new(move |request| Box::pin(decide(request)));
    let state = Arc::new(BridgeState {
        decide: Mutex::new(Some(boxed)),
        done: done.clone(),
    });

    let router = Router::new()
        .route(FEEDBACK_PATH, post(feedback))
        .fallback(not_found)
        .with_state(state);

    let local = listener.local_addr().ok();
    info!(?local, "bridge server accepting prompt");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { done.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("bridge server error: {err}")))?;

    info!("bridge server shut down");
    Ok(())
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorReply::new(message))).into_response()
}

async fn not_found() -> Response {
    error(StatusCode::NOT_FOUND, "Not found")
}

async fn feedback(State(state): State<Arc<BridgeState>>, body: String) -> Response {
    let request: FeedbackRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!(%err, "malformed prompt request");
            return error(StatusCode::BAD_REQUEST, format!("invalid request: {err}"));
        }
    };

    let decide = state
        .decide
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    let Some(decide) = decide else {
        return error(
            StatusCode::CONFLICT,
            "a feedback request was already received",
        );
    };

    info!(title = %request.title, "prompt received");
    let outcome = decide(request).await;
    state.done.cancel();

    match outcome {
        Ok(decision) => (
            StatusCode::OK,
            Json(FeedbackReply {
                feedback: FeedbackPayload::Decision(decision),
            }),
        )
            .into_response(),
        Err(reason) => error(StatusCode::BAD_REQUEST, reason),
    }
}
