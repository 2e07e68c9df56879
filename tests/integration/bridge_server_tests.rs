//! Single-shot behaviour of the collaborator-side bridge server.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use feedback_broker::bridge::client::BridgeClient;
use feedback_broker::bridge::server::{bind, serve_once};
use feedback_broker::models::decision::{Decision, FeedbackReply};
use feedback_broker::AppError;

use super::test_helpers::{request, CALL_CEILING};

fn url(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{port}{path}")
}

fn http() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().expect("client")
}

#[tokio::test]
async fn second_prompt_is_rejected_while_first_pending() {
    let listener = bind(0).await.expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let (started_tx, started_rx) = oneshot::channel::<()>();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve_once(
        listener,
        move |req| async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
            Ok(Decision::text(format!("answer to {}", req.prompt)))
        },
        CancellationToken::new(),
    ));

    let client = http();

    let missing = client.get(url(port, "/elsewhere")).send().await.expect("404 request");
    assert_eq!(missing.status().as_u16(), 404);

    let malformed = client
        .post(url(port, "/feedback"))
        .body("not json")
        .send()
        .await
        .expect("400 request");
    assert_eq!(malformed.status().as_u16(), 400);

    let first = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .post(url(port, "/feedback"))
                .json(&request("first"))
                .send()
                .await
        })
    };
    timeout(CALL_CEILING, started_rx)
        .await
        .expect("first prompt reached the decider")
        .expect("decider started");

    let second = client
        .post(url(port, "/feedback"))
        .json(&request("second"))
        .send()
        .await
        .expect("409 request");
    assert_eq!(second.status().as_u16(), 409);

    release_tx.send(()).expect("release");
    let reply = first.await.expect("join").expect("first response");
    assert_eq!(reply.status().as_u16(), 200);
    let body: FeedbackReply = reply.json().await.expect("reply body");
    assert_eq!(body.feedback.into_decision().text, "answer to first");

    timeout(Duration::from_secs(5), server)
        .await
        .expect("server stops after answering")
        .expect("join")
        .expect("server result");
}

#[tokio::test]
async fn declined_prompt_maps_to_feedback_error() {
    let listener = bind(0).await.expect("bind");
    let endpoint = listener.local_addr().expect("addr");

    let server = tokio::spawn(serve_once(
        listener,
        |_| async { Err("CANCELLED: Window was closed without providing feedback.".to_owned()) },
        CancellationToken::new(),
    ));

    let err = BridgeClient::new()
        .expect("client")
        .deliver(endpoint, &request("anyone?"))
        .await
        .expect_err("declined");
    assert_eq!(
        err,
        AppError::Feedback("CANCELLED: Window was closed without providing feedback.".into())
    );

    timeout(Duration::from_secs(5), server)
        .await
        .expect("server stops")
        .expect("join")
        .expect("server result");
}

#[tokio::test]
async fn shutdown_token_stops_idle_server() {
    let listener = bind(0).await.expect("bind");
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(serve_once(
        listener,
        |_| async { Ok(Decision::text("unused")) },
        shutdown.clone(),
    ));

    shutdown.cancel();
    timeout(Duration::from_secs(5), server)
        .await
        .expect("server stops")
        .expect("join")
        .expect("server result");
}

#[tokio::test]
async fn nobody_listening_is_unreachable() {
    let endpoint = {
        let spare = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        spare.local_addr().expect("addr")
    };

    let err = BridgeClient::new()
        .expect("client")
        .deliver(endpoint, &request("hello?"))
        .await
        .expect_err("refused");
    assert!(matches!(err, AppError::BridgeUnreachable(_)));
}
