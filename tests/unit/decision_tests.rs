//! Decision normalization and wire shape.

use feedback_broker::models::decision::{
    mime_for_path, Decision, FeedbackPayload, FeedbackReply, FeedbackRequest,
};
use feedback_broker::models::time_info::TimeFormat;
use feedback_broker::AppError;

const SENTINEL: &str = "No response received within the inactivity window.";

#[test]
fn finalize_trims_text() {
    let decision = Decision::text("  ship it \n").finalize(SENTINEL).expect("finalize");
    assert_eq!(decision.text, "ship it");
}

#[test]
fn empty_auto_submit_becomes_sentinel() {
    let mut decision = Decision::text("   ");
    decision.auto_submitted = true;
    let decision = decision.finalize(SENTINEL).expect("finalize");
    assert_eq!(decision.text, SENTINEL);
}

#[test]
fn partial_auto_submit_keeps_text() {
    let mut decision = Decision::text("half an answer");
    decision.auto_submitted = true;
    let decision = decision.finalize(SENTINEL).expect("finalize");
    assert_eq!(decision.text, "half an answer");
}

#[test]
fn empty_manual_decision_is_protocol_error() {
    let err = Decision::text("").finalize(SENTINEL).expect_err("empty decision");
    assert!(matches!(err, AppError::InternalProtocol(_)));
}

#[test]
fn image_requires_flag() {
    let mut decision = Decision::text("see attached");
    decision.image_path = Some("/tmp/shot.png".into());
    assert_eq!(decision.image(), None);

    decision.has_image = true;
    assert_eq!(decision.image(), Some("/tmp/shot.png"));
}

#[test]
fn mime_is_guessed_from_extension() {
    assert_eq!(mime_for_path("a.JPG".as_ref()), "image/jpeg");
    assert_eq!(mime_for_path("a.webp".as_ref()), "image/webp");
    assert_eq!(mime_for_path("a".as_ref()), "image/png");
}

#[test]
fn decision_serializes_camel_case() {
    let value = serde_json::to_value(Decision::text("ok").with_image("/tmp/a.gif")).expect("json");
    assert_eq!(
        value,
        serde_json::json!({
            "text": "ok",
            "hasImage": true,
            "imagePath": "/tmp/a.gif",
            "imageType": "image/gif"
        })
    );
}

#[test]
fn auto_submitted_flag_round_trips() {
    let mut decision = Decision::text("");
    decision.auto_submitted = true;
    let body = serde_json::to_string(&FeedbackReply {
        feedback: FeedbackPayload::Decision(decision),
    })
    .expect("json");
    assert!(body.contains("\"autoSubmitted\":true"));

    let reply: FeedbackReply = serde_json::from_str(&body).expect("parse");
    assert!(reply.feedback.into_decision().auto_submitted);
}

#[test]
fn legacy_string_payload_is_text_only() {
    let reply: FeedbackReply = serde_json::from_str(r#"{"feedback":"fine"}"#).expect("parse");
    let decision = reply.feedback.into_decision();
    assert_eq!(decision.text, "fine");
    assert!(!decision.has_image);
}

#[test]
fn request_defaults_time_format() {
    let request: FeedbackRequest =
        serde_json::from_str(r#"{"prompt":"p","title":"t"}"#).expect("parse");
    assert_eq!(request.time_format, TimeFormat::Full);
    assert_eq!(request.timezone, None);
}
