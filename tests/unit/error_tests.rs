//! Display format and classification of `AppError`.

use feedback_broker::AppError;

#[test]
fn display_prefixes_are_stable() {
    let cases = [
        (AppError::ResourceExhausted("x".into()), "resource exhausted: x"),
        (AppError::ProcessLaunchFailed("x".into()), "process launch failed: x"),
        (AppError::BridgeUnreachable("x".into()), "bridge unreachable: x"),
        (AppError::Feedback("x".into()), "feedback: x"),
        (AppError::ImageReadFailed("x".into()), "image read failed: x"),
        (AppError::InternalProtocol("x".into()), "protocol: x"),
        (AppError::ProcessExited("x".into()), "process exited: x"),
        (AppError::Cancelled("x".into()), "cancelled: x"),
        (AppError::ResponseTimeout("x".into()), "response timeout: x"),
        (AppError::Config("x".into()), "config: x"),
        (AppError::Mcp("x".into()), "mcp: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn feedback_error_carries_collaborator_reason_verbatim() {
    let err = AppError::Feedback("CANCELLED: Operation cancelled by user.".into());
    assert!(err.to_string().ends_with("CANCELLED: Operation cancelled by user."));
}

#[test]
fn io_error_converts() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert_eq!(err, AppError::Io("gone".into()));
}
