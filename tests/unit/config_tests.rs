use std::time::Duration;

use feedback_broker::config::{Readiness, DEFAULT_WINDOW_COMMAND};
use feedback_broker::{AppError, GlobalConfig};

const SAMPLE: &str = r#"
inactivity_text = "Nobody answered."

[window]
command = "/opt/bin/my-window"
args = ["--theme", "dark"]
port_env = "FEEDBACK_PORT"
readiness = "grace_delay"
grace_delay_ms = 750

[ports]
start = 30000
end = 30100
max_attempts = 8

[timeouts]
response_seconds = 600
shutdown_grace_seconds = 2
"#;

#[test]
fn empty_file_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("empty config");
    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.window.command, DEFAULT_WINDOW_COMMAND);
    assert_eq!(config.window.port_env, "MCP_SERVER_PORT");
    assert_eq!(config.window.readiness, Readiness::Handshake);
    assert_eq!(config.ports.start, 20_000);
    assert_eq!(config.ports.end, 29_999);
    assert_eq!(config.response_timeout(), None);
    assert_eq!(config.startup_timeout(), Duration::from_secs(15));
}

#[test]
fn full_file_parses() {
    let config = GlobalConfig::from_toml_str(SAMPLE).expect("sample config");
    assert_eq!(config.inactivity_text, "Nobody answered.");
    assert_eq!(config.window.args, ["--theme", "dark"]);
    assert_eq!(config.window.port_env, "FEEDBACK_PORT");
    assert_eq!(config.window.readiness, Readiness::GraceDelay);
    assert_eq!(config.grace_delay(), Duration::from_millis(750));
    assert_eq!(config.ports.max_attempts, 8);
    assert_eq!(config.response_timeout(), Some(Duration::from_secs(600)));
    assert_eq!(config.shutdown_grace(), Duration::from_secs(2));
}

#[test]
fn partial_table_keeps_other_defaults() {
    let config = GlobalConfig::from_toml_str("[ports]\nstart = 40000\nend = 40010\n")
        .expect("partial config");
    assert_eq!(config.ports.max_attempts, 32);
    assert_eq!(config.window.command, DEFAULT_WINDOW_COMMAND);
}

#[test]
fn inverted_range_rejected() {
    let err = GlobalConfig::from_toml_str("[ports]\nstart = 30000\nend = 29000\n")
        .expect_err("inverted range");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("ports.start")));
}

#[test]
fn privileged_ports_rejected() {
    let err = GlobalConfig::from_toml_str("[ports]\nstart = 80\nend = 2000\n")
        .expect_err("privileged range");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn zero_attempts_rejected() {
    let err = GlobalConfig::from_toml_str("[ports]\nmax_attempts = 0\n").expect_err("zero attempts");
    assert!(err.to_string().contains("max_attempts"));
}

#[test]
fn blank_command_rejected() {
    let err = GlobalConfig::from_toml_str("[window]\ncommand = \"  \"\n").expect_err("blank command");
    assert!(err.to_string().contains("window.command"));
}

#[test]
fn blank_inactivity_text_rejected() {
    let err = GlobalConfig::from_toml_str("inactivity_text = \"\"\n").expect_err("blank sentinel");
    assert!(err.to_string().contains("inactivity_text"));
}

#[test]
fn unknown_readiness_is_parse_error() {
    let err = GlobalConfig::from_toml_str("[window]\nreadiness = \"telepathy\"\n")
        .expect_err("bad readiness");
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn load_from_missing_path_fails() {
    let err = GlobalConfig::load_from_path("/definitely/not/here.toml").expect_err("missing file");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("failed to read config")));
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, SAMPLE).expect("write config");
    let config = GlobalConfig::load_from_path(&path).expect("load config");
    assert_eq!(config.window.command, "/opt/bin/my-window");
}

#[test]
fn sibling_window_binary_is_preferred() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sibling = dir.path().join(format!(
        "{DEFAULT_WINDOW_COMMAND}{}",
        std::env::consts::EXE_SUFFIX
    ));
    std::fs::write(&sibling, b"").expect("write sibling");

    let mut config = GlobalConfig::default();
    config.resolve_window_command(&dir.path().join("feedback-broker"));
    assert_eq!(config.window.command, sibling.to_string_lossy());
}

#[test]
fn explicit_window_command_is_kept() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join(DEFAULT_WINDOW_COMMAND), b"").expect("write sibling");

    let mut config = GlobalConfig::default();
    config.window.command = "custom-window".into();
    config.resolve_window_command(&dir.path().join("feedback-broker"));
    assert_eq!(config.window.command, "custom-window");
}

#[test]
fn missing_sibling_keeps_bare_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = GlobalConfig::default();
    config.resolve_window_command(&dir.path().join("feedback-broker"));
    assert_eq!(config.window.command, DEFAULT_WINDOW_COMMAND);
}
