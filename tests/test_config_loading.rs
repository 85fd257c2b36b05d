//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.
//! We test observable outcomes, not implementation details of TOML parsing.

use std::io::Write;
use std::time::Duration;
use stomp_session::config::{ConfigError, SessionConfig};
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[broker]
url = "wss://chat.example.com/ws-stomp"
host = "chat"
credential_env = "CHAT_TOKEN"

[session]
topics = ["/topic/chat/1"]
connect_timeout_ms = 5000
receipt_timeout_ms = 2500

[heartbeat]
outgoing_ms = 4000
incoming_ms = 8000
grace_multiplier = 3.0

[reconnect]
base_delay_ms = 500
max_delay_ms = 10000
max_attempts = 5
jitter_ratio = 0.2
"#,
    );

    let config = SessionConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.broker.url, "wss://chat.example.com/ws-stomp");
    assert_eq!(config.broker.host.as_deref(), Some("chat"));
    assert_eq!(config.broker.credential_env.as_deref(), Some("CHAT_TOKEN"));
    assert_eq!(config.session.topics, vec!["/topic/chat/1"]);
    assert_eq!(config.session.connect_timeout(), Duration::from_secs(5));
    assert_eq!(config.session.receipt_timeout(), Duration::from_millis(2500));
    assert_eq!(config.heartbeat.outgoing_ms, 4000);
    assert_eq!(config.heartbeat.incoming_ms, 8000);
    assert_eq!(config.heartbeat.grace_multiplier, 3.0);
    assert_eq!(config.reconnect.base_delay_ms, 500);
    assert_eq!(config.reconnect.max_attempts, Some(5));
    assert_eq!(config.virtual_host(), "chat");
}

#[test]
fn test_config_minimal_uses_defaults() {
    let temp_file = write_config(
        r#"
[broker]
url = "ws://localhost:8080/ws-stomp"
"#,
    );

    let config = SessionConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config, SessionConfig::for_endpoint("ws://localhost:8080/ws-stomp"));
    assert_eq!(config.broker.auth_header, "Authorization");
    assert_eq!(config.broker.auth_scheme.as_deref(), Some("Bearer"));
    assert_eq!(config.heartbeat.outgoing_ms, 10_000);
    assert_eq!(config.heartbeat.incoming_ms, 10_000);
    assert_eq!(config.reconnect.max_attempts, None);
    assert_eq!(config.virtual_host(), "localhost");
    assert!(config.credential_provider().is_none());
}

#[test]
fn test_config_partial_section_keeps_other_defaults() {
    let temp_file = write_config(
        r#"
[broker]
url = "tcp://broker.internal:61613"

[reconnect]
max_attempts = 3
"#,
    );

    let config = SessionConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.reconnect.max_attempts, Some(3));
    assert_eq!(config.reconnect.base_delay_ms, 1_000);
    assert_eq!(config.reconnect.max_delay_ms, 30_000);
    assert!(!config.reconnect.auth_error_patterns.is_empty());
}

#[test]
fn test_config_fails_with_missing_file() {
    let result = SessionConfig::load_from_file(std::path::Path::new("/nonexistent/session.toml"));

    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_config_fails_with_invalid_toml() {
    let temp_file = write_config("[broker\nurl = ");

    let result = SessionConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_config_fails_without_broker_section() {
    let temp_file = write_config(
        r#"
[session]
topics = ["/topic/a"]
"#,
    );

    let result = SessionConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_config_rejects_unsupported_scheme() {
    let temp_file = write_config(
        r#"
[broker]
url = "http://localhost:8080/ws-stomp"
"#,
    );

    let result = SessionConfig::load_from_file(temp_file.path());

    match result {
        Err(ConfigError::InvalidConfig(message)) => assert!(message.contains("scheme")),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[test]
fn test_config_rejects_out_of_range_values() {
    let cases = [
        "[session]\nconnect_timeout_ms = 0",
        "[session]\ndedup_capacity = 0",
        "[heartbeat]\ngrace_multiplier = 0.5",
        "[reconnect]\nbase_delay_ms = 5000\nmax_delay_ms = 1000",
        "[reconnect]\nmax_attempts = 0",
        "[reconnect]\njitter_ratio = 1.5",
    ];

    for case in cases {
        let content = format!("[broker]\nurl = \"ws://localhost/ws\"\n\n{case}\n");
        let result = SessionConfig::from_toml(&content);
        assert!(
            matches!(result, Err(ConfigError::InvalidConfig(_))),
            "expected rejection for:\n{case}"
        );
    }
}

#[test]
fn test_credential_env_resolution() {
    let mut config = SessionConfig::for_endpoint("ws://localhost/ws");
    config.broker.credential_env = Some("STOMP_SESSION_TEST_MISSING_TOKEN".to_string());

    assert!(matches!(
        config.get_credential(),
        Err(ConfigError::EnvVarNotFound(name)) if name == "STOMP_SESSION_TEST_MISSING_TOKEN"
    ));
    assert!(config.credential_provider().is_some());
}

#[test]
fn test_config_round_trips_through_toml() {
    let mut config = SessionConfig::for_endpoint("ws://localhost:8080/ws-stomp");
    config.session.topics = vec!["/topic/chat/1".to_string()];
    config.reconnect.max_attempts = Some(4);

    let serialized = toml::to_string_pretty(&config).unwrap();
    let parsed = SessionConfig::from_toml(&serialized).unwrap();

    assert_eq!(parsed, config);
}
