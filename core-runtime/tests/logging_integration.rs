//! Integration tests for logging system

use bridge_traits::log::LogLevel;
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};

#[test]
fn test_logging_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_pii_redaction(false)
        .with_filter("core_auth=debug,core_service=trace")
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_pii);
    assert_eq!(
        config.filter,
        Some("core_auth=debug,core_service=trace".to_string())
    );
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}

#[test]
fn test_default_format() {
    #[cfg(debug_assertions)]
    assert_eq!(LogFormat::default(), LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LogFormat::default(), LogFormat::Json);
}

#[test]
fn test_pii_redaction_tokens() {
    assert_eq!(redact_if_sensitive("access_token", "eyJhbGci"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("refresh_token", "rt"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("Authorization", "Bearer x"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("password", "hunter2"), "[REDACTED]");
}

#[test]
fn test_pii_redaction_emails() {
    let redacted = redact_if_sensitive("username", "user@example.com");

    assert!(redacted.starts_with('u'));
    assert!(redacted.contains("[REDACTED]"));
    assert!(!redacted.contains("example.com"));
}

#[test]
fn test_pii_redaction_keeps_whole_first_character() {
    assert_eq!(
        redact_if_sensitive("username", "élodie@example.com"),
        "é***@[REDACTED]"
    );
    assert_eq!(
        redact_if_sensitive("identity", "用户@example.cn"),
        "用***@[REDACTED]"
    );
    assert_eq!(
        redact_if_sensitive("username", "@example.com"),
        "***@[REDACTED]"
    );
}

#[test]
fn test_pii_redaction_normal_values() {
    assert_eq!(redact_if_sensitive("app_id", "app-123"), "app-123");
    assert_eq!(redact_if_sensitive("identity", "64b7f0c2"), "64b7f0c2");
}

#[test]
fn test_init_logging_only_once() {
    let config = LoggingConfig::default().with_format(LogFormat::Compact);
    assert!(init_logging(config.clone()).is_ok());
    assert!(init_logging(config).is_err());
}
