//! Integration tests for the logging configuration surface

use bridge_traits::LogLevel;
use core_runtime::config::{BridgeConfigBuilder, ENV_LOG_FILE, ENV_LOG_LEVEL};
use core_runtime::logging::{effective_filter, redact_if_sensitive, LogFormat, LoggingConfig};

#[test]
fn test_logging_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_secret_redaction(false)
        .with_spans(true)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_secrets);
    assert!(config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);

    assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert!("xml".parse::<LogFormat>().is_err());
}

#[test]
fn test_default_filter_holds_dependencies_at_warn() {
    let filter = effective_filter(&LoggingConfig::default().with_level(LogLevel::Trace)).unwrap();

    assert!(filter.contains("core_bridge=trace"));
    assert!(filter.contains("bridge_sim=trace"));
    assert!(filter.contains("warn"));
}

#[test]
fn test_credentials_never_pass_redaction() {
    for field in ["api_key", "passphrase", "access_grant", "serialized"] {
        assert_eq!(redact_if_sensitive(field, "value"), "[REDACTED]");
    }
    assert_eq!(redact_if_sensitive("key", "photos/2024/a.jpg"), "photos/2024/a.jpg");
}

#[test]
fn test_log_file_from_environment() {
    let config = BridgeConfigBuilder::from_lookup(|name| match name {
        ENV_LOG_LEVEL => Some("error".to_string()),
        ENV_LOG_FILE => Some("/var/log/uplink.log".to_string()),
        _ => None,
    })
    .unwrap()
    .build()
    .unwrap();

    assert_eq!(config.logging.level, LogLevel::Error);
    assert_eq!(
        config.logging.log_file.as_deref(),
        Some(std::path::Path::new("/var/log/uplink.log"))
    );
}
