//! # Bridge logging
//!
//! Structured logging for the bridge built on `tracing`, supporting:
//! - pretty, JSON and compact output, to stdout or an append-only file
//! - per-crate filtering with a single global level, or `none` to disable
//! - redaction of access grants, API keys and passphrases
//! - mirroring of events into a host [`LoggerSink`]
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::{ConsoleLogger, LogLevel};
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use std::sync::Arc;
//!
//! let config = LoggingConfig::default()
//!     .with_format(LogFormat::Compact)
//!     .with_level(LogLevel::Debug)
//!     .with_logger_sink(Arc::new(ConsoleLogger::default()));
//!
//! init_logging(config)?;
//! tracing::info!("bridge ready");
//! ```
//!
//! ## LoggerSink integration
//!
//! The sink receives a [`LogEntry`] per event with the original message, the
//! event's fields and the name of the innermost span (`task` for work
//! submitted through the bridge).

use crate::error::{Error, Result};

use bridge_traits::{LogEntry, LogLevel, LoggerSink};
use core_async::runtime;

use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{format::FmtSpan, writer::BoxMakeWriter},
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

/// Crates whose events follow the configured level; everything else is held at `warn`.
const BRIDGE_TARGETS: &[&str] = &[
    "uplink_bridge",
    "core_bridge",
    "core_runtime",
    "core_async",
    "bridge_native",
    "bridge_sim",
];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line format
    Pretty,
    /// One JSON object per line
    Json,
    /// Single-line format
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Json;
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(Error::Config(format!("Unknown log format '{}'", other))),
        }
    }
}

/// Logging configuration
#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Minimum level for the bridge crates
    pub level: LogLevel,
    /// `false` is the `none` level: nothing is installed and nothing is emitted
    pub enabled: bool,
    /// Redact grants, keys and passphrases in forwarded entries
    pub redact_secrets: bool,
    /// Custom filter string replacing the per-crate default (e.g. `"core_bridge=trace"`)
    pub filter: Option<String>,
    /// Append to this file instead of writing to stdout
    pub log_file: Option<PathBuf>,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    /// Emit span enter/exit events (pretty format only)
    pub enable_spans: bool,
    pub display_target: bool,
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            enabled: true,
            redact_secrets: true,
            filter: None,
            log_file: None,
            logger_sink: None,
            enable_spans: false,
            display_target: true,
            display_thread_info: true,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("enabled", &self.enabled)
            .field("redact_secrets", &self.redact_secrets)
            .field("filter", &self.filter)
            .field("log_file", &self.log_file)
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .finish()
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set minimum log level. Re-enables logging if it was disabled.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self.enabled = true;
        self
    }

    /// The `none` level.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Parses `error|warn|info|debug|trace|none`.
    pub fn with_level_name(self, name: &str) -> Result<Self> {
        if name.trim().eq_ignore_ascii_case("none") {
            return Ok(self.disabled());
        }
        let level = name
            .parse::<LogLevel>()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(self.with_level(level))
    }

    pub fn with_secret_redaction(mut self, redact: bool) -> Self {
        self.redact_secrets = redact;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    pub fn with_thread_info(mut self, display: bool) -> Self {
        self.display_thread_info = display;
        self
    }
}

/// Install the global subscriber.
///
/// Call once at startup. A second call fails with [`Error::Config`]. With the
/// `none` level this is a no-op.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = build_filter(&config)?;
    let writer = build_writer(&config)?;
    let fmt_layer = build_fmt_layer(&config, writer);
    let sink_layer = LoggerSinkLayer::new(config.logger_sink.clone(), config.redact_secrets);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(sink_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let filter_string = match &config.filter {
        Some(custom) => custom.clone(),
        None => {
            let mut directives = vec!["warn".to_string()];
            directives.extend(
                BRIDGE_TARGETS
                    .iter()
                    .map(|target| format!("{}={}", target, config.level)),
            );
            directives.join(",")
        }
    };

    EnvFilter::try_new(filter_string)
        .map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))
}

fn build_writer(config: &LoggingConfig) -> Result<BoxMakeWriter> {
    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    Error::Config(format!("Cannot open log file {}: {}", path.display(), e))
                })?;
            Ok(BoxMakeWriter::new(std::sync::Mutex::new(file)))
        }
        None => Ok(BoxMakeWriter::new(io::stdout)),
    }
}

fn build_fmt_layer<S>(
    config: &LoggingConfig,
    writer: BoxMakeWriter,
) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let ansi = config.log_file.is_none();
    let base = tracing_subscriber::fmt::layer()
        .with_target(config.display_target)
        .with_thread_ids(config.display_thread_info)
        .with_thread_names(config.display_thread_info)
        .with_ansi(ansi)
        .with_writer(writer);

    match config.format {
        LogFormat::Pretty => base
            .pretty()
            .with_span_events(if config.enable_spans {
                FmtSpan::ACTIVE
            } else {
                FmtSpan::NONE
            })
            .boxed(),
        LogFormat::Json => base
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => base.compact().boxed(),
    }
}

/// Layer that forwards events to a `LoggerSink` implementation.
struct LoggerSinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
    redact: bool,
}

impl LoggerSinkLayer {
    fn new(sink: Option<Arc<dyn LoggerSink>>, redact: bool) -> Self {
        Self { sink, redact }
    }
}

impl<S> Layer<S> for LoggerSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };

        let metadata = event.metadata();
        let level = tracing_level_to_log_level(*metadata.level());
        if level < sink.min_level() {
            return;
        }

        let mut visitor = SinkVisitor::default();
        event.record(&mut visitor);
        let SinkVisitor { message, fields } = visitor;

        let fields = fields.into_iter().map(|(key, value)| {
            let value = if self.redact {
                redact_if_sensitive(&key, &value)
            } else {
                value
            };
            (key, value)
        });
        let entry = LogEntry {
            fields: fields.collect(),
            span: ctx.lookup_current().map(|span| span.name().to_string()),
            ..LogEntry::new(
                level,
                metadata.target(),
                message.unwrap_or_else(|| metadata.name().to_string()),
            )
        };

        forward(Arc::clone(sink), entry);
    }
}

/// Hands the entry to the sink without blocking the emitting thread when a
/// runtime is available. Worker threads have none and deliver inline.
fn forward(sink: Arc<dyn LoggerSink>, entry: LogEntry) {
    let delivery = async move {
        if let Err(err) = sink.log(entry).await {
            eprintln!("uplink-bridge: log sink rejected entry: {}", err);
        }
    };
    match runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(delivery);
        }
        Err(_) => {
            if let Err(err) = runtime::block_on(delivery) {
                eprintln!("uplink-bridge: log sink unavailable: {}", err);
            }
        }
    }
}

#[derive(Default)]
struct SinkVisitor {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl SinkVisitor {
    fn record_value(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for SinkVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record_value(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field, format!("{:?}", value));
    }
}

fn tracing_level_to_log_level(level: tracing::Level) -> LogLevel {
    match level {
        tracing::Level::TRACE => LogLevel::Trace,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::ERROR => LogLevel::Error,
    }
}

/// Mask a field value that may carry credentials.
///
/// Field names are matched case-insensitively against known credential
/// names. Values that look like a serialized access grant (long base58 text)
/// are masked whatever the field is called.
///
/// ```ignore
/// use core_runtime::logging::redact_if_sensitive;
///
/// tracing::debug!(grant = %redact_if_sensitive("grant", &serialized), "parsing access");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    const SENSITIVE_FIELDS: &[&str] = &[
        "grant",
        "access_grant",
        "serialized",
        "api_key",
        "apikey",
        "passphrase",
        "password",
        "secret",
        "token",
        "authorization",
    ];

    let field_lower = field_name.to_lowercase();
    if SENSITIVE_FIELDS.iter().any(|f| field_lower.contains(f)) || looks_like_grant(value) {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}

fn looks_like_grant(value: &str) -> bool {
    const BASE58: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    value.len() >= 64 && value.chars().all(|c| BASE58.contains(c))
}

/// Build the filter string `init_logging` would install, for diagnostics.
pub fn effective_filter(config: &LoggingConfig) -> Result<String> {
    build_filter(config).map(|filter| filter.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as SinkResult;
    use std::sync::Mutex;

    #[test]
    fn test_logging_config_builder() {
        let config = LoggingConfig::default()
            .with_format(LogFormat::Json)
            .with_level(LogLevel::Debug)
            .with_secret_redaction(true)
            .with_filter("core_bridge=trace")
            .with_log_file("/tmp/uplink.log")
            .with_thread_info(false);

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Debug);
        assert!(config.enabled);
        assert!(config.redact_secrets);
        assert_eq!(config.filter.as_deref(), Some("core_bridge=trace"));
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/uplink.log")));
        assert!(!config.display_thread_info);
    }

    #[test]
    fn test_level_names() {
        let config = LoggingConfig::default().with_level_name("none").unwrap();
        assert!(!config.enabled);

        let config = config.with_level_name("trace").unwrap();
        assert!(config.enabled);
        assert_eq!(config.level, LogLevel::Trace);

        assert!(LoggingConfig::default().with_level_name("loud").is_err());
    }

    #[test]
    fn test_disabled_logging_installs_nothing() {
        assert!(init_logging(LoggingConfig::default().disabled()).is_ok());
    }

    #[test]
    fn test_redact_if_sensitive() {
        assert_eq!(redact_if_sensitive("api_key", "13Yq...abc"), "[REDACTED]");
        assert_eq!(redact_if_sensitive("Passphrase", "hunter2"), "[REDACTED]");
        assert_eq!(redact_if_sensitive("access_grant", "x"), "[REDACTED]");

        let grant = "1".repeat(10) + &"Zk8q".repeat(20);
        assert_eq!(redact_if_sensitive("value", &grant), "[REDACTED]");

        assert_eq!(redact_if_sensitive("bucket", "photos"), "photos");
        assert_eq!(redact_if_sensitive("task_id", "12"), "12");
    }

    #[test]
    fn test_build_filter() {
        let config = LoggingConfig::default().with_level(LogLevel::Debug);
        let filter = effective_filter(&config).unwrap();
        assert!(filter.contains("core_bridge=debug"));
        assert!(filter.contains("bridge_native=debug"));
    }

    #[test]
    fn test_build_custom_filter() {
        let config = LoggingConfig::default().with_filter("core_bridge=trace,bridge_sim=debug");
        let filter = effective_filter(&config).unwrap();
        assert!(filter.contains("core_bridge=trace"));
        assert!(!filter.contains("core_runtime"));
    }

    #[test]
    fn test_logger_sink_layer_forwards_and_redacts() {
        let sink = Arc::new(TestLoggerSink::default());
        let trait_sink: Arc<dyn LoggerSink> = sink.clone();
        let layer = LoggerSinkLayer::new(Some(trait_sink), true);
        let subscriber = tracing_subscriber::registry().with(layer);
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::info!(target: "core_bridge", bucket = "photos", passphrase = "hunter2", "opening");

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.target, "core_bridge");
        assert_eq!(entry.message, "opening");
        assert_eq!(entry.field("bucket"), Some("photos"));
        assert_eq!(entry.field("passphrase"), Some("[REDACTED]"));
    }

    #[derive(Default)]
    struct TestLoggerSink {
        entries: Mutex<Vec<LogEntry>>,
    }

    #[async_trait]
    impl LoggerSink for TestLoggerSink {
        async fn log(&self, entry: LogEntry) -> SinkResult<()> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }

        fn min_level(&self) -> LogLevel {
            LogLevel::Trace
        }
    }
}
