//! # Bridge Configuration
//!
//! [`BridgeConfig`] holds every setting the bridge reads at start-up: the
//! worker pool size, where to find `libuplink`, the values passed through to
//! `uplink_config_open_project`, and logging.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::BridgeConfig;
//! use std::time::Duration;
//!
//! let config = BridgeConfig::builder()
//!     .worker_threads(8)
//!     .user_agent("backup-tool/1.2")
//!     .dial_timeout(Duration::from_secs(10))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.worker_threads, 8);
//! ```
//!
//! ## Environment
//!
//! [`BridgeConfigBuilder::from_env`] starts from the process environment:
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `UPLINK_LIBRARY_PATH` | explicit library path, tried before the bundled locations |
//! | `UPLINK_WORKER_THREADS` | worker pool size |
//! | `UPLINK_LOG_LEVEL` | `error`, `warn`, `info`, `debug`, `trace` or `none` |
//! | `UPLINK_LOG_FORMAT` | `pretty`, `json` or `compact` |
//! | `UPLINK_LOG_FILE` | append logs to this file instead of stdout |
//!
//! ## Error Handling
//!
//! `build()` validates eagerly and reports the first problem found:
//!
//! ```should_panic
//! use core_runtime::config::BridgeConfig;
//!
//! BridgeConfig::builder()
//!     .worker_threads(0)
//!     .build()
//!     .expect("a pool needs at least one thread");
//! ```

use crate::error::{Error, Result};
use crate::logging::{LogFormat, LoggingConfig};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_LIBRARY_PATH: &str = "UPLINK_LIBRARY_PATH";
pub const ENV_WORKER_THREADS: &str = "UPLINK_WORKER_THREADS";
pub const ENV_LOG_LEVEL: &str = "UPLINK_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "UPLINK_LOG_FORMAT";
pub const ENV_LOG_FILE: &str = "UPLINK_LOG_FILE";

pub const DEFAULT_WORKER_THREADS: usize = 4;
pub const MAX_WORKER_THREADS: usize = 256;

/// Settings for one bridge instance. Build with [`BridgeConfig::builder`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Size of the blocking worker pool
    pub worker_threads: usize,

    /// Explicit `libuplink` location, tried before every bundled path
    pub library_path: Option<PathBuf>,

    /// Default user agent for `config_open_project`
    pub user_agent: Option<String>,

    /// Default dial timeout for `config_open_project`; passed through untouched
    pub dial_timeout: Option<Duration>,

    /// Default temp directory for `config_open_project`
    pub temp_directory: Option<PathBuf>,

    pub logging: LoggingConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            library_path: None,
            user_agent: None,
            dial_timeout: None,
            temp_directory: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Checks:
    /// - the worker pool size is within `1..=256`
    /// - the dial timeout fits the foreign `int` millisecond field
    /// - path and string settings are not empty
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::Config(
                "Worker pool needs at least one thread".to_string(),
            ));
        }

        if self.worker_threads > MAX_WORKER_THREADS {
            return Err(Error::Config(format!(
                "Worker pool size {} exceeds maximum of {}",
                self.worker_threads, MAX_WORKER_THREADS
            )));
        }

        if let Some(timeout) = self.dial_timeout {
            if timeout.as_millis() > i32::MAX as u128 {
                return Err(Error::Config(format!(
                    "Dial timeout of {} ms does not fit in a 32-bit millisecond count",
                    timeout.as_millis()
                )));
            }
        }

        if let Some(path) = &self.library_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Library path cannot be empty".to_string()));
            }
        }

        if let Some(dir) = &self.temp_directory {
            if dir.as_os_str().is_empty() {
                return Err(Error::Config("Temp directory cannot be empty".to_string()));
            }
        }

        if matches!(&self.user_agent, Some(agent) if agent.trim().is_empty()) {
            return Err(Error::Config("User agent cannot be blank".to_string()));
        }

        Ok(())
    }

    /// Dial timeout as the foreign millisecond count; zero means "library default".
    pub fn dial_timeout_millis(&self) -> i32 {
        self.dial_timeout
            .map(|t| i32::try_from(t.as_millis()).unwrap_or(i32::MAX))
            .unwrap_or(0)
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug, Clone, Default)]
pub struct BridgeConfigBuilder {
    worker_threads: Option<usize>,
    library_path: Option<PathBuf>,
    user_agent: Option<String>,
    dial_timeout: Option<Duration>,
    temp_directory: Option<PathBuf>,
    logging: Option<LoggingConfig>,
}

impl BridgeConfigBuilder {
    /// Starts from the `UPLINK_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default();

        if let Some(path) = lookup(ENV_LIBRARY_PATH).filter(|p| !p.is_empty()) {
            builder = builder.library_path(path);
        }

        if let Some(raw) = lookup(ENV_WORKER_THREADS) {
            let threads = raw.trim().parse::<usize>().map_err(|e| Error::Environment {
                variable: ENV_WORKER_THREADS.to_string(),
                message: e.to_string(),
            })?;
            builder = builder.worker_threads(threads);
        }

        let mut logging = LoggingConfig::default();
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            logging = logging
                .with_level_name(&level)
                .map_err(|e| Error::Environment {
                    variable: ENV_LOG_LEVEL.to_string(),
                    message: e.to_string(),
                })?;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            let format = format.parse::<LogFormat>().map_err(|e| Error::Environment {
                variable: ENV_LOG_FORMAT.to_string(),
                message: e.to_string(),
            })?;
            logging = logging.with_format(format);
        }
        if let Some(file) = lookup(ENV_LOG_FILE).filter(|f| !f.is_empty()) {
            logging = logging.with_log_file(file);
        }

        Ok(builder.logging(logging))
    }

    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    pub fn library_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.library_path = Some(path.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = Some(timeout);
        self
    }

    pub fn temp_directory<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.temp_directory = Some(dir.into());
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn build(self) -> Result<BridgeConfig> {
        let config = BridgeConfig {
            worker_threads: self.worker_threads.unwrap_or(DEFAULT_WORKER_THREADS),
            library_path: self.library_path,
            user_agent: self.user_agent,
            dial_timeout: self.dial_timeout,
            temp_directory: self.temp_directory,
            logging: self.logging.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::LogLevel;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::builder().build().unwrap();
        assert_eq!(config.worker_threads, DEFAULT_WORKER_THREADS);
        assert!(config.library_path.is_none());
        assert_eq!(config.dial_timeout_millis(), 0);
    }

    #[test]
    fn test_validate_rejects_zero_threads() {
        let result = BridgeConfig::builder().worker_threads(0).build();
        assert!(result.unwrap_err().to_string().contains("at least one thread"));
    }

    #[test]
    fn test_validate_rejects_excessive_threads() {
        let result = BridgeConfig::builder().worker_threads(1000).build();
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_validate_rejects_oversized_dial_timeout() {
        let result = BridgeConfig::builder()
            .dial_timeout(Duration::from_secs(u64::from(u32::MAX)))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_dial_timeout_passes_through() {
        let config = BridgeConfig::builder()
            .dial_timeout(Duration::from_millis(2500))
            .build()
            .unwrap();
        assert_eq!(config.dial_timeout_millis(), 2500);
    }

    #[test]
    fn test_validate_rejects_blank_user_agent() {
        assert!(BridgeConfig::builder().user_agent("  ").build().is_err());
    }

    #[test]
    fn test_from_env() {
        let builder = BridgeConfigBuilder::from_lookup(env(&[
            (ENV_LIBRARY_PATH, "/opt/uplink/libuplink.so"),
            (ENV_WORKER_THREADS, "2"),
            (ENV_LOG_LEVEL, "debug"),
            (ENV_LOG_FORMAT, "compact"),
        ]))
        .unwrap();
        let config = builder.build().unwrap();

        assert_eq!(
            config.library_path,
            Some(PathBuf::from("/opt/uplink/libuplink.so"))
        );
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_from_env_none_level_disables_logging() {
        let config = BridgeConfigBuilder::from_lookup(env(&[(ENV_LOG_LEVEL, "none")]))
            .unwrap()
            .build()
            .unwrap();
        assert!(!config.logging.enabled);
    }

    #[test]
    fn test_from_env_reports_bad_variable() {
        let err = BridgeConfigBuilder::from_lookup(env(&[(ENV_WORKER_THREADS, "many")]))
            .unwrap_err();
        assert!(matches!(err, Error::Environment { ref variable, .. } if variable == ENV_WORKER_THREADS));
    }

    #[test]
    fn test_explicit_settings_override_env() {
        let config = BridgeConfigBuilder::from_lookup(env(&[(ENV_WORKER_THREADS, "2")]))
            .unwrap()
            .worker_threads(6)
            .build()
            .unwrap();
        assert_eq!(config.worker_threads, 6);
    }
}
