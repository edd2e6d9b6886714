//! # Core Runtime Module
//!
//! Ambient runtime infrastructure for the uplink bridge:
//! - Configuration management (`BridgeConfig`, builder and environment)
//! - Logging and tracing infrastructure
//!
//! ## Overview
//!
//! Nothing in this crate talks to the foreign library. It establishes the
//! configuration surface and the logging conventions that `core-bridge` and
//! `bridge-native` rely on.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{BridgeConfig, BridgeConfigBuilder};
pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat, LoggingConfig};
