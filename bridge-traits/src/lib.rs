//! # Uplink Bridge Traits
//!
//! Contracts shared by every layer of the uplink bridge.
//!
//! ## Overview
//!
//! The bridge sits between a host runtime and `libuplink`, a foreign storage
//! network client. This crate pins down the two boundaries the rest of the
//! workspace is written against:
//!
//! - [`ffi`] - the fixed-layout records and numeric error codes of the C ABI
//! - [`ForeignLibrary`](library::ForeignLibrary) - the foreign library as a
//!   black box, one `unsafe` method per exported entry point
//! - [`LoggerSink`](log::LoggerSink) - forwarding of structured logs into the
//!   host's own logging pipeline
//!
//! ## Implementations
//!
//! | Implementation | Crate | Use |
//! |----------------|-------|-----|
//! | `DynamicUplink` | `bridge-native` | Production, symbols resolved from `libuplink` |
//! | `SimUplink` | `bridge-sim` | Tests, in-memory with resource accounting |
//!
//! ## Ownership
//!
//! Every pointer a [`ForeignLibrary`](library::ForeignLibrary) method returns
//! belongs to the foreign allocator. Callers must hand it back to the matching
//! `free_*` method exactly once and must never free it with the Rust allocator.
//!
//! ## Thread Safety
//!
//! `ForeignLibrary` requires `Send + Sync`: blocking calls are issued from a
//! worker pool while frees may happen on the host thread.

pub mod error;
pub mod ffi;
pub mod library;
pub mod log;

pub use error::SinkError;
pub use library::ForeignLibrary;
pub use log::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
