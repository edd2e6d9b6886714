//! # Core Bridge
//!
//! Exposes `libuplink` to a single-threaded host runtime.
//!
//! ## Overview
//!
//! - [`handle`]: type-tagged handles whose foreign resource is released
//!   exactly once, by explicit close or by drop
//! - [`work`]: two-phase tasks; the foreign call runs on a worker pool and
//!   the result is interpreted on the host loop
//! - [`exception`] / [`registry`]: foreign error codes projected into a
//!   typed exception hierarchy with realm-aware identity checks
//! - [`marshal`]: foreign records copied into owned Rust values
//! - [`Bridge`]: the context tying these together, plus one method per
//!   domain operation
//!
//! ## Usage
//!
//! ```ignore
//! use core_bridge::Bridge;
//! use core_runtime::BridgeConfigBuilder;
//!
//! let config = BridgeConfigBuilder::from_env()?.build()?;
//! let (bridge, mut host) = Bridge::from_config(&config)?;
//! bridge.init_error_classes(None);
//!
//! let access = host.block_on(bridge.parse_access(&grant)?)??;
//! let project = host.block_on(bridge.open_project(&access)?)??;
//! let bucket = host.block_on(bridge.stat_bucket(&project, "photos")?)??;
//! ```

pub mod bridge;
pub mod error;
pub mod exception;
pub mod foreign;
pub mod handle;
pub mod marshal;
pub mod ops;
pub mod registry;
pub mod work;

pub use bridge::Bridge;
pub use error::{BridgeError, Result};
pub use exception::{
    ErrorKind, ExceptionClass, Lineage, Realm, TypedException, GENERIC_CLASS, UMBRELLA_CLASS,
};
pub use handle::{Handle, HandleKind, HandleRegistry};
pub use marshal::{
    Bucket, CustomMetadata, EdgeCredentials, ObjectInfo, PartInfo, SystemMetadata, UploadInfo,
};
pub use ops::{
    DownloadOptions, EdgeConfig, ListObjectsOptions, ListUploadsOptions, Permission, ProjectConfig,
    SharePrefix, ShareUrlOptions, BYTES_READ_PROPERTY,
};
pub use registry::{ErrorClasses, ErrorRegistry};
pub use work::{HostContext, PendingFuture, TaskId, WorkStatsSnapshot};
