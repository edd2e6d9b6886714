//! Uplink host bridge.
//!
//! Re-exports the workspace crates under one name. Host applications can
//! depend on `uplink-bridge` alone:
//!
//! - [`bridge`]: the [`Bridge`] context and every domain operation
//! - [`runtime`]: configuration and logging setup
//! - [`abi`]: the `libuplink` ABI contract
//! - [`native`]: locating and opening the shared library
//! - `sim` (feature `sim`): the in-memory library used by tests

pub use bridge_native as native;
pub use bridge_traits as abi;
pub use core_bridge as bridge;
pub use core_runtime as runtime;

#[cfg(feature = "sim")]
pub use bridge_sim as sim;

pub use core_bridge::{Bridge, BridgeError, Handle, HandleKind, PendingFuture, TypedException};
pub use core_runtime::{init_logging, BridgeConfig, BridgeConfigBuilder};
