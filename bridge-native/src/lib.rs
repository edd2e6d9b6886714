//! # Native libuplink
//!
//! Finds the `libuplink` shared object, maps it with `libloading` and exposes
//! it through [`ForeignLibrary`](bridge_traits::ForeignLibrary).
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_native::LibraryLoader;
//!
//! let loader = LibraryLoader::new(None);
//! match loader.load() {
//!     Ok(loaded) => println!("using {}", loaded.path.display()),
//!     Err(err) => eprintln!("storage unavailable: {err}"),
//! }
//! ```

mod dynamic;
mod error;
mod loader;

pub use dynamic::DynamicUplink;
pub use error::{Attempt, LoadError, Result};
pub use loader::{
    library_file_name, platform_dir, LibraryLoader, LibraryOpener, LoadedLibrary, SystemOpener,
    ENV_LIBRARY_PATH,
};
