//! # Simulated libuplink
//!
//! [`SimUplink`] implements [`ForeignLibrary`](bridge_traits::ForeignLibrary)
//! entirely in memory. It behaves like the real library at the C boundary:
//! every result carries heap-allocated records the caller has to free through
//! the matching `free_*` function, errors carry the same numeric codes, and
//! iterators are lazy cursors.
//!
//! Everything it allocates is recorded in a [`Ledger`], which makes it the
//! harness for checking that the bridge frees each foreign resource exactly
//! once.
//!
//! ```
//! use bridge_sim::SimUplink;
//!
//! let sim = SimUplink::new();
//! sim.seed_object("media", "photos/cat.jpg", b"meow", &[]);
//! assert!(sim.ledger().is_balanced());
//! ```

mod gate;
mod ledger;
mod sim;
mod store;

pub use gate::Gate;
pub use ledger::{AllocKind, Ledger};
pub use sim::SimUplink;
pub use store::{ProjectSettings, SimFailure};
