//! Workspace umbrella crate.
//!
//! Re-exports the individual workspace crates so host applications can depend
//! on `media-persistence` alone instead of wiring each crate separately.

pub use bridge_traits;
pub use core_persistence;
pub use core_runtime;
