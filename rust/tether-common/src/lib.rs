#![warn(missing_docs)]

//! Light weight helpers shared by the tether crates.
//!
//! - [Deferred]: a value produced later by some provisioning step, consumed
//!   through continuations.
//! - [OnceMap]: a create-once cache, used to make sure shared objects (such
//!   as a scope's federation trust) are declared exactly once per run.

mod deferred;
pub use deferred::*;

mod once;
pub use once::*;
