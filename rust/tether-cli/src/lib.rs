#![warn(missing_docs)]

//! # Tether CLI
//!
//! Runs a provisioning pass over a stack configuration and a directory of
//! repository definitions, and prints the resulting report as JSON.
//!
//! ```bash
//! tether --config tether.toml --repositories repositories/
//! ```
//!
//! Logs go to stderr. The filter comes from `RUST_LOG` when it is set and
//! from `--log-level` otherwise. Tokens for the secret stores may be passed
//! through `VAULT_TOKEN` and `DOPPLER_TOKEN`.
//!
//! The run plans against an in-memory engine: every object is declared and
//! checked for consistency, and nothing is created.

mod cli;
pub use cli::*;
