//! Parsing and validation of `tempo.toml` testbench configuration files.
//!
//! This crate reads the testbench configuration file and produces a
//! strongly-typed [`TestbenchConfig`]: clock and seed settings, the
//! scoreboard policy, per-interface streaming bus options and the named
//! timing patterns used for idle insertion and backpressure.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
