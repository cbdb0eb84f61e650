//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration file (gateway
//! addresses, passwords, interface and timeouts) from the platform config
//! directory or an explicit path, and falls back to defaults when the file
//! does not exist yet.

pub mod config;
