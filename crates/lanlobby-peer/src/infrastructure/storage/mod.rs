//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration from the platform
//! config directory (or an explicit path), supplies defaults on first run,
//! and converts the on-disk schema into the runtime structs the network
//! layer takes.

pub mod config;
