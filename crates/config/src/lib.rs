//! Configuration for the subburn encode queue
//!
//! Handles loading configuration from TOML files and environment variable overrides,
//! and defines the encoding settings shared with the queue engine.

pub mod config;

pub use config::*;
