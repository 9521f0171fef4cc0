//! Persistent storage: the TOML config file and the config directory.

pub mod config;
