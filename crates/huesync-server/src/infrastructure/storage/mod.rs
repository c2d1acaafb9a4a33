//! Storage infrastructure: the TOML config file and the JSON credential file.

pub mod config;
pub mod credentials;
