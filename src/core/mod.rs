//! Core types shared by the library and the CLI.
//!
//! Currently this is the configuration layer: where the host finds its
//! settings and how they feed the extension runtime.

mod config;

pub use config::{Config, HostConfig, PluginsConfig, LOCAL_CONFIG_FILE};
