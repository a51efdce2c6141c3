//! # exthost
//!
//! Manifest-driven extension host: load extensions declared in a manifest,
//! let each one register an initializer, and bring them up in order.
//!
//! A host application supplies a [`plugin::ResourceLoader`] for its platform
//! (or uses the in-process [`plugin::StaticLoader`]) and hands the manifest to
//! a [`plugin::HostRuntime`]. Extensions get a [`plugin::HostApi`] for loading
//! further resources, talking on the event bus, and reading their settings.
//!
//! ## Features
//!
//! - **Load-once resources**: every script or stylesheet is fetched at most once
//! - **Failure isolation**: one broken extension never blocks the rest
//! - **Deterministic start-up**: manifest order, dependencies first
//! - **Event bus**: string-named events with isolated handlers
//!
//! ## Quick Start
//!
//! ```bash
//! # Validate a manifest
//! exthost check plugins/manifest.toml
//!
//! # Show what would be enabled
//! exthost list plugins/manifest.toml
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::future_not_send)]

pub mod core;
pub mod plugin;

// Re-export commonly used types
pub use core::Config;
pub use plugin::{
    EventBus, ExtensionError, ExtensionResult, HostApi, HostRuntime, LifecycleState,
    ManifestLoader, PluginDescriptor, PluginRegistry, ResourceCache, ResourceLoader,
    StartupReport, StaticLoader,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "exthost";
