//! Extension host for exthost.
//!
//! This module loads extensions declared in a manifest, lets each one
//! register an initializer, and brings them up in a deterministic order.
//!
//! # Architecture
//!
//! - [`ManifestLoader`] turns a manifest into ordered, validated
//!   [`PluginDescriptor`]s.
//! - [`ResourceCache`] loads every script or stylesheet locator at most once
//!   through a platform [`ResourceLoader`].
//! - [`PluginRegistry`] records registrations. Entry resources reach it only
//!   through the [`Registrar`] they receive while being evaluated.
//! - [`EventBus`] carries string-named events between extensions.
//! - [`HostRuntime`] drives start-up and hands each initializer a
//!   [`HostApi`].
//!
//! One extension failing (bad entry, missing registration, failing
//! initializer) never prevents the others from becoming ready.
//!
//! # Example Manifest
//!
//! ```toml
//! [[plugins]]
//! id = "techne-backdrop"
//! entry = "plugins/techne-backdrop/plugin.js"
//! enabledByDefault = true
//!
//! [[plugins]]
//! id = "techne-presentations"
//! entry = "plugins/techne-presentations/plugin.js"
//! enabledByDefault = true
//! dependencies = ["techne-backdrop"]
//! ```

mod builtin;
mod error;
mod events;
mod host;
mod manifest;
mod order;
mod registry;
mod resource;
mod runtime;
mod settings;
mod types;

pub use builtin::{EntryPoint, StaticLoader};
pub use error::{ErrorKind, ExtensionError, ExtensionResult, ResourceLoadError};
pub use events::{EventBus, Handler, Subscription};
pub use host::{Capabilities, HostApi, LogLevel};
pub use manifest::{LoadedManifest, ManifestFormat, ManifestLoader, RawDescriptor};
pub use order::DependencyGraph;
pub use registry::{
    DuplicatePolicy, InitFn, InitFuture, PluginRegistry, Registrar, RegistrationSnapshot,
};
pub use resource::{ResourceCache, ResourceLoader, StyleAttributes};
pub use runtime::{resolve_enabled, ExtensionStatus, HostRuntime, StartupReport};
pub use settings::{EnablementOverrides, PluginSettings};
pub use types::{
    ready_event, LifecycleState, PluginDescriptor, RegistrationState, ResourceKind, ResourceState,
    EVENT_PLUGIN_ENABLED, EVENT_SETTINGS_CHANGED,
};
