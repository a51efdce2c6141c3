//! Extension host error types.

use std::time::Duration;

use thiserror::Error;

use super::ResourceKind;

/// Result type for extension host operations.
pub type ExtensionResult<T> = Result<T, ExtensionError>;

/// A script or style resource failed to load.
///
/// Cached by the resource cache and handed to every requester of the same
/// locator, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to load {kind} '{locator}': {cause}")]
pub struct ResourceLoadError {
    /// Locator that failed.
    pub locator: String,
    /// Whether it was requested as a script or a style.
    pub kind: ResourceKind,
    /// Rendered cause reported by the platform loader.
    pub cause: String,
}

/// Errors that can occur while loading and running extensions.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// A manifest entry is malformed and was dropped.
    #[error("Invalid manifest entry #{index}: {reason}")]
    Config { index: usize, reason: String },

    /// The manifest as a whole could not be parsed.
    #[error("Invalid manifest: {0}")]
    ManifestParse(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A script or style failed to load.
    #[error(transparent)]
    ResourceLoad(#[from] ResourceLoadError),

    /// The entry resource loaded but never registered the extension.
    #[error("Extension '{id}' did not register: {reason}")]
    RegistrationMissing { id: String, reason: String },

    /// `register` was called after the entry resource finished evaluating.
    #[error("Extension '{id}' tried to register outside of its entry evaluation")]
    RegistrationClosed { id: String },

    /// A second registration under the same id was rejected.
    #[error("Extension '{id}' is already registered")]
    DuplicateRegistration { id: String },

    /// The initializer returned an error or panicked.
    #[error("Extension '{id}' failed to initialize: {cause}")]
    Init { id: String, cause: String },

    /// The initializer did not settle in time.
    #[error("Extension '{id}' timed out after {after:?}")]
    Timeout { id: String, after: Duration },

    /// A dependency never reached the ready state.
    #[error("Extension '{id}' depends on '{dependency}' which is not ready")]
    DependencyFailed { id: String, dependency: String },

    /// The id is not declared in the manifest.
    #[error("Extension '{0}' is not declared in the manifest")]
    UnknownPlugin(String),

    /// The extension is declared but not enabled.
    #[error("Extension '{0}' is not enabled")]
    NotEnabled(String),
}

/// Coarse classification used in log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Io,
    ResourceLoad,
    RegistrationMissing,
    DuplicateRegistration,
    Init,
    Timeout,
    Dependency,
    Lookup,
}

impl ErrorKind {
    /// Name used in diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "ConfigError",
            Self::Io => "IoError",
            Self::ResourceLoad => "ResourceLoadError",
            Self::RegistrationMissing => "RegistrationMissingError",
            Self::DuplicateRegistration => "DuplicateRegistrationWarning",
            Self::Init => "InitError",
            Self::Timeout => "TimeoutError",
            Self::Dependency => "DependencyError",
            Self::Lookup => "LookupError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ExtensionError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::ManifestParse(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::ResourceLoad(_) => ErrorKind::ResourceLoad,
            Self::RegistrationMissing { .. } | Self::RegistrationClosed { .. } => {
                ErrorKind::RegistrationMissing
            }
            Self::DuplicateRegistration { .. } => ErrorKind::DuplicateRegistration,
            Self::Init { .. } => ErrorKind::Init,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::DependencyFailed { .. } => ErrorKind::Dependency,
            Self::UnknownPlugin(_) | Self::NotEnabled(_) => ErrorKind::Lookup,
        }
    }

    /// Wrap an initializer failure, keeping the whole cause chain.
    pub(crate) fn init(id: &str, cause: &anyhow::Error) -> Self {
        Self::Init { id: id.to_string(), cause: format!("{cause:#}") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let err = ExtensionError::RegistrationMissing {
            id: "alpha".to_string(),
            reason: "entry loaded without calling register".to_string(),
        };
        assert_eq!(err.kind().as_str(), "RegistrationMissingError");
        assert_eq!(
            ExtensionError::Config { index: 0, reason: "missing id".into() }.kind(),
            ErrorKind::Config
        );
    }

    #[test]
    fn test_resource_error_display() {
        let err = ExtensionError::from(ResourceLoadError {
            locator: "plugins/a.js".to_string(),
            kind: ResourceKind::Script,
            cause: "404".to_string(),
        });
        assert_eq!(err.to_string(), "Failed to load script 'plugins/a.js': 404");
        assert_eq!(err.kind(), ErrorKind::ResourceLoad);
    }

    #[test]
    fn test_init_keeps_cause_chain() {
        let cause = anyhow::anyhow!("socket closed").context("fetching deck");
        let err = ExtensionError::init("slides", &cause);
        assert!(err.to_string().contains("fetching deck: socket closed"));
    }
}
