// Local crates
use crate::loader::ModuleLoadError;

// External crates
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while turning configuration into routes.
///
/// Messages are self-contained: the underlying cause is rendered into the
/// message rather than exposed as a separate `source`, so printing the error
/// once shows the full story.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("'{name}' type mismatch, expected {expected}, got '{actual}'.")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error(transparent)]
    ModuleLoad(#[from] ModuleLoadError),

    #[error("'{key}' error: {message}")]
    ContractViolation { key: String, message: String },

    #[error("'{key}' error: '{module}' failed: {cause:#}")]
    Invocation {
        key: String,
        module: String,
        cause: anyhow::Error,
    },

    #[error("Configuration file does not exists: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("Could not prepare configuration: failed to read {}: {cause}", path.display())]
    ConfigRead { path: PathBuf, cause: io::Error },

    #[error("Could not prepare configuration: failed to parse {}: {cause}", path.display())]
    ConfigParse {
        path: PathBuf,
        cause: serde_yaml::Error,
    },

    #[error("Could not prepare configuration: {cause}")]
    Prepare {
        index: usize,
        cause: Box<ResolveError>,
    },
}

impl ResolveError {
    pub(crate) fn type_mismatch(name: impl Into<String>, expected: &'static str, actual: &'static str) -> Self {
        ResolveError::TypeMismatch {
            name: name.into(),
            expected,
            actual,
        }
    }

    pub(crate) fn contract(key: impl Into<String>, message: impl Into<String>) -> Self {
        ResolveError::ContractViolation {
            key: key.into(),
            message: message.into(),
        }
    }

    /// The innermost error, looking through [`ResolveError::Prepare`].
    pub fn root(&self) -> &ResolveError {
        match self {
            ResolveError::Prepare { cause, .. } => cause.root(),
            other => other,
        }
    }
}
