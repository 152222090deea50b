//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why a settings file, override, or merged value was rejected.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings file {} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The merged document no longer matches the settings schema, e.g. a
    /// string where a port number belongs.
    #[error("settings do not match the schema: {0}")]
    Schema(#[from] serde_json::Error),
    /// A well-formed value the service cannot run with.
    #[error("{key} {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("unknown weather source \"{0}\" (expected \"simulated\" or \"http\")")]
    UnknownSourceKind(String),
}

impl SettingsError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }

    /// Settings key at fault, where one can be named.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            Self::Invalid { key, .. } => Some(key),
            Self::UnknownSourceKind(_) => Some("source.kind"),
            _ => None,
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
