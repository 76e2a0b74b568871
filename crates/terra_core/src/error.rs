use serde::Serialize;
use std::io;
use thiserror::Error;

/// Failure while building a manifest.
///
/// Paths are relative to the instance root, `.` being the root itself.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Path not found: {path}")]
    NotFound { path: String },

    #[error("Access denied: {path}")]
    AccessDenied {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid entry {path}: {reason}")]
    InvalidEntry { path: String, reason: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Manifest build cancelled")]
    Cancelled,
}

/// Coarse classification of a [`ManifestError`], safe to hand to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    InvalidEntry,
    IoFailure,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AccessDenied => "access_denied",
            Self::InvalidEntry => "invalid_entry",
            Self::IoFailure => "io_failure",
            Self::Cancelled => "cancelled",
        }
    }
}

impl ManifestError {
    /// Classifies an IO error raised while touching `path`.
    pub fn from_io(path: impl Into<String>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::AccessDenied { path, source },
            _ => Self::Io { path, source },
        }
    }

    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEntry {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::InvalidEntry { .. } => ErrorKind::InvalidEntry,
            Self::Io { .. } => ErrorKind::IoFailure,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid instance name: {0}")]
    InvalidName(String),

    #[error("Unknown instance: {0}")]
    UnknownInstance(String),

    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Storage backend error: {0}")]
    Generic(String),
}

#[derive(Error, Debug)]
#[error("Unknown hash algorithm: {0}")]
pub struct UnknownHashAlgorithm(pub String);
