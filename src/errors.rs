//! Typed error definitions for atlas_fs.
//! Three well-known failure modes: a required entry is missing, the OS
//! refused an operation, or the caller asked for something the current
//! state cannot do.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("{context}: {}", path.display())]
    NotFound { path: PathBuf, context: String },

    #[error("{message}")]
    Io {
        op: String,
        path: PathBuf,
        message: String,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Logic(String),
}

/// Flat view of the taxonomy for callers that only need to branch on the class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Io,
    Logic,
}

impl AtlasError {
    pub fn not_found(path: impl Into<PathBuf>, context: impl Into<String>) -> Self {
        AtlasError::NotFound {
            path: path.into(),
            context: context.into(),
        }
    }

    pub fn logic(msg: impl Into<String>) -> Self {
        AtlasError::Logic(msg.into())
    }

    /// Io error that did not originate from a failed syscall (e.g. destination already exists).
    pub fn io_state(op: &str, path: &Path, kind: io::ErrorKind, detail: &str) -> Self {
        let source = io::Error::new(kind, detail.to_string());
        AtlasError::Io {
            op: op.to_string(),
            path: path.to_path_buf(),
            message: format!("{} '{}': {}", op, path.display(), detail),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AtlasError::NotFound { .. } => ErrorKind::NotFound,
            AtlasError::Io { .. } => ErrorKind::Io,
            AtlasError::Logic(_) => ErrorKind::Logic,
        }
    }

    /// Underlying io::ErrorKind for Io errors.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            AtlasError::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AtlasError>;
