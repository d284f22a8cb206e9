//! Error types for the orchestrator
//!
//! Every handler failure ends up as the `message` of its task row, so the
//! `Display` output of these variants is what operators read.

use std::path::PathBuf;

use keel_core::CodecError;
use thiserror::Error;

use crate::repository::StoreError;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for orchestrator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Run data or a request is missing something or is inconsistent
    #[error("validation failed: {0}")]
    Validation(String),

    /// A stored spec could not be decoded (or a spec could not be encoded)
    #[error("serialization error: {0}")]
    Serialization(#[from] CodecError),

    /// A template failed to render
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Creating a directory or writing a file failed
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// SSH or SFTP connection to a node failed
    #[error("failed to reach {host}: {message}")]
    Dial { host: String, message: String },

    /// The installer container failed, timed out, or the runtime CLI failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// Optimistic update rejected because the caller's version is stale
    #[error("{kind} {id} was modified concurrently (expected resource version {expected})")]
    Concurrency {
        kind: &'static str,
        id: i64,
        expected: i64,
    },

    /// Entity does not exist
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Any other persistence failure
    #[error("store error: {0}")]
    Store(StoreError),

    /// A pipeline handler failed; the run stopped there
    #[error("handler {name} failed: {source}")]
    HandlerFailed {
        name: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_concurrency(&self) -> bool {
        matches!(self, Self::Concurrency { .. })
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { kind, id, expected } => Error::Concurrency { kind, id, expected },
            StoreError::NotFound { kind, id } => Error::NotFound { kind, id },
            other => Error::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_conflict_maps_to_concurrency() {
        let err: Error = StoreError::Conflict {
            kind: "task",
            id: 7,
            expected: 3,
        }
        .into();
        assert!(err.is_concurrency());
        assert_eq!(
            err.to_string(),
            "task 7 was modified concurrently (expected resource version 3)"
        );
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err: Error = StoreError::not_found("config", "plan 4").into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "config plan 4 not found");
    }
}
