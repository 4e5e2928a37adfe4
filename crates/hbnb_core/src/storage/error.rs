//! Storage error taxonomy shared by every backend.

use crate::config::ConfigError;
use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StorageResult<T> = Result<T, StorageError>;

/// Backend-specific failure carried inside a `StorageError`.
#[derive(Debug)]
pub enum BackendError {
    Db(DbError),
    Io(std::io::Error),
    Json(serde_json::Error),
    /// A pending change references an entity that does not exist.
    Constraint(String),
}

impl BackendError {
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::Db(err) => err.is_constraint_violation(),
            Self::Constraint(_) => true,
            Self::Io(_) | Self::Json(_) => false,
        }
    }
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "{err}"),
            Self::Constraint(message) => write!(f, "constraint violation: {message}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Constraint(_) => None,
        }
    }
}

impl From<DbError> for BackendError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<std::io::Error> for BackendError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Error returned by every `Storage` operation.
#[derive(Debug)]
pub enum StorageError {
    /// Missing or malformed configuration; fatal at construction.
    Config(ConfigError),
    /// The backing resource is unreachable, refuses the principal, or has an
    /// unusable schema; fatal at construction or reload.
    Connection {
        target: String,
        source: BackendError,
    },
    /// `save()` failed; nothing was persisted and the changes stay pending.
    Commit(BackendError),
    /// A read or a pending write failed.
    Query(BackendError),
    /// Persisted data could not be decoded into entities.
    InvalidData(String),
}

impl StorageError {
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::Commit(err) | Self::Query(err) => err.is_constraint_violation(),
            Self::Connection { source, .. } => source.is_constraint_violation(),
            Self::Config(_) | Self::InvalidData(_) => false,
        }
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Connection { target, source } => {
                write!(f, "cannot connect to `{target}`: {source}")
            }
            Self::Commit(err) => write!(f, "commit failed: {err}"),
            Self::Query(err) => write!(f, "query failed: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Connection { source, .. } => Some(source),
            Self::Commit(err) | Self::Query(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ConfigError> for StorageError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}
