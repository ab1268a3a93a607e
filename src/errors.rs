//! Error types for the monitoring engine.

use std::fmt;

use crate::db::error::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by engine operations.
#[derive(Debug)]
pub enum EngineError {
    /// Caller-visible precondition failure: unknown parameter, missing
    /// required parameter, unknown object id and the like. Never retried.
    InvalidArguments(String),

    /// A monitor definition cannot be removed while monitors reference it.
    DefinitionInUse,

    /// Referenced object does not exist in the registries.
    NotFound(String),

    /// Template expansion failed.
    Template(String),

    /// Database failure; the current transaction has been rolled back.
    Db(DbError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidArguments(msg) => write!(f, "invalid arguments: {}", msg),
            EngineError::DefinitionInUse => {
                write!(f, "can't remove active monitor def that is in use")
            }
            EngineError::NotFound(msg) => write!(f, "not found: {}", msg),
            EngineError::Template(msg) => write!(f, "template error: {}", msg),
            EngineError::Db(err) => write!(f, "database error: {}", err),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        EngineError::Db(err)
    }
}
