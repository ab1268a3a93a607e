//! Error types for persistence gateway operations.

use std::fmt;

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur while talking to the database.
#[derive(Debug)]
pub enum DbError {
    /// Could not open the database / create the connection pool.
    ConnectionFailed(String),

    /// A statement failed. The SQL text is preserved for logging.
    QueryFailed { sql: String, error: String },

    /// Schema creation or upgrade failed.
    SchemaFailed(String),
}

impl DbError {
    /// Wrap an sqlx error, keeping the statement that caused it.
    pub fn query(sql: &str, err: sqlx::Error) -> DbError {
        DbError::QueryFailed {
            sql: sql.to_string(),
            error: err.to_string(),
        }
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to database: {}", msg)
            }
            DbError::QueryFailed { sql, error } => {
                write!(f, "query failed: {} ({})", error, sql.trim())
            }
            DbError::SchemaFailed(msg) => write!(f, "schema initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for DbError {}
