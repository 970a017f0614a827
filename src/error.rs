//! Error types for the session manager.
//!
//! This module defines all error types using `thiserror`. Scope and registry
//! failures carry the engine or session name involved so callers can decide
//! how to recover (register the engine, pick another name, retry the unit of work).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("No engine configured under name '{name}'")]
    EngineNotConfigured { name: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("An engine is already registered under name '{name}'")]
    DuplicateName { name: String },

    #[error("A session named '{name}' is already active in this unit of work")]
    SessionAlreadyActive { name: String },

    #[error("Metadata '{metadata}' is already bound to another engine than '{engine}'")]
    MetadataAlreadyBound { metadata: String, engine: String },

    #[error("Metadata '{metadata}' is not bound to any engine")]
    UnboundMetadata { metadata: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Transaction error: {message} (transaction: {transaction_id})")]
    Transaction {
        message: String,
        transaction_id: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Flush on scope exit failed: {flush} (after the scope body failed: {body})")]
    ScopeExit {
        #[source]
        body: Box<DbError>,
        flush: Box<DbError>,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create an engine-not-configured error.
    pub fn engine_not_configured(name: impl Into<String>) -> Self {
        Self::EngineNotConfigured { name: name.into() }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a duplicate engine name error.
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    /// Create a session-already-active error.
    pub fn session_already_active(name: impl Into<String>) -> Self {
        Self::SessionAlreadyActive { name: name.into() }
    }

    /// Create a metadata-already-bound error.
    pub fn metadata_already_bound(metadata: impl Into<String>, engine: impl Into<String>) -> Self {
        Self::MetadataAlreadyBound {
            metadata: metadata.into(),
            engine: engine.into(),
        }
    }

    /// Create an unbound metadata error.
    pub fn unbound_metadata(metadata: impl Into<String>) -> Self {
        Self::UnboundMetadata {
            metadata: metadata.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            transaction_id: transaction_id.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Combine a failed scope body with the flush failure that followed it.
    pub fn scope_exit(body: DbError, flush: DbError) -> Self {
        Self::ScopeExit {
            body: Box::new(body),
            flush: Box::new(flush),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::EngineNotConfigured { .. } => {
                Some("Register the engine before opening a session scope for it")
            }
            Self::SessionAlreadyActive { .. } => {
                Some("Use a shared session scope to reuse the active session")
            }
            Self::ScopeExit { flush, .. } => flush.suggestion(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "Raise max_connections or acquire_timeout on the engine URL",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Recreate the engine")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
