//! Error types for pgconn.
//!
//! This module defines all error types using `thiserror`. Server-reported
//! failures are classified by SQLSTATE into dedicated variants so callers can
//! match on the condition instead of parsing messages.

use crate::models::ConnectionConfigError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("Connection to {endpoint} failed after {attempts} attempt(s)")]
    TriesExceeded { endpoint: String, attempts: u32 },

    #[error("Connection to {endpoint} is busy with another request")]
    ConnectionBusy { endpoint: String },

    #[error("Duplicate entry: {message}")]
    DuplicateEntry { message: String },

    #[error("Undefined table: {message}")]
    UndefinedTable { message: String },

    #[error("Duplicate table: {message}")]
    DuplicateTable { message: String },

    #[error("Duplicate type: {message}")]
    DuplicateType { message: String },

    /// Any server error whose SQLSTATE has no dedicated variant.
    #[error("Query failed (SQLSTATE {code}): {message}{}", query_suffix(.query))]
    Query {
        code: String,
        message: String,
        query: Option<String>,
    },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Template error: {message}")]
    Template { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn query_suffix(query: &Option<String>) -> String {
    match query {
        Some(q) => format!(": {}", q),
        None => String::new(),
    }
}

impl DbError {
    /// Create a tries exceeded error.
    pub fn tries_exceeded(endpoint: impl Into<String>, attempts: u32) -> Self {
        Self::TriesExceeded {
            endpoint: endpoint.into(),
            attempts,
        }
    }

    /// Create a connection busy error.
    pub fn connection_busy(endpoint: impl Into<String>) -> Self {
        Self::ConnectionBusy {
            endpoint: endpoint.into(),
        }
    }

    /// Create a generic query error for an unrecognized SQLSTATE.
    pub fn query(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            code: code.into(),
            message: message.into(),
            query: None,
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a template rendering error.
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Attach the query text to a generic query error.
    ///
    /// Other variants are returned unchanged.
    pub fn with_query(self, text: impl Into<String>) -> Self {
        match self {
            Self::Query { code, message, .. } => Self::Query {
                code,
                message,
                query: Some(text.into()),
            },
            other => other,
        }
    }

    /// SQLSTATE associated with a server-reported error.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::DuplicateEntry { .. } => Some(crate::db::classifier::CODE_DUPLICATE_ENTRY),
            Self::UndefinedTable { .. } => Some(crate::db::classifier::CODE_UNDEFINED_TABLE),
            Self::DuplicateTable { .. } => Some(crate::db::classifier::CODE_DUPLICATE_TABLE),
            Self::DuplicateType { .. } => Some(crate::db::classifier::CODE_DUPLICATE_TYPE),
            Self::Query { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::TriesExceeded { .. } => {
                Some("Check that the server is running and the credentials are correct")
            }
            Self::ConnectionBusy { .. } => {
                Some("Wait for the running query to finish or use a separate connection")
            }
            Self::DuplicateEntry { .. } => Some("A row with the same unique key already exists"),
            Self::UndefinedTable { .. } => Some("Check the table name and the search_path"),
            Self::DuplicateTable { .. } => Some("Use CREATE TABLE IF NOT EXISTS or drop it first"),
            Self::DuplicateType { .. } => Some("The type or object already exists"),
            Self::Template { .. } => Some("Provide a value for every :name placeholder"),
            Self::Transport { .. } => {
                Some("The connection was dropped; retrying the query reconnects")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TriesExceeded { .. } | Self::ConnectionBusy { .. } | Self::Transport { .. }
        )
    }
}

impl From<ConnectionConfigError> for DbError {
    fn from(err: ConnectionConfigError) -> Self {
        DbError::invalid_config(err.to_string())
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
