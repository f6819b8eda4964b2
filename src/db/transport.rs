//! Transport abstraction.
//!
//! A [`Transport`] opens wire-level connections from a descriptor; each open
//! connection is a [`TransportHandle`] exclusively owned by one
//! [`Connection`](crate::db::Connection). The PostgreSQL implementation lives
//! in [`crate::db::postgres`]; tests plug in scripted transports.

use crate::models::RawResult;
use std::fmt;

/// Failure reported by the wire client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// SQLSTATE when the server reported one; `None` for I/O and protocol
    /// failures.
    pub code: Option<String>,
    pub message: String,
}

impl ProviderError {
    /// Error carrying a server status code.
    pub fn server(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Error without a status code (network, protocol, client side).
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} (SQLSTATE {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Opens connections to a database server.
pub trait Transport: Send + Sync {
    /// Open a new connection described by a `key=value` descriptor.
    fn open(&self, descriptor: &str) -> Result<Box<dyn TransportHandle>, ProviderError>;
}

/// One open wire-level connection. Not safe for concurrent use.
pub trait TransportHandle: Send {
    /// True while a previously sent query has not been fully received.
    fn is_busy(&mut self) -> bool;

    /// Dispatch a query without waiting for its result.
    fn send(&mut self, query: &str) -> Result<(), ProviderError>;

    /// Block until the result of the last sent query is available.
    fn receive(&mut self) -> Result<RawResult, ProviderError>;

    /// Close the connection. Called exactly once by the owner.
    fn close(&mut self);
}
