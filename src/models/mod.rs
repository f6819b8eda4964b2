//! Data models for pgconn.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{
    ConnectionConfig, ConnectionConfigBuilder, ConnectionConfigError, ConnectionOptions,
};
pub use query::{QueryParam, QueryParams, QueryResult, RawResult};
