//! Database access layer.
//!
//! This module provides:
//! - Connection lifecycle and query execution
//! - SQLSTATE classification
//! - The endpoint-keyed connection registry
//! - Connection descriptor encoding
//! - The transport seam and its PostgreSQL implementation
//! - Query template rendering

pub mod classifier;
pub mod connection;
pub mod descriptor;
pub mod postgres;
pub mod registry;
pub mod template;
pub mod transport;
pub mod types;

pub use classifier::classify;
pub use connection::{BusyPolicy, Connection, ConnectionState};
pub use postgres::PgTransport;
pub use registry::ConnectionRegistry;
pub use template::{NamedTemplate, QueryTemplate};
pub use transport::{ProviderError, Transport, TransportHandle};
