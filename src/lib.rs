//! pgconn library
//!
//! A resilient PostgreSQL connection layer: bounded connect retry, typed
//! errors classified by SQLSTATE, and a registry holding one connection per
//! network endpoint.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use db::{BusyPolicy, Connection, ConnectionRegistry, PgTransport};
pub use error::{DbError, DbResult};
pub use models::{ConnectionConfig, QueryParams, QueryResult};
