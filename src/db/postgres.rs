//! PostgreSQL transport built on sqlx.
//!
//! sqlx is asynchronous; this transport drives it from a private
//! current-thread tokio runtime so that the crate's public API stays
//! blocking. Queries go over the simple query protocol, which accepts the
//! literal text produced by the template renderer (including several
//! statements separated by `;`).
//!
//! Do not call into this transport from inside another tokio runtime: the
//! blocking calls would panic.

use crate::db::descriptor;
use crate::db::transport::{ProviderError, Transport, TransportHandle};
use crate::db::types::{column_names, row_to_json};
use crate::error::{DbError, DbResult};
use crate::models::RawResult;
use futures_util::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection as _, Either};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

/// [`Transport`] opening real PostgreSQL connections.
#[derive(Debug, Clone)]
pub struct PgTransport {
    runtime: Arc<Runtime>,
}

impl PgTransport {
    /// Create the transport and its runtime.
    pub fn new() -> DbResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .thread_name("pgconn-transport")
            .build()
            .map_err(|e| DbError::internal(format!("Failed to start runtime: {}", e)))?;
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }
}

impl Transport for PgTransport {
    fn open(&self, descriptor: &str) -> Result<Box<dyn TransportHandle>, ProviderError> {
        let (options, timeout) = connect_options(descriptor)?;

        let conn = self.runtime.block_on(async {
            match tokio::time::timeout(timeout, options.connect()).await {
                Ok(result) => result.map_err(provider_error),
                Err(_) => Err(ProviderError::other(format!(
                    "timed out after {}s",
                    timeout.as_secs()
                ))),
            }
        })?;

        Ok(Box::new(PgHandle {
            runtime: Arc::clone(&self.runtime),
            conn: Some(conn),
            pending: None,
        }))
    }
}

/// Translate a descriptor into sqlx connect options and the connect timeout.
fn connect_options(descriptor: &str) -> Result<(PgConnectOptions, Duration), ProviderError> {
    let pairs = descriptor::parse(descriptor)
        .map_err(|e| ProviderError::other(format!("Invalid connection descriptor: {}", e)))?;

    let mut options = PgConnectOptions::new();
    let mut timeout = Duration::from_secs(crate::config::DEFAULT_CONNECT_TIMEOUT_SECS);

    for (key, value) in &pairs {
        options = match key.as_str() {
            "host" => options.host(value),
            "port" => options.port(value.parse().map_err(|_| {
                ProviderError::other(format!("Invalid port in descriptor: {}", value))
            })?),
            "user" => options.username(value),
            "password" => options.password(value),
            "dbname" => options.database(value),
            "connect_timeout" => {
                let secs: u64 = value.parse().map_err(|_| {
                    ProviderError::other(format!(
                        "Invalid connect_timeout in descriptor: {}",
                        value
                    ))
                })?;
                // libpq treats 0 as "wait forever"
                timeout = if secs == 0 {
                    Duration::MAX
                } else {
                    Duration::from_secs(secs)
                };
                options
            }
            other => {
                return Err(ProviderError::other(format!(
                    "Unsupported descriptor key: {}",
                    other
                )));
            }
        };
    }

    Ok((options, timeout))
}

/// Map a sqlx error, keeping the SQLSTATE of server-reported failures.
fn provider_error(err: sqlx::Error) -> ProviderError {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => ProviderError::server(code.into_owned(), db_err.message()),
            None => ProviderError::other(db_err.message()),
        },
        other => ProviderError::other(other.to_string()),
    }
}

struct PgHandle {
    runtime: Arc<Runtime>,
    conn: Option<PgConnection>,
    /// Query sent but not yet received.
    pending: Option<String>,
}

impl TransportHandle for PgHandle {
    fn is_busy(&mut self) -> bool {
        self.pending.is_some()
    }

    fn send(&mut self, query: &str) -> Result<(), ProviderError> {
        if self.conn.is_none() {
            return Err(ProviderError::other("connection is closed"));
        }
        self.pending = Some(query.to_string());
        Ok(())
    }

    fn receive(&mut self) -> Result<RawResult, ProviderError> {
        let sql = self
            .pending
            .take()
            .ok_or_else(|| ProviderError::other("no query in flight"))?;
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| ProviderError::other("connection is closed"))?;

        self.runtime.block_on(async {
            let mut result = RawResult::default();
            let mut stream = sqlx::raw_sql(&sql).fetch_many(&mut *conn);

            while let Some(item) = stream.try_next().await.map_err(provider_error)? {
                match item {
                    Either::Left(done) => result.rows_affected += done.rows_affected(),
                    Either::Right(row) => {
                        if result.columns.is_empty() {
                            result.columns = column_names(&row);
                        }
                        result.rows.push(row_to_json(&row));
                    }
                }
            }

            Ok(result)
        })
    }

    fn close(&mut self) {
        self.pending = None;
        if let Some(conn) = self.conn.take() {
            if let Err(e) = self.runtime.block_on(conn.close()) {
                debug!(error = %e, "Error while closing connection");
            }
        }
    }
}
