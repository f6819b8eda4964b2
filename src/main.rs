//! pgconn - Main entry point.
//!
//! Runs one or more queries against a PostgreSQL endpoint through the
//! connection registry and prints each result as JSON on stdout.

use clap::Parser;
use pgconn::config::Config;
use pgconn::db::{Connection, ConnectionRegistry, PgTransport};
use pgconn::error::DbError;
use pgconn::models::QueryParams;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    let conn_config = config.connection_config()?;
    let params = config.query_params()?;

    info!(
        endpoint = %conn_config.endpoint_key(),
        queries = config.queries.len(),
        "Starting pgconn v{}",
        env!("CARGO_PKG_VERSION")
    );

    let registry = ConnectionRegistry::new(Arc::new(PgTransport::new()?));
    let connection = registry.get_connection(conn_config);

    let result = if config.transaction {
        run_in_transaction(&connection, &config.queries, params.as_ref())
    } else {
        run_queries(&connection, &config.queries, params.as_ref())
    };

    registry.disconnect_all();

    if let Err(e) = result {
        error!(error = %e, "Query failed");
        if let Some(suggestion) = e.suggestion() {
            eprintln!("Hint: {}", suggestion);
        }
        return Err(e.into());
    }

    Ok(())
}

fn run_queries(
    connection: &Connection,
    queries: &[String],
    params: Option<&QueryParams>,
) -> Result<(), DbError> {
    for query in queries {
        let result = connection.query(query, params)?;
        let json = serde_json::to_string_pretty(&result)
            .map_err(|e| DbError::internal(format!("Failed to serialize result: {}", e)))?;
        println!("{}", json);
    }
    Ok(())
}

fn run_in_transaction(
    connection: &Connection,
    queries: &[String],
    params: Option<&QueryParams>,
) -> Result<(), DbError> {
    connection.begin()?;

    match run_queries(connection, queries, params) {
        Ok(()) => connection.commit(),
        Err(e) => {
            if let Err(rollback_err) = connection.rollback() {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(e)
        }
    }
}
