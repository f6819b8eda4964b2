//! A single database connection with bounded connect retry.
//!
//! A [`Connection`] owns at most one transport handle. It connects lazily on
//! the first query, refuses to pile a query onto a handle that still has one
//! in flight, and turns server failures into typed [`DbError`]s.

use crate::db::classifier::classify;
use crate::db::template::QueryTemplate;
use crate::db::transport::{ProviderError, Transport, TransportHandle};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, QueryParams, QueryResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const SQL_BEGIN: &str = "BEGIN";
pub const SQL_COMMIT: &str = "COMMIT";
pub const SQL_ROLLBACK: &str = "ROLLBACK";

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// What `query` does when the handle reports a query still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPolicy {
    /// Fail with [`DbError::ConnectionBusy`] without sending anything.
    #[default]
    Fail,
    /// Send anyway. Used by transaction control.
    Proceed,
}

/// Owning wrapper around a transport handle.
///
/// `release` is the only path that closes the handle; `Drop` goes through it
/// too, so a handle is closed exactly once and never outlives its owner.
struct OwnedHandle(Option<Box<dyn TransportHandle>>);

impl OwnedHandle {
    fn new(handle: Box<dyn TransportHandle>) -> Self {
        Self(Some(handle))
    }

    fn get(&mut self) -> DbResult<&mut dyn TransportHandle> {
        match self.0.as_mut() {
            Some(handle) => Ok(handle.as_mut()),
            None => Err(DbError::internal("transport handle already released")),
        }
    }

    fn release(&mut self) {
        if let Some(mut handle) = self.0.take() {
            handle.close();
        }
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct Connection {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    template: Arc<dyn QueryTemplate>,
    /// Held across busy check, send and receive.
    handle: Mutex<Option<OwnedHandle>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.config.endpoint_key())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a disconnected connection.
    pub fn new(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        template: Arc<dyn QueryTemplate>,
    ) -> Self {
        Self {
            config,
            transport,
            template,
            handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn endpoint_key(&self) -> String {
        self.config.endpoint_key()
    }

    /// Current lifecycle state.
    ///
    /// Blocks while another thread is running a query on this connection.
    pub fn state(&self) -> ConnectionState {
        if self.handle.lock().is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Open the transport, trying up to `connect_tries` times.
    ///
    /// An existing handle is released first.
    pub fn connect(&self) -> DbResult<()> {
        let mut slot = self.handle.lock();
        self.connect_locked(&mut slot)
    }

    /// Close the transport handle. No-op when already disconnected.
    pub fn disconnect(&self) {
        let mut slot = self.handle.lock();
        if let Some(mut handle) = slot.take() {
            handle.release();
            info!(endpoint = %self.config.endpoint_key(), "Disconnected");
        }
    }

    /// Disconnect, then connect, without letting another caller in between.
    pub fn reconnect(&self) -> DbResult<()> {
        let mut slot = self.handle.lock();
        if let Some(mut handle) = slot.take() {
            handle.release();
            info!(endpoint = %self.config.endpoint_key(), "Disconnected for reconnect");
        }
        self.connect_locked(&mut slot)
    }

    /// Run a query, failing fast if the connection is busy.
    ///
    /// With `params`, `text` is rendered through the query template first;
    /// without, it is sent verbatim. A [`DbError::Transport`] failure leaves
    /// the connection disconnected; the next query reconnects.
    pub fn query(&self, text: &str, params: Option<&QueryParams>) -> DbResult<QueryResult> {
        self.query_with_policy(text, params, BusyPolicy::Fail)
    }

    /// Run a query with an explicit busy policy.
    pub fn query_with_policy(
        &self,
        text: &str,
        params: Option<&QueryParams>,
        policy: BusyPolicy,
    ) -> DbResult<QueryResult> {
        let mut slot = self.handle.lock();
        if slot.is_none() {
            self.connect_locked(&mut slot)?;
        }
        let handle = match slot.as_mut() {
            Some(handle) => handle.get()?,
            None => return Err(DbError::internal("connection has no transport handle")),
        };

        if handle.is_busy() {
            match policy {
                BusyPolicy::Fail => {
                    return Err(DbError::connection_busy(self.config.endpoint_key()));
                }
                BusyPolicy::Proceed => {
                    debug!(endpoint = %self.config.endpoint_key(), "Connection busy, proceeding");
                }
            }
        }

        let sql = match params {
            Some(params) => self.template.render(text, params)?,
            None => text.to_string(),
        };

        debug!(endpoint = %self.config.endpoint_key(), query = %sql, "Sending query");
        match handle.send(&sql).and_then(|()| handle.receive()) {
            Ok(raw) => Ok(QueryResult::from(raw)),
            Err(err) => {
                // Without a SQLSTATE the handle itself failed; drop it so the
                // next query opens a fresh one.
                if err.code.is_none() {
                    if let Some(mut dead) = slot.take() {
                        dead.release();
                    }
                    warn!(
                        endpoint = %self.config.endpoint_key(),
                        error = %err,
                        "Connection lost, handle released"
                    );
                }
                Err(query_error(err, text))
            }
        }
    }

    /// Start a transaction.
    pub fn begin(&self) -> DbResult<()> {
        self.query_with_policy(SQL_BEGIN, None, BusyPolicy::Proceed).map(|_| ())
    }

    /// Commit the current transaction.
    pub fn commit(&self) -> DbResult<()> {
        self.query_with_policy(SQL_COMMIT, None, BusyPolicy::Proceed).map(|_| ())
    }

    /// Roll back the current transaction.
    pub fn rollback(&self) -> DbResult<()> {
        self.query_with_policy(SQL_ROLLBACK, None, BusyPolicy::Proceed).map(|_| ())
    }

    fn connect_locked(&self, slot: &mut Option<OwnedHandle>) -> DbResult<()> {
        if let Some(mut old) = slot.take() {
            old.release();
        }

        let endpoint = self.config.endpoint_key();
        let descriptor = self.config.descriptor();
        let max_tries = self.config.connect_tries();

        for attempt in 1..=max_tries {
            match self.transport.open(&descriptor) {
                Ok(handle) => {
                    *slot = Some(OwnedHandle::new(handle));
                    info!(endpoint = %endpoint, attempt, "Connected successfully");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        endpoint = %endpoint,
                        attempt,
                        max_tries,
                        error = %e,
                        "Connection attempt failed"
                    );
                }
            }
        }

        error!(
            endpoint = %endpoint,
            descriptor = %self.config.masked_descriptor(),
            attempts = max_tries,
            "All connection attempts failed"
        );
        Err(DbError::tries_exceeded(endpoint, max_tries))
    }
}

/// Turn a transport failure into a typed error, attaching the query text to
/// unrecognized server errors.
fn query_error(err: ProviderError, text: &str) -> DbError {
    match err.code {
        Some(code) => classify(&code, &err.message).with_query(text),
        None => DbError::transport(err.message),
    }
}
