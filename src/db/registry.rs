//! Endpoint-keyed connection registry.
//!
//! The registry hands out one shared [`Connection`] per `host:port`. It is an
//! ordinary value owned by the application: create it at startup, clone it
//! (clones share the same entries) into whatever needs connections, and call
//! [`disconnect_all`](ConnectionRegistry::disconnect_all) on shutdown.
//!
//! Entries are never evicted. The first configuration registered for an
//! endpoint wins; later configurations for the same endpoint are ignored.

use crate::db::connection::Connection;
use crate::db::template::{NamedTemplate, QueryTemplate};
use crate::db::transport::Transport;
use crate::error::DbResult;
use crate::models::{ConnectionConfig, ConnectionOptions};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<String, Arc<Connection>>>>,
    transport: Arc<dyn Transport>,
    template: Arc<dyn QueryTemplate>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("endpoints", &self.endpoints())
            .finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry rendering parameters with [`NamedTemplate`].
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_template(transport, Arc::new(NamedTemplate))
    }

    /// Create an empty registry with a custom query template.
    pub fn with_template(transport: Arc<dyn Transport>, template: Arc<dyn QueryTemplate>) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            transport,
            template,
        }
    }

    /// Get the connection for the config's endpoint, creating it on first use.
    ///
    /// Creation does not connect; the connection opens lazily on its first
    /// query.
    pub fn get_connection(&self, config: ConnectionConfig) -> Arc<Connection> {
        let key = config.endpoint_key();

        if let Some(existing) = self.connections.read().get(&key) {
            debug!(endpoint = %key, "Reusing registered connection");
            return Arc::clone(existing);
        }

        // Re-check under the write lock: another caller may have inserted
        // the endpoint since the read lock was dropped.
        let mut connections = self.connections.write();
        match connections.entry(key) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                info!(endpoint = %entry.key(), "Registering connection");
                let connection = Arc::new(Connection::new(
                    config,
                    Arc::clone(&self.transport),
                    Arc::clone(&self.template),
                ));
                Arc::clone(entry.insert(connection))
            }
        }
    }

    /// Validate an option map and get the connection for its endpoint.
    pub fn get_connection_from_options(
        &self,
        options: ConnectionOptions,
    ) -> DbResult<Arc<Connection>> {
        let config = ConnectionConfig::try_from(options)?;
        Ok(self.get_connection(config))
    }

    /// Look up a registered connection by endpoint key (`host:port`).
    pub fn get(&self, endpoint_key: &str) -> Option<Arc<Connection>> {
        self.connections.read().get(endpoint_key).cloned()
    }

    /// Endpoint keys of all registered connections, sorted.
    pub fn endpoints(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.connections.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Get the number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Close every transport handle. Entries stay registered and reconnect
    /// on their next query.
    pub fn disconnect_all(&self) {
        let connections: Vec<Arc<Connection>> = self.connections.read().values().cloned().collect();
        for connection in connections {
            connection.disconnect();
        }
        info!("All connections closed");
    }
}
