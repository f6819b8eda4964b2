//! Scripted in-memory transport shared by the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use pgconn::db::{ProviderError, Transport, TransportHandle};
use pgconn::models::RawResult;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything the transport observed, plus the knobs tests turn.
#[derive(Debug, Default)]
pub struct ScriptState {
    /// Descriptors passed to `open`, one per attempt.
    pub opens: Vec<String>,
    /// Queries passed to `send`, across all handles.
    pub sent: Vec<String>,
    /// Number of handles closed.
    pub closes: usize,
    /// Number of upcoming `open` calls that fail.
    pub failing_opens: usize,
    /// Reported by every handle's `is_busy`.
    pub busy: bool,
    /// Server errors returned for specific query texts.
    pub errors: HashMap<String, ProviderError>,
    /// Results returned for specific query texts; others get an empty result.
    pub results: HashMap<String, RawResult>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    pub state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose next `n` opens fail.
    pub fn failing(n: usize) -> Self {
        let transport = Self::new();
        transport.state.lock().failing_opens = n;
        transport
    }

    pub fn set_busy(&self, busy: bool) {
        self.state.lock().busy = busy;
    }

    pub fn fail_query(&self, query: &str, code: &str, message: &str) {
        self.state
            .lock()
            .errors
            .insert(query.to_string(), ProviderError::server(code, message));
    }

    pub fn drop_connection_on(&self, query: &str) {
        self.state.lock().errors.insert(
            query.to_string(),
            ProviderError::other("server closed the connection unexpectedly"),
        );
    }

    pub fn respond(&self, query: &str, result: RawResult) {
        self.state.lock().results.insert(query.to_string(), result);
    }

    pub fn opens(&self) -> usize {
        self.state.lock().opens.len()
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, descriptor: &str) -> Result<Box<dyn TransportHandle>, ProviderError> {
        let mut state = self.state.lock();
        state.opens.push(descriptor.to_string());
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(ProviderError::other("could not connect to server"));
        }
        Ok(Box::new(ScriptedHandle {
            state: Arc::clone(&self.state),
            pending: None,
        }))
    }
}

struct ScriptedHandle {
    state: Arc<Mutex<ScriptState>>,
    pending: Option<String>,
}

impl TransportHandle for ScriptedHandle {
    fn is_busy(&mut self) -> bool {
        self.state.lock().busy
    }

    fn send(&mut self, query: &str) -> Result<(), ProviderError> {
        self.state.lock().sent.push(query.to_string());
        self.pending = Some(query.to_string());
        Ok(())
    }

    fn receive(&mut self) -> Result<RawResult, ProviderError> {
        let query = self
            .pending
            .take()
            .ok_or_else(|| ProviderError::other("no query in flight"))?;
        let state = self.state.lock();
        if let Some(err) = state.errors.get(&query) {
            return Err(err.clone());
        }
        Ok(state.results.get(&query).cloned().unwrap_or_default())
    }

    fn close(&mut self) {
        self.state.lock().closes += 1;
    }
}
