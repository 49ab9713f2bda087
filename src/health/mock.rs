//! In-memory backend for exercising the evaluator and HTTP responder

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::pool::{Backend, ConnectionError};
use crate::protocol::Row;

use super::checks::{READ_ONLY_QUERY, WSREP_LOCAL_STATE_QUERY};

pub struct MockBackend {
    reachable: bool,
    ping_delay: Option<Duration>,
    responses: HashMap<&'static str, Result<Vec<Row>, String>>,
    pings: AtomicUsize,
    queries: AtomicUsize,
    closed: AtomicBool,
}

fn variable(name: &str, value: &str) -> Vec<Row> {
    vec![Row::new(vec![Some(name.to_string()), Some(value.to_string())])]
}

impl MockBackend {
    /// A reachable node reporting the given wsrep state and read_only value
    pub fn node(wsrep_local_state: i64, read_only: &str) -> Self {
        let mut responses = HashMap::new();
        responses.insert(
            WSREP_LOCAL_STATE_QUERY,
            Ok(variable("wsrep_local_state", &wsrep_local_state.to_string())),
        );
        responses.insert(READ_ONLY_QUERY, Ok(variable("read_only", read_only)));

        Self {
            reachable: true,
            ping_delay: None,
            responses,
            pings: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// A node whose ping fails
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::node(4, "OFF")
        }
    }

    pub fn with_rows(mut self, sql: &'static str, rows: Vec<Row>) -> Self {
        self.responses.insert(sql, Ok(rows));
        self
    }

    pub fn with_query_error(mut self, sql: &'static str) -> Self {
        self.responses
            .insert(sql, Err("Lost connection to MySQL server during query".to_string()));
        self
    }

    /// Make every ping take this long, to keep requests in flight
    pub fn with_ping_delay(mut self, delay: Duration) -> Self {
        self.ping_delay = Some(delay);
        self
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn ping(&self) -> Result<(), ConnectionError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.ping_delay {
            tokio::time::sleep(delay).await;
        }
        if self.reachable {
            Ok(())
        } else {
            Err(ConnectionError::Connect("Connection refused".to_string()))
        }
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, ConnectionError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        match self.responses.get(sql) {
            Some(Ok(rows)) => Ok(rows.clone()),
            Some(Err(message)) => Err(ConnectionError::Query(message.clone())),
            None => Err(ConnectionError::Query(format!("Unexpected query: {sql}"))),
        }
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ConnectionError::PoolClosed);
        }
        Ok(())
    }
}
