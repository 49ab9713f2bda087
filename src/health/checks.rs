//! Replication and read-only checks
//!
//! Checks never fail outward. Any error is logged and replaced by the most
//! conservative value, and the returned [`Reading`] is flagged as degraded so
//! callers and tests can tell a fallback from a genuine reading.

use thiserror::Error;
use tracing::{debug, error};

use crate::pool::{Backend, ConnectionError};

use super::status::ReplicationState;

/// Returns the state of the local wsrep provider
pub const WSREP_LOCAL_STATE_QUERY: &str = "SHOW STATUS LIKE 'wsrep_local_state'";
/// Returns whether the node refuses writes
pub const READ_ONLY_QUERY: &str = "SHOW GLOBAL VARIABLES LIKE 'read_only'";

/// A check reading, possibly a fail-safe default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading<T> {
    pub value: T,
    /// True when `value` is a fallback produced by an error
    pub degraded: bool,
}

impl<T> Reading<T> {
    fn measured(value: T) -> Self {
        Self {
            value,
            degraded: false,
        }
    }

    fn fallback(value: T) -> Self {
        Self {
            value,
            degraded: true,
        }
    }
}

/// Why a check fell back to its default
#[derive(Debug, Error)]
pub enum ReadingError {
    #[error(transparent)]
    Query(#[from] ConnectionError),
    #[error("Query returned no rows")]
    NoRows,
    #[error("Expected 2 columns, got {0}")]
    Columns(usize),
    #[error("Value is NULL")]
    Null,
    #[error("Value {0:?} is not an integer")]
    NotAnInteger(String),
    #[error("Unknown wsrep_local_state {0}")]
    UnknownState(i64),
}

/// Fetch the value column of a `SHOW ... LIKE` single-variable query
async fn fetch_variable<B: Backend>(backend: &B, sql: &str) -> Result<String, ReadingError> {
    let rows = backend.query(sql).await?;
    let row = rows.into_iter().next().ok_or(ReadingError::NoRows)?;
    if row.len() != 2 {
        return Err(ReadingError::Columns(row.len()));
    }
    row.get(1).map(str::to_string).ok_or(ReadingError::Null)
}

async fn try_replication_state<B: Backend>(backend: &B) -> Result<ReplicationState, ReadingError> {
    let raw = fetch_variable(backend, WSREP_LOCAL_STATE_QUERY).await?;
    let ordinal = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| ReadingError::NotAnInteger(raw.clone()))?;
    ReplicationState::try_from(ordinal).map_err(ReadingError::UnknownState)
}

/// Read wsrep_local_state; falls back to `Joining` on any error
pub async fn replication_state<B: Backend>(backend: &B) -> Reading<ReplicationState> {
    match try_replication_state(backend).await {
        Ok(state) => {
            debug!(state = %state, "wsrep_local_state");
            Reading::measured(state)
        }
        Err(e) => {
            error!(error = %e, "Error executing wsrep_local_state query");
            Reading::fallback(ReplicationState::Joining)
        }
    }
}

/// Read the read_only variable; falls back to read-only on any error
pub async fn read_only<B: Backend>(backend: &B) -> Reading<bool> {
    match fetch_variable(backend, READ_ONLY_QUERY).await {
        Ok(value) => {
            debug!(value = %value, "read_only");
            Reading::measured(value != "OFF")
        }
        Err(e) => {
            error!(error = %e, "Error executing read_only query");
            Reading::fallback(true)
        }
    }
}
