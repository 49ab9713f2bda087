use async_trait::async_trait;

use crate::protocol::Row;

use super::connection::ConnectionError;
use super::stateless::ConnectionPool;

/// A pingable, query-capable handle to one database node
///
/// Implementations must be safe for concurrent use: every HTTP request runs
/// its own checks against the same handle.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Verify the node is reachable and accepting sessions
    async fn ping(&self) -> Result<(), ConnectionError>;

    /// Run one statement and return its rows
    async fn query(&self, sql: &str) -> Result<Vec<Row>, ConnectionError>;

    /// Release every resource held by the handle
    async fn close(&self) -> Result<(), ConnectionError>;
}

#[async_trait]
impl Backend for ConnectionPool {
    async fn ping(&self) -> Result<(), ConnectionError> {
        let mut conn = self.get().await?;
        conn.ping().await
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, ConnectionError> {
        // The lease is returned (or discarded if broken) on every exit path
        let mut conn = self.get().await?;
        conn.query(sql).await
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        ConnectionPool::close(self).await
    }
}
