use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::connection::{ConnectionError, PooledConnection};
use super::options::ConnectOptions;

/// Configuration for the connection pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of open connections, idle and leased together
    pub max_open: usize,
    /// Maximum connection age before recycling
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open: 5,
            // Load balancers in front of the node may recycle long-lived sockets
            max_lifetime: Duration::from_secs(300),
        }
    }
}

type IdleList = Arc<Mutex<VecDeque<PooledConnection>>>;

/// A bounded pool of query-only connections to one database node
///
/// Connections are leased through [`PoolGuard`] and go back to the idle
/// list when the guard drops. The pool is safe to share between request
/// handlers; only its owner should call [`ConnectionPool::close`].
pub struct ConnectionPool {
    options: Arc<ConnectOptions>,
    config: PoolConfig,
    idle: IdleList,
    permits: Arc<Semaphore>,
}

impl ConnectionPool {
    /// Create a pool; no connection is opened until the first lease
    pub fn new(options: ConnectOptions, config: PoolConfig) -> Self {
        let max_open = config.max_open.max(1);
        Self {
            options: Arc::new(options),
            config: PoolConfig { max_open, ..config },
            idle: Arc::new(Mutex::new(VecDeque::new())),
            permits: Arc::new(Semaphore::new(max_open)),
        }
    }

    /// Lease a connection, reusing an idle one when it is still fresh
    pub async fn get(&self) -> Result<PoolGuard, ConnectionError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ConnectionError::PoolClosed)?;

        let reused = {
            let mut idle = self.idle.lock();
            let mut found = None;
            while let Some(conn) = idle.pop_front() {
                if conn.is_expired(self.config.max_lifetime) {
                    debug!(connection_id = conn.connection_id(), "Connection expired, discarding");
                    continue;
                }
                if !conn.is_usable() {
                    continue;
                }
                found = Some(conn);
                break;
            }
            found
        };

        let mut conn = match reused {
            Some(conn) => {
                debug!(connection_id = conn.connection_id(), "Reusing idle connection");
                conn
            }
            None => {
                debug!("Creating new connection");
                PooledConnection::connect(&self.options).await?
            }
        };
        conn.acquire();

        Ok(PoolGuard {
            conn: Some(conn),
            idle: self.idle.clone(),
            max_lifetime: self.config.max_lifetime,
            _permit: permit,
        })
    }

    /// Close the pool
    ///
    /// Waits for every outstanding lease to come back, refuses new leases,
    /// then ends the idle sessions. Fails if the pool was already closed.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        let all = self
            .permits
            .acquire_many(self.config.max_open as u32)
            .await
            .map_err(|_| ConnectionError::PoolClosed)?;
        self.permits.close();

        let drained: Vec<PooledConnection> = self.idle.lock().drain(..).collect();
        let count = drained.len();
        for mut conn in drained {
            conn.quit().await;
        }
        drop(all);

        debug!(closed = count, "Connection pool closed");
        Ok(())
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Get current number of idle connections
    #[cfg(test)]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }
}

/// A leased connection; returned to the pool on drop
///
/// Broken or expired connections are discarded instead of returned, so a
/// failed query can never poison later leases.
pub struct PoolGuard {
    conn: Option<PooledConnection>,
    idle: IdleList,
    max_lifetime: Duration,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PoolGuard {
    type Target = PooledConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PoolGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        conn.release();

        if !conn.is_usable() {
            debug!(connection_id = conn.connection_id(), "Connection not usable, discarding");
            return;
        }
        if conn.is_expired(self.max_lifetime) {
            debug!(connection_id = conn.connection_id(), "Connection expired, discarding");
            return;
        }

        let mut idle = self.idle.lock();
        idle.push_back(conn);
        debug!(idle_count = idle.len(), "Returned connection to pool");
    }
}
