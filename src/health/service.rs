use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::pool::{Backend, ConnectOptions, ConnectionError, ConnectionPool, PoolConfig};

use super::evaluator::{evaluate, EvaluationConfig};
use super::status::NodeStatus;

/// Evaluation policy bound to the node handle it applies to
///
/// One instance lives for one daemon cycle (or one standalone run). Its
/// policy never changes; a reload builds a fresh instance.
pub struct HealthService<B> {
    backend: Arc<B>,
    config: EvaluationConfig,
}

impl<B> Clone for HealthService<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            config: self.config,
        }
    }
}

impl HealthService<ConnectionPool> {
    /// Open a pool to the configured node and bind the configured policy
    pub fn open(config: &Config) -> Self {
        let options = ConnectOptions::from_config(&config.connection);
        let pool = ConnectionPool::new(options, PoolConfig::default());
        Self::new(Arc::new(pool), EvaluationConfig::from(&config.options))
    }
}

impl<B: Backend> HealthService<B> {
    pub fn new(backend: Arc<B>, config: EvaluationConfig) -> Self {
        Self { backend, config }
    }

    /// Run one full evaluation against the node
    pub async fn check(&self) -> NodeStatus {
        evaluate(self.backend.as_ref(), &self.config).await
    }

    #[cfg(test)]
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Release the node handle
    pub async fn close(&self) -> Result<(), ConnectionError> {
        self.backend.close().await
    }
}

/// Evaluate once and report the verdict on the log stream
pub async fn run_standalone<B: Backend>(service: &HealthService<B>) -> NodeStatus {
    debug!("Running standalone health check");

    let status = service.check().await;
    if status.is_available() {
        info!(status = %status, "{}", status.message());
    } else {
        warn!(status = %status, "{}", status.message());
    }
    status
}
