use tracing::{debug, error};

use crate::config::OptionsConfig;
use crate::pool::Backend;

use super::checks;
use super::status::{NodeStatus, ReplicationState};

/// Policy knobs for turning signals into a verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationConfig {
    /// Treat a Donor node like a Synced one
    pub available_when_donor: bool,
    /// Report a read-only node as Available
    pub available_when_readonly: bool,
}

impl From<&OptionsConfig> for EvaluationConfig {
    fn from(options: &OptionsConfig) -> Self {
        Self {
            available_when_donor: options.available_when_donor,
            available_when_readonly: options.available_when_readonly,
        }
    }
}

impl EvaluationConfig {
    fn accepts(&self, state: ReplicationState) -> bool {
        match state {
            ReplicationState::Synced => true,
            ReplicationState::Donor => self.available_when_donor,
            ReplicationState::Joining | ReplicationState::Joined => false,
        }
    }
}

/// Evaluate the node behind `backend`
///
/// Checks run strictly in order (ping, replication state, read-only) and
/// stop at the first one that settles the verdict. Nothing is cached; every
/// call asks the node again.
pub async fn evaluate<B: Backend>(backend: &B, config: &EvaluationConfig) -> NodeStatus {
    if let Err(e) = backend.ping().await {
        error!(error = %e, "Database node is unreachable");
        return NodeStatus::Unavailable;
    }

    let state = checks::replication_state(backend).await;
    if !config.accepts(state.value) {
        debug!(state = %state.value, degraded = state.degraded, "Replication state not accepted");
        return NodeStatus::NotReady;
    }

    if config.available_when_readonly {
        return NodeStatus::Available;
    }

    let read_only = checks::read_only(backend).await;
    if read_only.value {
        debug!(degraded = read_only.degraded, "Node is read-only");
        return NodeStatus::ReadOnly;
    }

    NodeStatus::Available
}
