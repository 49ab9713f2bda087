//! Verdicts and replication signals

use std::fmt;
use std::process::ExitCode;

/// Result of one full evaluation of a node
///
/// Variants are ordered by severity; only `Available` counts as healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeStatus {
    /// Node accepts read/write traffic
    Available,
    /// Node is synced but read-only, and read-only nodes are not accepted
    ReadOnly,
    /// Node is reachable but its replication state disqualifies it
    NotReady,
    /// Node could not be reached
    Unavailable,
}

impl NodeStatus {
    pub fn is_available(self) -> bool {
        self == NodeStatus::Available
    }

    /// Human readable status line, also used as the HTTP body
    pub fn message(self) -> &'static str {
        match self {
            NodeStatus::Available => "MySQL cluster node is ready.",
            NodeStatus::Unavailable => "Could not connect to the MySQL cluster node.",
            NodeStatus::ReadOnly => "MySQL cluster node is read-only.",
            NodeStatus::NotReady => "MySQL cluster node is not ready.",
        }
    }

    /// Standalone process exit code
    pub fn exit_code(self) -> u8 {
        match self {
            NodeStatus::Available => 0,
            NodeStatus::Unavailable => 1,
            NodeStatus::ReadOnly => 2,
            NodeStatus::NotReady => 3,
        }
    }
}

impl From<NodeStatus> for ExitCode {
    fn from(status: NodeStatus) -> Self {
        ExitCode::from(status.exit_code())
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeStatus::Available => "available",
            NodeStatus::ReadOnly => "read-only",
            NodeStatus::NotReady => "not-ready",
            NodeStatus::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// wsrep_local_state as reported by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ReplicationState {
    /// Node is in the process of joining the cluster
    Joining = 1,
    /// Node is providing a state snapshot to a joiner
    Donor = 2,
    /// Node received the snapshot but has not caught up yet
    Joined = 3,
    /// Node is in the cluster and fully operational
    Synced = 4,
}

impl TryFrom<i64> for ReplicationState {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ReplicationState::Joining),
            2 => Ok(ReplicationState::Donor),
            3 => Ok(ReplicationState::Joined),
            4 => Ok(ReplicationState::Synced),
            other => Err(other),
        }
    }
}

impl fmt::Display for ReplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplicationState::Joining => "Joining",
            ReplicationState::Donor => "Donor",
            ReplicationState::Joined => "Joined",
            ReplicationState::Synced => "Synced",
        };
        f.write_str(name)
    }
}
