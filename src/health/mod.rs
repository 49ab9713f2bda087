//! Node health evaluation
//!
//! This module provides:
//! - Replication state and read-only checks against one node
//! - The evaluator turning check readings into a [`NodeStatus`]
//! - [`HealthService`], the per-cycle binding of policy to a node handle

mod evaluator;
#[cfg(test)]
pub(crate) mod mock;
mod checks;
mod service;
mod status;

#[cfg(test)]
pub use evaluator::EvaluationConfig;
pub use service::{run_standalone, HealthService};
