use thiserror::Error;

use crate::node::NodeId;

/// Errors raised while building or using a [`NodeAddressResolver`](crate::NodeAddressResolver).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    /// The node id does not belong to any registered group.
    #[error("node id {id} is out of range (total nodes: {total})")]
    OutOfRange {
        /// The requested id.
        id: NodeId,
        /// Number of nodes known to the resolver.
        total: usize,
    },
    /// The same group name was registered twice.
    #[error("node group '{0}' registered more than once")]
    DuplicateGroup(String),
}

/// Errors raised when validating a
/// [`DistributedConfiguration`](crate::DistributedConfiguration).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// At least one scenario-driven node is required.
    #[error("at least one scenario-driven node is required")]
    NoNodes,
    /// Network reliability must be a probability.
    #[error("network reliability must be within [0, 1], got {0}")]
    InvalidReliability(f64),
    /// More nodes may fail than exist.
    #[error("max_failed_nodes ({max}) exceeds the total number of nodes ({total})")]
    TooManyFailures {
        /// Configured maximum.
        max: usize,
        /// Total nodes including additional groups.
        total: usize,
    },
    /// Operation timeout must be strictly positive.
    #[error("operation timeout must be greater than zero")]
    ZeroTimeout,
    /// A sampling range is inverted.
    #[error("invalid duration range for {0}")]
    InvalidRange(&'static str),
}

/// Errors that prevent a runner from being built or from starting a run.
///
/// Run outcomes (deadlock, crash, validation and budget failures) are not
/// errors; they are reported through [`InvocationResult`](crate::InvocationResult).
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The node groups could not be resolved.
    #[error("invalid node layout: {0}")]
    Resolver(#[from] ResolverError),
    /// The scenario does not provide one operation sequence per node.
    #[error("scenario has {actual} parallel sequences but {expected} nodes are configured")]
    ScenarioMismatch {
        /// Configured scenario-driven nodes.
        expected: usize,
        /// Sequences in the scenario.
        actual: usize,
    },
    /// The worker runtime could not be created.
    #[error("failed to build worker runtime: {0}")]
    Runtime(#[from] std::io::Error),
    /// `run` was called after `close`.
    #[error("runner has been closed")]
    Closed,
}

/// A type alias for `Result<T, RunnerError>`.
pub type RunnerResult<T> = Result<T, RunnerError>;
