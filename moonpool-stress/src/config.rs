//! # Stress Run Configuration
//!
//! [`DistributedConfiguration`] describes the node layout, the delivery
//! policy and the faults injected during every run.
//!
//! ## Delivery
//!
//! | Setting | Field | Default |
//! |---------|-------|---------|
//! | Ordering policy | `message_order` | Synchronous |
//! | Delivery probability | `network_reliability` | 1.0 (perfect) |
//! | Duplication | `message_duplication` | disabled |
//!
//! ## Process faults
//!
//! | Setting | Field | Default |
//! |---------|-------|---------|
//! | Crash behaviour | `crash_mode` | NoCrashes |
//! | Concurrently failed nodes | `max_failed_nodes` | 0 |
//! | Recovery delay | `recovery_delay` | 0-1ms |
//! | Long-run crash target | `expected_failures` | `max_failed_nodes` |
//!
//! ## Network partitions
//!
//! | Setting | Field | Default |
//! |---------|-------|---------|
//! | Partition shape | `partition_mode` | None |
//! | Partition lifetime | `partition_duration` | 50-200ms |
//! | Long-run partition target | `expected_partitions` | 8 |
//!
//! ## Budgets and supervision
//!
//! | Setting | Field | Default |
//! |---------|-------|---------|
//! | Messages per node | `messages_per_node` | unlimited |
//! | Messages per run | `total_messages` | unlimited |
//! | Per-node completion timeout | `operation_timeout` | 20s |
//!
//! ```rust
//! use moonpool_stress::{CrashMode, DistributedConfiguration, MessageOrder};
//!
//! let mut config = DistributedConfiguration::new(3);
//! config.message_order = MessageOrder::Fifo;
//! config.network_reliability = 0.95;
//! config.crash_mode = CrashMode::AllRecoveries;
//! config.max_failed_nodes = 1;
//! assert!(config.validate().is_ok());
//! ```

use std::ops::Range;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default long-run expectation of network partitions per suite.
pub const DEFAULT_EXPECTED_PARTITIONS: usize = 8;

/// Message ordering policy of the in-flight queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOrder {
    /// One global FIFO: delivery order equals send order.
    #[default]
    Synchronous,
    /// FIFO per destination, random interleaving across destinations.
    Fifo,
    /// No ordering guarantee at all.
    Asynchronous,
}

/// Crash and recovery behaviour of nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashMode {
    /// Nodes never crash.
    #[default]
    NoCrashes,
    /// Crashed nodes stay down for the rest of the run.
    NoRecoveries,
    /// Crashed nodes always come back after a recovery delay.
    AllRecoveries,
    /// Each crash independently decides whether the node comes back.
    Mixed,
}

/// Shape of injected network partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkPartitionMode {
    /// No partitions.
    #[default]
    None,
    /// Split the nodes into two random halves.
    Halves,
    /// Isolate one random node from the rest.
    SingleNode,
}

/// Whether logical clocks are tracked for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// Flip a coin at the start of every run.
    #[default]
    Random,
    /// Track clocks on every run.
    Always,
    /// Never track clocks; every clock is all-zero.
    Never,
}

/// An additional group of nodes that has no operations of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroup {
    /// Group name.
    pub name: String,
    /// Number of nodes in the group.
    pub count: usize,
    /// Whether nodes of this group may crash.
    pub can_fail: bool,
}

impl NodeGroup {
    /// Create a group description.
    pub fn new(name: impl Into<String>, count: usize, can_fail: bool) -> Self {
        Self {
            name: name.into(),
            count,
            can_fail,
        }
    }
}

/// Configuration of a distributed stress run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributedConfiguration {
    /// Number of scenario-driven nodes.
    pub nodes: usize,
    /// Group name of the scenario-driven nodes.
    pub node_group: String,
    /// Additional groups, assigned ids after the scenario-driven nodes in order.
    pub groups: Vec<NodeGroup>,

    /// In-flight message ordering policy.
    pub message_order: MessageOrder,
    /// Probability that a message is transmitted (1.0 is perfect).
    pub network_reliability: f64,
    /// Whether messages may be delivered twice.
    pub message_duplication: bool,

    /// Crash behaviour.
    pub crash_mode: CrashMode,
    /// Maximum number of concurrently failed nodes.
    pub max_failed_nodes: usize,
    /// Range of the delay a crashed node waits before recovering.
    pub recovery_delay: Range<Duration>,
    /// Long-run number of crashes per node set targeted by calibration.
    ///
    /// Defaults to `max_failed_nodes` when unset.
    pub expected_failures: Option<usize>,

    /// Partition shape.
    pub partition_mode: NetworkPartitionMode,
    /// Range of partition lifetimes.
    pub partition_duration: Range<Duration>,
    /// Long-run number of partitions targeted by calibration.
    pub expected_partitions: usize,

    /// Per-node cap on sent messages, checked after each run.
    pub messages_per_node: usize,
    /// Cap on the total number of sent messages, checked after each run.
    pub total_messages: usize,
    /// Time each node gets to finish its operations.
    pub operation_timeout: Duration,

    /// Logical clock tracking.
    pub logical_clocks: ClockMode,
    /// Base seed; runs derive their seeds from it. Random when unset.
    pub seed: Option<u64>,
}

impl Default for DistributedConfiguration {
    fn default() -> Self {
        Self {
            nodes: 2,
            node_group: "node".to_string(),
            groups: Vec::new(),
            message_order: MessageOrder::Synchronous,
            network_reliability: 1.0,
            message_duplication: false,
            crash_mode: CrashMode::NoCrashes,
            max_failed_nodes: 0,
            recovery_delay: Duration::ZERO..Duration::from_millis(1),
            expected_failures: None,
            partition_mode: NetworkPartitionMode::None,
            partition_duration: Duration::from_millis(50)..Duration::from_millis(200),
            expected_partitions: DEFAULT_EXPECTED_PARTITIONS,
            messages_per_node: usize::MAX,
            total_messages: usize::MAX,
            operation_timeout: Duration::from_secs(20),
            logical_clocks: ClockMode::Random,
            seed: None,
        }
    }
}

impl DistributedConfiguration {
    /// Fault-free configuration for `nodes` scenario-driven nodes.
    pub fn new(nodes: usize) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }

    /// Configuration with every fault kind enabled, useful for soak runs.
    pub fn chaotic(nodes: usize) -> Self {
        Self {
            nodes,
            message_order: MessageOrder::Asynchronous,
            network_reliability: 0.95,
            message_duplication: true,
            crash_mode: CrashMode::Mixed,
            max_failed_nodes: (nodes.saturating_sub(1)) / 2,
            partition_mode: NetworkPartitionMode::Halves,
            ..Self::default()
        }
    }

    /// Register an additional node group.
    pub fn with_group(mut self, group: NodeGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Scenario-driven nodes plus every additional group.
    pub fn total_nodes(&self) -> usize {
        self.nodes + self.groups.iter().map(|g| g.count).sum::<usize>()
    }

    /// Whether transmission never fails.
    pub fn is_network_reliable(&self) -> bool {
        self.network_reliability >= 1.0
    }

    /// Crash target used by calibration.
    pub fn expected_failures(&self) -> usize {
        self.expected_failures.unwrap_or(self.max_failed_nodes)
    }

    /// Check the configuration for inconsistent values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes == 0 {
            return Err(ConfigError::NoNodes);
        }
        if !(0.0..=1.0).contains(&self.network_reliability) {
            return Err(ConfigError::InvalidReliability(self.network_reliability));
        }
        let total = self.total_nodes();
        if self.max_failed_nodes > total {
            return Err(ConfigError::TooManyFailures {
                max: self.max_failed_nodes,
                total,
            });
        }
        if self.operation_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.recovery_delay.start > self.recovery_delay.end {
            return Err(ConfigError::InvalidRange("recovery_delay"));
        }
        if self.partition_duration.start > self.partition_duration.end {
            return Err(ConfigError::InvalidRange("partition_duration"));
        }
        Ok(())
    }
}
