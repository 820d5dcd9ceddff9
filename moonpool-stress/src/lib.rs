//! # Moonpool Stress Runner
//!
//! Randomized stress execution for distributed node programs. A set of
//! logical nodes runs on real OS threads while a broker delivers their
//! messages and a calibrated oracle injects faults into every send.
//!
//! Unlike the deterministic simulator, runs here are genuinely concurrent:
//! interleavings come from the OS scheduler and the queue policy, and the
//! seed only fixes the fault oracle's and the queue's random choices.
//!
//! ## Core Components
//!
//! - [`NodeAddressResolver`]: Stable id layout of node groups
//! - [`FaultOracle`]: Loss, duplication, crash, recovery and partition decisions
//! - [`MessageQueue`]: Synchronous, per-destination FIFO or fully asynchronous delivery order
//! - [`Environment`]: The send path every node uses
//! - [`DistributedRunner`]: One run at a time, with deadlock and budget supervision
//! - [`StressBuilder`]: Many runs sharing one calibration context
//!
//! ## Data Flow
//!
//! ```text
//! operation ──► Environment::send ──► FaultOracle ──► MessageQueue
//!                     │                                   │
//!                     │                                   ▼
//!                     │                    broker ──► Node::on_message
//!                     │                      │
//!                     └──► EventLog ◄────────┘ (delivered)
//!                    (sent, crash, …)
//! ```
//!
//! ## Fault Injection Overview
//!
//! | Mechanism | Setting | Default |
//! |-----------|---------|---------|
//! | Message loss | `network_reliability` | disabled |
//! | Duplication | `message_duplication` | disabled |
//! | Reordering | `message_order` | synchronous |
//! | Node crash | `crash_mode`, `max_failed_nodes` | disabled |
//! | Node recovery | `crash_mode`, `recovery_delay` | disabled |
//! | Network partitions | `partition_mode` | disabled |
//!
//! ## Quick Start
//!
//! ```ignore
//! use moonpool_stress::simulations::broadcast;
//! use moonpool_stress::{CrashMode, DistributedConfiguration};
//!
//! let mut config = DistributedConfiguration::new(4);
//! config.crash_mode = CrashMode::AllRecoveries;
//! config.max_failed_nodes = 1;
//!
//! let report = broadcast::stress_builder(config, 3).set_iterations(100).run()?;
//! assert!(report.is_success(), "{report}");
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Core Modules
// =============================================================================

/// Fault injection state and decisions.
pub mod chaos;

/// Stress run configuration.
pub mod config;

/// Error types.
pub mod error;

/// Run event log.
pub mod events;

/// Node contract, messages and scenarios.
pub mod node;

/// In-flight message queues.
pub mod queue;

/// Node id layout.
pub mod resolver;

/// Seeded randomness.
pub mod rng;

/// Distributed runner and suite orchestration.
pub mod runner;

/// Reusable workloads.
pub mod simulations;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use chaos::{CalibrationContext, FailureTable, FaultOracle, PartitionTable};
pub use config::{
    ClockMode, CrashMode, DistributedConfiguration, MessageOrder, NetworkPartitionMode, NodeGroup,
};
pub use error::{ConfigError, ResolverError, RunnerError, RunnerResult};
pub use events::{Event, EventLog};
pub use node::{ExecutionScenario, Message, Node, NodeId, Operation, OperationResult};
pub use queue::{
    create_queue, AsynchronousMessageQueue, FifoMessageQueue, MessageQueue,
    SynchronousMessageQueue,
};
pub use resolver::NodeAddressResolver;
pub use rng::SimRng;
pub use runner::{
    BudgetViolation, DistributedRunner, Environment, ExecutionResult, HBClock, InvocationResult,
    IterationControl, NodeFactory, NodeSnapshot, ResultWithClock, RunnerState, StressBuilder,
    StressReport,
};
