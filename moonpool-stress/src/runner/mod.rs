//! Distributed runner and suite orchestration.
//!
//! ## Submodules
//!
//! - `builder` - StressBuilder for running a scenario many times
//! - `orchestrator` - DistributedRunner and its per-run lifecycle
//! - `environment` - The node-facing send path
//! - `broker` - Background message delivery
//! - `execution` - Per-node operation sequences and logical clocks
//! - `report` - Run outcomes and suite reports

pub(crate) mod broker;
pub mod builder;
pub mod environment;
pub mod execution;
pub mod orchestrator;
pub mod report;

pub use builder::{IterationControl, StressBuilder};
pub use environment::Environment;
pub use execution::{HBClock, ResultWithClock};
pub use orchestrator::{DistributedRunner, NodeFactory};
pub use report::{
    BudgetViolation, ExecutionResult, InvocationResult, NodeSnapshot, RunnerState, StressReport,
};
