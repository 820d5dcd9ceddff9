//! Fault injection state and decisions.
//!
//! ## Submodules
//!
//! - [`oracle`] - Calibrated loss, duplication, crash, recovery and partition decisions
//! - [`calibration`] - Decision-point history shared across runs of a suite
//! - [`failures`] - Bounded per-node failure flags
//! - [`partition`] - The network partition in effect during a run

pub mod calibration;
pub mod failures;
pub mod oracle;
pub mod partition;

pub use calibration::CalibrationContext;
pub use failures::FailureTable;
pub use oracle::{FaultOracle, NODE_RECOVERY_PROBABILITY, SINGLE_COPY_PROBABILITY};
pub use partition::{PartitionSides, PartitionTable};
