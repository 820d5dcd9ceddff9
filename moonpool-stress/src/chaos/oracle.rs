//! Stochastic fault decisions for a run.
//!
//! The oracle answers the send path's questions: is the message transmitted,
//! how many copies arrive, does the sender crash, does it recover, does a
//! partition start. Crash and partition probabilities are calibrated against
//! the decision points observed by previous runs of the suite:
//!
//! ```text
//! q = expected / total_nodes
//! p = q / previous_points                              (recoveries allowed)
//! p = q / (previous_points - (current - 1) * q)        (no recoveries)
//! ```
//!
//! so the expected number of fault decisions per run stays close to
//! `expected / total_nodes` however many messages the program sends.

use parking_lot::Mutex;
use tracing::trace;

use crate::chaos::calibration::CalibrationContext;
use crate::config::{CrashMode, DistributedConfiguration};
use crate::rng::SimRng;

/// Probability that a duplicated-eligible message is delivered once.
pub const SINGLE_COPY_PROBABILITY: f64 = 0.9;

/// Probability that a crashed node recovers in [`CrashMode::Mixed`].
pub const NODE_RECOVERY_PROBABILITY: f64 = 0.7;

#[derive(Debug, Default)]
struct OracleState {
    pending_crashes: usize,
    decision_points: usize,
}

/// Seeded, calibrated fault decision engine.
#[derive(Debug)]
pub struct FaultOracle {
    rng: SimRng,
    reliability: f64,
    duplication: bool,
    crash_mode: CrashMode,
    total_nodes: usize,
    expected_failures: usize,
    expected_partitions: usize,
    state: Mutex<OracleState>,
    calibration: CalibrationContext,
}

impl FaultOracle {
    /// Build an oracle for `config`, sharing `calibration` with the rest of the suite.
    pub fn new(
        config: &DistributedConfiguration,
        calibration: CalibrationContext,
        seed: u64,
    ) -> Self {
        Self {
            rng: SimRng::new(seed),
            reliability: config.network_reliability,
            duplication: config.message_duplication,
            crash_mode: config.crash_mode,
            total_nodes: config.total_nodes().max(1),
            expected_failures: config.expected_failures(),
            expected_partitions: config.expected_partitions,
            state: Mutex::new(OracleState::default()),
            calibration,
        }
    }

    /// The oracle's random source.
    pub fn rng(&self) -> &SimRng {
        &self.rng
    }

    /// The shared calibration context.
    pub fn calibration(&self) -> &CalibrationContext {
        &self.calibration
    }

    /// Count one fault-decision point.
    pub fn decision_point(&self) {
        self.state.lock().decision_points += 1;
    }

    /// Decision points counted during the current run.
    pub fn decision_points(&self) -> usize {
        self.state.lock().decision_points
    }

    /// Whether a transmission succeeds.
    pub fn message_is_sent(&self) -> bool {
        self.reliability >= 1.0 || self.rng.random_bool(self.reliability)
    }

    /// Number of copies delivered for one send: 0, 1 or 2.
    pub fn duplication_rate(&self) -> usize {
        if !self.message_is_sent() {
            return 0;
        }
        if !self.duplication {
            return 1;
        }
        if self.rng.random_bool(SINGLE_COPY_PROBABILITY) {
            1
        } else {
            2
        }
    }

    /// Whether the sender crashes now, given `remaining` failures still allowed.
    pub fn node_failed(&self, remaining: usize) -> bool {
        let mut state = self.state.lock();
        if remaining == 0 {
            state.pending_crashes = 0;
            return false;
        }
        if state.pending_crashes > 0 {
            state.pending_crashes -= 1;
            trace!(pending = state.pending_crashes, "crash burst continues");
            return true;
        }

        let p = self.crash_probability(state.decision_points);
        if !self.rng.random_bool(p) {
            return false;
        }
        state.pending_crashes = self.rng.random_range(0..remaining);
        trace!(p, burst = state.pending_crashes, "crash decided");
        true
    }

    fn crash_probability(&self, current: usize) -> f64 {
        let previous = self.calibration.previous_decision_points();
        if previous == 0 {
            return 0.0;
        }
        let q = self.expected_failures as f64 / self.total_nodes as f64;
        let denominator = match self.crash_mode {
            CrashMode::NoRecoveries => {
                previous as f64 - current.saturating_sub(1) as f64 * q
            }
            _ => previous as f64,
        };
        if denominator <= 0.0 {
            1.0
        } else {
            q / denominator
        }
    }

    /// Whether a crashed node comes back, independent of history.
    pub fn node_recovered(&self) -> bool {
        self.rng.random_bool(NODE_RECOVERY_PROBABILITY)
    }

    /// Whether a network partition starts now.
    pub fn is_network_partition(&self) -> bool {
        let previous = self.calibration.previous_decision_points();
        if previous == 0 {
            return false;
        }
        let q = self.expected_partitions as f64 / self.total_nodes as f64;
        self.rng.random_bool(q / previous as f64)
    }

    /// Bernoulli draw with probability `p` from the oracle's source.
    pub fn chance(&self, p: f64) -> bool {
        self.rng.random_bool(p)
    }

    /// Fold this run into the calibration context, clear per-run state and reseed.
    pub fn reset(&self, seed: u64) {
        let mut state = self.state.lock();
        self.calibration.fold(state.decision_points);
        *state = OracleState::default();
        self.rng.reseed(seed);
    }
}
