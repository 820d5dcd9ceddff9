//! Cross-run calibration of fault probabilities.
//!
//! Per-decision fault probabilities are divided by the number of decision
//! points seen in previous runs, so the expected number of faults per run
//! converges to the configured target no matter how chatty the program is.
//! Runners of the same suite share one [`CalibrationContext`].

use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct CalibrationState {
    previous_decision_points: usize,
    runs: usize,
}

/// Shared accumulator of decision points observed by previous runs.
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct CalibrationContext {
    state: Arc<Mutex<CalibrationState>>,
}

impl CalibrationContext {
    /// Fresh context with no history. Faults stay disabled until one run has been folded in.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that behaves as if a previous run saw `points` decision points.
    pub fn with_history(points: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(CalibrationState {
                previous_decision_points: points,
                runs: 0,
            })),
        }
    }

    /// Calibrated decision-point count used as the probability denominator.
    pub fn previous_decision_points(&self) -> usize {
        self.state.lock().previous_decision_points
    }

    /// Number of runs folded into this context.
    pub fn runs(&self) -> usize {
        self.state.lock().runs
    }

    pub(crate) fn fold(&self, current: usize) {
        let mut state = self.state.lock();
        state.previous_decision_points = state.previous_decision_points.max(current);
        state.runs += 1;
    }
}
