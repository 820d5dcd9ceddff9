//! Stress builder for running a scenario many times.
//!
//! [`StressBuilder`] owns one [`DistributedRunner`] and drives it for a fixed
//! number of runs or for a wall-clock budget, stopping at the first run that
//! does not complete.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use tracing::{error, info, instrument};

use super::environment::Environment;
use super::orchestrator::{time_seed, DistributedRunner, NodeFactory};
use super::report::StressReport;
use crate::chaos::CalibrationContext;
use crate::config::DistributedConfiguration;
use crate::error::RunnerResult;
use crate::node::{ExecutionScenario, Node};

/// How many runs a suite executes.
#[derive(Debug, Clone)]
pub enum IterationControl {
    /// Run a fixed number of iterations.
    FixedCount(usize),
    /// Run until the wall-clock budget is spent.
    TimeLimit(Duration),
}

/// Seed sequence of a suite: explicit seeds first, then seeds hashed from a base.
pub(crate) struct IterationManager {
    control: IterationControl,
    seeds: Vec<u64>,
    base_seed: u64,
    iteration_count: usize,
    start_time: Instant,
}

impl IterationManager {
    pub(crate) fn new(control: IterationControl, initial_seeds: Vec<u64>, base_seed: u64) -> Self {
        Self {
            control,
            seeds: initial_seeds,
            base_seed,
            iteration_count: 0,
            start_time: Instant::now(),
        }
    }

    pub(crate) fn should_continue(&self) -> bool {
        match &self.control {
            IterationControl::FixedCount(count) => self.iteration_count < *count,
            IterationControl::TimeLimit(duration) => self.start_time.elapsed() < *duration,
        }
    }

    pub(crate) fn next_iteration(&mut self) -> u64 {
        let seed = if self.iteration_count < self.seeds.len() {
            self.seeds[self.iteration_count]
        } else {
            let mut hasher = DefaultHasher::new();
            self.base_seed.hash(&mut hasher);
            self.iteration_count.hash(&mut hasher);
            let new_seed = hasher.finish();
            self.seeds.push(new_seed);
            new_seed
        };
        self.iteration_count += 1;
        seed
    }

    pub(crate) fn current_iteration(&self) -> usize {
        self.iteration_count
    }

    pub(crate) fn seeds_used(&self) -> &[u64] {
        &self.seeds[..self.iteration_count.min(self.seeds.len())]
    }
}

/// Builder for a suite of stress runs sharing one calibration context.
pub struct StressBuilder<N: Node> {
    config: DistributedConfiguration,
    scenario: ExecutionScenario<N>,
    factory: NodeFactory<N>,
    calibration: CalibrationContext,
    iteration_control: IterationControl,
    seeds: Vec<u64>,
}

impl<N: Node> StressBuilder<N> {
    /// Create a builder running `scenario` once against nodes built by `factory`.
    pub fn new<F>(
        config: DistributedConfiguration,
        scenario: ExecutionScenario<N>,
        factory: F,
    ) -> Self
    where
        F: Fn(Environment<N::Body>) -> N + Send + Sync + 'static,
    {
        Self {
            config,
            scenario,
            factory: Box::new(factory),
            calibration: CalibrationContext::new(),
            iteration_control: IterationControl::FixedCount(1),
            seeds: Vec::new(),
        }
    }

    /// Set the number of iterations to run.
    pub fn set_iterations(mut self, iterations: usize) -> Self {
        self.iteration_control = IterationControl::FixedCount(iterations);
        self
    }

    /// Run for a specific wall-clock time duration.
    pub fn set_time_limit(mut self, duration: Duration) -> Self {
        self.iteration_control = IterationControl::TimeLimit(duration);
        self
    }

    /// Set the iteration control strategy.
    pub fn set_iteration_control(mut self, control: IterationControl) -> Self {
        self.iteration_control = control;
        self
    }

    /// Set specific seeds for deterministic debugging and regression testing.
    pub fn set_debug_seeds(mut self, seeds: Vec<u64>) -> Self {
        self.seeds = seeds;
        self
    }

    /// Share a calibration context with other suites.
    pub fn calibration(mut self, calibration: CalibrationContext) -> Self {
        self.calibration = calibration;
        self
    }

    #[instrument(skip_all)]
    /// Run the suite and generate a report.
    pub fn run(self) -> RunnerResult<StressReport<N>> {
        let base_seed = self.config.seed.unwrap_or_else(time_seed);
        let mut iterations = IterationManager::new(self.iteration_control, self.seeds, base_seed);
        let mut runner =
            DistributedRunner::new(self.config, self.scenario, self.factory, self.calibration)?;

        let start = Instant::now();
        let mut successful_runs = 0;
        let mut failure = None;
        let mut failing_history = None;

        while iterations.should_continue() {
            let seed = iterations.next_iteration();
            info!(
                "Starting iteration {} with seed {}",
                iterations.current_iteration(),
                seed
            );

            let outcome = runner.run_with_seed(seed)?;
            if outcome.is_completed() {
                successful_runs += 1;
            } else {
                let history = runner.calibration().previous_decision_points();
                error!(seed, history, "iteration failed: {}", outcome);
                failure = Some(outcome);
                failing_history = Some(history);
                break;
            }
        }
        runner.close();

        let report = StressReport {
            iterations: iterations.current_iteration(),
            successful_runs,
            failed_runs: usize::from(failure.is_some()),
            seeds_used: iterations.seeds_used().to_vec(),
            failure,
            failing_history,
            wall_time: start.elapsed(),
        };
        info!(
            "Stress suite completed: {}/{} iterations successful",
            report.successful_runs, report.iterations
        );
        Ok(report)
    }
}
