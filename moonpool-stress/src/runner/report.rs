//! Run outcomes and suite reports.

use std::any::Any;
use std::fmt;
use std::time::Duration;

use super::execution::ResultWithClock;
use crate::events::Event;
use crate::node::{ExecutionScenario, Node, NodeId};

/// Lifecycle of a runner. The last four states are terminal for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Built, no run started yet.
    Init,
    /// Per-run state being rebuilt.
    Reset,
    /// Node operations executing.
    Running,
    /// All operations finished and every check passed.
    Completed,
    /// A live node did not finish within the timeout.
    Deadlocked,
    /// An operation or message handler panicked.
    Crashed,
    /// Validation or a message budget failed.
    InvariantViolated,
}

/// Everything a completed run hands to the verifier.
#[derive(Debug, Clone)]
pub struct ExecutionResult<B> {
    /// Seed of the run.
    pub seed: u64,
    /// Per scenario node, one `(result, clock)` pair per operation.
    pub parallel_results: Vec<Vec<ResultWithClock>>,
    /// Ordered event log.
    pub events: Vec<Event<B>>,
    /// Sent-message count per node.
    pub message_counts: Vec<usize>,
    /// Event log followed by every node's state.
    pub state_representation: String,
    /// Whether logical clocks were tracked.
    pub used_clocks: bool,
}

/// Progress of one node when a run was declared deadlocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    /// Node id.
    pub node: NodeId,
    /// Group name.
    pub group: String,
    /// Whether the node was marked failed.
    pub failed: bool,
    /// Operations completed.
    pub completed_operations: usize,
    /// Operations in the node's sequence.
    pub total_operations: usize,
    /// Operation in progress, if any.
    pub current_operation: Option<String>,
}

impl NodeSnapshot {
    /// Whether every operation completed.
    pub fn finished(&self) -> bool {
        self.completed_operations >= self.total_operations
    }
}

impl fmt::Display for NodeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node {} ({}): {}/{} operations",
            self.node, self.group, self.completed_operations, self.total_operations
        )?;
        if let Some(op) = &self.current_operation {
            write!(f, ", stuck in '{op}'")?;
        }
        if self.failed {
            write!(f, " [failed]")?;
        }
        Ok(())
    }
}

/// Which message budget was exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetViolation {
    /// One node sent more than `messages_per_node`.
    PerNode {
        /// Offending node.
        node: NodeId,
        /// Messages it sent.
        sent: usize,
        /// Configured cap.
        limit: usize,
    },
    /// All nodes together sent more than `total_messages`.
    Total {
        /// Messages sent in total.
        sent: usize,
        /// Configured cap.
        limit: usize,
    },
}

impl fmt::Display for BudgetViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetViolation::PerNode { node, sent, limit } => {
                write!(f, "node {node} sent {sent} messages (limit {limit})")
            }
            BudgetViolation::Total { sent, limit } => {
                write!(f, "{sent} messages sent in total (limit {limit})")
            }
        }
    }
}

/// Outcome of one run.
pub enum InvocationResult<N: Node> {
    /// Every operation finished and every check passed.
    Completed(ExecutionResult<N::Body>),
    /// A live node did not finish within the operation timeout.
    Deadlocked {
        /// Seed of the run.
        seed: u64,
        /// Progress of every node at the time of the timeout.
        snapshot: Vec<NodeSnapshot>,
    },
    /// An operation or a message handler panicked.
    Crashed {
        /// Seed of the run.
        seed: u64,
        /// Node whose operation panicked, `None` for a message handler.
        node: Option<NodeId>,
        /// Panic message.
        cause: String,
    },
    /// A node's post-run validation panicked.
    ValidationFailed {
        /// Seed of the run.
        seed: u64,
        /// The scenario without its post phase.
        scenario: ExecutionScenario<N>,
        /// Node whose validation failed.
        node: NodeId,
        /// Group of that node.
        group: String,
        /// Panic message.
        message: String,
    },
    /// A message budget was exceeded.
    BudgetExceeded {
        /// Seed of the run.
        seed: u64,
        /// The exceeded budget.
        violation: BudgetViolation,
        /// Sent-message count per node.
        counts: Vec<usize>,
    },
}

impl<N: Node> InvocationResult<N> {
    /// Returns `true` for [`InvocationResult::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, InvocationResult::Completed(_))
    }

    /// Seed of the run.
    pub fn seed(&self) -> u64 {
        match self {
            InvocationResult::Completed(result) => result.seed,
            InvocationResult::Deadlocked { seed, .. }
            | InvocationResult::Crashed { seed, .. }
            | InvocationResult::ValidationFailed { seed, .. }
            | InvocationResult::BudgetExceeded { seed, .. } => *seed,
        }
    }

    /// Terminal state the run ended in.
    pub fn state(&self) -> RunnerState {
        match self {
            InvocationResult::Completed(_) => RunnerState::Completed,
            InvocationResult::Deadlocked { .. } => RunnerState::Deadlocked,
            InvocationResult::Crashed { .. } => RunnerState::Crashed,
            InvocationResult::ValidationFailed { .. } | InvocationResult::BudgetExceeded { .. } => {
                RunnerState::InvariantViolated
            }
        }
    }

    /// The execution result of a completed run.
    pub fn completed(&self) -> Option<&ExecutionResult<N::Body>> {
        match self {
            InvocationResult::Completed(result) => Some(result),
            _ => None,
        }
    }
}

impl<N: Node> fmt::Debug for InvocationResult<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationResult::Completed(result) => {
                f.debug_tuple("Completed").field(result).finish()
            }
            InvocationResult::Deadlocked { seed, snapshot } => f
                .debug_struct("Deadlocked")
                .field("seed", seed)
                .field("snapshot", snapshot)
                .finish(),
            InvocationResult::Crashed { seed, node, cause } => f
                .debug_struct("Crashed")
                .field("seed", seed)
                .field("node", node)
                .field("cause", cause)
                .finish(),
            InvocationResult::ValidationFailed {
                seed,
                scenario,
                node,
                group,
                message,
            } => f
                .debug_struct("ValidationFailed")
                .field("seed", seed)
                .field("scenario", scenario)
                .field("node", node)
                .field("group", group)
                .field("message", message)
                .finish(),
            InvocationResult::BudgetExceeded {
                seed,
                violation,
                counts,
            } => f
                .debug_struct("BudgetExceeded")
                .field("seed", seed)
                .field("violation", violation)
                .field("counts", counts)
                .finish(),
        }
    }
}

impl<N: Node> fmt::Display for InvocationResult<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationResult::Completed(result) => write!(
                f,
                "completed (seed {}, {} events, {} messages)",
                result.seed,
                result.events.len(),
                result.message_counts.iter().sum::<usize>()
            ),
            InvocationResult::Deadlocked { seed, snapshot } => {
                writeln!(f, "deadlocked (seed {seed})")?;
                for node in snapshot {
                    writeln!(f, "  {node}")?;
                }
                Ok(())
            }
            InvocationResult::Crashed { seed, node, cause } => match node {
                Some(node) => write!(f, "node {node} crashed (seed {seed}): {cause}"),
                None => write!(f, "message handler crashed (seed {seed}): {cause}"),
            },
            InvocationResult::ValidationFailed {
                seed,
                scenario,
                node,
                group,
                message,
            } => {
                writeln!(f, "validation failed on node {node} ({group}) (seed {seed}): {message}")?;
                write!(f, "{scenario}")
            }
            InvocationResult::BudgetExceeded {
                seed,
                violation,
                counts,
            } => write!(f, "message budget exceeded (seed {seed}): {violation}, counts {counts:?}"),
        }
    }
}

/// Render the event log followed by every node's state.
pub(crate) fn state_representation<B: fmt::Debug>(
    events: &[Event<B>],
    states: impl IntoIterator<Item = Option<String>>,
) -> String {
    let mut out = String::from("MESSAGES\n");
    for event in events {
        out.push_str(&event.to_string());
        out.push('\n');
    }
    out.push_str("NODE STATES\n");
    for (id, state) in states.into_iter().enumerate() {
        out.push_str(&format!("{id}: {}\n", state.as_deref().unwrap_or("-")));
    }
    out
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Summary of a stress suite.
pub struct StressReport<N: Node> {
    /// Runs executed.
    pub iterations: usize,
    /// Runs that completed.
    pub successful_runs: usize,
    /// Runs that did not complete.
    pub failed_runs: usize,
    /// Seed of every run, in order.
    pub seeds_used: Vec<u64>,
    /// The first failing run, if any.
    pub failure: Option<InvocationResult<N>>,
    /// Calibration history the failing run started from.
    ///
    /// Feed it to [`CalibrationContext::with_history`](crate::CalibrationContext::with_history)
    /// to replay the failing seed with the same fault probabilities.
    pub failing_history: Option<usize>,
    /// Wall-clock time of the whole suite.
    pub wall_time: Duration,
}

impl<N: Node> StressReport<N> {
    /// Percentage of completed runs.
    pub fn success_rate(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            (self.successful_runs as f64 / self.iterations as f64) * 100.0
        }
    }

    /// Seed of the first failing run.
    pub fn failing_seed(&self) -> Option<u64> {
        self.failure.as_ref().map(InvocationResult::seed)
    }

    /// Returns `true` if every run completed.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

impl<N: Node> fmt::Debug for StressReport<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StressReport")
            .field("iterations", &self.iterations)
            .field("successful_runs", &self.successful_runs)
            .field("failed_runs", &self.failed_runs)
            .field("seeds_used", &self.seeds_used)
            .field("failure", &self.failure)
            .field("failing_history", &self.failing_history)
            .field("wall_time", &self.wall_time)
            .finish()
    }
}

impl<N: Node> fmt::Display for StressReport<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Stress Report ===")?;
        writeln!(f, "Iterations: {}", self.iterations)?;
        writeln!(f, "Successful: {}", self.successful_runs)?;
        writeln!(f, "Failed: {}", self.failed_runs)?;
        writeln!(f, "Success Rate: {:.2}%", self.success_rate())?;
        writeln!(f)?;
        writeln!(f, "Wall Time: {:?}", self.wall_time)?;

        if let Some(failure) = &self.failure {
            writeln!(f)?;
            writeln!(f, "Faulty seed: {}", failure.seed())?;
            if let Some(points) = self.failing_history {
                writeln!(f, "Calibration history: {points}")?;
            }
            writeln!(f, "{failure}")?;
        }
        Ok(())
    }
}
