//! Per-node operation execution and logical clocks.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::node::{NodeId, Operation, OperationResult};

/// Happens-before vector clock attached to one operation.
///
/// Entry `j` is the number of operations scenario node `j` had completed when
/// the operation started.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HBClock(Vec<usize>);

impl HBClock {
    /// Clock from raw entries.
    pub fn new(values: Vec<usize>) -> Self {
        Self(values)
    }

    /// All-zero clock for `nodes` scenario nodes.
    pub fn empty(nodes: usize) -> Self {
        Self(vec![0; nodes])
    }

    /// Raw entries.
    pub fn values(&self) -> &[usize] {
        &self.0
    }

    /// Returns `true` if every entry is zero.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|v| *v == 0)
    }

    /// Whether operation `operation` of `node` completed before this clock was taken.
    pub fn happens_before(&self, node: NodeId, operation: usize) -> bool {
        self.0.get(node).is_some_and(|completed| *completed > operation)
    }
}

impl fmt::Display for HBClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", values.join(","))
    }
}

/// Result of one operation paired with its clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultWithClock {
    /// What the operation returned.
    pub result: OperationResult,
    /// Clock taken when the operation started.
    pub clock: HBClock,
}

/// Progress of every scenario node, shared by all executions of a runner.
pub(crate) type ProgressTable = Arc<[AtomicUsize]>;

pub(crate) fn progress_table(nodes: usize) -> ProgressTable {
    (0..nodes).map(|_| AtomicUsize::new(0)).collect()
}

/// Operation sequence of one scenario node, cross-linked with the others
/// through the shared progress table.
pub(crate) struct NodeExecution<N> {
    node: NodeId,
    operations: Vec<Operation<N>>,
    progress: ProgressTable,
}

impl<N> NodeExecution<N> {
    pub(crate) fn new(
        node: NodeId,
        operations: Vec<Operation<N>>,
        progress: ProgressTable,
    ) -> Self {
        Self {
            node,
            operations,
            progress,
        }
    }

    pub(crate) fn node(&self) -> NodeId {
        self.node
    }

    pub(crate) fn len(&self) -> usize {
        self.operations.len()
    }

    pub(crate) fn completed(&self) -> usize {
        self.progress
            .get(self.node)
            .map_or(0, |p| p.load(Ordering::Acquire))
    }

    /// Name of the operation the node is executing, if it has not finished.
    pub(crate) fn current_operation(&self) -> Option<&str> {
        self.operations.get(self.completed()).map(Operation::name)
    }

    /// Results before anything ran: every entry incomplete with a zero clock.
    pub(crate) fn initial_results(&self) -> Vec<ResultWithClock> {
        self.operations
            .iter()
            .map(|_| ResultWithClock {
                result: OperationResult::Incomplete,
                clock: HBClock::empty(self.progress.len()),
            })
            .collect()
    }

    fn clock_for(&self, index: usize, use_clocks: bool) -> HBClock {
        if !use_clocks {
            return HBClock::empty(self.progress.len());
        }
        HBClock::new(
            self.progress
                .iter()
                .enumerate()
                .map(|(j, p)| {
                    if j == self.node {
                        index
                    } else {
                        p.load(Ordering::Acquire)
                    }
                })
                .collect(),
        )
    }

    /// Run the operations in order on the calling thread until done or cancelled.
    pub(crate) fn run(
        &self,
        instance: &N,
        use_clocks: bool,
        running: &CancellationToken,
        results: &Mutex<Vec<ResultWithClock>>,
    ) {
        for (index, operation) in self.operations.iter().enumerate() {
            if running.is_cancelled() {
                debug!(node = self.node, index, "run stopped before operation");
                return;
            }
            let clock = self.clock_for(index, use_clocks);
            let result = operation.invoke(instance);
            if let Some(slot) = results.lock().get_mut(index) {
                *slot = ResultWithClock { result, clock };
            }
            if let Some(p) = self.progress.get(self.node) {
                p.store(index + 1, Ordering::Release);
            }
        }
    }
}

/// Executions of one run, cross-linked through a fresh progress table.
///
/// Threads abandoned by an earlier run keep their own table, so they cannot
/// touch this run's progress.
pub(crate) fn executions_for_run<N>(
    parallel: &[Vec<Operation<N>>],
) -> Vec<Arc<NodeExecution<N>>> {
    let progress = progress_table(parallel.len());
    parallel
        .iter()
        .enumerate()
        .map(|(node, ops)| {
            Arc::new(NodeExecution::new(
                node,
                ops.clone(),
                Arc::clone(&progress),
            ))
        })
        .collect()
}
