//! Per-run lifecycle of a distributed stress runner.
//!
//! ```text
//! INIT ──► RESET ──► RUNNING ──┬──► COMPLETED
//!            ▲                 ├──► DEADLOCKED
//!            │                 ├──► CRASHED
//!            └── next run ◄────┴──► INVARIANT_VIOLATED
//! ```
//!
//! Each scenario node runs its operation sequence on a blocking-pool thread
//! while the broker delivers messages on another. The orchestrator waits for
//! every node in id order, each with the configured operation timeout, then
//! validates, joins the broker and checks message budgets.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::broker::MessageBroker;
use super::environment::{Environment, RunContext};
use super::execution::{executions_for_run, NodeExecution, ResultWithClock};
use super::report::{
    panic_message, state_representation, BudgetViolation, ExecutionResult, InvocationResult,
    NodeSnapshot, RunnerState,
};
use crate::chaos::{CalibrationContext, FaultOracle};
use crate::config::{ClockMode, DistributedConfiguration};
use crate::error::{RunnerError, RunnerResult};
use crate::node::{ExecutionScenario, Node};
use crate::queue::{create_queue, MessageQueue};
use crate::resolver::NodeAddressResolver;
use crate::rng::{stream_seed, SimRng, CHAOS_STREAM, ORACLE_STREAM, QUEUE_STREAM};

/// Builds a fresh node for every run from its environment.
pub type NodeFactory<N> = Box<dyn Fn(Environment<<N as Node>::Body>) -> N + Send + Sync>;

type SharedResults = Arc<Mutex<Vec<ResultWithClock>>>;

/// How the broker ended.
enum BrokerExit {
    Stopped,
    Panicked(String),
    Stuck,
}

/// Runs a scenario against freshly built nodes under injected faults.
pub struct DistributedRunner<N: Node> {
    config: Arc<DistributedConfiguration>,
    resolver: Arc<NodeAddressResolver>,
    scenario: ExecutionScenario<N>,
    factory: NodeFactory<N>,
    executions: Vec<Arc<NodeExecution<N>>>,
    oracle: Arc<FaultOracle>,
    queue: Arc<dyn MessageQueue<N::Body>>,
    queue_rng: SimRng,
    runtime: Option<Runtime>,
    base_seed: u64,
    invocations: u64,
    state: RunnerState,
}

pub(crate) fn time_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(12345)
}

fn build_runtime(nodes: usize) -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(nodes + 1)
        .thread_name("stress-worker")
        .enable_time()
        .build()
}

impl<N: Node> DistributedRunner<N> {
    /// Validate the configuration and scenario and prepare the worker runtime.
    pub fn new(
        config: DistributedConfiguration,
        scenario: ExecutionScenario<N>,
        factory: NodeFactory<N>,
        calibration: CalibrationContext,
    ) -> RunnerResult<Self> {
        config.validate()?;
        let resolver = NodeAddressResolver::new(&config.node_group, config.nodes, &config.groups)?;
        if scenario.parallel.len() != config.nodes {
            return Err(RunnerError::ScenarioMismatch {
                expected: config.nodes,
                actual: scenario.parallel.len(),
            });
        }

        let base_seed = config.seed.unwrap_or_else(time_seed);
        let oracle = FaultOracle::new(
            &config,
            calibration,
            stream_seed(base_seed, ORACLE_STREAM),
        );
        let queue_rng = SimRng::new(stream_seed(base_seed, QUEUE_STREAM));
        let queue = create_queue(
            config.message_order,
            resolver.total_nodes(),
            queue_rng.clone(),
        );
        let runtime = build_runtime(config.nodes)?;
        let executions = executions_for_run(&scenario.parallel);

        debug!(
            nodes = config.nodes,
            total = resolver.total_nodes(),
            order = ?config.message_order,
            crash_mode = ?config.crash_mode,
            "distributed runner initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
            scenario,
            factory,
            executions,
            oracle: Arc::new(oracle),
            queue,
            queue_rng,
            runtime: Some(runtime),
            base_seed,
            invocations: 0,
            state: RunnerState::Init,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// The runner's configuration.
    pub fn config(&self) -> &DistributedConfiguration {
        &self.config
    }

    /// The node layout.
    pub fn resolver(&self) -> &NodeAddressResolver {
        &self.resolver
    }

    /// Calibration context shared with the fault oracle.
    ///
    /// Between runs it holds the history the last run started from.
    pub fn calibration(&self) -> &CalibrationContext {
        self.oracle.calibration()
    }

    /// Number of runs started so far.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Run once with a seed derived from the base seed and the run count.
    pub fn run(&mut self) -> RunnerResult<InvocationResult<N>> {
        let mut hasher = DefaultHasher::new();
        self.base_seed.hash(&mut hasher);
        self.invocations.hash(&mut hasher);
        self.run_with_seed(hasher.finish())
    }

    /// Run once with an explicit seed.
    pub fn run_with_seed(&mut self, seed: u64) -> RunnerResult<InvocationResult<N>> {
        let handle = self
            .runtime
            .as_ref()
            .map(|rt| rt.handle().clone())
            .ok_or(RunnerError::Closed)?;
        self.invocations += 1;

        self.state = RunnerState::Reset;
        let (ctx, nodes, use_clocks) = self.reset(seed, &handle);
        let broker = {
            let broker = MessageBroker::new(Arc::clone(&ctx), Arc::clone(&nodes));
            handle.spawn_blocking(move || broker.run())
        };

        self.state = RunnerState::Running;
        debug!(seed, use_clocks, "run started");
        let results: Vec<SharedResults> = self
            .executions
            .iter()
            .map(|e| Arc::new(Mutex::new(e.initial_results())))
            .collect();
        let workers: Vec<JoinHandle<()>> = self
            .executions
            .iter()
            .zip(&results)
            .map(|(execution, results)| {
                let execution = Arc::clone(execution);
                let node = Arc::clone(&nodes[execution.node()]);
                let running = ctx.running.clone();
                let results = Arc::clone(results);
                handle.spawn_blocking(move || execution.run(&node, use_clocks, &running, &results))
            })
            .collect();

        let mut abandoned = false;
        for (id, worker) in workers.into_iter().enumerate() {
            let timeout = self.config.operation_timeout;
            match handle.block_on(async move { tokio::time::timeout(timeout, worker).await }) {
                Ok(Ok(())) => {}
                Ok(Err(join_error)) => {
                    let cause = match join_error.try_into_panic() {
                        Ok(payload) => panic_message(payload.as_ref()),
                        Err(join_error) => join_error.to_string(),
                    };
                    error!(seed, node = id, %cause, "operation panicked");
                    ctx.stop();
                    let outcome = match self.join_broker(&handle, broker) {
                        BrokerExit::Panicked(handler_cause) => InvocationResult::Crashed {
                            seed,
                            node: None,
                            cause: handler_cause,
                        },
                        _ => InvocationResult::Crashed {
                            seed,
                            node: Some(id),
                            cause,
                        },
                    };
                    return self.finish(outcome, true);
                }
                Err(_elapsed) if ctx.failures.is_failed(id) => {
                    warn!(seed, node = id, "failed node did not finish, ignoring");
                    abandoned = true;
                }
                Err(_elapsed) => {
                    ctx.stop();
                    let exit = self.join_broker(&handle, broker);
                    let outcome = match exit {
                        BrokerExit::Panicked(cause) => InvocationResult::Crashed {
                            seed,
                            node: None,
                            cause,
                        },
                        _ => {
                            let snapshot = self.snapshot(&ctx);
                            error!(seed, node = id, "deadlock detected");
                            InvocationResult::Deadlocked { seed, snapshot }
                        }
                    };
                    return self.finish(outcome, true);
                }
            }
        }

        // The broker stops the run itself when a handler panics.
        let broker_failed = ctx.running.is_cancelled();
        ctx.stop();

        let parallel_results: Vec<Vec<ResultWithClock>> =
            results.iter().map(|r| r.lock().clone()).collect();

        if !broker_failed {
            if let Some(outcome) = self.validate(seed, &ctx, &nodes) {
                let _ = self.join_broker(&handle, broker);
                return self.finish(outcome, abandoned);
            }
        }

        match self.join_broker(&handle, broker) {
            BrokerExit::Stopped => {}
            BrokerExit::Panicked(cause) => {
                return self.finish(
                    InvocationResult::Crashed {
                        seed,
                        node: None,
                        cause,
                    },
                    true,
                );
            }
            BrokerExit::Stuck => {
                error!(seed, "message broker did not stop");
                let snapshot = self.snapshot(&ctx);
                return self.finish(InvocationResult::Deadlocked { seed, snapshot }, true);
            }
        }

        let counts = ctx.message_counts();
        if let Some(violation) = self.check_budgets(&counts) {
            warn!(seed, %violation, "message budget exceeded");
            return self.finish(
                InvocationResult::BudgetExceeded {
                    seed,
                    violation,
                    counts,
                },
                abandoned,
            );
        }

        let events = ctx.events.snapshot();
        let state_representation =
            state_representation(&events, nodes.iter().map(|n| n.state_representation()));
        debug!(seed, events = events.len(), "run completed");
        self.finish(
            InvocationResult::Completed(ExecutionResult {
                seed,
                parallel_results,
                events,
                message_counts: counts,
                state_representation,
                used_clocks: use_clocks,
            }),
            abandoned,
        )
    }

    /// Rebuild every per-run structure and the nodes.
    fn reset(
        &mut self,
        seed: u64,
        handle: &Handle,
    ) -> (Arc<RunContext<N::Body>>, Arc<[Arc<N>]>, bool) {
        self.queue.clear();
        self.oracle.reset(stream_seed(seed, ORACLE_STREAM));
        self.queue_rng.reseed(stream_seed(seed, QUEUE_STREAM));
        self.executions = executions_for_run(&self.scenario.parallel);

        let chaos_rng = SimRng::new(stream_seed(seed, CHAOS_STREAM));
        let use_clocks = match self.config.logical_clocks {
            ClockMode::Random => chaos_rng.random_bool(0.5),
            ClockMode::Always => true,
            ClockMode::Never => false,
        };

        let ctx = Arc::new(RunContext::new(
            Arc::clone(&self.config),
            Arc::clone(&self.resolver),
            Arc::clone(&self.oracle),
            Arc::clone(&self.queue),
            chaos_rng,
        ));
        let nodes: Arc<[Arc<N>]> = (0..self.resolver.total_nodes())
            .map(|id| {
                let group = self.resolver.group_for(id).unwrap_or_default().to_string();
                let env = Environment::new(id, group, Arc::clone(&ctx), handle.clone());
                Arc::new((self.factory)(env))
            })
            .collect();
        (ctx, nodes, use_clocks)
    }

    /// Run every node's validation; the first panic becomes the outcome.
    fn validate(
        &self,
        seed: u64,
        ctx: &RunContext<N::Body>,
        nodes: &Arc<[Arc<N>]>,
    ) -> Option<InvocationResult<N>> {
        let events = ctx.events.snapshot();
        for (id, node) in nodes.iter().enumerate() {
            let verdict = panic::catch_unwind(AssertUnwindSafe(|| node.validate(&events, nodes)));
            if let Err(payload) = verdict {
                let message = panic_message(payload.as_ref());
                let group = self.resolver.group_for(id).unwrap_or_default().to_string();
                error!(seed, node = id, %message, "validation failed");
                return Some(InvocationResult::ValidationFailed {
                    seed,
                    scenario: self.scenario.without_post(),
                    node: id,
                    group,
                    message,
                });
            }
        }
        None
    }

    fn check_budgets(&self, counts: &[usize]) -> Option<BudgetViolation> {
        let limit = self.config.messages_per_node;
        if let Some((node, &sent)) = counts.iter().enumerate().find(|(_, sent)| **sent > limit) {
            return Some(BudgetViolation::PerNode { node, sent, limit });
        }
        let sent: usize = counts.iter().sum();
        (sent > self.config.total_messages).then_some(BudgetViolation::Total {
            sent,
            limit: self.config.total_messages,
        })
    }

    fn join_broker(
        &self,
        handle: &Handle,
        broker: JoinHandle<Result<usize, String>>,
    ) -> BrokerExit {
        let timeout = self.config.operation_timeout;
        match handle.block_on(async move { tokio::time::timeout(timeout, broker).await }) {
            Ok(Ok(Ok(delivered))) => {
                debug!(delivered, "message broker joined");
                BrokerExit::Stopped
            }
            Ok(Ok(Err(cause))) => BrokerExit::Panicked(cause),
            Ok(Err(join_error)) => BrokerExit::Panicked(join_error.to_string()),
            Err(_elapsed) => BrokerExit::Stuck,
        }
    }

    fn snapshot(&self, ctx: &RunContext<N::Body>) -> Vec<NodeSnapshot> {
        (0..self.resolver.total_nodes())
            .map(|id| {
                let execution = self.executions.get(id);
                NodeSnapshot {
                    node: id,
                    group: self.resolver.group_for(id).unwrap_or_default().to_string(),
                    failed: ctx.failures.is_failed(id),
                    completed_operations: execution.map_or(0, |e| e.completed()),
                    total_operations: execution.map_or(0, |e| e.len()),
                    current_operation: execution
                        .and_then(|e| e.current_operation())
                        .map(str::to_string),
                }
            })
            .collect()
    }

    /// Record the terminal state, replacing the runtime when threads were left behind.
    fn finish(
        &mut self,
        outcome: InvocationResult<N>,
        abandoned: bool,
    ) -> RunnerResult<InvocationResult<N>> {
        self.state = outcome.state();
        if abandoned {
            info!("replacing worker runtime after abandoned threads");
            if let Some(old) = self.runtime.take() {
                old.shutdown_background();
            }
            self.runtime = Some(build_runtime(self.config.nodes)?);
        }
        Ok(outcome)
    }

    /// Shut the worker runtime down. Further runs fail with [`RunnerError::Closed`].
    pub fn close(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            debug!(invocations = self.invocations, "closing distributed runner");
            runtime.shutdown_background();
        }
    }
}

impl<N: Node> Drop for DistributedRunner<N> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<N: Node> std::fmt::Debug for DistributedRunner<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedRunner")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("invocations", &self.invocations)
            .field("closed", &self.runtime.is_none())
            .finish_non_exhaustive()
    }
}

