//! Per-run shared state and the node-facing [`Environment`].
//!
//! Every send goes through [`Environment::send`] on the caller's thread,
//! which is where loss, duplication, crashes, recoveries and partitions are
//! applied to the sender.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::chaos::{FailureTable, FaultOracle, PartitionTable};
use crate::config::{CrashMode, DistributedConfiguration, NetworkPartitionMode};
use crate::events::{Event, EventLog};
use crate::node::{Message, NodeId};
use crate::queue::MessageQueue;
use crate::resolver::NodeAddressResolver;
use crate::rng::SimRng;

/// Everything one run shares between node threads and the broker.
pub(crate) struct RunContext<B> {
    pub(crate) config: Arc<DistributedConfiguration>,
    pub(crate) resolver: Arc<NodeAddressResolver>,
    pub(crate) oracle: Arc<FaultOracle>,
    pub(crate) queue: Arc<dyn MessageQueue<B>>,
    pub(crate) events: EventLog<B>,
    pub(crate) failures: FailureTable,
    pub(crate) partitions: PartitionTable,
    pub(crate) counters: Box<[AtomicUsize]>,
    pub(crate) chaos_rng: SimRng,
    pub(crate) running: CancellationToken,
}

impl<B> RunContext<B> {
    pub(crate) fn new(
        config: Arc<DistributedConfiguration>,
        resolver: Arc<NodeAddressResolver>,
        oracle: Arc<FaultOracle>,
        queue: Arc<dyn MessageQueue<B>>,
        chaos_rng: SimRng,
    ) -> Self {
        let total = resolver.total_nodes();
        Self {
            failures: FailureTable::new(total, config.max_failed_nodes),
            partitions: PartitionTable::new(),
            counters: (0..total).map(|_| AtomicUsize::new(0)).collect(),
            events: EventLog::new(),
            running: CancellationToken::new(),
            config,
            resolver,
            oracle,
            queue,
            chaos_rng,
        }
    }

    /// Sent-message count of every node.
    pub(crate) fn message_counts(&self) -> Vec<usize> {
        self.counters
            .iter()
            .map(|c| c.load(Ordering::Acquire))
            .collect()
    }

    pub(crate) fn stop(&self) {
        self.running.cancel();
    }
}

/// A node's handle on the simulated network.
///
/// Built by the runner for every node at the start of each run and handed to
/// the node factory.
pub struct Environment<B> {
    id: NodeId,
    group: String,
    ctx: Arc<RunContext<B>>,
    handle: Handle,
}

impl<B> Clone for Environment<B> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            group: self.group.clone(),
            ctx: Arc::clone(&self.ctx),
            handle: self.handle.clone(),
        }
    }
}

impl<B> std::fmt::Debug for Environment<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.id)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

impl<B: Clone + Send + 'static> Environment<B> {
    pub(crate) fn new(id: NodeId, group: String, ctx: Arc<RunContext<B>>, handle: Handle) -> Self {
        Self {
            id,
            group,
            ctx,
            handle,
        }
    }

    /// This node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// This node's group name.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Total number of nodes in the run.
    pub fn total_nodes(&self) -> usize {
        self.ctx.resolver.total_nodes()
    }

    /// Number of scenario-driven nodes.
    pub fn nodes_with_scenario(&self) -> usize {
        self.ctx.resolver.nodes_with_scenario()
    }

    /// Ids of the nodes of `group`, ascending.
    pub fn ids_for(&self, group: &str) -> Vec<NodeId> {
        self.ctx.resolver.ids_for(group)
    }

    /// Whether the run is still active. Long-running operations should poll this.
    pub fn is_running(&self) -> bool {
        !self.ctx.running.is_cancelled()
    }

    /// Send `message` to `receiver`.
    ///
    /// Never fails: lost messages, messages from failed senders and messages
    /// sent after the run stopped are dropped silently. The sender may crash
    /// inside this call; with recoveries enabled the call blocks for the
    /// recovery delay and returns without sending.
    pub fn send(&self, mut message: Message<B>, receiver: NodeId) {
        message.stamp(self.id, receiver);
        let ctx = &self.ctx;

        if !self.is_running() {
            trace!(sender = self.id, receiver, "run stopped, send dropped");
            return;
        }
        if !ctx.resolver.contains(receiver) {
            debug!(sender = self.id, receiver, "unknown receiver, send dropped");
            return;
        }
        if ctx.failures.is_failed(self.id) {
            return;
        }

        if let Some(counter) = ctx.counters.get(self.id) {
            counter.fetch_add(1, Ordering::AcqRel);
        }
        ctx.oracle.decision_point();
        let copies = ctx.oracle.duplication_rate();

        if self.maybe_crash() {
            return;
        }
        self.maybe_partition();

        for _ in 0..copies {
            ctx.events.push(Event::MessageSent {
                message: message.clone(),
            });
            ctx.queue.put(message.clone());
        }
    }

    /// Send a copy of `message` to every other node.
    pub fn broadcast(&self, message: Message<B>) {
        for receiver in (0..self.total_nodes()).filter(|id| *id != self.id) {
            self.send(message.clone(), receiver);
        }
    }

    fn maybe_crash(&self) -> bool {
        let ctx = &self.ctx;
        let config = &ctx.config;
        if config.crash_mode == CrashMode::NoCrashes
            || config.max_failed_nodes == 0
            || !ctx.resolver.can_fail(self.id)
        {
            return false;
        }

        let remaining = ctx.failures.remaining();
        if !ctx.oracle.node_failed(remaining) {
            return false;
        }
        if !ctx
            .oracle
            .chance(remaining as f64 / config.max_failed_nodes as f64)
        {
            return false;
        }
        if !ctx.failures.try_fail(self.id) {
            return false;
        }

        ctx.events.push(Event::NodeCrash { node: self.id });
        info!(node = self.id, failed = ctx.failures.failed_count(), "node crashed");

        let recovers = match config.crash_mode {
            CrashMode::AllRecoveries => true,
            CrashMode::Mixed => ctx.oracle.node_recovered(),
            CrashMode::NoRecoveries | CrashMode::NoCrashes => false,
        };
        if recovers {
            let delay = ctx.chaos_rng.random_duration(config.recovery_delay.clone());
            self.pause(delay);
            ctx.failures.recover(self.id);
            ctx.events.push(Event::NodeRecovery { node: self.id });
            info!(node = self.id, ?delay, "node recovered");
        }
        true
    }

    fn maybe_partition(&self) {
        let ctx = &self.ctx;
        let mode = ctx.config.partition_mode;
        if mode == NetworkPartitionMode::None || ctx.partitions.is_active() {
            return;
        }
        if !ctx.oracle.is_network_partition() {
            return;
        }

        let duration = ctx
            .chaos_rng
            .random_duration(ctx.config.partition_duration.clone());
        if let Some((first, second)) =
            ctx.partitions
                .start(mode, &ctx.chaos_rng, self.total_nodes(), duration)
        {
            info!(?first, ?second, ?duration, "network partition started");
            ctx.events.push(Event::NetworkPartition { first, second });
        }
    }

    /// Sleep for `delay`, returning early once the run stops.
    fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        let token = self.ctx.running.clone();
        self.handle.block_on(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        });
    }
}
