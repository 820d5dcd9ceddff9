//! Background message delivery.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, trace};

use super::environment::RunContext;
use super::report::panic_message;
use crate::events::Event;
use crate::node::Node;

/// Drains the run's queue and hands messages to the receivers' handlers.
///
/// Handlers run one at a time on the broker thread, concurrently with every
/// node's own operations.
pub(crate) struct MessageBroker<N: Node> {
    ctx: Arc<RunContext<N::Body>>,
    nodes: Arc<[Arc<N>]>,
}

impl<N: Node> MessageBroker<N> {
    pub(crate) fn new(ctx: Arc<RunContext<N::Body>>, nodes: Arc<[Arc<N>]>) -> Self {
        Self { ctx, nodes }
    }

    /// Poll until the run stops.
    ///
    /// A panicking handler stops the run and is returned as the error.
    pub(crate) fn run(self) -> Result<usize, String> {
        let ctx = &self.ctx;
        let mut delivered = 0usize;
        debug!("message broker started");

        while !ctx.running.is_cancelled() {
            if let Some((first, second)) = ctx.partitions.heal_expired() {
                debug!(?first, ?second, "network partition healed");
                ctx.events.push(Event::PartitionHealed { first, second });
            }

            let Some(message) = ctx.queue.get() else {
                std::thread::yield_now();
                continue;
            };
            let (Some(sender), Some(receiver)) = (message.sender(), message.receiver()) else {
                continue;
            };
            if ctx.failures.is_failed(receiver) {
                trace!(sender, receiver, "receiver failed, message dropped");
                continue;
            }
            if ctx.partitions.is_separated(sender, receiver) {
                trace!(sender, receiver, "partitioned, message dropped");
                continue;
            }
            let Some(node) = self.nodes.get(receiver) else {
                continue;
            };

            ctx.events.push(Event::MessageDelivered {
                message: message.clone(),
            });
            let handled =
                panic::catch_unwind(AssertUnwindSafe(|| node.on_message(&message, sender)));
            if let Err(payload) = handled {
                let cause = panic_message(payload.as_ref());
                error!(receiver, %cause, "message handler panicked");
                ctx.stop();
                return Err(cause);
            }
            delivered += 1;
        }

        debug!(delivered, "message broker stopped");
        Ok(delivered)
    }
}
