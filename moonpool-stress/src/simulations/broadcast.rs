//! Echo broadcast workload.
//!
//! Every scenario node originates a few rumors and broadcasts them. Any node
//! that learns a rumor for the first time re-broadcasts it, so a rumor reaches
//! every live node as long as one copy gets through.
//!
//! Validation checks integrity only (nothing is delivered that was not sent,
//! and every delivered rumor was originated by its claimed origin), which
//! must hold under every fault the runner injects.

use std::collections::BTreeSet;

use parking_lot::Mutex;

use crate::config::DistributedConfiguration;
use crate::events::Event;
use crate::node::{ExecutionScenario, Message, Node, NodeId, Operation};
use crate::runner::{Environment, StressBuilder};

/// A broadcast payload, identified by its origin and sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rumor {
    /// Node that originated the rumor.
    pub origin: NodeId,
    /// Per-origin sequence number.
    pub seq: u64,
}

/// A node of the echo broadcast protocol.
pub struct BroadcastNode {
    env: Environment<Rumor>,
    originated: Mutex<Vec<u64>>,
    seen: Mutex<BTreeSet<Rumor>>,
}

impl BroadcastNode {
    /// Create a node bound to `env`.
    pub fn new(env: Environment<Rumor>) -> Self {
        Self {
            env,
            originated: Mutex::new(Vec::new()),
            seen: Mutex::new(BTreeSet::new()),
        }
    }

    /// Originate rumor `seq` and broadcast it.
    pub fn broadcast(&self, seq: u64) {
        let rumor = Rumor {
            origin: self.env.id(),
            seq,
        };
        self.originated.lock().push(seq);
        self.seen.lock().insert(rumor);
        self.env.broadcast(Message::new(rumor));
    }

    /// Number of distinct rumors known to this node.
    pub fn seen(&self) -> usize {
        self.seen.lock().len()
    }

    fn originated(&self, seq: u64) -> bool {
        self.originated.lock().contains(&seq)
    }
}

impl Node for BroadcastNode {
    type Body = Rumor;

    fn on_message(&self, message: &Message<Rumor>, _sender: NodeId) {
        let rumor = *message.body();
        let fresh = self.seen.lock().insert(rumor);
        if fresh {
            self.env.broadcast(Message::new(rumor));
        }
    }

    fn validate(&self, events: &[Event<Rumor>], nodes: &[std::sync::Arc<Self>]) {
        let mut in_flight: Vec<&Message<Rumor>> = Vec::new();
        for event in events {
            match event {
                Event::MessageSent { message } => in_flight.push(message),
                Event::MessageDelivered { message } => {
                    let Some(position) = in_flight.iter().position(|m| *m == message) else {
                        panic!("delivered without a send: {message}");
                    };
                    in_flight.swap_remove(position);
                }
                _ => {}
            }
        }

        for rumor in self.seen.lock().iter() {
            let origin = nodes.get(rumor.origin);
            assert!(
                origin.is_some_and(|node| node.originated(rumor.seq)),
                "node {} knows rumor {rumor:?} that was never originated",
                self.env.id()
            );
        }
    }

    fn state_representation(&self) -> Option<String> {
        Some(format!("{} rumors {:?}", self.seen(), self.seen.lock()))
    }
}

/// Scenario where each of `nodes` nodes originates `rumors` rumors, then reports how many it knows.
pub fn scenario(nodes: usize, rumors: u64) -> ExecutionScenario<BroadcastNode> {
    let parallel = (0..nodes)
        .map(|_| {
            let mut ops: Vec<Operation<BroadcastNode>> = (0..rumors)
                .map(|seq| {
                    Operation::void(format!("broadcast({seq})"), move |node: &BroadcastNode| {
                        node.broadcast(seq)
                    })
                })
                .collect();
            ops.push(Operation::value("seen", BroadcastNode::seen));
            ops
        })
        .collect();
    ExecutionScenario::parallel(parallel)
}

/// Stress suite of the broadcast workload for `config`.
pub fn stress_builder(
    config: DistributedConfiguration,
    rumors: u64,
) -> StressBuilder<BroadcastNode> {
    let nodes = config.nodes;
    StressBuilder::new(config, scenario(nodes, rumors), BroadcastNode::new)
}
