//! Peer program shared by the runner tests.

use std::time::Duration;

use moonpool_stress::{
    CalibrationContext, DistributedConfiguration, DistributedRunner, Environment, Event,
    ExecutionScenario, Message, Node, NodeId, Operation,
};
use parking_lot::Mutex;

/// Body that the receiver answers with [`PONG`].
pub const PING: u32 = 5;
/// Answer to [`PING`].
pub const PONG: u32 = 10;
/// Body that makes the receiver's handler panic.
pub const POISON: u32 = 666;

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

/// Records every delivered message and answers pings.
pub struct Peer {
    pub env: Environment<u32>,
    received: Mutex<Vec<(NodeId, u32)>>,
    reject_in_validation: bool,
    reject_crashes: bool,
}

impl Peer {
    pub fn new(env: Environment<u32>) -> Self {
        Self {
            env,
            received: Mutex::new(Vec::new()),
            reject_in_validation: false,
            reject_crashes: false,
        }
    }

    /// A peer whose validation fails whenever any node crashed during the run.
    pub fn crash_intolerant(env: Environment<u32>) -> Self {
        Self {
            reject_crashes: true,
            ..Self::new(env)
        }
    }

    /// A peer whose post-run validation always fails on node 1.
    pub fn strict(env: Environment<u32>) -> Self {
        Self {
            reject_in_validation: true,
            ..Self::new(env)
        }
    }

    pub fn send(&self, body: u32, receiver: NodeId) {
        self.env.send(Message::new(body), receiver);
    }

    pub fn has_received(&self, body: u32) -> bool {
        self.received.lock().iter().any(|(_, b)| *b == body)
    }

    /// Spin until `body` arrives or the run stops.
    pub fn wait_for(&self, body: u32) -> bool {
        while self.env.is_running() {
            if self.has_received(body) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }
}

impl Node for Peer {
    type Body = u32;

    fn on_message(&self, message: &Message<u32>, sender: NodeId) {
        let body = *message.body();
        if body == POISON {
            panic!("poisoned by node {sender}");
        }
        self.received.lock().push((sender, body));
        if body == PING {
            self.send(PONG, sender);
        }
    }

    fn validate(&self, events: &[Event<u32>], _nodes: &[std::sync::Arc<Self>]) {
        assert!(
            !(self.reject_in_validation && self.env.id() == 1),
            "node 1 rejects every run"
        );
        if self.reject_crashes {
            let crashes = events
                .iter()
                .filter(|e| matches!(e, Event::NodeCrash { .. }))
                .count();
            assert_eq!(crashes, 0, "{crashes} nodes crashed");
        }
    }

    fn state_representation(&self) -> Option<String> {
        Some(format!("received {:?}", self.received.lock()))
    }
}

/// Runner over `parallel` with fresh peers.
pub fn runner(
    config: DistributedConfiguration,
    parallel: Vec<Vec<Operation<Peer>>>,
) -> DistributedRunner<Peer> {
    runner_with(config, parallel, Peer::new, CalibrationContext::new())
}

pub fn runner_with<F>(
    config: DistributedConfiguration,
    parallel: Vec<Vec<Operation<Peer>>>,
    factory: F,
    calibration: CalibrationContext,
) -> DistributedRunner<Peer>
where
    F: Fn(Environment<u32>) -> Peer + Send + Sync + 'static,
{
    DistributedRunner::new(
        config,
        ExecutionScenario::parallel(parallel),
        Box::new(factory),
        calibration,
    )
    .expect("valid runner")
}

/// `(sender, receiver, body)` of a message event.
pub fn route(event: &Event<u32>) -> Option<(NodeId, NodeId, u32)> {
    let message = event.message()?;
    Some((message.sender()?, message.receiver()?, *message.body()))
}
