//! Node-under-test contract, messages and operation scenarios.
//!
//! A test program is a set of [`Node`] instances built fresh for every run by
//! a factory. Scenario-driven nodes execute an ordered list of [`Operation`]s
//! on their own worker thread while the broker delivers messages to
//! [`Node::on_message`] concurrently, so node state must be interior-mutable.
//!
//! ```ignore
//! struct Counter { env: Environment<u64>, seen: Mutex<Vec<u64>> }
//!
//! impl Node for Counter {
//!     type Body = u64;
//!     fn on_message(&self, message: &Message<u64>, _sender: NodeId) {
//!         self.seen.lock().push(*message.body());
//!     }
//! }
//!
//! let op = Operation::void("ping", |node: &Counter| node.env.send(Message::new(1), 1));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::events::Event;

/// Dense integer identifier of a simulated node.
pub type NodeId = usize;

/// A message exchanged between nodes.
///
/// Sender and receiver are absent until the message goes through
/// [`Environment::send`](crate::Environment::send), which stamps both exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<B> {
    body: B,
    headers: BTreeMap<String, String>,
    sender: Option<NodeId>,
    receiver: Option<NodeId>,
}

impl<B> Message<B> {
    /// Create an unaddressed message with the given body and no headers.
    pub fn new(body: B) -> Self {
        Self {
            body,
            headers: BTreeMap::new(),
            sender: None,
            receiver: None,
        }
    }

    /// Attach a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// The message body.
    pub fn body(&self) -> &B {
        &self.body
    }

    /// The message headers.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Sending node, once the message has been sent.
    pub fn sender(&self) -> Option<NodeId> {
        self.sender
    }

    /// Destination node, once the message has been sent.
    pub fn receiver(&self) -> Option<NodeId> {
        self.receiver
    }

    pub(crate) fn stamp(&mut self, sender: NodeId, receiver: NodeId) {
        self.sender = Some(sender);
        self.receiver = Some(receiver);
    }
}

impl<B: fmt::Debug> fmt::Display for Message<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body={:?}", self.body)?;
        if !self.headers.is_empty() {
            write!(f, " headers={:?}", self.headers)?;
        }
        Ok(())
    }
}

/// A participant of the distributed program under test.
///
/// `on_message` runs on the broker thread while the node's own operations run
/// on its worker thread, both through `&self`.
pub trait Node: Send + Sync + 'static {
    /// Body type carried by this program's messages.
    type Body: Clone + fmt::Debug + Send + Sync + 'static;

    /// Handle a delivered message.
    fn on_message(&self, message: &Message<Self::Body>, sender: NodeId);

    /// Post-run validation, called once per node after all operations completed.
    ///
    /// Should panic on violation. `nodes` holds every node of the run, indexed by id.
    fn validate(&self, _events: &[Event<Self::Body>], _nodes: &[Arc<Self>]) {}

    /// Optional human-readable state, included in the run's state representation.
    fn state_representation(&self) -> Option<String> {
        None
    }
}

/// Result of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationResult {
    /// The operation returned nothing.
    Void,
    /// The operation returned a value, rendered with `Debug`.
    Value(String),
    /// The operation did not finish (node crashed and never returned, or the run stopped).
    Incomplete,
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationResult::Void => write!(f, "void"),
            OperationResult::Value(v) => write!(f, "{v}"),
            OperationResult::Incomplete => write!(f, "-"),
        }
    }
}

type OperationFn<N> = dyn Fn(&N) -> OperationResult + Send + Sync;

/// A named operation executed against a node on that node's worker thread.
pub struct Operation<N> {
    name: String,
    run: Arc<OperationFn<N>>,
}

impl<N> Operation<N> {
    /// Create an operation from a closure returning an [`OperationResult`].
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&N) -> OperationResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            run: Arc::new(f),
        }
    }

    /// Create an operation whose return value is recorded with `Debug`.
    pub fn value<T, F>(name: impl Into<String>, f: F) -> Self
    where
        T: fmt::Debug,
        F: Fn(&N) -> T + Send + Sync + 'static,
    {
        Self::new(name, move |node| OperationResult::Value(format!("{:?}", f(node))))
    }

    /// Create an operation that returns nothing.
    pub fn void<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&N) + Send + Sync + 'static,
    {
        Self::new(name, move |node| {
            f(node);
            OperationResult::Void
        })
    }

    /// Operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, node: &N) -> OperationResult {
        (self.run)(node)
    }
}

impl<N> Clone for Operation<N> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            run: Arc::clone(&self.run),
        }
    }
}

impl<N> fmt::Debug for Operation<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("run", &"<closure>")
            .finish()
    }
}

/// Operation sequences for one invocation, supplied by the scenario generator.
///
/// Only `parallel` is executed by the runner, one sequence per
/// scenario-driven node. `init` and `post` travel with the scenario for the
/// verifier.
pub struct ExecutionScenario<N> {
    /// Operations preceding the parallel part.
    pub init: Vec<Operation<N>>,
    /// One operation sequence per scenario-driven node.
    pub parallel: Vec<Vec<Operation<N>>>,
    /// Cleanup operations following the parallel part.
    pub post: Vec<Operation<N>>,
}

impl<N> ExecutionScenario<N> {
    /// Scenario with only a parallel part.
    pub fn parallel(parallel: Vec<Vec<Operation<N>>>) -> Self {
        Self {
            init: Vec::new(),
            parallel,
            post: Vec::new(),
        }
    }

    /// The same scenario with its post (cleanup) phase dropped.
    pub fn without_post(&self) -> Self {
        Self {
            init: self.init.clone(),
            parallel: self.parallel.clone(),
            post: Vec::new(),
        }
    }
}

impl<N> Clone for ExecutionScenario<N> {
    fn clone(&self) -> Self {
        Self {
            init: self.init.clone(),
            parallel: self.parallel.clone(),
            post: self.post.clone(),
        }
    }
}

impl<N> fmt::Debug for ExecutionScenario<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionScenario")
            .field("init", &self.init)
            .field("parallel", &self.parallel)
            .field("post", &self.post)
            .finish()
    }
}

impl<N> fmt::Display for ExecutionScenario<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |ops: &[Operation<N>]| {
            ops.iter()
                .map(|op| op.name().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        if !self.init.is_empty() {
            writeln!(f, "init: [{}]", names(&self.init))?;
        }
        for (node, ops) in self.parallel.iter().enumerate() {
            writeln!(f, "node {node}: [{}]", names(ops))?;
        }
        if !self.post.is_empty() {
            writeln!(f, "post: [{}]", names(&self.post))?;
        }
        Ok(())
    }
}
