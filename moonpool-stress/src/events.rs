//! Run event log.
//!
//! Every transition of a run (send, delivery, crash, recovery, partition) is
//! appended to a single [`EventLog`] shared by all node threads and the
//! broker. The log is read once the run is over and handed to the verifier.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::node::{Message, NodeId};

/// Events recorded during a run, in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<B> {
    /// A copy of a message was handed to the message queue.
    MessageSent {
        /// The stamped message.
        message: Message<B>,
    },
    /// A message was handed to the receiver's handler.
    MessageDelivered {
        /// The delivered message.
        message: Message<B>,
    },
    /// A node crashed.
    NodeCrash {
        /// The crashed node.
        node: NodeId,
    },
    /// A crashed node recovered.
    NodeRecovery {
        /// The recovered node.
        node: NodeId,
    },
    /// The network was split in two components.
    NetworkPartition {
        /// First component.
        first: Vec<NodeId>,
        /// Second component.
        second: Vec<NodeId>,
    },
    /// A previous partition was healed.
    PartitionHealed {
        /// First component.
        first: Vec<NodeId>,
        /// Second component.
        second: Vec<NodeId>,
    },
}

impl<B> Event<B> {
    /// The message carried by send and delivery events.
    pub fn message(&self) -> Option<&Message<B>> {
        match self {
            Event::MessageSent { message } | Event::MessageDelivered { message } => Some(message),
            _ => None,
        }
    }

    /// Returns `true` for [`Event::MessageSent`].
    pub fn is_sent(&self) -> bool {
        matches!(self, Event::MessageSent { .. })
    }

    /// Returns `true` for [`Event::MessageDelivered`].
    pub fn is_delivered(&self) -> bool {
        matches!(self, Event::MessageDelivered { .. })
    }
}

fn fmt_node(id: Option<NodeId>) -> String {
    id.map_or_else(|| "?".to_string(), |id| id.to_string())
}

impl<B: fmt::Debug> fmt::Display for Event<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::MessageSent { message } => write!(
                f,
                "sent {} -> {}: {}",
                fmt_node(message.sender()),
                fmt_node(message.receiver()),
                message
            ),
            Event::MessageDelivered { message } => write!(
                f,
                "delivered {} -> {}: {}",
                fmt_node(message.sender()),
                fmt_node(message.receiver()),
                message
            ),
            Event::NodeCrash { node } => write!(f, "node {node} crashed"),
            Event::NodeRecovery { node } => write!(f, "node {node} recovered"),
            Event::NetworkPartition { first, second } => {
                write!(f, "partition {first:?} | {second:?}")
            }
            Event::PartitionHealed { first, second } => {
                write!(f, "partition healed {first:?} | {second:?}")
            }
        }
    }
}

/// Append-only event log, safe for concurrent producers.
#[derive(Debug)]
pub struct EventLog<B> {
    events: Arc<Mutex<Vec<Event<B>>>>,
}

impl<B> Clone for EventLog<B> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<B> Default for EventLog<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> EventLog<B> {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append an event.
    pub fn push(&self, event: Event<B>) {
        self.events.lock().push(event);
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Remove every event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl<B: Clone> EventLog<B> {
    /// Copy of the events recorded so far.
    pub fn snapshot(&self) -> Vec<Event<B>> {
        self.events.lock().clone()
    }
}
