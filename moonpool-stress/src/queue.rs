//! In-flight message queues.
//!
//! Three interchangeable ordering policies buffer messages between send and
//! delivery. All of them are polled by the broker: `get` never blocks and
//! returns `None` when nothing is ready.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::MessageOrder;
use crate::node::Message;
use crate::rng::SimRng;

/// Buffer of messages between send and delivery.
pub trait MessageQueue<B>: Send + Sync {
    /// Enqueue a message. Never blocks or fails.
    fn put(&self, message: Message<B>);

    /// Next deliverable message, if any.
    fn get(&self) -> Option<Message<B>>;

    /// Drop every buffered message.
    fn clear(&self);
}

/// One global FIFO: messages come out in exactly the order they went in.
#[derive(Debug)]
pub struct SynchronousMessageQueue<B> {
    queue: Mutex<VecDeque<Message<B>>>,
}

impl<B> Default for SynchronousMessageQueue<B> {
    fn default() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }
}

impl<B> SynchronousMessageQueue<B> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Send> MessageQueue<B> for SynchronousMessageQueue<B> {
    fn put(&self, message: Message<B>) {
        self.queue.lock().push_back(message);
    }

    fn get(&self) -> Option<Message<B>> {
        self.queue.lock().pop_front()
    }

    fn clear(&self) {
        self.queue.lock().clear();
    }
}

/// Pop the head of a uniformly chosen non-empty slot.
fn pop_random_slot<B>(slots: &mut [VecDeque<Message<B>>], rng: &SimRng) -> Option<Message<B>> {
    let non_empty: Vec<usize> = slots
        .iter()
        .enumerate()
        .filter(|(_, slot)| !slot.is_empty())
        .map(|(i, _)| i)
        .collect();
    if non_empty.is_empty() {
        return None;
    }
    let pick = non_empty[rng.random_range(0..non_empty.len())];
    slots[pick].pop_front()
}

/// One FIFO per destination; the next destination is picked at random.
///
/// Order is preserved per destination only.
#[derive(Debug)]
pub struct FifoMessageQueue<B> {
    slots: Mutex<Vec<VecDeque<Message<B>>>>,
    rng: SimRng,
}

impl<B> FifoMessageQueue<B> {
    /// Queue for `nodes` destinations.
    pub fn new(nodes: usize, rng: SimRng) -> Self {
        Self {
            slots: Mutex::new((0..nodes.max(1)).map(|_| VecDeque::new()).collect()),
            rng,
        }
    }
}

impl<B: Send> MessageQueue<B> for FifoMessageQueue<B> {
    fn put(&self, message: Message<B>) {
        let mut slots = self.slots.lock();
        let slot = message.receiver().unwrap_or(0).min(slots.len() - 1);
        slots[slot].push_back(message);
    }

    fn get(&self) -> Option<Message<B>> {
        pop_random_slot(&mut self.slots.lock(), &self.rng)
    }

    fn clear(&self) {
        self.slots.lock().iter_mut().for_each(VecDeque::clear);
    }
}

/// Messages land in random slots regardless of destination. No ordering at all.
#[derive(Debug)]
pub struct AsynchronousMessageQueue<B> {
    slots: Mutex<Vec<VecDeque<Message<B>>>>,
    rng: SimRng,
}

impl<B> AsynchronousMessageQueue<B> {
    /// Queue with `nodes` internal slots.
    pub fn new(nodes: usize, rng: SimRng) -> Self {
        Self {
            slots: Mutex::new((0..nodes.max(1)).map(|_| VecDeque::new()).collect()),
            rng,
        }
    }
}

impl<B: Send> MessageQueue<B> for AsynchronousMessageQueue<B> {
    fn put(&self, message: Message<B>) {
        let mut slots = self.slots.lock();
        let slot = self.rng.random_range(0..slots.len());
        slots[slot].push_back(message);
    }

    fn get(&self) -> Option<Message<B>> {
        pop_random_slot(&mut self.slots.lock(), &self.rng)
    }

    fn clear(&self) {
        self.slots.lock().iter_mut().for_each(VecDeque::clear);
    }
}

/// Build the queue for `order` over `nodes` destinations.
pub fn create_queue<B: Send + 'static>(
    order: MessageOrder,
    nodes: usize,
    rng: SimRng,
) -> Arc<dyn MessageQueue<B>> {
    match order {
        MessageOrder::Synchronous => Arc::new(SynchronousMessageQueue::new()),
        MessageOrder::Fifo => Arc::new(FifoMessageQueue::new(nodes, rng)),
        MessageOrder::Asynchronous => Arc::new(AsynchronousMessageQueue::new(nodes, rng)),
    }
}
