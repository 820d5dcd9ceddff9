//! Active network partition of a run.
//!
//! At most one partition is active at a time. It splits the node set in two
//! components and expires after a sampled duration; the broker heals it.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::NetworkPartitionMode;
use crate::node::NodeId;
use crate::rng::SimRng;

#[derive(Debug, Clone)]
struct ActivePartition {
    first: Vec<NodeId>,
    second: Vec<NodeId>,
    until: Instant,
}

/// Components of a partition, as `(first, second)`.
pub type PartitionSides = (Vec<NodeId>, Vec<NodeId>);

/// The partition currently in effect, if any.
#[derive(Debug, Default)]
pub struct PartitionTable {
    active: Mutex<Option<ActivePartition>>,
}

impl PartitionTable {
    /// Table without an active partition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a partition is in effect.
    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Start a partition of `total` nodes lasting `duration`.
    ///
    /// Returns the components, or `None` if a partition is already active,
    /// the mode is [`NetworkPartitionMode::None`] or there are fewer than two nodes.
    pub fn start(
        &self,
        mode: NetworkPartitionMode,
        rng: &SimRng,
        total: usize,
        duration: Duration,
    ) -> Option<PartitionSides> {
        if total < 2 {
            return None;
        }
        let mut active = self.active.lock();
        if active.is_some() {
            return None;
        }

        let mut ids: Vec<NodeId> = (0..total).collect();
        let split = match mode {
            NetworkPartitionMode::None => return None,
            NetworkPartitionMode::Halves => {
                rng.shuffle(&mut ids);
                total / 2
            }
            NetworkPartitionMode::SingleNode => {
                let isolated = rng.random_range(0..total);
                ids.swap(0, isolated);
                1
            }
        };
        let second = ids.split_off(split);
        let mut first = ids;
        first.sort_unstable();
        let mut second = second;
        second.sort_unstable();

        *active = Some(ActivePartition {
            first: first.clone(),
            second: second.clone(),
            until: Instant::now() + duration,
        });
        Some((first, second))
    }

    /// Whether `a` and `b` sit in different components of the active partition.
    pub fn is_separated(&self, a: NodeId, b: NodeId) -> bool {
        self.active.lock().as_ref().is_some_and(|p| {
            (p.first.contains(&a) && p.second.contains(&b))
                || (p.second.contains(&a) && p.first.contains(&b))
        })
    }

    /// Remove the active partition if its lifetime is over.
    pub fn heal_expired(&self) -> Option<PartitionSides> {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|p| Instant::now() >= p.until) {
            return active.take().map(|p| (p.first, p.second));
        }
        None
    }

    /// Drop the active partition regardless of its lifetime.
    pub fn clear(&self) {
        *self.active.lock() = None;
    }
}
