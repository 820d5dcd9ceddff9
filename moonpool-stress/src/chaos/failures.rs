//! Per-run node failure flags.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::node::NodeId;

/// One failure flag per node plus a bounded failed-node count.
///
/// [`try_fail`](Self::try_fail) is a reservation: the failed count can never
/// exceed `max`, even under concurrent callers.
#[derive(Debug)]
pub struct FailureTable {
    flags: Box<[AtomicBool]>,
    failed: AtomicUsize,
    max: usize,
}

impl FailureTable {
    /// Table for `nodes` nodes with at most `max` concurrently failed.
    pub fn new(nodes: usize, max: usize) -> Self {
        Self {
            flags: (0..nodes).map(|_| AtomicBool::new(false)).collect(),
            failed: AtomicUsize::new(0),
            max,
        }
    }

    /// Mark `node` failed if a slot is available and it is not failed already.
    pub fn try_fail(&self, node: NodeId) -> bool {
        let Some(flag) = self.flags.get(node) else {
            return false;
        };
        let reserved = self
            .failed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < self.max).then_some(count + 1)
            })
            .is_ok();
        if !reserved {
            return false;
        }
        if flag.swap(true, Ordering::AcqRel) {
            self.failed.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    /// Clear the failure flag of `node`. Returns `true` if it was failed.
    pub fn recover(&self, node: NodeId) -> bool {
        let recovered = self
            .flags
            .get(node)
            .is_some_and(|flag| flag.swap(false, Ordering::AcqRel));
        if recovered {
            self.failed.fetch_sub(1, Ordering::AcqRel);
        }
        recovered
    }

    /// Whether `node` is currently failed.
    pub fn is_failed(&self, node: NodeId) -> bool {
        self.flags
            .get(node)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Number of currently failed nodes.
    pub fn failed_count(&self) -> usize {
        self.failed.load(Ordering::Acquire)
    }

    /// Failures still allowed before the maximum is reached.
    pub fn remaining(&self) -> usize {
        self.max.saturating_sub(self.failed_count())
    }

    /// Configured maximum of concurrently failed nodes.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Clear every flag.
    pub fn clear(&self) {
        for flag in self.flags.iter() {
            flag.store(false, Ordering::Release);
        }
        self.failed.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_fail_and_recover() {
        let table = FailureTable::new(3, 2);
        assert!(table.try_fail(1));
        assert!(!table.try_fail(1), "already failed");
        assert!(table.is_failed(1));
        assert_eq!(table.remaining(), 1);

        assert!(table.recover(1));
        assert!(!table.recover(1));
        assert_eq!(table.failed_count(), 0);
        assert!(!table.try_fail(7), "out of range");
    }

    #[test]
    fn test_maximum_is_never_exceeded() {
        let table = Arc::new(FailureTable::new(16, 3));
        let handles: Vec<_> = (0..16)
            .map(|node| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || table.try_fail(node))
            })
            .collect();
        let failed = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .filter(|ok| *ok)
            .count();

        assert_eq!(failed, 3);
        assert_eq!(table.failed_count(), 3);
        assert_eq!(table.remaining(), 0);
        assert_eq!((0..16).filter(|n| table.is_failed(*n)).count(), 3);
    }

    #[test]
    fn test_clear_resets_everything() {
        let table = FailureTable::new(2, 2);
        table.try_fail(0);
        table.try_fail(1);
        table.clear();
        assert_eq!(table.failed_count(), 0);
        assert!(!table.is_failed(0));
        assert!(table.try_fail(0));
    }
}
