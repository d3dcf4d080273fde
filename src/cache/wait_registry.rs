//! Pooled wait handles keyed by target client timestamp.
//!
//! Many threads commonly wait for the same in-flight catalog download, so
//! every waiter on a target shares one handle and a single `notify_all`
//! releases them together. Handles return to a pool once their target has
//! been signalled.
//!
//! The registry is plain data; it lives inside the coordinator's state mutex
//! and every method assumes that mutex is held.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Condvar;

use crate::common::CacheTimestamp;

#[derive(Debug)]
struct WaitSlot {
    handle: Arc<Condvar>,
    waiters: usize,
}

#[derive(Debug, Default)]
pub(crate) struct WaitRegistry {
    slots: HashMap<CacheTimestamp, WaitSlot>,
    pool: Vec<Arc<Condvar>>,
}

impl WaitRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Join the waiters for `target`.
    ///
    /// Returns the shared handle and whether a new handle had to be
    /// allocated.
    pub(crate) fn register(&mut self, target: CacheTimestamp) -> (Arc<Condvar>, bool) {
        if let Some(slot) = self.slots.get_mut(&target) {
            slot.waiters += 1;
            return (slot.handle.clone(), false);
        }
        let (handle, allocated) = match self.pool.pop() {
            Some(handle) => (handle, false),
            None => (Arc::new(Condvar::new()), true),
        };
        self.slots.insert(
            target,
            WaitSlot {
                handle: handle.clone(),
                waiters: 1,
            },
        );
        (handle, allocated)
    }

    /// Withdraw one waiter from `target` without a signal (timeout or
    /// ordering failure). The handle is recycled once nobody waits on it.
    pub(crate) fn leave(&mut self, target: CacheTimestamp) {
        let Some(slot) = self.slots.get_mut(&target) else {
            return;
        };
        slot.waiters = slot.waiters.saturating_sub(1);
        if slot.waiters == 0 {
            if let Some(slot) = self.slots.remove(&target) {
                self.pool.push(slot.handle);
            }
        }
    }

    /// Wake everyone waiting for exactly `stamp`.
    ///
    /// Returns the number of waiters released.
    pub(crate) fn signal(&mut self, stamp: CacheTimestamp) -> usize {
        let Some(slot) = self.slots.remove(&stamp) else {
            return 0;
        };
        slot.handle.notify_all();
        self.pool.push(slot.handle);
        slot.waiters
    }

    /// Whether `target` still has registered waiters (i.e. has not been
    /// signalled).
    pub(crate) fn is_registered(&self, target: CacheTimestamp) -> bool {
        self.slots.contains_key(&target)
    }

    pub(crate) fn waiters(&self, target: CacheTimestamp) -> usize {
        self.slots.get(&target).map_or(0, |s| s.waiters)
    }

    pub(crate) fn registered(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn pooled(&self) -> usize {
        self.pool.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waiters_share_one_handle() {
        let mut registry = WaitRegistry::new();
        let (a, allocated_a) = registry.register(5);
        let (b, allocated_b) = registry.register(5);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(allocated_a);
        assert!(!allocated_b);
        assert_eq!(registry.waiters(5), 2);
        assert_eq!(registry.registered(), 1);
    }

    #[test]
    fn test_signal_recycles_handle() {
        let mut registry = WaitRegistry::new();
        let (first, _) = registry.register(5);
        registry.register(5);

        assert_eq!(registry.signal(5), 2);
        assert!(!registry.is_registered(5));
        assert_eq!(registry.pooled(), 1);

        let (second, allocated) = registry.register(6);
        assert!(!allocated);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.pooled(), 0);
    }

    #[test]
    fn test_signal_without_waiters() {
        let mut registry = WaitRegistry::new();
        assert_eq!(registry.signal(9), 0);
        assert_eq!(registry.pooled(), 0);
    }

    #[test]
    fn test_leave_recycles_at_zero() {
        let mut registry = WaitRegistry::new();
        registry.register(3);
        registry.register(3);

        registry.leave(3);
        assert!(registry.is_registered(3));
        assert_eq!(registry.pooled(), 0);

        registry.leave(3);
        assert!(!registry.is_registered(3));
        assert_eq!(registry.pooled(), 1);

        // Leaving an unknown target is a no-op
        registry.leave(3);
        assert_eq!(registry.pooled(), 1);
    }
}
