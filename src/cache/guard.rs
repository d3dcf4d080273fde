//! RAII guards for the schema cache lock.
//!
//! - [`CacheReadGuard`] - Shared access to the replica (many allowed)
//! - [`CacheWriteGuard`] - Exclusive access, used to rebuild and apply
//!
//! Releasing the lock is dropping the guard.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::Ordering;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::cache::coordinator::CacheCoordinator;
use crate::cache::replica::SchemaReplica;
use crate::cache::stats::CacheStats;
use crate::common::{CacheTimestamp, LockMode};

/// Shared access to the schema replica.
///
/// # Example
/// ```ignore
/// let guard = coordinator.acquire_shared()?;
/// let table = guard.lookup("orders"); // Deref to &S
/// // guard drops here, lock released
/// ```
pub struct CacheReadGuard<'a, S: SchemaReplica> {
    lock: RwLockReadGuard<'a, S>,
}

impl<'a, S: SchemaReplica> CacheReadGuard<'a, S> {
    pub(crate) fn new(lock: RwLockReadGuard<'a, S>) -> Self {
        Self { lock }
    }
}

impl<S: SchemaReplica> Deref for CacheReadGuard<'_, S> {
    type Target = S;

    #[inline]
    fn deref(&self) -> &S {
        &self.lock
    }
}

/// Exclusive access to the schema replica.
///
/// Only one `CacheWriteGuard` exists at a time and no [`CacheReadGuard`]
/// coexists with it, so readers never observe a half-rebuilt replica.
pub struct CacheWriteGuard<'a, S: SchemaReplica> {
    coordinator: &'a CacheCoordinator<S>,
    lock: RwLockWriteGuard<'a, S>,
}

impl<'a, S: SchemaReplica> CacheWriteGuard<'a, S> {
    pub(crate) fn new(coordinator: &'a CacheCoordinator<S>, lock: RwLockWriteGuard<'a, S>) -> Self {
        Self { coordinator, lock }
    }

    /// Rebuild the replica if it is older than `server_stamp`.
    ///
    /// The rebuild is coarse: the whole replica is cleared, with every
    /// registered hook's `before_rebuild` fired first and `after_rebuild`
    /// fired once the new stamp is recorded. Returns `true` if a rebuild
    /// happened.
    pub fn ensure_consistent(&mut self, server_stamp: CacheTimestamp) -> bool {
        let current = self.coordinator.server_stamp.load(Ordering::Acquire);
        if current >= server_stamp {
            return false;
        }

        let hooks = self.coordinator.hooks.lock().clone();
        for hook in &hooks {
            hook.before_rebuild();
        }
        self.lock.clear();
        self.coordinator
            .server_stamp
            .store(server_stamp, Ordering::Release);
        for hook in &hooks {
            hook.after_rebuild();
        }

        CacheStats::bump(&self.coordinator.stats.rebuilds);
        info!(from = current, to = server_stamp, "rebuilt schema replica");
        true
    }

    /// Forget the server timestamp so the next `ensure_consistent` rebuilds.
    ///
    /// Used after a partially applied script.
    pub fn mark_stale(&mut self) {
        debug!("schema replica marked stale");
        self.coordinator.server_stamp.store(0, Ordering::Release);
    }
}

impl<S: SchemaReplica> Deref for CacheWriteGuard<'_, S> {
    type Target = S;

    #[inline]
    fn deref(&self) -> &S {
        &self.lock
    }
}

impl<S: SchemaReplica> DerefMut for CacheWriteGuard<'_, S> {
    #[inline]
    fn deref_mut(&mut self) -> &mut S {
        &mut self.lock
    }
}

/// Either kind of cache guard, as returned by
/// [`CacheCoordinator::acquire_cache_lock`].
pub enum CacheGuard<'a, S: SchemaReplica> {
    Shared(CacheReadGuard<'a, S>),
    Exclusive(CacheWriteGuard<'a, S>),
}

impl<'a, S: SchemaReplica> CacheGuard<'a, S> {
    pub fn mode(&self) -> LockMode {
        match self {
            CacheGuard::Shared(_) => LockMode::Shared,
            CacheGuard::Exclusive(_) => LockMode::Exclusive,
        }
    }

    /// The write guard, if this is an exclusive lock.
    pub fn as_exclusive(&mut self) -> Option<&mut CacheWriteGuard<'a, S>> {
        match self {
            CacheGuard::Shared(_) => None,
            CacheGuard::Exclusive(guard) => Some(guard),
        }
    }

    /// Release the lock. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl<S: SchemaReplica> Deref for CacheGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        match self {
            CacheGuard::Shared(guard) => &**guard,
            CacheGuard::Exclusive(guard) => &**guard,
        }
    }
}
