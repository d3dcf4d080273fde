//! The schema cache coordinator.
//!
//! One [`CacheCoordinator`] exists per server connection and is shared by
//! every thread talking to that server. It owns:
//! - the schema replica, behind a reader/writer lock with bounded acquisition
//! - the server timestamp the replica was last rebuilt at
//! - the client timestamp, and the waiters blocked on it

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::cache::guard::{CacheGuard, CacheReadGuard, CacheWriteGuard};
use crate::cache::replica::{RebuildHooks, SchemaReplica};
use crate::cache::stats::CacheStats;
use crate::cache::wait_registry::WaitRegistry;
use crate::common::{CacheConfig, CacheTimestamp, Error, LockMode, Result};
use cursorcache_core::config::INITIAL_CLIENT_CACHE_TIMESTAMP;

struct WaitState {
    client: CacheTimestamp,
    registry: WaitRegistry,
}

/// Timestamp tracker, reader/writer lock and wait registry for one schema
/// replica.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                      CacheCoordinator                        │
/// │  ┌──────────────────────┐   ┌─────────────────────────────┐  │
/// │  │ replica: RwLock<S>   │   │ state: Mutex<WaitState>     │  │
/// │  │ shared: reads/rules  │   │ client stamp                │  │
/// │  │ exclusive: rebuild   │   │ target → shared Condvar     │  │
/// │  └──────────────────────┘   │ pool of idle Condvars       │  │
/// │  ┌──────────────────────┐   └─────────────────────────────┘  │
/// │  │ server_stamp: atomic │   hooks: before/after rebuild      │
/// │  └──────────────────────┘   stats: atomic counters           │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `replica`: `RwLock`, every acquisition bounded by `lock_timeout`
/// - `server_stamp`: atomic, only written while the replica is locked
///   exclusively
/// - `state`: `Mutex` + `Condvar`, waits bounded by `serialization_timeout`
/// - `hooks`: `Mutex`, cloned out before being invoked
///
/// The client timestamp starts at 1 and never decreases. The server timestamp
/// starts at 0, meaning the replica has never been built.
pub struct CacheCoordinator<S: SchemaReplica> {
    replica: RwLock<S>,
    pub(super) server_stamp: AtomicU64,
    state: Mutex<WaitState>,
    pub(super) hooks: Mutex<Vec<Arc<dyn RebuildHooks>>>,
    config: CacheConfig,
    pub(super) stats: CacheStats,
}

impl<S: SchemaReplica> CacheCoordinator<S> {
    /// Wrap a replica.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` if a timeout is zero
    pub fn new(replica: S, config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            replica: RwLock::new(replica),
            server_stamp: AtomicU64::new(0),
            state: Mutex::new(WaitState {
                client: INITIAL_CLIENT_CACHE_TIMESTAMP,
                registry: WaitRegistry::new(),
            }),
            hooks: Mutex::new(Vec::new()),
            config,
            stats: CacheStats::new(),
        })
    }

    /// Register rebuild observers. Hooks fire in registration order.
    pub fn add_hooks(&self, hooks: Arc<dyn RebuildHooks>) {
        self.hooks.lock().push(hooks);
    }

    // ========================================================================
    // Client timestamp
    // ========================================================================

    /// Block until the client timestamp equals `target`.
    ///
    /// Returns immediately, without touching the wait registry, when the
    /// stamp is already there. Waiters on the same target share one handle.
    ///
    /// # Errors
    /// - `Error::CacheSerializationError` if the stamp is (or moves) past
    ///   `target` without `target` ever being signalled
    /// - `Error::CacheSerializationTimeout` if `serialization_timeout`
    ///   elapses first
    pub fn wait_for_client_timestamp(&self, target: CacheTimestamp) -> Result<()> {
        let mut state = self.state.lock();
        if state.client == target {
            return Ok(());
        }
        if state.client > target {
            return Err(Error::CacheSerializationError {
                target,
                current: state.client,
            });
        }

        let (handle, allocated) = state.registry.register(target);
        if allocated {
            CacheStats::bump(&self.stats.wait_handles_allocated);
        } else {
            CacheStats::bump(&self.stats.wait_handles_reused);
        }
        debug!(
            wanted = target,
            current = state.client,
            "waiting for client cache timestamp"
        );

        let deadline = Instant::now() + self.config.serialization_timeout;
        loop {
            let timed_out = handle.wait_until(&mut state, deadline).timed_out();

            // A removed slot means `target` was signalled, even if the stamp
            // has moved on since.
            if !state.registry.is_registered(target) {
                return Ok(());
            }
            if state.client > target {
                state.registry.leave(target);
                return Err(Error::CacheSerializationError {
                    target,
                    current: state.client,
                });
            }
            if timed_out {
                state.registry.leave(target);
                CacheStats::bump(&self.stats.serialization_timeouts);
                warn!(
                    wanted = target,
                    current = state.client,
                    "timed out waiting for client cache timestamp"
                );
                return Err(Error::CacheSerializationTimeout {
                    target,
                    current: state.client,
                });
            }
        }
    }

    /// Advance the client timestamp and wake the waiters registered for
    /// exactly `stamp`.
    ///
    /// A stamp at or below the current one is ignored.
    pub fn set_client_timestamp(&self, stamp: CacheTimestamp) {
        let mut state = self.state.lock();
        if stamp <= state.client {
            if stamp < state.client {
                warn!(stamp, current = state.client, "ignoring client cache timestamp regression");
            }
            return;
        }
        state.client = stamp;
        let woken = state.registry.signal(stamp);
        if woken > 0 {
            debug!(stamp, woken, "released client cache timestamp waiters");
        }
    }

    pub fn client_timestamp(&self) -> CacheTimestamp {
        self.state.lock().client
    }

    /// Server timestamp of the last rebuild (0 if never built or stale).
    pub fn server_timestamp(&self) -> CacheTimestamp {
        self.server_stamp.load(Ordering::Acquire)
    }

    // ========================================================================
    // Cache lock
    // ========================================================================

    /// Acquire the cache lock in `mode`. Release by dropping the guard.
    ///
    /// # Errors
    /// - `Error::CacheLockTimeout` if `lock_timeout` elapses first
    pub fn acquire_cache_lock(&self, mode: LockMode) -> Result<CacheGuard<'_, S>> {
        match mode {
            LockMode::Shared => self.acquire_shared().map(CacheGuard::Shared),
            LockMode::Exclusive => self.acquire_exclusive().map(CacheGuard::Exclusive),
        }
    }

    pub fn acquire_shared(&self) -> Result<CacheReadGuard<'_, S>> {
        self.replica
            .try_read_for(self.config.lock_timeout)
            .map(CacheReadGuard::new)
            .ok_or_else(|| self.lock_timeout(LockMode::Shared))
    }

    pub fn acquire_exclusive(&self) -> Result<CacheWriteGuard<'_, S>> {
        self.replica
            .try_write_for(self.config.lock_timeout)
            .map(|lock| CacheWriteGuard::new(self, lock))
            .ok_or_else(|| self.lock_timeout(LockMode::Exclusive))
    }

    /// Take the exclusive lock and rebuild if the replica is older than
    /// `server_stamp`. Returns `true` if a rebuild happened.
    pub fn ensure_consistent(&self, server_stamp: CacheTimestamp) -> Result<bool> {
        let mut guard = self.acquire_exclusive()?;
        Ok(guard.ensure_consistent(server_stamp))
    }

    fn lock_timeout(&self, mode: LockMode) -> Error {
        CacheStats::bump(&self.stats.lock_timeouts);
        warn!(%mode, waited = ?self.config.lock_timeout, "cache lock acquisition timed out");
        Error::CacheLockTimeout {
            mode,
            waited: self.config.lock_timeout,
        }
    }

    // ========================================================================
    // Stats and info
    // ========================================================================

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Threads currently blocked on `target`.
    pub fn pending_waiters(&self, target: CacheTimestamp) -> usize {
        self.state.lock().registry.waiters(target)
    }

    /// Targets with at least one waiter.
    pub fn registered_wait_handles(&self) -> usize {
        self.state.lock().registry.registered()
    }

    /// Idle handles available for reuse.
    pub fn pooled_wait_handles(&self) -> usize {
        self.state.lock().registry.pooled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct Names(Vec<String>);

    impl SchemaReplica for Names {
        fn clear(&mut self) {
            self.0.clear();
        }

        fn apply_script(&mut self, script: &str) -> Result<()> {
            self.0.push(script.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<&'static str>>,
    }

    impl RebuildHooks for Recorder {
        fn before_rebuild(&self) {
            self.events.lock().push("clearing");
        }

        fn after_rebuild(&self) {
            self.events.lock().push("cleared");
        }
    }

    fn coordinator(timeout: Duration) -> Arc<CacheCoordinator<Names>> {
        let config = CacheConfig::default()
            .with_lock_timeout(timeout)
            .with_serialization_timeout(timeout);
        Arc::new(CacheCoordinator::new(Names::default(), config).unwrap())
    }

    fn wait_until_pending(coordinator: &CacheCoordinator<Names>, target: u64, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while coordinator.pending_waiters(target) < count {
            assert!(Instant::now() < deadline, "waiters never registered");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_initial_timestamps() {
        let c = coordinator(Duration::from_secs(1));
        assert_eq!(c.client_timestamp(), INITIAL_CLIENT_CACHE_TIMESTAMP);
        assert_eq!(c.server_timestamp(), 0);
    }

    #[test]
    fn test_wait_for_current_stamp_returns_immediately() {
        let c = coordinator(Duration::from_secs(1));
        c.wait_for_client_timestamp(1).unwrap();
        assert_eq!(c.registered_wait_handles(), 0);
        assert_eq!(c.pooled_wait_handles(), 0);
        assert_eq!(c.stats().snapshot().wait_handles_allocated, 0);
    }

    #[test]
    fn test_wait_for_past_stamp_is_ordering_violation() {
        let c = coordinator(Duration::from_secs(1));
        c.set_client_timestamp(4);
        assert!(matches!(
            c.wait_for_client_timestamp(2),
            Err(Error::CacheSerializationError { target: 2, current: 4 })
        ));
    }

    #[test]
    fn test_wait_times_out() {
        let c = coordinator(Duration::from_millis(20));
        let err = c.wait_for_client_timestamp(3).unwrap_err();
        assert!(matches!(
            err,
            Error::CacheSerializationTimeout { target: 3, current: 1 }
        ));
        assert!(err.is_timeout());
        assert_eq!(c.registered_wait_handles(), 0);
        assert_eq!(c.pooled_wait_handles(), 1);
        assert_eq!(c.stats().snapshot().serialization_timeouts, 1);
    }

    #[test]
    fn test_waiters_share_handle_and_wake_together() {
        let c = coordinator(Duration::from_secs(5));
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let c = c.clone();
                thread::spawn(move || c.wait_for_client_timestamp(2))
            })
            .collect();

        wait_until_pending(&c, 2, 4);
        assert_eq!(c.registered_wait_handles(), 1);

        c.set_client_timestamp(2);
        for waiter in waiters {
            waiter.join().unwrap().unwrap();
        }

        let stats = c.stats().snapshot();
        assert_eq!(stats.wait_handles_allocated, 1);
        assert_eq!(stats.wait_handles_reused, 3);
        assert_eq!(c.pooled_wait_handles(), 1);
    }

    #[test]
    fn test_set_wakes_only_exact_stamp() {
        let c = coordinator(Duration::from_secs(5));
        let far = {
            let c = c.clone();
            thread::spawn(move || c.wait_for_client_timestamp(3))
        };
        wait_until_pending(&c, 3, 1);

        c.set_client_timestamp(2);
        assert_eq!(c.pending_waiters(3), 1);

        c.set_client_timestamp(3);
        far.join().unwrap().unwrap();
    }

    #[test]
    fn test_skipped_stamp_fails_waiter() {
        let c = coordinator(Duration::from_millis(100));
        let waiter = {
            let c = c.clone();
            thread::spawn(move || c.wait_for_client_timestamp(2))
        };
        wait_until_pending(&c, 2, 1);

        // Jumping past the target never signals it; the waiter sees the jump
        // when its wait expires.
        c.set_client_timestamp(3);
        assert!(matches!(
            waiter.join().unwrap(),
            Err(Error::CacheSerializationError { target: 2, current: 3 })
        ));
        assert_eq!(c.registered_wait_handles(), 0);
    }

    #[test]
    fn test_client_timestamp_never_decreases() {
        let c = coordinator(Duration::from_secs(1));
        c.set_client_timestamp(5);
        c.set_client_timestamp(3);
        assert_eq!(c.client_timestamp(), 5);
    }

    #[test]
    fn test_ensure_consistent_fires_hooks_in_order() {
        let c = coordinator(Duration::from_secs(1));
        let recorder = Arc::new(Recorder::default());
        c.add_hooks(recorder.clone());

        assert!(c.ensure_consistent(5).unwrap());
        {
            let mut guard = c.acquire_exclusive().unwrap();
            guard.apply_script("create t").unwrap();
        }
        recorder.events.lock().clear();

        assert!(c.ensure_consistent(7).unwrap());
        assert_eq!(*recorder.events.lock(), vec!["clearing", "cleared"]);
        assert_eq!(c.server_timestamp(), 7);
        assert!(c.acquire_shared().unwrap().0.is_empty());

        assert!(!c.ensure_consistent(7).unwrap());
        assert!(!c.ensure_consistent(6).unwrap());
        assert_eq!(c.stats().snapshot().rebuilds, 2);
    }

    #[test]
    fn test_mark_stale_forces_rebuild() {
        let c = coordinator(Duration::from_secs(1));
        c.ensure_consistent(4).unwrap();
        c.acquire_exclusive().unwrap().mark_stale();
        assert_eq!(c.server_timestamp(), 0);
        assert!(c.ensure_consistent(4).unwrap());
    }

    #[test]
    fn test_shared_lock_times_out_behind_exclusive() {
        let c = coordinator(Duration::from_millis(50));
        let guard = c.acquire_exclusive().unwrap();

        let reader = {
            let c = c.clone();
            thread::spawn(move || c.acquire_shared().map(|_| ()))
        };
        let err = reader.join().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::CacheLockTimeout {
                mode: LockMode::Shared,
                ..
            }
        ));

        drop(guard);
        assert!(c.acquire_cache_lock(LockMode::Shared).is_ok());
        assert_eq!(c.stats().snapshot().lock_timeouts, 1);
    }

    #[test]
    fn test_shared_lock_proceeds_after_release() {
        let c = coordinator(Duration::from_secs(5));
        let guard = c.acquire_cache_lock(LockMode::Exclusive).unwrap();
        assert_eq!(guard.mode(), LockMode::Exclusive);

        let reader = {
            let c = c.clone();
            thread::spawn(move || c.acquire_shared().map(|_| ()))
        };
        thread::sleep(Duration::from_millis(20));
        guard.release();
        reader.join().unwrap().unwrap();
    }

    #[test]
    fn test_many_readers_share_lock() {
        let c = coordinator(Duration::from_millis(50));
        let a = c.acquire_shared().unwrap();
        let b = c.acquire_shared().unwrap();
        assert!(c.acquire_exclusive().is_err());
        drop(a);
        drop(b);
        assert!(c.acquire_exclusive().is_ok());
    }
}
