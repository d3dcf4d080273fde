//! The process-local schema replica and its rebuild notifications.

use crate::common::Result;

/// Process-local copy of the server's catalog.
///
/// All access goes through the [`CacheCoordinator`](super::CacheCoordinator)
/// reader/writer lock; implementations need no locking of their own.
pub trait SchemaReplica: Send + Sync {
    /// Discard every catalog object.
    fn clear(&mut self);

    /// Execute schema-defining statements against the replica.
    fn apply_script(&mut self, script: &str) -> Result<()>;
}

/// Observer of full replica rebuilds.
///
/// Both callbacks run synchronously while the exclusive cache lock is held,
/// `before_rebuild` before the replica is cleared and `after_rebuild` once the
/// new server timestamp is recorded. Implementations must not take the cache
/// lock.
pub trait RebuildHooks: Send + Sync {
    fn before_rebuild(&self);
    fn after_rebuild(&self);
}
