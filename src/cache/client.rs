//! Keeping the schema replica consistent with the server.
//!
//! [`CacheConsistencyClient`] runs the resynchronization protocol for one
//! catalog request:
//!
//! ```text
//! get_catalog(name)
//!   → wait_for_client_timestamp(required - 1)
//!   → lock (Exclusive if anything changes, else Shared)
//!   → ensure_consistent(server stamp) → apply ddl script
//!   → set_client_timestamp(required)      (always, even on failure)
//!   → unlock
//! ```
//!
//! Waiting for `required - 1` rather than `required` makes the caller the one
//! who advances the stamp to `required`, instead of waiting on itself.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::coordinator::CacheCoordinator;
use crate::cache::replica::SchemaReplica;
use crate::common::{CacheTimestamp, Error, Result};

/// Answer to a catalog request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogUpdate {
    /// Schema-defining statements to run against the replica. May be empty.
    pub ddl_script: String,
    /// The server's schema timestamp.
    pub server_cache_timestamp: CacheTimestamp,
    /// The client timestamp this update brings the replica to.
    pub required_client_cache_timestamp: CacheTimestamp,
    /// Whether the catalog changed since the client's last request.
    pub changed: bool,
}

impl CatalogUpdate {
    /// An update carrying `ddl_script`; `changed` is set when the script is
    /// non-empty.
    pub fn new(
        ddl_script: impl Into<String>,
        server_cache_timestamp: CacheTimestamp,
        required_client_cache_timestamp: CacheTimestamp,
    ) -> Self {
        let ddl_script = ddl_script.into();
        Self {
            changed: !ddl_script.is_empty(),
            ddl_script,
            server_cache_timestamp,
            required_client_cache_timestamp,
        }
    }

    /// An update that only advances the client timestamp.
    pub fn unchanged(
        server_cache_timestamp: CacheTimestamp,
        required_client_cache_timestamp: CacheTimestamp,
    ) -> Self {
        Self::new(String::new(), server_cache_timestamp, required_client_cache_timestamp)
    }
}

/// The server side of the catalog protocol.
pub trait RemoteCatalog: Send + Sync {
    /// Fetch the catalog needed to resolve `name`.
    fn get_catalog(&self, name: &str) -> Result<CatalogUpdate>;

    /// Tell the server the local replica can no longer be trusted.
    fn mark_replica_stale(&self) -> Result<()>;
}

impl<C: RemoteCatalog + ?Sized> RemoteCatalog for Arc<C> {
    fn get_catalog(&self, name: &str) -> Result<CatalogUpdate> {
        (**self).get_catalog(name)
    }

    fn mark_replica_stale(&self) -> Result<()> {
        (**self).mark_replica_stale()
    }
}

/// Applies catalog updates to a shared replica in client-timestamp order.
pub struct CacheConsistencyClient<S: SchemaReplica, C: RemoteCatalog> {
    coordinator: Arc<CacheCoordinator<S>>,
    catalog: C,
}

impl<S: SchemaReplica, C: RemoteCatalog> CacheConsistencyClient<S, C> {
    pub fn new(coordinator: Arc<CacheCoordinator<S>>, catalog: C) -> Self {
        Self {
            coordinator,
            catalog,
        }
    }

    pub fn coordinator(&self) -> &Arc<CacheCoordinator<S>> {
        &self.coordinator
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Fetch the catalog for `name` and bring the replica up to date with it.
    ///
    /// Returns the update that was applied.
    pub fn resolve(&self, name: &str) -> Result<CatalogUpdate> {
        let update = self.catalog.get_catalog(name)?;
        self.apply_update(&update)?;
        Ok(update)
    }

    /// Apply one catalog update.
    ///
    /// Every failure notifies the server that the replica is stale before
    /// being returned. If the update was reached in timestamp order, the
    /// client timestamp advances to `required_client_cache_timestamp` even
    /// when applying fails, so later waiters are not stranded.
    ///
    /// # Errors
    /// - `Error::CacheSerializationError` / `Error::CacheSerializationTimeout`
    ///   if the update's turn never came
    /// - `Error::CacheLockTimeout` if the cache lock was not acquired in time
    /// - `Error::CacheDeserializationError` wrapping any other failure while
    ///   applying
    pub fn apply_update(&self, update: &CatalogUpdate) -> Result<()> {
        let required = update.required_client_cache_timestamp;
        if let Err(e) = self
            .coordinator
            .wait_for_client_timestamp(required.saturating_sub(1))
        {
            self.notify_stale(&e);
            return Err(e);
        }

        let result = self.apply_locked(update);
        self.coordinator.set_client_timestamp(required);

        result.map_err(|e| {
            self.notify_stale(&e);
            if e.is_timeout() {
                e
            } else {
                Error::CacheDeserializationError(Box::new(e))
            }
        })
    }

    fn apply_locked(&self, update: &CatalogUpdate) -> Result<()> {
        let rebuild = update.server_cache_timestamp > self.coordinator.server_timestamp();
        if !update.changed && !rebuild && update.ddl_script.is_empty() {
            let _guard = self.coordinator.acquire_shared()?;
            return Ok(());
        }

        let mut guard = self.coordinator.acquire_exclusive()?;
        guard.ensure_consistent(update.server_cache_timestamp);
        if !update.ddl_script.is_empty() {
            if let Err(e) = guard.apply_script(&update.ddl_script) {
                guard.mark_stale();
                return Err(e);
            }
        }
        debug!(
            client = update.required_client_cache_timestamp,
            server = update.server_cache_timestamp,
            "applied catalog update"
        );
        Ok(())
    }

    fn notify_stale(&self, cause: &Error) {
        warn!(error = %cause, "schema cache resync failed, marking replica stale");
        if let Err(e) = self.catalog.mark_replica_stale() {
            warn!(error = %e, "failed to notify server of stale replica");
        }
    }
}
