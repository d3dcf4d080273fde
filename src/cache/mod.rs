//! Process-wide schema cache coordination.
//!
//! Each process keeps a replica of the server's catalog. The server's schema
//! timestamp advances on every DDL change; the client timestamp orders the
//! catalog downloads applied locally. This module keeps the two consistent
//! under concurrent access from many threads.
//!
//! # Components
//! - [`CacheCoordinator`] - Timestamps, reader/writer lock, pooled wait handles
//! - [`CacheReadGuard`] / [`CacheWriteGuard`] - RAII access to the replica
//! - [`CacheConsistencyClient`] - The resync protocol over a [`RemoteCatalog`]
//! - [`LocalRuleContext`] - Lets cursors evaluate proposable calls locally
//! - [`MemoryCatalog`] / [`ScriptedReplica`] - In-process implementations

mod client;
mod coordinator;
mod guard;
mod local_rules;
mod memory;
mod replica;
mod stats;
mod wait_registry;

pub use client::{CacheConsistencyClient, CatalogUpdate, RemoteCatalog};
pub use coordinator::CacheCoordinator;
pub use guard::{CacheGuard, CacheReadGuard, CacheWriteGuard};
pub use local_rules::{LocalRuleContext, RuleEvaluator};
pub use memory::{MemoryCatalog, ScriptedReplica};
pub use replica::{RebuildHooks, SchemaReplica};
pub use stats::{CacheStats, CacheStatsSnapshot};
