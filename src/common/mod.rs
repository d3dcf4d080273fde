//! Common types and utilities shared across the runtime.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Runtime configuration
//! - Error types (re-exported from `cursorcache-core`)
//! - Identifiers and row types (re-exported from `cursorcache-core`)

pub mod config;

pub use config::{CacheConfig, CursorConfig};
pub use cursorcache_core::{
    BookmarkId, CacheTimestamp, CursorCapabilities, CursorFlags, Direction, Error, LockMode,
    ProposableKind, Result, Row, RowHeader, StreamId, Value,
};
