//! Default configuration constants.

use std::time::Duration;

/// Rows requested per remote fetch when no fetch count is configured.
///
/// A fetch count of 1 disables buffering entirely, since a window of one row
/// saves no round trips.
pub const DEFAULT_FETCH_COUNT: usize = 20;

/// How long a caller waits for the schema cache lock before giving up.
pub const DEFAULT_CACHE_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a caller waits for the client cache timestamp to reach its
/// target before giving up.
///
/// This covers an entire catalog download by another process, so it is
/// deliberately longer than the lock timeout.
pub const DEFAULT_CACHE_SERIALIZATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Client cache timestamp of a freshly connected process.
pub const INITIAL_CLIENT_CACHE_TIMESTAMP: u64 = 1;
