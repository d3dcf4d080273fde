//! Runtime configuration for cursors and the schema cache.

use std::time::Duration;

use cursorcache_core::config::{
    DEFAULT_CACHE_LOCK_TIMEOUT, DEFAULT_CACHE_SERIALIZATION_TIMEOUT, DEFAULT_FETCH_COUNT,
};

use crate::common::{Error, Result};

/// Per-cursor configuration.
///
/// # Example
/// ```
/// use cursorcache::CursorConfig;
///
/// let config = CursorConfig::default().with_fetch_count(5);
/// assert_eq!(config.fetch_count, 5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorConfig {
    /// Rows requested per remote fetch. A value of 1 disables buffering.
    pub fetch_count: usize,
}

impl CursorConfig {
    pub fn with_fetch_count(mut self, fetch_count: usize) -> Self {
        self.fetch_count = fetch_count;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch_count == 0 {
            return Err(Error::InvalidConfig("fetch_count must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            fetch_count: DEFAULT_FETCH_COUNT,
        }
    }
}

/// Configuration of the process-wide schema cache for one server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Bound on acquiring the cache reader/writer lock.
    pub lock_timeout: Duration,
    /// Bound on waiting for the client cache timestamp.
    pub serialization_timeout: Duration,
}

impl CacheConfig {
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_serialization_timeout(mut self, timeout: Duration) -> Self {
        self.serialization_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout.is_zero() {
            return Err(Error::InvalidConfig("lock_timeout must be > 0".into()));
        }
        if self.serialization_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "serialization_timeout must be > 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_CACHE_LOCK_TIMEOUT,
            serialization_timeout: DEFAULT_CACHE_SERIALIZATION_TIMEOUT,
        }
    }
}
