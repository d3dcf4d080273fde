//! Error types for the cursor and schema-cache runtime.

use std::time::Duration;

use thiserror::Error;

use crate::types::{BookmarkId, CacheTimestamp, LockMode};

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in the client runtime.
///
/// Every variant is surfaced to the caller; nothing here is retried
/// internally.
#[derive(Debug, Error)]
pub enum Error {
    /// The cursor is on a crack (BOF, EOF, or a buffer edge) where a row was
    /// required.
    #[error("no current row")]
    NoCurrentRow,

    /// A bookmark was released that the cursor is not tracking.
    #[error("invalid bookmark: {0}")]
    InvalidBookmark(BookmarkId),

    /// A bookmark the buffer knows about was rejected by the server.
    ///
    /// This means the underlying row set was modified concurrently and the
    /// buffer no longer reflects it.
    #[error("cursor out of sync with server: {0} was rejected")]
    CursorSyncError(BookmarkId),

    /// The schema cache lock could not be acquired in time.
    #[error("timed out after {waited:?} acquiring {mode} cache lock")]
    CacheLockTimeout { mode: LockMode, waited: Duration },

    /// The client cache timestamp did not reach the target in time.
    #[error("timed out waiting for client cache timestamp {target} (current {current})")]
    CacheSerializationTimeout {
        target: CacheTimestamp,
        current: CacheTimestamp,
    },

    /// The client cache timestamp is already past the target; catalog
    /// updates were applied out of order.
    #[error("client cache timestamp {current} is past target {target}")]
    CacheSerializationError {
        target: CacheTimestamp,
        current: CacheTimestamp,
    },

    /// Applying a catalog update to the local replica failed.
    #[error("failed to apply catalog update: {0}")]
    CacheDeserializationError(#[source] Box<Error>),

    /// The remote cursor does not support the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The remote side reported a failure.
    #[error("remote error: {0}")]
    Remote(String),

    /// A physical row could not be decoded.
    #[error("malformed row: {0}")]
    RowFormat(String),

    /// A physical row failed its checksum.
    #[error("row checksum mismatch: expected {expected:#010x}, found {found:#010x}")]
    ChecksumMismatch { expected: u32, found: u32 },

    /// A column name is not part of the row header.
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// The cursor has been closed.
    #[error("cursor is closed")]
    CursorClosed,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// True for the two bounded-wait failures.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::CacheLockTimeout { .. } | Error::CacheSerializationTimeout { .. }
        )
    }
}
