//! cursorcache - the client-side runtime between a row-at-a-time cursor API
//! and a remote database server.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          cursorcache                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Cursor Layer (cursor/)                      │   │
//! │  │   BufferedCursor: Next/Prior/First/Last, bookmarks,      │   │
//! │  │   Insert/Update/Delete, Default/Change/Validate          │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │            ↓ window                  ↓ local rules             │
//! │  ┌──────────────────────────┐  ┌──────────────────────────┐   │
//! │  │   Buffer (buffer/)       │  │   Schema Cache (cache/)  │   │
//! │  │ RowBuffer + BookmarkTable│  │ CacheCoordinator         │   │
//! │  │ + CursorStats            │  │ + CacheConsistencyClient │   │
//! │  └──────────────────────────┘  └──────────────────────────┘   │
//! │            ↓                                 ↓                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │   Remote protocols: RemoteCursor, RemoteCatalog          │   │
//! │  │   (in-process: MemoryCursor, MemoryCatalog)              │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (Row, BookmarkId, Error, config)
//! - [`buffer`] - The fetch window and bookmark reference counts
//! - [`cursor`] - The buffered cursor and the remote cursor protocol
//! - [`cache`] - Schema replica consistency across threads
//!
//! # Quick Start
//! ```
//! use cursorcache::{BufferedCursor, CursorConfig, MemoryCursor};
//!
//! let remote = MemoryCursor::numbered(100).unwrap();
//! let mut cursor = BufferedCursor::new(remote, CursorConfig::default()).unwrap();
//! cursor.open().unwrap();
//!
//! let mut count = 0;
//! while cursor.next().unwrap() {
//!     count += 1;
//! }
//! assert_eq!(count, 100);
//! assert_eq!(cursor.remote().fetches().len(), 6);
//! ```

pub mod buffer;
pub mod cache;
pub mod common;
pub mod cursor;

// Re-export commonly used items at crate root for convenience
pub use common::{
    BookmarkId, CacheConfig, CacheTimestamp, CursorConfig, Direction, Error, LockMode, Result,
    Row, RowHeader, Value,
};

pub use buffer::{BookmarkTable, CursorStats};
pub use cache::{
    CacheConsistencyClient, CacheCoordinator, CacheStats, CacheStatsSnapshot, CatalogUpdate,
    MemoryCatalog, RemoteCatalog, ScriptedReplica,
};
pub use cursor::{BufferedCursor, CursorContext, MemoryCursor, RemoteCursor};
