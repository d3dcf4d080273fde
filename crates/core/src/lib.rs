//! Core types and constants for the cursorcache client runtime.
//!
//! This crate provides the leaf abstractions shared by the cursor buffer and
//! the schema-cache layers:
//!
//! # Types
//! - [`BookmarkId`] - Opaque server-issued row handle
//! - [`Row`] / [`RowHeader`] / [`Value`] - Result tuples and their encoding
//! - [`CursorFlags`] / [`CursorCapabilities`] - Remote cursor state
//! - [`LockMode`] / [`CacheTimestamp`] - Schema cache coordination
//!
//! # Error Handling
//! - [`Error`] - Unified error type
//! - [`Result<T>`] - Convenient result alias
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use cursorcache_core::{Row, RowHeader, Value};
//!
//! let header = Arc::new(RowHeader::new(["id", "name"]));
//! let row = Row::new(header.clone(), vec![Value::Integer(1), Value::Text("a".into())]).unwrap();
//!
//! let bytes = row.to_physical().unwrap();
//! assert_eq!(Row::from_physical(header, &bytes).unwrap(), row);
//! ```

pub mod config;
pub mod error;
pub mod row;
pub mod types;

pub use error::{Error, Result};
pub use row::{Row, RowHeader, Value};
pub use types::{
    BookmarkId, CacheTimestamp, CursorCapabilities, CursorFlags, Direction, LockMode,
    ProposableKind, StreamId,
};
