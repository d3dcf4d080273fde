//! Client-side row buffering.
//!
//! The buffer is the window between a cursor's row-at-a-time API and the
//! remote cursor that owns the real result set.
//!
//! # Components
//! - [`RowBuffer`] / [`BufferedRow`] - The fetched window and its position
//! - [`BookmarkTable`] - Reference counts for server bookmarks
//! - [`CursorStats`] - Per-cursor counters

mod bookmark_table;
mod row_buffer;
mod stats;

pub use bookmark_table::{BookmarkTable, DisposeBookmarks};
pub use row_buffer::{BufferedRow, RowBuffer};
pub use stats::CursorStats;
