//! Client-side cursors over remote result sets.
//!
//! # Components
//! - [`BufferedCursor`] - Row-at-a-time navigation with a fetch window
//! - [`RemoteCursor`] - The protocol a server-side cursor speaks
//! - [`CursorContext`] - Lookups into the owning process (local rules, streams)
//! - [`MemoryCursor`] - In-process remote cursor with a call log

mod buffered_cursor;
mod context;
mod memory;
mod remote;

pub use buffered_cursor::BufferedCursor;
pub use context::{marshal_row, CursorContext, ProposableCall, StreamManager};
pub use memory::{MemoryCursor, RemoteCall};
pub use remote::{FetchResult, Proposal, RemoteCursor};
