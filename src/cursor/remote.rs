//! The remote cursor protocol.
//!
//! [`RemoteCursor`] is the client's view of a cursor owned by the server
//! process. Every method is one synchronous round trip. Implementations
//! carry whatever side-channel context their transport needs (pending
//! transaction starts, pending plan cleanups); the buffered cursor never
//! looks at it.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::buffer::DisposeBookmarks;
use crate::common::{
    BookmarkId, CursorCapabilities, CursorFlags, Direction, Result, Row, RowHeader,
};

/// Rows returned by one [`RemoteCursor::fetch`].
///
/// `rows` and `bookmarks` are parallel and in traversal order. Cursors
/// without bookmark support return [`BookmarkId::INVALID`] for every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub rows: Vec<Row>,
    pub bookmarks: Vec<BookmarkId>,
    pub flags: CursorFlags,
}

/// Result of a proposable call: the proposed row and whether the rule
/// changed anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub row: Row,
    pub changed: bool,
}

/// A cursor living in the server process.
///
/// # Positioning
/// The remote cursor is always on a row, on the BOF crack, or on the EOF
/// crack. Calls that move it return the [`CursorFlags`] of the new position.
///
/// # Fetch semantics
/// `fetch(direction, count, skip_current)` walks up to `count` rows in
/// `direction`, returning every row it lands on. When `skip_current` is
/// false and the cursor is on a row, that row is returned first and counts
/// toward `count`; the flag is ignored on a crack. Afterwards the cursor
/// sits on the last row returned, or on the crack if the set ran out.
pub trait RemoteCursor: DisposeBookmarks {
    fn capabilities(&self) -> CursorCapabilities;

    fn open(&mut self) -> Result<CursorFlags>;
    fn close(&mut self) -> Result<()>;
    fn get_flags(&mut self) -> Result<CursorFlags>;
    fn reset(&mut self) -> Result<CursorFlags>;

    fn select(&mut self) -> Result<Row>;
    fn select_by_header(&mut self, header: &Arc<RowHeader>) -> Result<Row>;
    fn fetch(&mut self, direction: Direction, count: usize, skip_current: bool)
        -> Result<FetchResult>;

    fn move_by(&mut self, delta: i64) -> Result<CursorFlags>;
    fn first(&mut self) -> Result<CursorFlags>;
    fn last(&mut self) -> Result<CursorFlags>;

    /// Insert a row; the cursor is left on the new row.
    fn insert(&mut self, row: &Row) -> Result<CursorFlags>;
    /// Update the current row; the cursor is left on the updated row.
    fn update(&mut self, row: &Row) -> Result<CursorFlags>;
    /// Delete the current row; the cursor moves to the following row.
    fn delete(&mut self) -> Result<CursorFlags>;

    fn get_bookmark(&mut self) -> Result<BookmarkId>;
    /// Position on a bookmarked row. `false` means the row is gone.
    fn goto_bookmark(&mut self, bookmark: BookmarkId, forward: bool)
        -> Result<(bool, CursorFlags)>;
    fn compare_bookmarks(&mut self, a: BookmarkId, b: BookmarkId) -> Result<Ordering>;

    fn get_key(&mut self) -> Result<Row>;
    fn find_key(&mut self, key: &Row) -> Result<(bool, CursorFlags)>;
    fn find_nearest(&mut self, key: &Row) -> Result<CursorFlags>;
    fn refresh(&mut self, row: &Row) -> Result<(bool, CursorFlags)>;
    fn row_count(&mut self) -> Result<u64>;

    fn default_row(&mut self, row: &Row, column: Option<&str>) -> Result<Proposal>;
    fn change(&mut self, old: &Row, new: &Row, column: Option<&str>) -> Result<Proposal>;
    fn validate(&mut self, old: Option<&Row>, new: &Row, column: Option<&str>)
        -> Result<Proposal>;
}

/// Wrapper counting every call that crosses to the remote cursor.
pub(crate) struct RemoteLink<R> {
    cursor: R,
    round_trips: u64,
}

impl<R> RemoteLink<R> {
    pub(crate) fn new(cursor: R) -> Self {
        Self {
            cursor,
            round_trips: 0,
        }
    }

    /// Borrow the remote cursor for one round trip.
    #[inline]
    pub(crate) fn call(&mut self) -> &mut R {
        self.round_trips += 1;
        &mut self.cursor
    }

    /// Borrow the remote cursor without counting a round trip.
    #[inline]
    pub(crate) fn get(&self) -> &R {
        &self.cursor
    }

    pub(crate) fn call_uncounted(&mut self) -> &mut R {
        &mut self.cursor
    }

    #[inline]
    pub(crate) fn round_trips(&self) -> u64 {
        self.round_trips
    }
}

impl<R: RemoteCursor> DisposeBookmarks for RemoteLink<R> {
    fn dispose_bookmark(&mut self, bookmark: BookmarkId) -> Result<()> {
        self.call().dispose_bookmark(bookmark)
    }

    fn dispose_bookmarks(&mut self, bookmarks: &[BookmarkId]) -> Result<()> {
        self.call().dispose_bookmarks(bookmarks)
    }
}
