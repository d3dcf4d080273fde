//! The speculative fetch window.
//!
//! A [`RowBuffer`] holds a run of rows fetched from the remote cursor, kept
//! in cursor order regardless of the direction they were fetched in, plus a
//! position index:
//!
//! ```text
//!   index:   -1     0     1     2    ...   len-1   len
//!          ┌─────┬─────┬─────┬─────┬─────┬───────┬─────┐
//!          │ BOF │ r0  │ r1  │ r2  │ ... │ r(n-1)│ EOF │
//!          └─────┴─────┴─────┴─────┴─────┴───────┴─────┘
//! ```
//!
//! Positions `-1` and `len` are crack sentinels: the buffer's view of "just
//! before" and "just after" the window.

use crate::buffer::bookmark_table::{BookmarkTable, DisposeBookmarks};
use crate::common::{BookmarkId, Direction, Result, Row};

/// A fetched row plus the server bookmark identifying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedRow {
    pub row: Row,
    pub bookmark: BookmarkId,
}

impl BufferedRow {
    pub fn new(row: Row, bookmark: BookmarkId) -> Self {
        Self { row, bookmark }
    }
}

/// Ordered run of buffered rows with a direction and a position.
///
/// Invariant: `index ∈ [-1, len]`. Every buffered row holds one reference in
/// the owning cursor's [`BookmarkTable`] until the buffer is cleared.
#[derive(Debug)]
pub struct RowBuffer {
    rows: Vec<BufferedRow>,
    index: isize,
    direction: Direction,
    full: bool,
}

impl RowBuffer {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            index: -1,
            direction: Direction::Forward,
            full: false,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the buffer holds the result of a fetch (possibly empty).
    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn index(&self) -> isize {
        self.index
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    /// Index of the last buffered row (`-1` when empty).
    #[inline]
    pub fn last_index(&self) -> isize {
        self.rows.len() as isize - 1
    }

    /// Move the position. Values outside `[-1, len]` are clamped.
    pub fn set_index(&mut self, index: isize) {
        self.index = index.clamp(-1, self.rows.len() as isize);
    }

    pub fn rows(&self) -> &[BufferedRow] {
        &self.rows
    }

    pub fn at(&self, index: isize) -> Option<&BufferedRow> {
        usize::try_from(index).ok().and_then(|i| self.rows.get(i))
    }

    /// The row at the current position, or `None` on a crack.
    pub fn current(&self) -> Option<&BufferedRow> {
        self.at(self.index)
    }

    /// True when another buffered row lies in `direction` from the current
    /// position.
    pub fn can_step(&self, direction: Direction) -> bool {
        let target = self.index + direction.step();
        target >= 0 && target <= self.last_index()
    }

    /// Move one row in `direction` without bounds checking beyond the
    /// crack sentinels.
    pub fn step(&mut self, direction: Direction) {
        self.set_index(self.index + direction.step());
    }

    /// Buffer position of a bookmark, by linear scan.
    ///
    /// Windows are small, so a scan beats maintaining an index.
    pub fn position_of(&self, bookmark: BookmarkId) -> Option<usize> {
        self.rows.iter().position(|r| r.bookmark == bookmark)
    }

    /// Install freshly fetched rows.
    ///
    /// `rows` arrive in traversal order; backward fetches are reversed so
    /// the buffer is always in cursor order. Each valid bookmark is tracked
    /// in `table`; rows from cursors without bookmark support carry
    /// [`BookmarkId::INVALID`] and are not tracked. The position lands on the row nearest the starting point:
    /// the first row for a forward fetch, the last for a backward one.
    pub fn load(&mut self, mut rows: Vec<BufferedRow>, direction: Direction, table: &mut BookmarkTable) {
        debug_assert!(self.rows.is_empty(), "load into a non-empty buffer");
        for row in rows.iter().filter(|r| r.bookmark.is_valid()) {
            table.track(row.bookmark);
        }
        if !direction.is_forward() {
            rows.reverse();
        }
        self.rows = rows;
        self.direction = direction;
        self.full = true;
        self.index = match direction {
            Direction::Forward => 0,
            Direction::Backward => self.last_index(),
        };
    }

    /// Drop every buffered row, releasing their bookmark references with a
    /// single batched disposal for those that reach zero.
    ///
    /// The buffer is empty afterwards even if the remote disposal fails.
    pub fn clear<D>(&mut self, table: &mut BookmarkTable, remote: &mut D) -> Result<()>
    where
        D: DisposeBookmarks + ?Sized,
    {
        let rows = std::mem::take(&mut self.rows);
        self.index = -1;
        self.full = false;
        if rows.is_empty() {
            return Ok(());
        }
        let bookmarks: Vec<BookmarkId> = rows
            .iter()
            .map(|r| r.bookmark)
            .filter(BookmarkId::is_valid)
            .collect();
        if !bookmarks.is_empty() {
            table.release_batch(&bookmarks, remote)?;
        }
        Ok(())
    }
}

impl Default for RowBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{RowHeader, Value};
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        batches: Vec<Vec<BookmarkId>>,
    }

    impl DisposeBookmarks for Recorder {
        fn dispose_bookmark(&mut self, bookmark: BookmarkId) -> Result<()> {
            self.batches.push(vec![bookmark]);
            Ok(())
        }

        fn dispose_bookmarks(&mut self, bookmarks: &[BookmarkId]) -> Result<()> {
            self.batches.push(bookmarks.to_vec());
            Ok(())
        }
    }

    fn rows(ids: &[i64]) -> Vec<BufferedRow> {
        let header = Arc::new(RowHeader::new(["id"]));
        ids.iter()
            .map(|&id| {
                let row = Row::new(header.clone(), vec![Value::Integer(id)]).unwrap();
                BufferedRow::new(row, BookmarkId::new(id as u64 + 100))
            })
            .collect()
    }

    fn id_at(buffer: &RowBuffer, index: isize) -> i64 {
        buffer.at(index).unwrap().row.get(0).unwrap().as_integer().unwrap()
    }

    #[test]
    fn test_new_buffer_is_inactive() {
        let buffer = RowBuffer::new();
        assert!(!buffer.is_full());
        assert_eq!(buffer.index(), -1);
        assert!(buffer.current().is_none());
    }

    #[test]
    fn test_load_forward() {
        let mut table = BookmarkTable::new();
        let mut buffer = RowBuffer::new();

        buffer.load(rows(&[1, 2, 3]), Direction::Forward, &mut table);

        assert!(buffer.is_full());
        assert_eq!(buffer.index(), 0);
        assert_eq!(id_at(&buffer, 0), 1);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_load_backward_reverses() {
        let mut table = BookmarkTable::new();
        let mut buffer = RowBuffer::new();

        // Traversal order going backward: 9, 8, 7
        buffer.load(rows(&[9, 8, 7]), Direction::Backward, &mut table);

        assert_eq!(buffer.index(), 2);
        assert_eq!(id_at(&buffer, 0), 7);
        assert_eq!(id_at(&buffer, 2), 9);
        assert_eq!(buffer.direction(), Direction::Backward);
    }

    #[test]
    fn test_load_empty_lands_on_crack() {
        let mut table = BookmarkTable::new();
        let mut buffer = RowBuffer::new();
        buffer.load(Vec::new(), Direction::Forward, &mut table);
        assert!(buffer.is_full());
        assert_eq!(buffer.index(), 0);
        assert!(buffer.current().is_none());

        let mut buffer = RowBuffer::new();
        buffer.load(Vec::new(), Direction::Backward, &mut table);
        assert_eq!(buffer.index(), -1);
    }

    #[test]
    fn test_step_bounds() {
        let mut table = BookmarkTable::new();
        let mut buffer = RowBuffer::new();
        buffer.load(rows(&[1, 2]), Direction::Forward, &mut table);

        assert!(buffer.can_step(Direction::Forward));
        assert!(!buffer.can_step(Direction::Backward));

        buffer.step(Direction::Forward);
        assert_eq!(buffer.index(), 1);
        assert!(!buffer.can_step(Direction::Forward));

        buffer.step(Direction::Forward);
        assert_eq!(buffer.index(), 2);
        buffer.step(Direction::Forward);
        assert_eq!(buffer.index(), 2, "clamped at the EOF sentinel");
    }

    #[test]
    fn test_position_of() {
        let mut table = BookmarkTable::new();
        let mut buffer = RowBuffer::new();
        buffer.load(rows(&[1, 2, 3]), Direction::Forward, &mut table);

        assert_eq!(buffer.position_of(BookmarkId::new(102)), Some(1));
        assert_eq!(buffer.position_of(BookmarkId::new(999)), None);
    }

    #[test]
    fn test_clear_releases_in_one_batch() {
        let mut table = BookmarkTable::new();
        let mut remote = Recorder::default();
        let mut buffer = RowBuffer::new();
        buffer.load(rows(&[1, 2, 3]), Direction::Forward, &mut table);

        // The application holds a second reference to row 2
        table.checkout(BookmarkId::new(102)).unwrap();

        buffer.clear(&mut table, &mut remote).unwrap();

        assert!(!buffer.is_full());
        assert!(buffer.is_empty());
        assert_eq!(buffer.index(), -1);
        assert_eq!(
            remote.batches,
            vec![vec![BookmarkId::new(101), BookmarkId::new(103)]]
        );
        assert_eq!(table.ref_count(BookmarkId::new(102)), Some(1));
    }

    #[test]
    fn test_invalid_bookmarks_untracked() {
        let mut table = BookmarkTable::new();
        let mut remote = Recorder::default();
        let mut buffer = RowBuffer::new();
        let rows: Vec<BufferedRow> = rows(&[1, 2])
            .into_iter()
            .map(|r| BufferedRow::new(r.row, BookmarkId::INVALID))
            .collect();

        buffer.load(rows, Direction::Forward, &mut table);
        assert!(table.is_empty());

        buffer.clear(&mut table, &mut remote).unwrap();
        assert!(remote.batches.is_empty());
    }

    #[test]
    fn test_clear_empty_is_silent() {
        let mut table = BookmarkTable::new();
        let mut remote = Recorder::default();
        let mut buffer = RowBuffer::new();
        buffer.clear(&mut table, &mut remote).unwrap();
        assert!(remote.batches.is_empty());
    }
}
