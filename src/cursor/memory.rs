//! In-process implementation of the remote cursor protocol.
//!
//! [`MemoryCursor`] behaves like a server-side cursor over a keyed, ordered
//! row set held in physical form. It serves as a loopback server for
//! embedded use and as the test double for the buffered cursor: every call
//! is recorded in a call log.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::buffer::DisposeBookmarks;
use crate::common::{
    BookmarkId, CursorCapabilities, CursorFlags, Direction, Error, Result, Row, RowHeader, Value,
};
use crate::cursor::remote::{FetchResult, Proposal, RemoteCursor};

/// One call received by a [`MemoryCursor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Open,
    Close,
    GetFlags,
    Reset,
    Select,
    SelectByHeader,
    Fetch {
        direction: Direction,
        count: usize,
        skip_current: bool,
    },
    MoveBy(i64),
    First,
    Last,
    Insert,
    Update,
    Delete,
    GetBookmark,
    GotoBookmark(BookmarkId),
    CompareBookmarks,
    DisposeBookmark(BookmarkId),
    DisposeBookmarks(Vec<BookmarkId>),
    GetKey,
    FindKey,
    FindNearest,
    Refresh,
    RowCount,
    Default,
    Change,
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Bof,
    On(usize),
    Eof,
}

struct StoredRow {
    id: u64,
    key: Value,
    physical: Vec<u8>,
}

/// A server-side cursor simulated in memory.
///
/// Rows are kept ordered by a single key column. Bookmarks are issued fresh
/// for every row handed out and stay live until disposed; a bookmark whose
/// row has been deleted no longer positions.
pub struct MemoryCursor {
    header: Arc<RowHeader>,
    key_header: Arc<RowHeader>,
    key_column: usize,
    rows: Vec<StoredRow>,
    position: Position,
    capabilities: CursorCapabilities,
    bookmarks: HashMap<BookmarkId, u64>,
    next_bookmark: u64,
    next_row_id: u64,
    defaults: Vec<(usize, Value)>,
    calls: Vec<RemoteCall>,
}

impl MemoryCursor {
    /// Build a cursor over `rows`, keyed on the first column.
    ///
    /// # Errors
    /// - `Error::RowFormat` if the header has no columns
    /// - `Error::Remote` on duplicate keys
    pub fn new(header: Arc<RowHeader>, rows: Vec<Row>) -> Result<Self> {
        let key_name = header
            .columns()
            .first()
            .cloned()
            .ok_or_else(|| Error::RowFormat("a keyed cursor needs at least one column".into()))?;
        let mut cursor = Self::keyed(header, key_name, rows.len());
        for row in rows {
            cursor.store(&row)?;
        }
        Ok(cursor)
    }

    fn keyed(header: Arc<RowHeader>, key_name: String, capacity: usize) -> Self {
        Self {
            key_header: Arc::new(RowHeader::new([key_name])),
            header,
            key_column: 0,
            rows: Vec::with_capacity(capacity),
            position: Position::Bof,
            capabilities: CursorCapabilities::all(),
            bookmarks: HashMap::new(),
            next_bookmark: 1,
            next_row_id: 1,
            defaults: Vec::new(),
            calls: Vec::new(),
        }
    }

    /// `count` rows of `(id, name)` with ids `0..count`.
    pub fn numbered(count: usize) -> Result<Self> {
        let header = Arc::new(RowHeader::new(["id", "name"]));
        let mut cursor = Self::keyed(header.clone(), "id".to_string(), count);
        for i in 0..count {
            let mut row = Row::empty(header.clone());
            row.set_at(0, Value::Integer(i as i64));
            row.set_at(1, Value::Text(format!("row{}", i)));
            cursor.store(&row)?;
        }
        Ok(cursor)
    }

    /// Restrict what this cursor supports.
    pub fn with_capabilities(mut self, capabilities: CursorCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Default value applied by `default_row` to a null column.
    ///
    /// Unknown column names are ignored.
    pub fn with_default(mut self, column: &str, value: Value) -> Self {
        if let Some(index) = self.header.index_of(column) {
            self.defaults.push((index, value));
        }
        self
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn header(&self) -> &Arc<RowHeader> {
        &self.header
    }

    /// Every call received, oldest first.
    pub fn calls(&self) -> &[RemoteCall] {
        &self.calls
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// Fetch calls received, as `(direction, count, skip_current)`.
    pub fn fetches(&self) -> Vec<(Direction, usize, bool)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                RemoteCall::Fetch {
                    direction,
                    count,
                    skip_current,
                } => Some((*direction, *count, *skip_current)),
                _ => None,
            })
            .collect()
    }

    /// Bookmarks issued and not yet disposed.
    pub fn live_bookmarks(&self) -> usize {
        self.bookmarks.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Delete the row with `key` as another session would, without moving
    /// this cursor's position onto a different row.
    ///
    /// Returns `true` if a row was removed.
    pub fn remove_concurrently(&mut self, key: &Value) -> bool {
        let Ok(index) = self.search(key) else {
            return false;
        };
        self.rows.remove(index);
        self.position = match self.position {
            Position::On(i) if i == index => {
                if index < self.rows.len() {
                    Position::On(index)
                } else {
                    Position::Eof
                }
            }
            Position::On(i) if i > index => Position::On(i - 1),
            other => other,
        };
        true
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn record(&mut self, call: RemoteCall) {
        self.calls.push(call);
    }

    fn flags(&self) -> CursorFlags {
        if self.rows.is_empty() {
            return CursorFlags::new(true, true);
        }
        CursorFlags::new(self.position == Position::Bof, self.position == Position::Eof)
    }

    fn search(&self, key: &Value) -> std::result::Result<usize, usize> {
        self.rows.binary_search_by(|r| r.key.cmp(key))
    }

    fn store(&mut self, row: &Row) -> Result<usize> {
        if row.header().columns() != self.header.columns() {
            return Err(Error::RowFormat("row header does not match cursor".into()));
        }
        let key = row
            .get(self.key_column)
            .cloned()
            .ok_or_else(|| Error::RowFormat("row has no key column".into()))?;
        let index = match self.search(&key) {
            Ok(_) => return Err(Error::Remote(format!("duplicate key {:?}", key))),
            Err(index) => index,
        };
        let id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.insert(
            index,
            StoredRow {
                id,
                key,
                physical: row.to_physical()?,
            },
        );
        Ok(index)
    }

    fn decode(&self, index: usize) -> Result<Row> {
        Row::from_physical(self.header.clone(), &self.rows[index].physical)
    }

    fn current_index(&self) -> Result<usize> {
        match self.position {
            Position::On(i) => Ok(i),
            _ => Err(Error::NoCurrentRow),
        }
    }

    fn issue_bookmark(&mut self, index: usize) -> BookmarkId {
        if !self.capabilities.bookmarkable {
            return BookmarkId::INVALID;
        }
        let bookmark = BookmarkId::new(self.next_bookmark);
        self.next_bookmark += 1;
        self.bookmarks.insert(bookmark, self.rows[index].id);
        bookmark
    }

    fn bookmark_index(&self, bookmark: BookmarkId) -> Result<Option<usize>> {
        let row_id = self
            .bookmarks
            .get(&bookmark)
            .ok_or_else(|| Error::Remote(format!("unknown {}", bookmark)))?;
        Ok(self.rows.iter().position(|r| r.id == *row_id))
    }

    fn step(&self, position: Position, direction: Direction) -> Position {
        let len = self.rows.len();
        match (direction, position) {
            (_, _) if len == 0 => match direction {
                Direction::Forward => Position::Eof,
                Direction::Backward => Position::Bof,
            },
            (Direction::Forward, Position::Bof) => Position::On(0),
            (Direction::Forward, Position::On(i)) if i + 1 < len => Position::On(i + 1),
            (Direction::Forward, _) => Position::Eof,
            (Direction::Backward, Position::Eof) => Position::On(len - 1),
            (Direction::Backward, Position::On(i)) if i > 0 => Position::On(i - 1),
            (Direction::Backward, _) => Position::Bof,
        }
    }

    fn require_backwards(&self) -> Result<()> {
        if self.capabilities.backwards_navigable {
            Ok(())
        } else {
            Err(Error::Unsupported("backward navigation"))
        }
    }

    fn require_updatable(&self) -> Result<()> {
        if self.capabilities.updatable {
            Ok(())
        } else {
            Err(Error::Unsupported("modification"))
        }
    }

    fn require_bookmarks(&self) -> Result<()> {
        if self.capabilities.bookmarkable {
            Ok(())
        } else {
            Err(Error::Unsupported("bookmarks"))
        }
    }

    fn key_of(&self, row: &Row) -> Result<Value> {
        let name = &self.key_header.columns()[0];
        row.value(name).cloned()
    }
}

impl DisposeBookmarks for MemoryCursor {
    fn dispose_bookmark(&mut self, bookmark: BookmarkId) -> Result<()> {
        self.record(RemoteCall::DisposeBookmark(bookmark));
        self.bookmarks
            .remove(&bookmark)
            .map(|_| ())
            .ok_or_else(|| Error::Remote(format!("unknown {}", bookmark)))
    }

    fn dispose_bookmarks(&mut self, bookmarks: &[BookmarkId]) -> Result<()> {
        self.record(RemoteCall::DisposeBookmarks(bookmarks.to_vec()));
        for bookmark in bookmarks {
            if self.bookmarks.remove(bookmark).is_none() {
                return Err(Error::Remote(format!("unknown {}", bookmark)));
            }
        }
        Ok(())
    }
}

impl RemoteCursor for MemoryCursor {
    fn capabilities(&self) -> CursorCapabilities {
        self.capabilities
    }

    fn open(&mut self) -> Result<CursorFlags> {
        self.record(RemoteCall::Open);
        self.position = Position::Bof;
        Ok(self.flags())
    }

    fn close(&mut self) -> Result<()> {
        self.record(RemoteCall::Close);
        self.bookmarks.clear();
        Ok(())
    }

    fn get_flags(&mut self) -> Result<CursorFlags> {
        self.record(RemoteCall::GetFlags);
        Ok(self.flags())
    }

    fn reset(&mut self) -> Result<CursorFlags> {
        self.record(RemoteCall::Reset);
        self.position = Position::Bof;
        Ok(self.flags())
    }

    fn select(&mut self) -> Result<Row> {
        self.record(RemoteCall::Select);
        let index = self.current_index()?;
        self.decode(index)
    }

    fn select_by_header(&mut self, header: &Arc<RowHeader>) -> Result<Row> {
        self.record(RemoteCall::SelectByHeader);
        let index = self.current_index()?;
        self.decode(index)?.project(header)
    }

    fn fetch(
        &mut self,
        direction: Direction,
        count: usize,
        skip_current: bool,
    ) -> Result<FetchResult> {
        self.record(RemoteCall::Fetch {
            direction,
            count,
            skip_current,
        });
        if !direction.is_forward() {
            self.require_backwards()?;
        }

        let mut indexes = Vec::with_capacity(count);
        let mut position = self.position;
        if !skip_current {
            if let Position::On(i) = position {
                indexes.push(i);
            }
        }
        while indexes.len() < count {
            position = self.step(position, direction);
            match position {
                Position::On(i) => indexes.push(i),
                _ => break,
            }
        }
        self.position = position;

        let mut rows = Vec::with_capacity(indexes.len());
        let mut bookmarks = Vec::with_capacity(indexes.len());
        for index in indexes {
            rows.push(self.decode(index)?);
            bookmarks.push(self.issue_bookmark(index));
        }
        Ok(FetchResult {
            rows,
            bookmarks,
            flags: self.flags(),
        })
    }

    fn move_by(&mut self, delta: i64) -> Result<CursorFlags> {
        self.record(RemoteCall::MoveBy(delta));
        let direction = if delta < 0 {
            self.require_backwards()?;
            Direction::Backward
        } else {
            Direction::Forward
        };
        for _ in 0..delta.unsigned_abs() {
            self.position = self.step(self.position, direction);
            if self.position == Position::Bof || self.position == Position::Eof {
                break;
            }
        }
        Ok(self.flags())
    }

    fn first(&mut self) -> Result<CursorFlags> {
        self.record(RemoteCall::First);
        self.position = Position::Bof;
        Ok(self.flags())
    }

    fn last(&mut self) -> Result<CursorFlags> {
        self.record(RemoteCall::Last);
        self.require_backwards()?;
        self.position = Position::Eof;
        Ok(self.flags())
    }

    fn insert(&mut self, row: &Row) -> Result<CursorFlags> {
        self.record(RemoteCall::Insert);
        self.require_updatable()?;
        let index = self.store(row)?;
        self.position = Position::On(index);
        Ok(self.flags())
    }

    fn update(&mut self, row: &Row) -> Result<CursorFlags> {
        self.record(RemoteCall::Update);
        self.require_updatable()?;
        let index = self.current_index()?;
        let old = self.rows.remove(index);
        match self.store(row) {
            Ok(new_index) => {
                // The updated row keeps its identity, so bookmarks follow it
                self.rows[new_index].id = old.id;
                self.position = Position::On(new_index);
                Ok(self.flags())
            }
            Err(e) => {
                self.rows.insert(index, old);
                Err(e)
            }
        }
    }

    fn delete(&mut self) -> Result<CursorFlags> {
        self.record(RemoteCall::Delete);
        self.require_updatable()?;
        let index = self.current_index()?;
        self.rows.remove(index);
        self.position = if index < self.rows.len() {
            Position::On(index)
        } else {
            Position::Eof
        };
        Ok(self.flags())
    }

    fn get_bookmark(&mut self) -> Result<BookmarkId> {
        self.record(RemoteCall::GetBookmark);
        self.require_bookmarks()?;
        let index = self.current_index()?;
        Ok(self.issue_bookmark(index))
    }

    fn goto_bookmark(&mut self, bookmark: BookmarkId, _forward: bool) -> Result<(bool, CursorFlags)> {
        self.record(RemoteCall::GotoBookmark(bookmark));
        self.require_bookmarks()?;
        // Unknown and dead bookmarks both fail to position
        match self.bookmark_index(bookmark).ok().flatten() {
            Some(index) => {
                self.position = Position::On(index);
                Ok((true, self.flags()))
            }
            None => Ok((false, self.flags())),
        }
    }

    fn compare_bookmarks(&mut self, a: BookmarkId, b: BookmarkId) -> Result<Ordering> {
        self.record(RemoteCall::CompareBookmarks);
        self.require_bookmarks()?;
        let a = self.bookmark_index(a)?;
        let b = self.bookmark_index(b)?;
        match (a, b) {
            (Some(a), Some(b)) => Ok(a.cmp(&b)),
            _ => Err(Error::Remote("bookmarked row no longer exists".into())),
        }
    }

    fn get_key(&mut self) -> Result<Row> {
        self.record(RemoteCall::GetKey);
        let index = self.current_index()?;
        Row::new(self.key_header.clone(), vec![self.rows[index].key.clone()])
    }

    fn find_key(&mut self, key: &Row) -> Result<(bool, CursorFlags)> {
        self.record(RemoteCall::FindKey);
        let key = self.key_of(key)?;
        match self.search(&key) {
            Ok(index) => {
                self.position = Position::On(index);
                Ok((true, self.flags()))
            }
            Err(_) => Ok((false, self.flags())),
        }
    }

    fn find_nearest(&mut self, key: &Row) -> Result<CursorFlags> {
        self.record(RemoteCall::FindNearest);
        let key = self.key_of(key)?;
        let index = match self.search(&key) {
            Ok(index) | Err(index) => index,
        };
        self.position = if index < self.rows.len() {
            Position::On(index)
        } else {
            Position::Eof
        };
        Ok(self.flags())
    }

    fn refresh(&mut self, row: &Row) -> Result<(bool, CursorFlags)> {
        self.record(RemoteCall::Refresh);
        let key = self.key_of(row)?;
        match self.search(&key) {
            Ok(index) => {
                self.position = Position::On(index);
                Ok((true, self.flags()))
            }
            Err(index) => {
                self.position = if index < self.rows.len() {
                    Position::On(index)
                } else {
                    Position::Eof
                };
                Ok((false, self.flags()))
            }
        }
    }

    fn row_count(&mut self) -> Result<u64> {
        self.record(RemoteCall::RowCount);
        Ok(self.rows.len() as u64)
    }

    fn default_row(&mut self, row: &Row, _column: Option<&str>) -> Result<Proposal> {
        self.record(RemoteCall::Default);
        let mut proposed = row.clone();
        let mut changed = false;
        for (index, value) in &self.defaults {
            if proposed.get(*index).is_some_and(Value::is_null) {
                proposed.set_at(*index, value.clone());
                changed = true;
            }
        }
        Ok(Proposal {
            row: proposed,
            changed,
        })
    }

    fn change(&mut self, _old: &Row, new: &Row, _column: Option<&str>) -> Result<Proposal> {
        self.record(RemoteCall::Change);
        Ok(Proposal {
            row: new.clone(),
            changed: false,
        })
    }

    fn validate(&mut self, _old: Option<&Row>, new: &Row, _column: Option<&str>) -> Result<Proposal> {
        self.record(RemoteCall::Validate);
        if self.key_of(new)?.is_null() {
            return Err(Error::Remote("key column is required".into()));
        }
        Ok(Proposal {
            row: new.clone(),
            changed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(result: &FetchResult) -> Vec<i64> {
        result
            .rows
            .iter()
            .map(|r| r.get(0).and_then(Value::as_integer).unwrap())
            .collect()
    }

    #[test]
    fn test_constructors() {
        let cursor = MemoryCursor::numbered(4).unwrap();
        assert_eq!(cursor.len(), 4);
        assert!(cursor.calls().is_empty());

        let header = Arc::new(RowHeader::new(["id"]));
        let rows = vec![
            Row::new(header.clone(), vec![Value::Integer(2)]).unwrap(),
            Row::new(header.clone(), vec![Value::Integer(1)]).unwrap(),
        ];
        let mut cursor = MemoryCursor::new(header.clone(), rows).unwrap();
        let result = cursor.fetch(Direction::Forward, 5, true).unwrap();
        assert_eq!(ids(&result), vec![1, 2]);

        let duplicate = vec![
            Row::new(header.clone(), vec![Value::Integer(1)]).unwrap(),
            Row::new(header.clone(), vec![Value::Integer(1)]).unwrap(),
        ];
        assert!(matches!(
            MemoryCursor::new(header, duplicate),
            Err(Error::Remote(_))
        ));
    }

    #[test]
    fn test_fetch_forward_from_bof() {
        let mut cursor = MemoryCursor::numbered(10).unwrap();
        let result = cursor.fetch(Direction::Forward, 3, true).unwrap();
        assert_eq!(ids(&result), vec![0, 1, 2]);
        assert_eq!(result.flags, CursorFlags::ON_ROW);
        assert_eq!(cursor.live_bookmarks(), 3);
    }

    #[test]
    fn test_fetch_includes_current_unless_skipped() {
        let mut cursor = MemoryCursor::numbered(10).unwrap();
        cursor.move_by(4).unwrap(); // on row 3

        let result = cursor.fetch(Direction::Forward, 2, false).unwrap();
        assert_eq!(ids(&result), vec![3, 4]);

        let result = cursor.fetch(Direction::Forward, 2, true).unwrap();
        assert_eq!(ids(&result), vec![5, 6]);
    }

    #[test]
    fn test_fetch_runs_off_the_end() {
        let mut cursor = MemoryCursor::numbered(3).unwrap();
        let result = cursor.fetch(Direction::Forward, 5, true).unwrap();
        assert_eq!(ids(&result), vec![0, 1, 2]);
        assert!(result.flags.eof);

        let result = cursor.fetch(Direction::Backward, 2, true).unwrap();
        assert_eq!(ids(&result), vec![2, 1]);
    }

    #[test]
    fn test_empty_set_flags() {
        let mut cursor = MemoryCursor::numbered(0).unwrap();
        let flags = cursor.open().unwrap();
        assert!(flags.bof && flags.eof);
    }

    #[test]
    fn test_bookmarks_follow_rows() {
        let mut cursor = MemoryCursor::numbered(5).unwrap();
        cursor.move_by(3).unwrap(); // on row 2
        let bookmark = cursor.get_bookmark().unwrap();

        cursor.first().unwrap();
        let (found, flags) = cursor.goto_bookmark(bookmark, true).unwrap();
        assert!(found);
        assert!(flags.on_row());
        assert_eq!(cursor.select().unwrap().get(0), Some(&Value::Integer(2)));

        assert!(cursor.remove_concurrently(&Value::Integer(2)));
        let (found, _) = cursor.goto_bookmark(bookmark, true).unwrap();
        assert!(!found);

        cursor.dispose_bookmark(bookmark).unwrap();
        assert!(cursor.dispose_bookmark(bookmark).is_err());
    }

    #[test]
    fn test_insert_positions_on_new_row() {
        let mut cursor = MemoryCursor::numbered(3).unwrap();
        let mut row = Row::empty(cursor.header().clone());
        row.set("id", Value::Integer(10)).unwrap();

        cursor.insert(&row).unwrap();
        assert_eq!(cursor.select().unwrap().get(0), Some(&Value::Integer(10)));
        assert!(cursor.insert(&row).is_err(), "duplicate key");
    }

    #[test]
    fn test_delete_moves_to_following_row() {
        let mut cursor = MemoryCursor::numbered(3).unwrap();
        cursor.move_by(2).unwrap(); // on row 1
        cursor.delete().unwrap();
        assert_eq!(cursor.select().unwrap().get(0), Some(&Value::Integer(2)));

        cursor.delete().unwrap();
        assert!(cursor.get_flags().unwrap().eof);
    }

    #[test]
    fn test_capabilities_enforced() {
        let mut cursor = MemoryCursor::numbered(3).unwrap().with_capabilities(CursorCapabilities::forward_only());
        assert!(matches!(cursor.last(), Err(Error::Unsupported(_))));
        assert!(matches!(cursor.move_by(-1), Err(Error::Unsupported(_))));

        let result = cursor.fetch(Direction::Forward, 2, true).unwrap();
        assert!(result.bookmarks.iter().all(|b| !b.is_valid()));
        assert_eq!(cursor.live_bookmarks(), 0);
    }

    #[test]
    fn test_find_nearest() {
        let mut cursor = MemoryCursor::numbered(5).unwrap();
        let mut key = Row::empty(cursor.header().clone());
        key.set("id", Value::Integer(7)).unwrap();

        let flags = cursor.find_nearest(&key).unwrap();
        assert!(flags.eof);

        key.set("id", Value::Integer(3)).unwrap();
        let (found, _) = cursor.find_key(&key).unwrap();
        assert!(found);
        assert_eq!(cursor.get_key().unwrap().get(0), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_default_row_fills_nulls() {
        let mut cursor = MemoryCursor::numbered(0).unwrap().with_default("name", Value::Text("new".into()));
        let row = Row::empty(cursor.header().clone());
        let proposal = cursor.default_row(&row, None).unwrap();
        assert!(proposal.changed);
        assert_eq!(proposal.row.value("name").unwrap().as_text(), Some("new"));
    }
}
