//! Buffered cursor - the client-side navigational engine.
//!
//! The [`BufferedCursor`] provides:
//! - Row-at-a-time navigation over a remote cursor
//! - A fetch window that turns most `next`/`prior` calls into index arithmetic
//! - Exact bookmark semantics on top of the window
//! - Local evaluation of proposable calls when the schema replica allows it

use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use crate::buffer::{BookmarkTable, BufferedRow, CursorStats, RowBuffer};
use crate::common::{
    BookmarkId, CursorCapabilities, CursorConfig, CursorFlags, Direction, Error,
    ProposableKind, Result, Row, RowHeader,
};
use crate::cursor::context::{marshal_row, CursorContext, ProposableCall};
use crate::cursor::remote::{Proposal, RemoteCursor, RemoteLink};

/// Where the remote cursor sits relative to the buffer.
///
/// `Known(i)` uses buffer indexes: `-1` is just before the window, `len` just
/// after it, anything in between is on that buffered row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceIndex {
    Known(isize),
    Unknown,
}

/// A cursor that buffers a window of rows from a [`RemoteCursor`].
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                       BufferedCursor                         │
/// │  ┌──────────────────────┐   ┌─────────────────────────────┐  │
/// │  │ buffer: RowBuffer    │   │ bookmarks: BookmarkTable    │  │
/// │  │ [r0][r1]...[rn-1]    │──▶│ BookmarkId → refcount       │  │
/// │  │ index, direction     │   └─────────────────────────────┘  │
/// │  └──────────────────────┘                 │ dispose at 0     │
/// │  ┌──────────────────────┐   ┌─────────────▼───────────────┐  │
/// │  │ flags, source_index  │   │ link: RemoteLink<R>         │  │
/// │  │ trivial_bof          │   │ counts every round trip     │  │
/// │  └──────────────────────┘   └─────────────────────────────┘  │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// # Ownership
/// A cursor belongs to exactly one logical process and is not shared across
/// threads; it owns its buffer and bookmark table outright. The parent
/// [`CursorContext`] is held weakly and only used for lookups.
///
/// # Direction after mutations
/// `insert`, `update`, `delete`, `find_key`, `find_nearest` and `refresh` all
/// leave the buffer direction at [`Direction::Backward`], so the next refill
/// triggered by `select` reads the window ending at the current row.
pub struct BufferedCursor<R: RemoteCursor> {
    /// The remote cursor, wrapped to count round trips.
    link: RemoteLink<R>,

    /// The fetch window.
    buffer: RowBuffer,

    /// Reference counts for every bookmark this cursor holds.
    bookmarks: BookmarkTable,

    /// Remote capabilities, captured at construction.
    capabilities: CursorCapabilities,

    /// Rows per remote fetch.
    fetch_count: usize,

    /// Last flags reported by the remote, or `None` once invalidated.
    flags: Option<CursorFlags>,

    /// Where the remote cursor is relative to the buffer.
    source_index: SourceIndex,

    /// Position of the remote cursor counted from the BOF crack (-1), when
    /// known. Lets a cursor without bookmarks rewind onto a buffered row.
    remote_ordinal: Option<i64>,

    /// Set while the cursor has never been positioned, so BOF needs no
    /// round trip.
    trivial_bof: bool,

    /// Cached row count and the round-trip counter it was read at.
    row_count: Option<(u64, u64)>,

    /// Non-owning back-reference to the owning process.
    context: Option<Weak<dyn CursorContext>>,

    stats: CursorStats,

    open: bool,
}

impl<R: RemoteCursor> BufferedCursor<R> {
    /// Wrap a remote cursor.
    ///
    /// The cursor starts closed; call [`open`](Self::open) before use.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` if the config is invalid
    pub fn new(remote: R, config: CursorConfig) -> Result<Self> {
        config.validate()?;
        let capabilities = remote.capabilities();
        Ok(Self {
            link: RemoteLink::new(remote),
            buffer: RowBuffer::new(),
            bookmarks: BookmarkTable::new(),
            capabilities,
            fetch_count: config.fetch_count,
            flags: None,
            source_index: SourceIndex::Unknown,
            remote_ordinal: None,
            trivial_bof: true,
            row_count: None,
            context: None,
            stats: CursorStats::default(),
            open: false,
        })
    }

    /// Attach the owning process's context. Only a weak reference is kept.
    pub fn set_context<C: CursorContext + 'static>(&mut self, context: &Arc<C>) {
        let weak: Weak<C> = Arc::downgrade(context);
        self.context = Some(weak);
    }

    // ========================================================================
    // Public API: Lifecycle
    // ========================================================================

    pub fn open(&mut self) -> Result<()> {
        if self.open {
            return Ok(());
        }
        let flags = self.link.call().open()?;
        self.flags = Some(flags);
        self.source_index = SourceIndex::Unknown;
        self.remote_ordinal = Some(-1);
        self.trivial_bof = true;
        self.buffer.set_direction(Direction::Forward);
        self.open = true;
        Ok(())
    }

    /// Close the cursor, releasing the buffer and every bookmark still held.
    ///
    /// Bookmark disposal here is best-effort: failures are logged and
    /// swallowed since the remote cursor is going away regardless. Closing
    /// twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        if let Err(e) = self.buffer.clear(&mut self.bookmarks, &mut self.link) {
            warn!(error = %e, "failed to release buffered bookmarks on close");
        }
        if let Err(e) = self.bookmarks.release_all(&mut self.link) {
            warn!(error = %e, "failed to release held bookmarks on close");
        }
        self.flags = None;
        self.source_index = SourceIndex::Unknown;
        self.remote_ordinal = None;
        self.link.call().close()
    }

    /// Return to the BOF crack, discarding the buffer.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.clear_buffer()?;
        let flags = self.link.call().reset()?;
        self.flags = Some(flags);
        self.remote_ordinal = Some(-1);
        self.buffer.set_direction(Direction::Forward);
        self.trivial_bof = true;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    // ========================================================================
    // Public API: Reading
    // ========================================================================

    /// Copy of the current row.
    ///
    /// # Errors
    /// - `Error::NoCurrentRow` if the cursor is on a crack
    pub fn select(&mut self) -> Result<Row> {
        self.ensure_open()?;
        if !self.use_buffer() {
            return self.link.call().select();
        }
        self.ensure_buffer_for_read()?;
        self.buffer
            .current()
            .map(|r| r.row.clone())
            .ok_or(Error::NoCurrentRow)
    }

    /// The named columns of the current row.
    ///
    /// # Errors
    /// - `Error::NoCurrentRow` if the cursor is on a crack
    /// - `Error::UnknownColumn` if a name is not in the row
    pub fn select_columns(&mut self, header: &Arc<RowHeader>) -> Result<Row> {
        self.ensure_open()?;
        if !self.use_buffer() {
            return self.link.call().select_by_header(header);
        }
        self.ensure_buffer_for_read()?;
        let current = self.buffer.current().ok_or(Error::NoCurrentRow)?;
        current.row.project(header)
    }

    /// True on the BOF crack.
    pub fn bof(&mut self) -> Result<bool> {
        self.ensure_open()?;
        if self.trivial_bof {
            return Ok(true);
        }
        let flags = self.remote_flags()?;
        Ok(flags.bof && (self.buffer.is_empty() || self.buffer.index() < 0))
    }

    /// True on the EOF crack.
    pub fn eof(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let flags = self.remote_flags()?;
        Ok(flags.eof
            && (self.buffer.is_empty() || self.buffer.index() >= self.buffer.len() as isize))
    }

    /// Number of rows in the underlying set.
    ///
    /// The answer is cached until the next round trip of any kind.
    pub fn row_count(&mut self) -> Result<u64> {
        self.ensure_open()?;
        if let Some((count, at)) = self.row_count {
            if at == self.link.round_trips() {
                return Ok(count);
            }
        }
        let count = self.link.call().row_count()?;
        self.row_count = Some((count, self.link.round_trips()));
        Ok(count)
    }

    // ========================================================================
    // Public API: Navigation
    // ========================================================================

    /// Move to the next row. Returns `false` at EOF.
    pub fn next(&mut self) -> Result<bool> {
        self.navigate(Direction::Forward)
    }

    /// Move to the prior row. Returns `false` at BOF.
    pub fn prior(&mut self) -> Result<bool> {
        self.navigate(Direction::Backward)
    }

    /// Move to the BOF crack. The buffer refills lazily.
    pub fn first(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.clear_buffer()?;
        self.buffer.set_direction(Direction::Forward);
        let flags = self.link.call().first()?;
        self.flags = Some(flags);
        self.remote_ordinal = Some(-1);
        self.trivial_bof = true;
        Ok(())
    }

    /// Move to the EOF crack. The buffer refills lazily.
    pub fn last(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.clear_buffer()?;
        self.buffer.set_direction(Direction::Backward);
        let flags = self.link.call().last()?;
        self.flags = Some(flags);
        self.remote_ordinal = None;
        self.trivial_bof = false;
        Ok(())
    }

    /// Move `delta` rows. Returns `true` if the cursor lands on a row.
    pub fn move_by(&mut self, delta: i64) -> Result<bool> {
        self.ensure_open()?;
        if delta == 0 {
            return if self.buffer_active() {
                Ok(self.buffer.current().is_some())
            } else {
                Ok(self.remote_flags()?.on_row())
            };
        }
        self.trivial_bof = false;

        let mut remaining = delta;
        if self.buffer_active() {
            let target = self.buffer.index() as i64 + delta;
            if target >= 0 && target <= self.buffer.last_index() as i64 {
                self.buffer.set_index(target as isize);
                self.stats.buffer_hits += 1;
                return Ok(true);
            }
            // Put the remote on the window edge facing the target and move
            // the rest of the way from there.
            if !self.buffer.is_empty() {
                let last = self.buffer.last_index();
                let anchor = match self.source_index {
                    SourceIndex::Known(source) if target < 0 && source <= 0 => source,
                    SourceIndex::Known(source) if target >= 0 && source >= last => source,
                    _ if target < 0 => 0,
                    _ => last,
                };
                self.sync_source(anchor)?;
                remaining = target - anchor as i64;
            }
        }

        self.clear_buffer()?;
        self.buffer.set_direction(if delta > 0 {
            Direction::Forward
        } else {
            Direction::Backward
        });
        if remaining == 0 {
            return Ok(self.remote_flags()?.on_row());
        }
        let flags = self.link.call().move_by(remaining)?;
        self.flags = Some(flags);
        self.track_move(remaining, flags);
        Ok(flags.on_row())
    }

    // ========================================================================
    // Public API: Bookmarks
    // ========================================================================

    /// Bookmark of the current row.
    ///
    /// Inside the buffer this takes another reference to the row's tracked
    /// bookmark without a round trip. Every bookmark returned must be handed
    /// back through [`dispose_bookmark`](Self::dispose_bookmark).
    pub fn get_bookmark(&mut self) -> Result<BookmarkId> {
        self.ensure_open()?;
        if !self.capabilities.bookmarkable {
            return Err(Error::Unsupported("bookmarks"));
        }
        if self.buffer_active() {
            let bookmark = self
                .buffer
                .current()
                .map(|r| r.bookmark)
                .ok_or(Error::NoCurrentRow)?;
            self.bookmarks.checkout(bookmark)?;
            self.stats.buffer_hits += 1;
            return Ok(bookmark);
        }
        let bookmark = self.link.call().get_bookmark()?;
        if self.use_buffer() {
            self.bookmarks.track(bookmark);
        }
        Ok(bookmark)
    }

    /// Position on a bookmarked row.
    ///
    /// A bookmark inside the buffer only moves the index. Otherwise the
    /// buffer is discarded and the remote cursor repositioned.
    ///
    /// # Errors
    /// - `Error::CursorSyncError` if the server rejects a bookmark this
    ///   cursor is tracking
    pub fn goto_bookmark(&mut self, bookmark: BookmarkId, forward: bool) -> Result<bool> {
        self.ensure_open()?;
        if self.buffer_active() {
            if let Some(position) = self.buffer.position_of(bookmark) {
                self.buffer.set_index(position as isize);
                self.trivial_bof = false;
                self.stats.buffer_hits += 1;
                return Ok(true);
            }
        }

        let known = self.bookmarks.contains(bookmark);
        self.clear_buffer()?;
        let (found, flags) = self.link.call().goto_bookmark(bookmark, forward)?;
        self.flags = Some(flags);
        self.remote_ordinal = None;
        self.trivial_bof = false;
        if !found && known {
            return Err(Error::CursorSyncError(bookmark));
        }
        Ok(found)
    }

    /// Order two bookmarks. Answered locally when both rows are buffered.
    pub fn compare_bookmarks(&mut self, a: BookmarkId, b: BookmarkId) -> Result<Ordering> {
        self.ensure_open()?;
        if self.buffer_active() {
            if let (Some(i), Some(j)) = (self.buffer.position_of(a), self.buffer.position_of(b)) {
                self.stats.buffer_hits += 1;
                return Ok(i.cmp(&j));
            }
        }
        self.link.call().compare_bookmarks(a, b)
    }

    /// Hand back a bookmark obtained from [`get_bookmark`](Self::get_bookmark).
    ///
    /// # Errors
    /// - `Error::InvalidBookmark` if this cursor buffers and the bookmark is
    ///   not tracked (for instance, it was already disposed)
    pub fn dispose_bookmark(&mut self, bookmark: BookmarkId) -> Result<()> {
        if self.bookmarks.contains(bookmark) {
            self.bookmarks.release(bookmark, &mut self.link)?;
            return Ok(());
        }
        // A buffering cursor tracks every bookmark it hands out
        if self.use_buffer() {
            return Err(Error::InvalidBookmark(bookmark));
        }
        self.link.call().dispose_bookmark(bookmark)
    }

    /// Hand back several bookmarks. Tracked bookmarks that reach zero are
    /// disposed remotely in one batched call.
    pub fn dispose_bookmarks(&mut self, bookmarks: &[BookmarkId]) -> Result<()> {
        let (tracked, untracked): (Vec<BookmarkId>, Vec<BookmarkId>) = bookmarks
            .iter()
            .copied()
            .partition(|&b| self.bookmarks.contains(b));
        if let Some(&stray) = untracked.first() {
            if self.use_buffer() {
                return Err(Error::InvalidBookmark(stray));
            }
        }
        if !tracked.is_empty() {
            self.bookmarks.release_batch(&tracked, &mut self.link)?;
        }
        if !untracked.is_empty() {
            self.link.call().dispose_bookmarks(&untracked)?;
        }
        Ok(())
    }

    // ========================================================================
    // Public API: Modification
    // ========================================================================

    /// Insert a row. The cursor is left on the new row.
    pub fn insert(&mut self, row: &Row) -> Result<()> {
        self.ensure_open()?;
        self.flush_streams(row)?;
        self.link.call().insert(row)?;
        self.after_mutation()
    }

    /// Replace the current row.
    pub fn update(&mut self, row: &Row) -> Result<()> {
        self.ensure_open()?;
        self.sync_current()?;
        self.flush_streams(row)?;
        self.link.call().update(row)?;
        self.after_mutation()
    }

    /// Delete the current row.
    pub fn delete(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.sync_current()?;
        self.link.call().delete()?;
        self.after_mutation()
    }

    // ========================================================================
    // Public API: Searching
    // ========================================================================

    /// Key of the current row.
    pub fn get_key(&mut self) -> Result<Row> {
        self.ensure_open()?;
        self.sync_current()?;
        self.link.call().get_key()
    }

    /// Position on the row with exactly this key.
    pub fn find_key(&mut self, key: &Row) -> Result<bool> {
        self.ensure_open()?;
        self.prepare_reposition()?;
        let (found, flags) = self.link.call().find_key(key)?;
        self.flags = Some(flags);
        Ok(found)
    }

    /// Position on the first row at or after this key.
    pub fn find_nearest(&mut self, key: &Row) -> Result<()> {
        self.ensure_open()?;
        self.prepare_reposition()?;
        let flags = self.link.call().find_nearest(key)?;
        self.flags = Some(flags);
        Ok(())
    }

    /// Re-read the row matching `row`'s key and position on it.
    pub fn refresh(&mut self, row: &Row) -> Result<bool> {
        self.ensure_open()?;
        self.prepare_reposition()?;
        let (found, flags) = self.link.call().refresh(row)?;
        self.flags = Some(flags);
        Ok(found)
    }

    // ========================================================================
    // Public API: Proposable calls
    // ========================================================================

    /// Apply default values to a new row.
    pub fn default_row(&mut self, row: &Row, column: Option<&str>) -> Result<Proposal> {
        self.propose(ProposableKind::Default, None, row, column)
    }

    /// Propagate a change to `column` through the row's rules.
    pub fn change(&mut self, old: &Row, new: &Row, column: Option<&str>) -> Result<Proposal> {
        self.propose(ProposableKind::Change, Some(old), new, column)
    }

    /// Check a proposed row against its constraints.
    pub fn validate(
        &mut self,
        old: Option<&Row>,
        new: &Row,
        column: Option<&str>,
    ) -> Result<Proposal> {
        self.propose(ProposableKind::Validate, old, new, column)
    }

    // ========================================================================
    // Public API: Stats and info
    // ========================================================================

    /// Counters for this cursor.
    pub fn stats(&self) -> CursorStats {
        CursorStats {
            round_trips: self.link.round_trips(),
            ..self.stats
        }
    }

    pub fn capabilities(&self) -> CursorCapabilities {
        self.capabilities
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count
    }

    /// Whether this cursor buffers at all.
    pub fn is_buffering(&self) -> bool {
        self.use_buffer()
    }

    /// Rows currently in the window.
    pub fn buffered_rows(&self) -> usize {
        self.buffer.len()
    }

    /// Position inside the window (`-1` and `len` are the cracks).
    pub fn buffer_index(&self) -> isize {
        self.buffer.index()
    }

    pub fn buffer_direction(&self) -> Direction {
        self.buffer.direction()
    }

    /// Local reference count of a bookmark, or `None` if untracked.
    pub fn bookmark_ref_count(&self, bookmark: BookmarkId) -> Option<u32> {
        self.bookmarks.ref_count(bookmark)
    }

    /// The wrapped remote cursor.
    pub fn remote(&self) -> &R {
        self.link.get()
    }

    /// Mutable access to the wrapped remote cursor.
    ///
    /// Calls made through this reference bypass the buffer and are not
    /// counted as round trips.
    pub fn remote_mut(&mut self) -> &mut R {
        self.link.call_uncounted()
    }

    // ========================================================================
    // Internal: Buffer policy
    // ========================================================================

    /// Buffering needs more than one row per fetch, and either exact
    /// repositioning through bookmarks or a cursor that never needs it.
    fn use_buffer(&self) -> bool {
        self.fetch_count > 1 && self.capabilities.supports_buffering()
    }

    fn buffer_active(&self) -> bool {
        self.use_buffer() && self.buffer.is_full()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::CursorClosed)
        }
    }

    fn remote_flags(&mut self) -> Result<CursorFlags> {
        if let Some(flags) = self.flags {
            return Ok(flags);
        }
        let flags = self.link.call().get_flags()?;
        self.flags = Some(flags);
        Ok(flags)
    }

    fn clear_buffer(&mut self) -> Result<()> {
        self.source_index = SourceIndex::Unknown;
        if !self.buffer.is_full() && self.buffer.is_empty() {
            return Ok(());
        }
        self.buffer.clear(&mut self.bookmarks, &mut self.link)
    }

    /// Fetch a window in `direction` into the (empty) buffer.
    fn fill(&mut self, direction: Direction, skip_current: bool) -> Result<()> {
        let was_on_row = self.flags.is_some_and(|f| f.on_row());
        let result = self
            .link
            .call()
            .fetch(direction, self.fetch_count, skip_current)?;
        if result.rows.len() != result.bookmarks.len() {
            return Err(Error::Remote(format!(
                "fetch returned {} rows but {} bookmarks",
                result.rows.len(),
                result.bookmarks.len()
            )));
        }

        let fetched = result.rows.len();
        self.remote_ordinal = match (direction, self.remote_ordinal) {
            (Direction::Forward, Some(ordinal)) if fetched > 0 => {
                let first = if skip_current || !was_on_row {
                    ordinal + 1
                } else {
                    ordinal
                };
                Some(first + fetched as i64 - 1 + i64::from(result.flags.eof))
            }
            _ => None,
        };
        let rows: Vec<BufferedRow> = result
            .rows
            .into_iter()
            .zip(result.bookmarks)
            .map(|(row, bookmark)| BufferedRow::new(row, bookmark))
            .collect();
        self.buffer.load(rows, direction, &mut self.bookmarks);
        self.flags = Some(result.flags);
        self.trivial_bof = false;

        let len = self.buffer.len() as isize;
        self.source_index = if result.flags.at_end(direction) {
            SourceIndex::Known(if direction.is_forward() { len } else { -1 })
        } else if len > 0 {
            SourceIndex::Known(if direction.is_forward() { len - 1 } else { 0 })
        } else {
            SourceIndex::Unknown
        };

        self.stats.refills += 1;
        self.stats.rows_fetched += fetched as u64;
        debug!(%direction, fetched, skip_current, "filled cursor buffer");
        Ok(())
    }

    /// Make sure a read can be answered from the buffer, filling it from
    /// the remote cursor's current row if needed.
    fn ensure_buffer_for_read(&mut self) -> Result<()> {
        if self.buffer.is_full() {
            self.stats.buffer_hits += 1;
            return Ok(());
        }
        if self.trivial_bof || !self.remote_flags()?.on_row() {
            return Err(Error::NoCurrentRow);
        }
        let direction = self.buffer.direction();
        self.fill(direction, false)
    }

    fn navigate(&mut self, direction: Direction) -> Result<bool> {
        self.ensure_open()?;
        self.trivial_bof = false;
        self.buffer.set_direction(direction);

        if !self.use_buffer() {
            let step = direction.step() as i64;
            let flags = self.link.call().move_by(step)?;
            self.flags = Some(flags);
            self.track_move(step, flags);
            return Ok(!flags.at_end(direction));
        }

        if !self.buffer.is_full() {
            self.fill(direction, true)?;
            return Ok(self.buffer.current().is_some());
        }

        if self.buffer.can_step(direction) {
            self.buffer.step(direction);
            self.stats.buffer_hits += 1;
            return Ok(true);
        }

        // At the edge of the window.
        let (edge, beyond) = match direction {
            Direction::Forward => (self.buffer.last_index(), self.buffer.len() as isize),
            Direction::Backward => (0, -1),
        };
        let at_end = self.flags.is_some_and(|f| f.at_end(direction));
        if self.source_index == SourceIndex::Known(beyond) && at_end {
            self.buffer.set_index(beyond);
            self.stats.buffer_hits += 1;
            return Ok(false);
        }

        if !self.buffer.is_empty() {
            self.sync_source(edge)?;
        }
        self.clear_buffer()?;
        self.fill(direction, true)?;
        Ok(self.buffer.current().is_some())
    }

    /// Put the remote cursor on buffered row `index`.
    fn sync_source(&mut self, index: isize) -> Result<()> {
        if self.source_index == SourceIndex::Known(index) {
            return Ok(());
        }
        if !self.capabilities.bookmarkable {
            return self.sync_by_moving(index);
        }
        let origin = self.window_origin();
        let bookmark = self
            .buffer
            .at(index)
            .map(|r| r.bookmark)
            .ok_or(Error::NoCurrentRow)?;
        let (found, flags) = self.link.call().goto_bookmark(bookmark, true)?;
        if !found {
            warn!(%bookmark, "server rejected buffered bookmark");
            return Err(Error::CursorSyncError(bookmark));
        }
        self.flags = Some(flags);
        self.source_index = SourceIndex::Known(index);
        self.remote_ordinal = origin.map(|origin| origin + index as i64);
        self.stats.syncs += 1;
        debug!(index, %bookmark, "synchronized remote cursor");
        Ok(())
    }

    /// Reposition a cursor without bookmarks: step from where the remote
    /// is, or rewind and walk forward when it cannot step back.
    fn sync_by_moving(&mut self, index: isize) -> Result<()> {
        let SourceIndex::Known(source) = self.source_index else {
            return Err(Error::Unsupported(
                "repositioning a cursor without bookmark support",
            ));
        };
        let (delta, flags) = if index >= source || self.capabilities.backwards_navigable {
            let delta = (index - source) as i64;
            (delta, self.link.call().move_by(delta)?)
        } else {
            let origin = self.window_origin().ok_or(Error::Unsupported(
                "rewinding a cursor whose position is unknown",
            ))?;
            self.link.call().reset()?;
            self.remote_ordinal = Some(-1);
            let delta = origin + index as i64 + 1;
            (delta, self.link.call().move_by(delta)?)
        };
        self.flags = Some(flags);
        self.track_move(delta, flags);
        if !flags.on_row() {
            self.source_index = SourceIndex::Unknown;
            warn!(index, "buffered row no longer reachable by moving");
            return Err(Error::CursorSyncError(BookmarkId::INVALID));
        }
        self.source_index = SourceIndex::Known(index);
        self.stats.syncs += 1;
        debug!(index, delta, "synchronized remote cursor by moving");
        Ok(())
    }

    /// Ordinal of buffered row 0, when both ends of the mapping are known.
    fn window_origin(&self) -> Option<i64> {
        match (self.source_index, self.remote_ordinal) {
            (SourceIndex::Known(source), Some(ordinal)) => Some(ordinal - source as i64),
            _ => None,
        }
    }

    /// Follow a relative remote move in `remote_ordinal`.
    fn track_move(&mut self, delta: i64, flags: CursorFlags) {
        self.remote_ordinal = match self.remote_ordinal {
            Some(ordinal) if flags.on_row() => Some(ordinal + delta),
            _ if flags.bof && delta < 0 => Some(-1),
            _ => None,
        };
    }

    /// Before an operation that needs the remote on the current row.
    fn sync_current(&mut self) -> Result<()> {
        if !self.buffer_active() {
            return Ok(());
        }
        if self.buffer.current().is_none() {
            return Err(Error::NoCurrentRow);
        }
        self.sync_source(self.buffer.index())
    }

    fn after_mutation(&mut self) -> Result<()> {
        self.flags = None;
        self.remote_ordinal = None;
        self.trivial_bof = false;
        self.clear_buffer()?;
        self.buffer.set_direction(Direction::Backward);
        Ok(())
    }

    fn prepare_reposition(&mut self) -> Result<()> {
        self.trivial_bof = false;
        self.remote_ordinal = None;
        self.clear_buffer()?;
        self.buffer.set_direction(Direction::Backward);
        Ok(())
    }

    fn context(&self) -> Option<Arc<dyn CursorContext>> {
        self.context.as_ref().and_then(Weak::upgrade)
    }

    fn flush_streams(&self, row: &Row) -> Result<()> {
        if !row.has_streams() {
            return Ok(());
        }
        if let Some(context) = self.context() {
            if let Some(streams) = context.streams() {
                for id in row.stream_ids() {
                    streams.flush(id)?;
                }
            }
        }
        Ok(())
    }

    fn propose(
        &mut self,
        kind: ProposableKind,
        old: Option<&Row>,
        new: &Row,
        column: Option<&str>,
    ) -> Result<Proposal> {
        self.ensure_open()?;
        if let Some(context) = self.context() {
            if context.is_local(kind, column) {
                let old = old.map(|r| marshal_row(r, context.streams())).transpose()?;
                let new = marshal_row(new, context.streams())?;
                self.stats.local_proposals += 1;
                return context.evaluate(ProposableCall {
                    kind,
                    old: old.as_ref(),
                    new: &new,
                    column,
                });
            }
        }
        match kind {
            ProposableKind::Default => self.link.call().default_row(new, column),
            ProposableKind::Change => {
                let old = old.ok_or(Error::Unsupported("change without an old row"))?;
                self.link.call().change(old, new, column)
            }
            ProposableKind::Validate => self.link.call().validate(old, new, column),
        }
    }
}

impl<R: RemoteCursor> Drop for BufferedCursor<R> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close remote cursor");
        }
    }
}
