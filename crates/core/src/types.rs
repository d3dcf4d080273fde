//! Core type definitions shared by the cursor and cache layers.

use std::fmt;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Opaque server-issued row handle.
///
/// Bookmarks stay valid across buffer refills and are the only way to put
/// the remote cursor back on an exact row. Every bookmark the server hands
/// out holds a server-side resource until it is disposed.
///
/// # Example
/// ```
/// use cursorcache_core::BookmarkId;
///
/// let bookmark = BookmarkId::new(42);
/// assert!(bookmark.is_valid());
/// assert_eq!(bookmark.0, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BookmarkId(pub u64);

impl BookmarkId {
    /// Sentinel for "no bookmark".
    pub const INVALID: BookmarkId = BookmarkId(0);

    /// Create a new BookmarkId.
    #[inline]
    pub fn new(id: u64) -> Self {
        BookmarkId(id)
    }

    /// Check if this bookmark is not the sentinel value.
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "Bookmark(INVALID)")
        } else {
            write!(f, "Bookmark({})", self.0)
        }
    }
}

/// Identifies an out-of-line column value held by a stream manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl StreamId {
    /// Create a new StreamId.
    #[inline]
    pub fn new(id: u64) -> Self {
        StreamId(id)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stream({})", self.0)
    }
}

/// Monotonic marker of schema evolution.
///
/// Tracked separately for the server (advances on every DDL change) and for
/// the client (advances every time a catalog download is applied locally).
pub type CacheTimestamp = u64;

// ============================================================================
// CURSOR STATE
// ============================================================================

/// Direction in which the row buffer was (or will be) filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    #[inline]
    pub fn is_forward(self) -> bool {
        self == Direction::Forward
    }

    /// Signed unit step for this direction.
    #[inline]
    pub fn step(self) -> isize {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// BOF/EOF flags reported by the remote cursor after a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorFlags {
    pub bof: bool,
    pub eof: bool,
}

impl CursorFlags {
    /// Flags of a cursor that sits on a row.
    pub const ON_ROW: CursorFlags = CursorFlags {
        bof: false,
        eof: false,
    };

    #[inline]
    pub fn new(bof: bool, eof: bool) -> Self {
        Self { bof, eof }
    }

    /// True when the cursor is positioned on a row (neither crack).
    #[inline]
    pub fn on_row(&self) -> bool {
        !self.bof && !self.eof
    }

    /// The crack in the given direction: EOF going forward, BOF going back.
    #[inline]
    pub fn at_end(&self, direction: Direction) -> bool {
        match direction {
            Direction::Forward => self.eof,
            Direction::Backward => self.bof,
        }
    }
}

/// What the remote cursor supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorCapabilities {
    pub bookmarkable: bool,
    pub updatable: bool,
    pub backwards_navigable: bool,
    pub searchable: bool,
}

impl CursorCapabilities {
    /// Every capability enabled.
    pub fn all() -> Self {
        Self {
            bookmarkable: true,
            updatable: true,
            backwards_navigable: true,
            searchable: true,
        }
    }

    /// A forward-only, read-only cursor without bookmarks.
    pub fn forward_only() -> Self {
        Self::default()
    }

    /// Whether a windowed buffer can be kept consistent with this cursor.
    ///
    /// Exact resync needs bookmarks; without them only the degenerate
    /// forward-only read-only mode never needs exact positioning.
    pub fn supports_buffering(&self) -> bool {
        self.bookmarkable || !(self.updatable || self.backwards_navigable)
    }
}

// ============================================================================
// SCHEMA CACHE
// ============================================================================

/// Mode of the schema cache reader/writer lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Ordinary reads of the replica, including local rule evaluation.
    Shared,
    /// Rebuild and apply of catalog changes.
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => write!(f, "shared"),
            LockMode::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// The three schema-rule calls that may be answered from the local replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProposableKind {
    Default,
    Change,
    Validate,
}

impl fmt::Display for ProposableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposableKind::Default => write!(f, "default"),
            ProposableKind::Change => write!(f, "change"),
            ProposableKind::Validate => write!(f, "validate"),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookmark_id() {
        let b = BookmarkId::new(7);
        assert!(b.is_valid());
        assert!(!BookmarkId::INVALID.is_valid());
        assert_eq!(format!("{}", b), "Bookmark(7)");
        assert_eq!(format!("{}", BookmarkId::INVALID), "Bookmark(INVALID)");
    }

    #[test]
    fn test_flags_at_end() {
        let flags = CursorFlags::new(false, true);
        assert!(flags.at_end(Direction::Forward));
        assert!(!flags.at_end(Direction::Backward));
        assert!(!flags.on_row());
        assert!(CursorFlags::ON_ROW.on_row());
    }

    #[test]
    fn test_supports_buffering() {
        assert!(CursorCapabilities::all().supports_buffering());
        assert!(CursorCapabilities::forward_only().supports_buffering());

        let updatable_no_bookmarks = CursorCapabilities {
            updatable: true,
            ..CursorCapabilities::default()
        };
        assert!(!updatable_no_bookmarks.supports_buffering());

        let scrollable_no_bookmarks = CursorCapabilities {
            backwards_navigable: true,
            ..CursorCapabilities::default()
        };
        assert!(!scrollable_no_bookmarks.supports_buffering());
    }

    #[test]
    fn test_direction_step() {
        assert_eq!(Direction::Forward.step(), 1);
        assert_eq!(Direction::Backward.step(), -1);
        assert_eq!(Direction::default(), Direction::Forward);
    }
}
