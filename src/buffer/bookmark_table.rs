//! Reference-counted bookmark tracking.
//!
//! The buffer and the application can both hold the same server bookmark.
//! [`BookmarkTable`] counts those references so that the server is asked to
//! dispose a bookmark exactly once, when the last local reference goes away.

use std::collections::HashMap;

use tracing::debug;

use crate::common::{BookmarkId, Error, Result};

/// Receiver of remote bookmark disposals.
///
/// Implemented by the remote cursor link; the table only decides *which*
/// bookmarks reached zero.
pub trait DisposeBookmarks {
    /// Release one bookmark on the server.
    fn dispose_bookmark(&mut self, bookmark: BookmarkId) -> Result<()>;

    /// Release a set of bookmarks on the server in one call.
    fn dispose_bookmarks(&mut self, bookmarks: &[BookmarkId]) -> Result<()>;
}

/// Map of bookmark to local reference count.
///
/// Invariant: every tracked entry has a count of at least 1. An entry whose
/// count would drop to 0 is removed and disposed remotely in the same call.
#[derive(Debug, Default)]
pub struct BookmarkTable {
    refs: HashMap<BookmarkId, u32>,
}

impl BookmarkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a bookmark handed out by the server.
    ///
    /// A new bookmark starts at refcount 1. If the server handed out a
    /// bookmark that is already tracked, the new reference is counted on top
    /// of the existing ones, so each `track` is matched by one release.
    pub fn track(&mut self, bookmark: BookmarkId) {
        *self.refs.entry(bookmark).or_insert(0) += 1;
    }

    /// Take an additional reference to a tracked bookmark.
    ///
    /// # Errors
    /// - `Error::InvalidBookmark` if the bookmark is not tracked
    pub fn checkout(&mut self, bookmark: BookmarkId) -> Result<()> {
        let count = self
            .refs
            .get_mut(&bookmark)
            .ok_or(Error::InvalidBookmark(bookmark))?;
        *count += 1;
        Ok(())
    }

    /// Drop one reference. At zero the entry is removed and the server is
    /// asked to dispose the bookmark.
    ///
    /// Returns `true` if the bookmark was disposed.
    ///
    /// # Errors
    /// - `Error::InvalidBookmark` if the bookmark is not tracked
    /// - Any error from the remote disposal
    pub fn release<D>(&mut self, bookmark: BookmarkId, remote: &mut D) -> Result<bool>
    where
        D: DisposeBookmarks + ?Sized,
    {
        let count = self
            .refs
            .get_mut(&bookmark)
            .ok_or(Error::InvalidBookmark(bookmark))?;
        *count -= 1;
        if *count > 0 {
            return Ok(false);
        }
        self.refs.remove(&bookmark);
        remote.dispose_bookmark(bookmark)?;
        Ok(true)
    }

    /// Drop one reference to each bookmark, disposing the ones that reach
    /// zero with a single batched remote call.
    ///
    /// The batch is validated up front: if any bookmark is untracked nothing
    /// is released. A bookmark listed twice is released twice.
    ///
    /// Returns the number of bookmarks disposed.
    pub fn release_batch<D>(&mut self, bookmarks: &[BookmarkId], remote: &mut D) -> Result<usize>
    where
        D: DisposeBookmarks + ?Sized,
    {
        let mut pending: HashMap<BookmarkId, u32> = HashMap::new();
        for &bookmark in bookmarks {
            *pending.entry(bookmark).or_insert(0) += 1;
        }
        for (&bookmark, &drops) in &pending {
            match self.refs.get(&bookmark) {
                Some(&count) if count >= drops => {}
                _ => return Err(Error::InvalidBookmark(bookmark)),
            }
        }

        let mut disposed = Vec::new();
        for (bookmark, drops) in pending {
            if let Some(count) = self.refs.get_mut(&bookmark) {
                *count -= drops;
                if *count == 0 {
                    self.refs.remove(&bookmark);
                    disposed.push(bookmark);
                }
            }
        }

        if !disposed.is_empty() {
            disposed.sort_unstable();
            debug!(count = disposed.len(), "disposing released bookmarks");
            remote.dispose_bookmarks(&disposed)?;
        }
        Ok(disposed.len())
    }

    /// Forget every tracked bookmark, disposing all of them remotely.
    ///
    /// Used when the owning cursor closes.
    pub fn release_all<D>(&mut self, remote: &mut D) -> Result<usize>
    where
        D: DisposeBookmarks + ?Sized,
    {
        if self.refs.is_empty() {
            return Ok(0);
        }
        let mut all: Vec<BookmarkId> = self.refs.drain().map(|(b, _)| b).collect();
        all.sort_unstable();
        remote.dispose_bookmarks(&all)?;
        Ok(all.len())
    }

    pub fn contains(&self, bookmark: BookmarkId) -> bool {
        self.refs.contains_key(&bookmark)
    }

    /// Current reference count, or `None` if untracked.
    pub fn ref_count(&self, bookmark: BookmarkId) -> Option<u32> {
        self.refs.get(&bookmark).copied()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Records every disposal call.
    #[derive(Default)]
    struct Recorder {
        single: Vec<BookmarkId>,
        batches: Vec<Vec<BookmarkId>>,
    }

    impl DisposeBookmarks for Recorder {
        fn dispose_bookmark(&mut self, bookmark: BookmarkId) -> Result<()> {
            self.single.push(bookmark);
            Ok(())
        }

        fn dispose_bookmarks(&mut self, bookmarks: &[BookmarkId]) -> Result<()> {
            self.batches.push(bookmarks.to_vec());
            Ok(())
        }
    }

    fn b(id: u64) -> BookmarkId {
        BookmarkId::new(id)
    }

    #[test]
    fn test_track_and_release() {
        let mut table = BookmarkTable::new();
        let mut remote = Recorder::default();

        table.track(b(1));
        assert_eq!(table.ref_count(b(1)), Some(1));

        assert!(table.release(b(1), &mut remote).unwrap());
        assert!(!table.contains(b(1)));
        assert_eq!(remote.single, vec![b(1)]);
    }

    #[test]
    fn test_checkout_delays_disposal() {
        let mut table = BookmarkTable::new();
        let mut remote = Recorder::default();

        table.track(b(1));
        table.checkout(b(1)).unwrap();
        assert_eq!(table.ref_count(b(1)), Some(2));

        assert!(!table.release(b(1), &mut remote).unwrap());
        assert!(remote.single.is_empty());

        assert!(table.release(b(1), &mut remote).unwrap());
        assert_eq!(remote.single, vec![b(1)]);
    }

    #[test]
    fn test_release_untracked_fails() {
        let mut table = BookmarkTable::new();
        let mut remote = Recorder::default();

        table.track(b(1));
        table.release(b(1), &mut remote).unwrap();

        assert!(matches!(
            table.release(b(1), &mut remote),
            Err(Error::InvalidBookmark(id)) if id == b(1)
        ));
        assert!(matches!(table.checkout(b(9)), Err(Error::InvalidBookmark(_))));
    }

    #[test]
    fn test_release_batch_single_remote_call() {
        let mut table = BookmarkTable::new();
        let mut remote = Recorder::default();

        for id in 1..=4 {
            table.track(b(id));
        }
        table.checkout(b(2)).unwrap();

        let disposed = table
            .release_batch(&[b(1), b(2), b(3), b(4)], &mut remote)
            .unwrap();

        assert_eq!(disposed, 3);
        assert_eq!(remote.batches, vec![vec![b(1), b(3), b(4)]]);
        assert!(remote.single.is_empty());
        assert_eq!(table.ref_count(b(2)), Some(1));
    }

    #[test]
    fn test_release_batch_is_all_or_nothing() {
        let mut table = BookmarkTable::new();
        let mut remote = Recorder::default();

        table.track(b(1));
        let result = table.release_batch(&[b(1), b(2)], &mut remote);

        assert!(matches!(result, Err(Error::InvalidBookmark(id)) if id == b(2)));
        assert_eq!(table.ref_count(b(1)), Some(1));
        assert!(remote.batches.is_empty());
    }

    #[test]
    fn test_release_batch_nothing_reaches_zero() {
        let mut table = BookmarkTable::new();
        let mut remote = Recorder::default();

        table.track(b(1));
        table.checkout(b(1)).unwrap();
        assert_eq!(table.release_batch(&[b(1)], &mut remote).unwrap(), 0);
        assert!(remote.batches.is_empty());
    }

    #[test]
    fn test_release_all() {
        let mut table = BookmarkTable::new();
        let mut remote = Recorder::default();

        table.track(b(3));
        table.track(b(1));
        table.checkout(b(1)).unwrap();

        assert_eq!(table.release_all(&mut remote).unwrap(), 2);
        assert!(table.is_empty());
        assert_eq!(remote.batches, vec![vec![b(1), b(3)]]);
    }

    proptest! {
        /// Every bookmark is disposed exactly once, after its last release.
        #[test]
        fn disposed_once_after_last_release(extra in prop::collection::vec(0u32..4, 1..12)) {
            let mut table = BookmarkTable::new();
            let mut remote = Recorder::default();

            for (i, &checkouts) in extra.iter().enumerate() {
                let id = b(i as u64 + 1);
                table.track(id);
                for _ in 0..checkouts {
                    table.checkout(id).unwrap();
                }
            }

            for (i, &checkouts) in extra.iter().enumerate() {
                let id = b(i as u64 + 1);
                for _ in 0..checkouts {
                    prop_assert!(!table.release(id, &mut remote).unwrap());
                }
                prop_assert!(table.release(id, &mut remote).unwrap());
            }

            prop_assert!(table.is_empty());
            prop_assert_eq!(remote.single.len(), extra.len());
        }
    }
}
