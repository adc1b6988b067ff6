//! B-tree coordinator: root ownership, descent, and the public operations.
//!
//! Locking follows two levels. The root id lives inside a `RwLock` that acts
//! as the structure latch: lookups, scans and inserts/removes that touch a
//! single leaf hold it shared and descend with latch coupling over the
//! arena's per-page latches. Anything that splits, merges, redistributes or
//! replaces the root drops its latches and retries with the structure latch
//! held exclusively, at which point no other operation on this tree is in
//! flight.

use super::codec::{KeyCodec, PageCodec};
use super::constants::{CHILD_PID_SIZE, MAX_CELL_SIZE, MAX_HEIGHT, SLOT_AREA_CAPACITY, SLOT_SIZE};
use super::node;
use super::page::SlottedPage;
use super::types::{FindResult, PageSummary, TreeStats, TreeStatsSnapshot};
use arbor_buffer::{PageArena, PageReadGuard};
use arbor_common::config::TreeConfig;
use arbor_common::page::{PageId, PageKind};
use arbor_common::{ArborError, Result};
use parking_lot::RwLock;
use std::marker::PhantomData;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Outcome of an optimistic single-leaf attempt.
enum Attempt<T> {
    Done(T),
    Restructure,
}

/// One internal page on a root-to-leaf path and the child position taken.
#[derive(Debug, Clone, Copy)]
pub(super) struct PathEntry {
    pub(super) pid: PageId,
    pub(super) pos: usize,
}

/// Ordered index from `K` to `V` stored in arena pages.
///
/// The tree refers to pages only by id and borrows their memory through arena
/// latch guards for the duration of one step. Several trees may share one
/// arena; dropping a tree returns its pages.
pub struct BTree<K: KeyCodec, V: PageCodec> {
    pub(super) arena: Arc<PageArena>,
    pub(super) config: TreeConfig,
    /// Root page id; doubles as the structure latch.
    pub(super) root: RwLock<PageId>,
    /// Number of levels (1 = the root is a leaf).
    pub(super) height: AtomicU32,
    len: AtomicUsize,
    pub(super) stats: TreeStats,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: KeyCodec, V: PageCodec> BTree<K, V> {
    /// Creates an empty tree whose root is a fresh leaf page from `arena`.
    pub fn new(arena: Arc<PageArena>, config: TreeConfig) -> Result<Self> {
        config.validate()?;

        let root = {
            let mut guard = arena.allocate()?;
            let pid = guard.page_id();
            let mut page = SlottedPage::new(&mut guard[..])?;
            page.init(pid, PageKind::Leaf);
            page.seal(config.checksum_pages);
            pid
        };

        tracing::debug!(target: "arbor::btree", root = root.0, key = %K::KIND, value = %V::KIND, "b-tree created");

        Ok(Self {
            arena,
            config,
            root: RwLock::new(root),
            height: AtomicU32::new(1),
            len: AtomicUsize::new(0),
            stats: TreeStats::default(),
            _marker: PhantomData,
        })
    }

    /// Creates a tree with default settings over a private arena of
    /// `page_count` pages.
    pub fn with_arena_pages(page_count: u32) -> Result<Self> {
        Self::new(Arc::new(PageArena::new(page_count)?), TreeConfig::default())
    }

    /// Returns the arena backing this tree.
    pub fn arena(&self) -> &Arc<PageArena> {
        &self.arena
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Returns the tree height (1 = just the root leaf).
    #[inline]
    pub fn height(&self) -> u32 {
        self.height.load(Ordering::Acquire)
    }

    /// Returns the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current root page id.
    pub fn root_page_id(&self) -> PageId {
        *self.root.read()
    }

    /// Returns a snapshot of the maintenance counters.
    pub fn stats(&self) -> TreeStatsSnapshot {
        self.stats.snapshot()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Locates `key`.
    ///
    /// With `for_insert` set, returns the leaf where the key belongs without
    /// checking whether it is present. Otherwise returns the leaf and value on
    /// an exact match, or [`FindResult::not_found`].
    pub fn find(&self, key: &K, for_insert: bool) -> Result<FindResult<V>> {
        let root = self.root.read();
        let (parent, leaf_pid) =
            self.descend_shared(*root, self.height(), |page| Ok(node::route(page, key)?.1))?;
        let leaf = self.arena.read_page(leaf_pid)?;
        drop(parent);

        let page = self.open(&leaf, leaf_pid)?;
        Self::expect_leaf(&page)?;
        if for_insert {
            return Ok(FindResult {
                pid: leaf_pid,
                value: None,
            });
        }

        match node::search(&page, key)? {
            Ok(idx) => Ok(FindResult {
                pid: leaf_pid,
                value: Some(node::leaf_value_at::<K, V, _>(&page, idx)?),
            }),
            Err(_) => Ok(FindResult::not_found()),
        }
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.find(key, false)?.value)
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.find(key, false)?.is_found())
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Inserts a new entry and returns the leaf that received it.
    ///
    /// Fails with `DuplicateKey` if the key is present, `CellTooLarge` if the
    /// entry (or its separator) exceeds [`MAX_CELL_SIZE`], and
    /// `ArenaExhausted` if a split cannot get its pages. A failed insert
    /// leaves the tree unchanged.
    pub fn insert(&self, key: K, value: V) -> Result<PageId> {
        let cell = node::encode_leaf_cell(&key, &value)?;
        if cell.len() > MAX_CELL_SIZE {
            return Err(ArborError::CellTooLarge {
                size: cell.len(),
                max: MAX_CELL_SIZE,
            });
        }
        let separator_len = key.serialized_size() + CHILD_PID_SIZE;
        if separator_len > MAX_CELL_SIZE {
            return Err(ArborError::CellTooLarge {
                size: separator_len,
                max: MAX_CELL_SIZE,
            });
        }

        // `len` changes only while the structure latch is held
        {
            let root = self.root.read();
            if let Attempt::Done(pid) = self.insert_in_place(*root, &key, &cell)? {
                self.len.fetch_add(1, Ordering::AcqRel);
                return Ok(pid);
            }
        }

        let mut root = self.root.write();
        let pid = self.insert_with_split(&mut root, &key, &cell)?;
        self.len.fetch_add(1, Ordering::AcqRel);
        Ok(pid)
    }

    /// Inserts into the target leaf if that needs no split.
    fn insert_in_place(&self, root: PageId, key: &K, cell: &[u8]) -> Result<Attempt<PageId>> {
        let (parent, leaf_pid) =
            self.descend_shared(root, self.height(), |page| Ok(node::route(page, key)?.1))?;
        let mut leaf = self.arena.write_page(leaf_pid)?;
        drop(parent);

        let mut page = SlottedPage::new(&mut leaf[..])?;
        page.validate(leaf_pid, self.config.checksum_pages)?;
        let kind = Self::expect_leaf(&page)?;

        let idx = match node::search(&page, key)? {
            Ok(_) => return Err(ArborError::DuplicateKey),
            Err(idx) => idx,
        };
        if node::needs_split(&page, kind, cell.len(), self.config.max_fill_factor) {
            return Ok(Attempt::Restructure);
        }

        page.insert_cell(idx, cell)?;
        page.seal(self.config.checksum_pages);
        Ok(Attempt::Done(leaf_pid))
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Removes `key` and returns its value, or `None` if it was absent (in
    /// which case nothing changes).
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        {
            let root = self.root.read();
            if let Attempt::Done(removed) = self.remove_in_place(*root, key)? {
                if removed.is_some() {
                    self.len.fetch_sub(1, Ordering::AcqRel);
                }
                return Ok(removed);
            }
        }

        let mut root = self.root.write();
        let removed = self.remove_with_rebalance(&mut root, key)?;
        if removed.is_some() {
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(removed)
    }

    /// Removes from the target leaf if that leaves it at or above the
    /// underflow threshold.
    fn remove_in_place(&self, root: PageId, key: &K) -> Result<Attempt<Option<V>>> {
        let (parent, leaf_pid) =
            self.descend_shared(root, self.height(), |page| Ok(node::route(page, key)?.1))?;
        let mut leaf = self.arena.write_page(leaf_pid)?;
        drop(parent);

        let mut page = SlottedPage::new(&mut leaf[..])?;
        page.validate(leaf_pid, self.config.checksum_pages)?;
        Self::expect_leaf(&page)?;

        let idx = match node::search(&page, key)? {
            Ok(idx) => idx,
            Err(_) => return Ok(Attempt::Done(None)),
        };
        let cell_len = node::leaf_cell_len::<K, V>(page.cell(idx)?)?;
        if !page.is_root() && self.underflows(page.used_bytes() - cell_len - SLOT_SIZE) {
            return Ok(Attempt::Restructure);
        }

        let value = node::leaf_value_at::<K, V, _>(&page, idx)?;
        page.remove_cell(idx, cell_len)?;
        page.seal(self.config.checksum_pages);
        Ok(Attempt::Done(Some(value)))
    }

    // =========================================================================
    // Scans
    // =========================================================================

    /// Returns every entry in key order.
    pub fn scan(&self) -> Result<Vec<(K, V)>> {
        self.range(Bound::Unbounded, Bound::Unbounded)
    }

    /// Returns the entries whose keys fall within the bounds, in key order.
    ///
    /// Walks the leaf level left to right through the sibling links, latching
    /// each next leaf before releasing the current one.
    pub fn range(&self, start: Bound<&K>, end: Bound<&K>) -> Result<Vec<(K, V)>> {
        let root = self.root.read();
        let height = self.height();
        let (parent, first) = match start {
            Bound::Included(key) | Bound::Excluded(key) => {
                self.descend_shared(*root, height, |page| Ok(node::route(page, key)?.1))?
            }
            Bound::Unbounded => {
                self.descend_shared(*root, height, |page| node::child_at::<K, _>(page, 0))?
            }
        };

        let mut pid = first;
        let mut guard = self.arena.read_page(pid)?;
        drop(parent);

        let mut out = Vec::new();
        let mut first_leaf = true;
        loop {
            let next = {
                let page = self.open(&guard, pid)?;
                Self::expect_leaf(&page)?;

                let from = match (first_leaf, start) {
                    (false, _) | (true, Bound::Unbounded) => 0,
                    (true, Bound::Included(key)) => {
                        node::search(&page, key)?.unwrap_or_else(|idx| idx)
                    }
                    (true, Bound::Excluded(key)) => match node::search(&page, key)? {
                        Ok(idx) => idx + 1,
                        Err(idx) => idx,
                    },
                };

                for idx in from..page.items_count() as usize {
                    let (key, value) = node::leaf_entry_at::<K, V, _>(&page, idx)?;
                    let past_end = match end {
                        Bound::Included(last) => key > *last,
                        Bound::Excluded(last) => key >= *last,
                        Bound::Unbounded => false,
                    };
                    if past_end {
                        return Ok(out);
                    }
                    out.push((key, value));
                }
                page.right_sibling()
            };

            if !next.is_valid() {
                break;
            }
            guard = self.arena.read_page(next)?;
            pid = next;
            first_leaf = false;
        }
        Ok(out)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Returns a structured view of one page of this tree.
    pub fn page_summary(&self, pid: PageId) -> Result<PageSummary<K>> {
        let _root = self.root.read();
        self.with_page(pid, |page| {
            let kind = page.kind()?;
            let keys = (0..page.items_count() as usize)
                .map(|idx| node::key_at::<K, _>(page, idx))
                .collect::<Result<Vec<_>>>()?;
            let children = if kind.is_leaf() {
                Vec::new()
            } else {
                node::children::<K, _>(page)?
            };

            Ok(PageSummary {
                pid,
                kind,
                parent: page.parent(),
                left_sibling: page.left_sibling(),
                right_sibling: page.right_sibling(),
                right_child: page.right_child(),
                items_count: page.items_count(),
                upper: page.upper(),
                fill_factor: page.fill_factor(),
                free_space: page.free_space(),
                keys,
                children,
            })
        })
    }

    // =========================================================================
    // Page access helpers
    // =========================================================================

    /// Wraps and validates latched page bytes.
    pub(super) fn open<'g>(&self, data: &'g [u8], pid: PageId) -> Result<SlottedPage<&'g [u8]>> {
        let page = SlottedPage::new(data)?;
        page.validate(pid, self.config.checksum_pages)?;
        Ok(page)
    }

    /// Runs `f` on a page under its shared latch.
    pub(super) fn with_page<R>(
        &self,
        pid: PageId,
        f: impl FnOnce(&SlottedPage<&[u8]>) -> Result<R>,
    ) -> Result<R> {
        let guard = self.arena.read_page(pid)?;
        let page = self.open(&guard, pid)?;
        f(&page)
    }

    /// Runs `f` on a page under its exclusive latch, then refreshes the
    /// page's fill factor and checksum.
    pub(super) fn with_page_mut<R>(
        &self,
        pid: PageId,
        f: impl FnOnce(&mut SlottedPage<&mut [u8]>) -> Result<R>,
    ) -> Result<R> {
        let mut guard = self.arena.write_page(pid)?;
        let mut page = SlottedPage::new(&mut guard[..])?;
        page.validate(pid, self.config.checksum_pages)?;
        let out = f(&mut page)?;
        page.seal(self.config.checksum_pages);
        Ok(out)
    }

    /// Formats a freshly allocated page as an empty node.
    pub(super) fn init_page(&self, pid: PageId, kind: PageKind) -> Result<()> {
        let mut guard = self.arena.write_page(pid)?;
        let mut page = SlottedPage::new(&mut guard[..])?;
        page.init(pid, kind);
        page.seal(self.config.checksum_pages);
        Ok(())
    }

    /// Points a page's parent link at `parent`.
    pub(super) fn adopt(&self, child: PageId, parent: PageId) -> Result<()> {
        self.with_page_mut(child, |page| {
            page.set_parent(parent);
            Ok(())
        })
    }

    /// Returns true if a non-root page using `used` bytes must be rebalanced.
    #[inline]
    pub(super) fn underflows(&self, used: usize) -> bool {
        (used as f64) < self.config.min_fill_factor * SLOT_AREA_CAPACITY as f64
    }

    /// Returns true if two siblings using `used` bytes together may merge.
    /// The limit sits below the split threshold, so a merged page does not
    /// split again on the next insert.
    #[inline]
    pub(super) fn fits_merged(&self, used: usize) -> bool {
        used as f64 <= self.config.merge_fill_factor() * SLOT_AREA_CAPACITY as f64
    }

    fn expect_leaf<B: AsRef<[u8]>>(page: &SlottedPage<B>) -> Result<PageKind> {
        let kind = page.kind()?;
        if !kind.is_leaf() {
            return Err(ArborError::BTreeCorrupted(format!(
                "expected a leaf at page {}, found {kind:?}",
                page.pid()
            )));
        }
        Ok(kind)
    }

    /// Descends the internal levels under shared latches.
    ///
    /// `pick` chooses the child at each internal page. Returns the latch on the
    /// last internal page (still held, so the caller can latch the leaf before
    /// releasing it) and the leaf pid.
    fn descend_shared(
        &self,
        root: PageId,
        height: u32,
        pick: impl Fn(&SlottedPage<&[u8]>) -> Result<PageId>,
    ) -> Result<(Option<PageReadGuard<'_>>, PageId)> {
        let mut pid = root;
        let mut held = None;
        for _ in 1..height {
            let guard = self.arena.read_page(pid)?;
            let child = {
                let page = self.open(&guard, pid)?;
                if page.kind()?.is_leaf() {
                    return Err(ArborError::BTreeCorrupted(format!(
                        "leaf page {pid} above the leaf level"
                    )));
                }
                pick(&page)?
            };
            // Parent released only once the child's parent is latched
            held = Some(guard);
            pid = child;
        }
        Ok((held, pid))
    }

    /// Walks from the root to the leaf covering `key` without holding
    /// latches between steps. Callers hold the structure latch exclusively.
    pub(super) fn find_path(&self, root: PageId, key: &K) -> Result<(Vec<PathEntry>, PageId)> {
        let mut path = Vec::new();
        let mut pid = root;
        loop {
            let step = self.with_page(pid, |page| {
                if page.kind()?.is_leaf() {
                    return Ok(None);
                }
                node::route(page, key).map(Some)
            })?;
            match step {
                None => return Ok((path, pid)),
                Some((pos, child)) => {
                    path.push(PathEntry { pid, pos });
                    if path.len() >= MAX_HEIGHT {
                        return Err(ArborError::BTreeCorrupted(format!(
                            "descent exceeded {MAX_HEIGHT} levels"
                        )));
                    }
                    pid = child;
                }
            }
        }
    }

    /// Collects every page reachable from `root`.
    pub(super) fn collect_pages(&self, root: PageId) -> Result<Vec<PageId>> {
        let mut pages = Vec::new();
        let mut stack = vec![root];
        while let Some(pid) = stack.pop() {
            let children = self.with_page(pid, |page| {
                if page.kind()?.is_leaf() {
                    Ok(Vec::new())
                } else {
                    node::children::<K, _>(page)
                }
            })?;
            pages.push(pid);
            if pages.len() > self.arena.capacity() as usize {
                return Err(ArborError::BTreeCorrupted(
                    "page graph contains a cycle".to_string(),
                ));
            }
            stack.extend(children);
        }
        Ok(pages)
    }
}

impl<K: KeyCodec, V: PageCodec> Drop for BTree<K, V> {
    fn drop(&mut self) {
        let root = *self.root.get_mut();
        match self.collect_pages(root) {
            Ok(pages) => {
                for pid in pages {
                    if let Err(e) = self.arena.free(pid) {
                        tracing::warn!(target: "arbor::btree", page = pid.0, error = %e, "failed to release tree page");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(target: "arbor::btree", error = %e, "tree pages not returned to arena");
            }
        }
    }
}

impl<K: KeyCodec, V: PageCodec> std::fmt::Debug for BTree<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BTree")
            .field("key", &K::KIND)
            .field("value", &V::KIND)
            .field("height", &self.height())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_tree() -> BTree<u32, String> {
        BTree::with_arena_pages(64).unwrap()
    }

    #[test]
    fn test_new_tree() {
        let tree = create_test_tree();
        assert_eq!(tree.height(), 1);
        assert!(tree.is_empty());
        assert_eq!(tree.arena().allocated_count(), 1);

        let summary = tree.page_summary(tree.root_page_id()).unwrap();
        assert_eq!(summary.kind, PageKind::Leaf);
        assert_eq!(summary.items_count, 0);
        assert_eq!(summary.parent, PageId::INVALID);
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let arena = Arc::new(PageArena::new(4).unwrap());
        let config = TreeConfig {
            min_fill_factor: 0.95,
            ..Default::default()
        };
        assert!(matches!(
            BTree::<u32, u32>::new(arena, config),
            Err(ArborError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_insert_and_find() {
        let tree = create_test_tree();
        let leaf = tree.insert(7, "seven".to_string()).unwrap();
        assert_eq!(leaf, tree.root_page_id());

        let found = tree.find(&7, false).unwrap();
        assert_eq!(found.pid, leaf);
        assert_eq!(found.value.as_deref(), Some("seven"));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_find_missing_key() {
        let tree = create_test_tree();
        tree.insert(1, "one".to_string()).unwrap();

        let result = tree.find(&2, false).unwrap();
        assert_eq!(result, FindResult::not_found());
        assert_eq!(tree.get(&2).unwrap(), None);
        assert!(!tree.contains_key(&2).unwrap());
    }

    #[test]
    fn test_find_for_insert() {
        let tree = create_test_tree();
        let result = tree.find(&42, true).unwrap();
        assert_eq!(result.pid, tree.root_page_id());
        assert!(result.value.is_none());
    }

    #[test]
    fn test_slot_order_after_unordered_inserts() {
        let tree = create_test_tree();
        tree.insert(5, "five".to_string()).unwrap();
        tree.insert(1, "one".to_string()).unwrap();
        tree.insert(3, "three".to_string()).unwrap();

        let summary = tree.page_summary(tree.root_page_id()).unwrap();
        assert_eq!(summary.keys, vec![1, 3, 5]);
        assert_eq!(tree.get(&3).unwrap().as_deref(), Some("three"));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let tree = create_test_tree();
        tree.insert(1, "one".to_string()).unwrap();
        assert!(matches!(
            tree.insert(1, "uno".to_string()),
            Err(ArborError::DuplicateKey)
        ));
        assert_eq!(tree.get(&1).unwrap().as_deref(), Some("one"));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_cell_too_large() {
        let tree: BTree<u32, String> = create_test_tree();
        let err = tree.insert(1, "x".repeat(MAX_CELL_SIZE)).unwrap_err();
        assert!(matches!(err, ArborError::CellTooLarge { max: MAX_CELL_SIZE, .. }));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_separator_too_large() {
        let tree: BTree<String, bool> = BTree::with_arena_pages(8).unwrap();
        // Leaf cell fits, separator (key + child pid) does not
        let key = "k".repeat(MAX_CELL_SIZE - 8 - 2);
        let err = tree.insert(key, true).unwrap_err();
        assert!(matches!(
            err,
            ArborError::CellTooLarge {
                size,
                max: MAX_CELL_SIZE
            } if size == MAX_CELL_SIZE + 2
        ));
    }

    #[test]
    fn test_remove_from_root_leaf() {
        let tree = create_test_tree();
        tree.insert(1, "one".to_string()).unwrap();
        tree.insert(2, "two".to_string()).unwrap();

        assert_eq!(tree.remove(&1).unwrap().as_deref(), Some("one"));
        assert_eq!(tree.remove(&1).unwrap(), None);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(&2).unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn test_remove_absent_leaves_page_bytes_unchanged() {
        let tree = create_test_tree();
        for k in [10u32, 20, 30] {
            tree.insert(k, format!("v{k}")).unwrap();
        }
        let root = tree.root_page_id();
        let before = tree.arena().read_page(root).unwrap().to_vec();

        assert_eq!(tree.remove(&25).unwrap(), None);

        let after = tree.arena().read_page(root).unwrap().to_vec();
        assert_eq!(before, after);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_range_bounds() {
        let tree = create_test_tree();
        for k in 0..20u32 {
            tree.insert(k, k.to_string()).unwrap();
        }

        let keys = |entries: Vec<(u32, String)>| entries.into_iter().map(|(k, _)| k).collect::<Vec<_>>();
        assert_eq!(
            keys(tree.range(Bound::Included(&5), Bound::Excluded(&9)).unwrap()),
            vec![5, 6, 7, 8]
        );
        assert_eq!(
            keys(tree.range(Bound::Excluded(&17), Bound::Unbounded).unwrap()),
            vec![18, 19]
        );
        assert_eq!(
            keys(tree.range(Bound::Unbounded, Bound::Included(&1)).unwrap()),
            vec![0, 1]
        );
        assert!(tree.range(Bound::Included(&50), Bound::Unbounded).unwrap().is_empty());
        assert_eq!(tree.scan().unwrap().len(), 20);
    }

    #[test]
    fn test_page_summary_unknown_page() {
        let tree = create_test_tree();
        assert!(matches!(
            tree.page_summary(PageId::new(40)),
            Err(ArborError::PageNotFound { .. })
        ));
    }

    #[test]
    fn test_drop_returns_pages() {
        let arena = Arc::new(PageArena::new(16).unwrap());
        {
            let tree: BTree<u64, u64> = BTree::new(Arc::clone(&arena), TreeConfig::default()).unwrap();
            for k in 0..100 {
                tree.insert(k, k * 2).unwrap();
            }
            assert!(arena.allocated_count() >= 1);
        }
        assert_eq!(arena.allocated_count(), 0);
    }

    #[test]
    fn test_checksummed_tree() {
        let arena = Arc::new(PageArena::new(8).unwrap());
        let config = TreeConfig {
            checksum_pages: true,
            ..Default::default()
        };
        let tree: BTree<i64, String> = BTree::new(arena, config).unwrap();
        tree.insert(-1, "minus one".to_string()).unwrap();
        tree.insert(1, "one".to_string()).unwrap();

        let root = tree.root_page_id();
        {
            let page = tree.arena().read_page(root).unwrap();
            let page = SlottedPage::new(&page[..]).unwrap();
            assert_ne!(page.crc(), 0);
            assert_eq!(page.crc(), page.compute_crc());
        }

        // Flip a cell byte behind the tree's back
        {
            let mut page = tree.arena().write_page(root).unwrap();
            let last = page.len() - 1;
            page[last] ^= 0xFF;
        }
        let err = tree.get(&1).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_tree_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BTree<u32, String>>();
    }
}
