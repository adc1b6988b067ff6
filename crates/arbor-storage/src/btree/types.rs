//! B-tree result and statistics types.

use arbor_common::page::{PageId, PageKind};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Outcome of a key lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct FindResult<V> {
    /// Leaf that holds (or would hold) the key; `PageId::INVALID` when a
    /// lookup found nothing.
    pub pid: PageId,
    /// Value stored under the key.
    pub value: Option<V>,
}

impl<V> FindResult<V> {
    /// The "not found" result.
    pub fn not_found() -> Self {
        Self {
            pid: PageId::INVALID,
            value: None,
        }
    }

    /// Returns true when the lookup located a page.
    pub fn is_found(&self) -> bool {
        self.pid.is_valid()
    }
}

/// Structured view of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSummary<K> {
    pub pid: PageId,
    pub kind: PageKind,
    pub parent: PageId,
    pub left_sibling: PageId,
    pub right_sibling: PageId,
    pub right_child: PageId,
    pub items_count: u16,
    pub upper: u16,
    /// Cached fill percentage from the header.
    pub fill_factor: u16,
    pub free_space: usize,
    /// Keys in slot order (separators for intermediate pages).
    pub keys: Vec<K>,
    /// Child pids of an intermediate page, right child last. Empty for leaves.
    pub children: Vec<PageId>,
}

/// Result of a successful whole-tree verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerifyReport {
    pub height: u32,
    pub leaf_pages: usize,
    pub internal_pages: usize,
    pub entries: usize,
}

impl VerifyReport {
    /// Total pages reachable from the root.
    pub fn total_pages(&self) -> usize {
        self.leaf_pages + self.internal_pages
    }
}

/// Point-in-time copy of the tree's maintenance counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStatsSnapshot {
    /// Number of leaf page splits performed
    pub leaf_splits: u64,
    /// Number of intermediate page splits performed
    pub internal_splits: u64,
    /// Number of leaf page merges performed
    pub leaf_merges: u64,
    /// Number of intermediate page merges performed
    pub internal_merges: u64,
    /// Number of entry redistributions between siblings
    pub redistributions: u64,
    /// Number of times a new root was created
    pub root_splits: u64,
    /// Number of times the root collapsed into its only child
    pub root_shrinks: u64,
}

/// Thread-safe maintenance counters.
#[derive(Debug, Default)]
pub(crate) struct TreeStats {
    leaf_splits: AtomicU64,
    internal_splits: AtomicU64,
    leaf_merges: AtomicU64,
    internal_merges: AtomicU64,
    redistributions: AtomicU64,
    root_splits: AtomicU64,
    root_shrinks: AtomicU64,
}

impl TreeStats {
    pub(crate) fn inc_leaf_splits(&self) {
        self.leaf_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_internal_splits(&self) {
        self.internal_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_merges(&self, kind: PageKind) {
        let counter = if kind.is_leaf() {
            &self.leaf_merges
        } else {
            &self.internal_merges
        };
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_redistributions(&self) {
        self.redistributions.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_root_splits(&self) {
        self.root_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_root_shrinks(&self) {
        self.root_shrinks.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> TreeStatsSnapshot {
        TreeStatsSnapshot {
            leaf_splits: self.leaf_splits.load(AtomicOrdering::Relaxed),
            internal_splits: self.internal_splits.load(AtomicOrdering::Relaxed),
            leaf_merges: self.leaf_merges.load(AtomicOrdering::Relaxed),
            internal_merges: self.internal_merges.load(AtomicOrdering::Relaxed),
            redistributions: self.redistributions.load(AtomicOrdering::Relaxed),
            root_splits: self.root_splits.load(AtomicOrdering::Relaxed),
            root_shrinks: self.root_shrinks.load(AtomicOrdering::Relaxed),
        }
    }
}
