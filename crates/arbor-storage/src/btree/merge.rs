//! Remove path that restructures the tree: sibling merges, redistribution
//! and root shrinking.
//!
//! Runs with the structure latch held exclusively. A non-root page that drops
//! below the minimum fill is paired with a sibling under the same parent (the
//! left one when it exists). The pair merges when the result stays under
//! `TreeConfig::merge_fill_factor`, otherwise the entries are redistributed at
//! the byte median. Merges cascade upward; a root left without separators
//! hands the root role to its only child.

use super::codec::{KeyCodec, PageCodec};
use super::constants::{CHILD_PID_SIZE, SLOT_AREA_CAPACITY};
use super::node;
use super::tree::{BTree, PathEntry};
use arbor_common::page::{PageId, PageKind};
use arbor_common::Result;
use std::sync::atomic::Ordering;

/// What rebalancing did to an underflowing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rebalance {
    Merged,
    Redistributed,
    Skipped,
}

/// Two adjacent children of one parent and the separator between them.
struct SiblingPair<K> {
    /// Slot of the separator in the parent; `left` sits at this position and
    /// `right` at the next.
    left_idx: usize,
    left: PageId,
    right: PageId,
    separator: K,
    separator_len: usize,
}

impl<K: KeyCodec, V: PageCodec> BTree<K, V> {
    /// Removes `key`, then repairs underflow along its path.
    pub(super) fn remove_with_rebalance(&self, root: &mut PageId, key: &K) -> Result<Option<V>> {
        let (_, leaf_pid) = self.find_path(*root, key)?;

        let removed = self.with_page_mut(leaf_pid, |page| {
            let idx = match node::search(page, key)? {
                Ok(idx) => idx,
                Err(_) => return Ok(None),
            };
            let value = node::leaf_value_at::<K, V, _>(page, idx)?;
            let len = node::leaf_cell_len::<K, V>(page.cell(idx)?)?;
            page.remove_cell(idx, len)?;
            Ok(Some(value))
        })?;

        if removed.is_some() {
            self.rebalance(root, key)?;
        }
        Ok(removed)
    }

    /// Repeats bottom-up passes over the path to `key` until one of them
    /// merges nothing. A merge can give a page that had no sibling a new
    /// neighbour, so the next pass looks at it again.
    fn rebalance(&self, root: &mut PageId, key: &K) -> Result<()> {
        loop {
            let (path, leaf_pid) = self.find_path(*root, key)?;
            let merged = self.rebalance_path(&path, leaf_pid)?;
            let shrunk = self.shrink_root(root)?;
            if !merged && !shrunk {
                return Ok(());
            }
        }
    }

    /// One pass from the leaf to the root. Returns true if any level merged.
    fn rebalance_path(&self, path: &[PathEntry], leaf_pid: PageId) -> Result<bool> {
        let mut merged = false;
        let mut pid = leaf_pid;
        for entry in path.iter().rev() {
            let used = self.with_page(pid, |page| Ok(page.used_bytes()))?;
            if self.underflows(used) {
                merged |= self.rebalance_child(entry.pid, entry.pos)? == Rebalance::Merged;
            }
            pid = entry.pid;
        }
        Ok(merged)
    }

    /// Rebalances the child at `pos` of `parent` with an adjacent sibling.
    fn rebalance_child(&self, parent: PageId, pos: usize) -> Result<Rebalance> {
        let pair = self.with_page(parent, |page| {
            if page.items_count() == 0 {
                return Ok(None);
            }
            let left_idx = pos.saturating_sub(1);
            Ok(Some(SiblingPair {
                left_idx,
                left: node::child_at::<K, _>(page, left_idx)?,
                right: node::child_at::<K, _>(page, left_idx + 1)?,
                separator: node::key_at::<K, _>(page, left_idx)?,
                separator_len: node::internal_cell_len::<K>(page.cell(left_idx)?)?,
            }))
        })?;
        let Some(pair) = pair else {
            return Ok(Rebalance::Skipped);
        };

        let kind = self.with_page(pair.left, |page| page.kind())?;
        if kind.is_leaf() {
            self.rebalance_leaves(parent, &pair)
        } else {
            self.rebalance_internal(parent, &pair, kind)
        }
    }

    fn rebalance_leaves(&self, parent: PageId, pair: &SiblingPair<K>) -> Result<Rebalance> {
        let mut cells = self.with_page(pair.left, |page| {
            node::raw_cells(page, node::leaf_cell_len::<K, V>)
        })?;
        let (right_cells, right_next) = self.with_page(pair.right, |page| {
            Ok((
                node::raw_cells(page, node::leaf_cell_len::<K, V>)?,
                page.right_sibling(),
            ))
        })?;
        cells.extend(right_cells);

        if self.fits_merged(node::footprint(&cells)) {
            self.with_page_mut(pair.left, |page| page.replace_cells(&cells))?;
            self.finish_merge(parent, pair, right_next, PageKind::Leaf)?;
            return Ok(Rebalance::Merged);
        }

        if cells.len() < 2 {
            return Ok(Rebalance::Skipped);
        }
        let mid = node::byte_median(&cells, 1, 1);
        let (lower, upper) = cells.split_at(mid);
        if node::footprint(lower) > SLOT_AREA_CAPACITY || node::footprint(upper) > SLOT_AREA_CAPACITY {
            return Ok(Rebalance::Skipped);
        }
        let separator = K::deserialize(&upper[0])?;
        if !self.separator_fits(parent, pair, &separator)? {
            return Ok(Rebalance::Skipped);
        }

        self.with_page_mut(pair.left, |page| page.replace_cells(lower))?;
        self.with_page_mut(pair.right, |page| page.replace_cells(upper))?;
        self.replace_separator(parent, pair, &separator)?;
        tracing::trace!(
            target: "arbor::btree::merge",
            left = pair.left.0,
            right = pair.right.0,
            left_items = lower.len(),
            right_items = upper.len(),
            "redistributed leaves"
        );
        Ok(Rebalance::Redistributed)
    }

    /// Intermediate pages pull the parent separator down between the two
    /// halves, paired with the left page's right child.
    fn rebalance_internal(
        &self,
        parent: PageId,
        pair: &SiblingPair<K>,
        kind: PageKind,
    ) -> Result<Rebalance> {
        let (mut cells, left_rc) = self.with_page(pair.left, |page| {
            Ok((
                node::raw_cells(page, node::internal_cell_len::<K>)?,
                page.right_child(),
            ))
        })?;
        let (right_cells, right_rc, right_next) = self.with_page(pair.right, |page| {
            Ok((
                node::raw_cells(page, node::internal_cell_len::<K>)?,
                page.right_child(),
                page.right_sibling(),
            ))
        })?;
        cells.push(node::encode_internal_cell(&pair.separator, left_rc)?);
        cells.extend(right_cells);

        if self.fits_merged(node::footprint(&cells)) {
            self.with_page_mut(pair.left, |page| {
                page.replace_cells(&cells)?;
                page.set_right_child(right_rc);
                Ok(())
            })?;
            for cell in &cells {
                self.adopt(node::cell_child::<K>(cell)?, pair.left)?;
            }
            self.adopt(right_rc, pair.left)?;
            self.finish_merge(parent, pair, right_next, kind)?;
            return Ok(Rebalance::Merged);
        }

        if cells.len() < 3 {
            return Ok(Rebalance::Skipped);
        }
        let mid = node::byte_median(&cells, 1, 2);
        let (lower, rest) = cells.split_at(mid);
        let (promoted, upper) = (&rest[0], &rest[1..]);
        if node::footprint(lower) > SLOT_AREA_CAPACITY || node::footprint(upper) > SLOT_AREA_CAPACITY {
            return Ok(Rebalance::Skipped);
        }
        let separator = K::deserialize(promoted)?;
        if !self.separator_fits(parent, pair, &separator)? {
            return Ok(Rebalance::Skipped);
        }
        let promoted_child = node::cell_child::<K>(promoted)?;

        self.with_page_mut(pair.left, |page| {
            page.replace_cells(lower)?;
            page.set_right_child(promoted_child);
            Ok(())
        })?;
        self.with_page_mut(pair.right, |page| {
            page.replace_cells(upper)?;
            page.set_right_child(right_rc);
            Ok(())
        })?;
        for cell in lower {
            self.adopt(node::cell_child::<K>(cell)?, pair.left)?;
        }
        self.adopt(promoted_child, pair.left)?;
        for cell in upper {
            self.adopt(node::cell_child::<K>(cell)?, pair.right)?;
        }
        self.adopt(right_rc, pair.right)?;

        self.replace_separator(parent, pair, &separator)?;
        tracing::trace!(
            target: "arbor::btree::merge",
            left = pair.left.0,
            right = pair.right.0,
            left_items = lower.len(),
            right_items = upper.len(),
            "redistributed intermediate pages"
        );
        Ok(Rebalance::Redistributed)
    }

    /// Unlinks the emptied right page after its entries moved left, drops the
    /// separator from the parent and frees the page.
    fn finish_merge(
        &self,
        parent: PageId,
        pair: &SiblingPair<K>,
        right_next: PageId,
        kind: PageKind,
    ) -> Result<()> {
        self.with_page_mut(pair.left, |page| {
            page.set_right_sibling(right_next);
            Ok(())
        })?;
        if right_next.is_valid() {
            self.with_page_mut(right_next, |page| {
                page.set_left_sibling(pair.left);
                Ok(())
            })?;
        }

        self.with_page_mut(parent, |page| {
            node::set_child_at::<K, _>(page, pair.left_idx + 1, pair.left)?;
            page.remove_cell(pair.left_idx, pair.separator_len)
        })?;
        self.arena.free(pair.right)?;

        self.stats.inc_merges(kind);
        tracing::trace!(
            target: "arbor::btree::merge",
            left = pair.left.0,
            freed = pair.right.0,
            parent = parent.0,
            ?kind,
            "merged siblings"
        );
        Ok(())
    }

    /// Returns true if the parent has room for `separator` in place of the
    /// current one.
    fn separator_fits(&self, parent: PageId, pair: &SiblingPair<K>, separator: &K) -> Result<bool> {
        let new_len = separator.serialized_size() + CHILD_PID_SIZE;
        self.with_page(parent, |page| Ok(page.free_space() + pair.separator_len >= new_len))
    }

    fn replace_separator(&self, parent: PageId, pair: &SiblingPair<K>, separator: &K) -> Result<()> {
        let cell = node::encode_internal_cell(separator, pair.left)?;
        self.with_page_mut(parent, |page| {
            page.remove_cell(pair.left_idx, pair.separator_len)?;
            page.insert_cell(pair.left_idx, &cell)
        })?;
        self.stats.inc_redistributions();
        Ok(())
    }

    /// Collapses intermediate roots that have no separators left. Returns
    /// true if the height changed.
    fn shrink_root(&self, root: &mut PageId) -> Result<bool> {
        let mut shrunk = false;
        loop {
            let (kind, items, child) = self.with_page(*root, |page| {
                Ok((page.kind()?, page.items_count(), page.right_child()))
            })?;
            if kind.is_leaf() || items > 0 {
                return Ok(shrunk);
            }

            self.with_page_mut(child, |page| {
                page.set_parent(PageId::INVALID);
                if page.kind()? == PageKind::Intermediate {
                    page.set_kind(PageKind::Root);
                }
                Ok(())
            })?;

            let old_root = std::mem::replace(root, child);
            let height = self.height.fetch_sub(1, Ordering::AcqRel) - 1;
            self.arena.free(old_root)?;

            self.stats.inc_root_shrinks();
            tracing::debug!(
                target: "arbor::btree",
                old_root = old_root.0,
                root = child.0,
                height,
                "root shrink"
            );
            shrunk = true;
        }
    }
}
