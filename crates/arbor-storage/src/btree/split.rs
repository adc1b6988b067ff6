//! Insert path that restructures the tree: leaf splits, intermediate splits
//! and root growth.
//!
//! Runs with the structure latch held exclusively. Every page the cascade
//! could need is reserved before the first page is modified, so running out
//! of arena pages leaves the tree untouched.

use super::codec::{KeyCodec, PageCodec};
use super::constants::{CHILD_PID_SIZE, MAX_CELL_SIZE};
use super::node;
use super::tree::{BTree, PathEntry};
use arbor_buffer::PageArena;
use arbor_common::page::{PageId, PageKind};
use arbor_common::{ArborError, Result};
use std::sync::atomic::Ordering;

/// Pages pre-allocated for one split cascade. Pages not taken are returned to
/// the arena on drop.
pub(crate) struct PageReservation<'a> {
    arena: &'a PageArena,
    pages: Vec<PageId>,
}

impl<'a> PageReservation<'a> {
    /// Allocates `count` pages, or none at all.
    pub(crate) fn reserve(arena: &'a PageArena, count: usize) -> Result<Self> {
        let mut reservation = Self {
            arena,
            pages: Vec::with_capacity(count),
        };
        for _ in 0..count {
            let page = arena.allocate()?;
            reservation.pages.push(page.page_id());
        }
        Ok(reservation)
    }

    /// Hands out one reserved page.
    pub(crate) fn take(&mut self) -> Result<PageId> {
        self.pages
            .pop()
            .ok_or_else(|| ArborError::Internal("page reservation exhausted".to_string()))
    }

    /// Number of pages still held.
    #[cfg(test)]
    pub(crate) fn remaining(&self) -> usize {
        self.pages.len()
    }
}

impl Drop for PageReservation<'_> {
    fn drop(&mut self) {
        for pid in self.pages.drain(..) {
            if let Err(e) = self.arena.free(pid) {
                tracing::warn!(target: "arbor::btree", page = pid.0, error = %e, "failed to release reserved page");
            }
        }
    }
}

impl<K: KeyCodec, V: PageCodec> BTree<K, V> {
    /// Inserts an entry whose leaf may need to split.
    pub(super) fn insert_with_split(&self, root: &mut PageId, key: &K, cell: &[u8]) -> Result<PageId> {
        let (path, leaf_pid) = self.find_path(*root, key)?;
        let max_fill = self.config.max_fill_factor;

        // The leaf may have changed since the optimistic attempt
        let (idx, split, mut cells) = self.with_page(leaf_pid, |page| {
            let idx = match node::search(page, key)? {
                Ok(_) => return Err(ArborError::DuplicateKey),
                Err(idx) => idx,
            };
            if !node::needs_split(page, page.kind()?, cell.len(), max_fill) {
                return Ok((idx, false, Vec::new()));
            }
            Ok((idx, true, node::raw_cells(page, node::leaf_cell_len::<K, V>)?))
        })?;

        if !split {
            self.with_page_mut(leaf_pid, |page| page.insert_cell(idx, cell))?;
            return Ok(leaf_pid);
        }

        cells.insert(idx, cell.to_vec());
        let mid = node::byte_median(&cells, 1, 1);
        let right_cells = cells.split_off(mid);
        let separator = K::deserialize(&right_cells[0])?;

        let needed =
            1 + self.ancestor_splits(&path, separator.serialized_size() + CHILD_PID_SIZE)?;
        let mut reservation = PageReservation::reserve(&self.arena, needed)?;

        let right_pid = reservation.take()?;
        self.split_leaf(leaf_pid, right_pid, &cells, &right_cells)?;
        self.stats.inc_leaf_splits();
        tracing::trace!(
            target: "arbor::btree::split",
            left = leaf_pid.0,
            right = right_pid.0,
            left_items = cells.len(),
            right_items = right_cells.len(),
            "split leaf"
        );

        self.insert_separator(root, &path, separator, leaf_pid, right_pid, &mut reservation)?;

        Ok(if idx < mid { leaf_pid } else { right_pid })
    }

    /// Counts the pages the cascade above a leaf split will allocate: one per
    /// ancestor that splits in turn, plus a new root if every ancestor does.
    fn ancestor_splits(&self, path: &[PathEntry], first_separator_len: usize) -> Result<usize> {
        // Promoted keys further up are existing separators, bounded by the key
        // width or by the largest allowed cell.
        let bound = K::KIND
            .fixed_size()
            .map_or(MAX_CELL_SIZE, |size| size + CHILD_PID_SIZE);
        let max_fill = self.config.max_fill_factor;

        let mut separator_len = first_separator_len;
        let mut count = 0;
        for entry in path.iter().rev() {
            let split = self.with_page(entry.pid, |page| {
                Ok(node::needs_split(page, page.kind()?, separator_len, max_fill))
            })?;
            if !split {
                return Ok(count);
            }
            count += 1;
            separator_len = bound;
        }
        Ok(count + 1)
    }

    /// Moves `right_cells` into the new right sibling and threads it into the
    /// leaf chain.
    fn split_leaf(
        &self,
        left_pid: PageId,
        right_pid: PageId,
        left_cells: &[Vec<u8>],
        right_cells: &[Vec<u8>],
    ) -> Result<()> {
        let (parent, old_right) = self.with_page_mut(left_pid, |page| {
            page.replace_cells(left_cells)?;
            let old_right = page.right_sibling();
            page.set_right_sibling(right_pid);
            Ok((page.parent(), old_right))
        })?;

        self.init_page(right_pid, PageKind::Leaf)?;
        self.with_page_mut(right_pid, |page| {
            page.replace_cells(right_cells)?;
            page.set_parent(parent);
            page.set_left_sibling(left_pid);
            page.set_right_sibling(old_right);
            Ok(())
        })?;

        if old_right.is_valid() {
            self.with_page_mut(old_right, |page| {
                page.set_left_sibling(right_pid);
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Publishes a split of `left` into `left` / `right` to the ancestors.
    ///
    /// The parent reference that pointed at `left` is redirected to `right`
    /// and `(separator, left)` goes in front of it. Parents that overflow
    /// split in turn; a root that overflows grows the tree by one level.
    fn insert_separator(
        &self,
        root: &mut PageId,
        path: &[PathEntry],
        separator: K,
        left: PageId,
        right: PageId,
        reservation: &mut PageReservation<'_>,
    ) -> Result<()> {
        let max_fill = self.config.max_fill_factor;
        let (mut separator, mut left, mut right) = (separator, left, right);

        for entry in path.iter().rev() {
            let cell = node::encode_internal_cell(&separator, left)?;
            let split = self.with_page(entry.pid, |page| {
                Ok(node::needs_split(page, page.kind()?, cell.len(), max_fill))
            })?;

            if !split {
                self.with_page_mut(entry.pid, |page| {
                    node::set_child_at::<K, _>(page, entry.pos, right)?;
                    page.insert_cell(entry.pos, &cell)
                })?;
                return Ok(());
            }

            let new_pid = reservation.take()?;
            separator = self.split_internal(entry.pid, new_pid, entry.pos, cell, right)?;
            left = entry.pid;
            right = new_pid;
        }

        self.grow_root(root, &separator, left, right, reservation)
    }

    /// Splits an intermediate page while adding `cell` at `pos` (whose old
    /// child reference is redirected to `redirect`). Returns the promoted key.
    fn split_internal(
        &self,
        pid: PageId,
        new_pid: PageId,
        pos: usize,
        cell: Vec<u8>,
        redirect: PageId,
    ) -> Result<K> {
        let (mut cells, mut right_child, parent, old_right) = self.with_page(pid, |page| {
            Ok((
                node::raw_cells(page, node::internal_cell_len::<K>)?,
                page.right_child(),
                page.parent(),
                page.right_sibling(),
            ))
        })?;

        if pos == cells.len() {
            right_child = redirect;
        } else {
            node::set_cell_child::<K>(&mut cells[pos], redirect)?;
        }
        cells.insert(pos, cell);

        // Left keeps [..mid], cells[mid] is promoted, right takes the rest
        let mid = node::byte_median(&cells, 1, 2);
        let mut right_cells = cells.split_off(mid);
        let promoted_cell = right_cells.remove(0);
        let promoted = K::deserialize(&promoted_cell)?;
        let promoted_child = node::cell_child::<K>(&promoted_cell)?;

        self.with_page_mut(pid, |page| {
            page.replace_cells(&cells)?;
            page.set_right_child(promoted_child);
            page.set_right_sibling(new_pid);
            Ok(())
        })?;

        self.init_page(new_pid, PageKind::Intermediate)?;
        self.with_page_mut(new_pid, |page| {
            page.replace_cells(&right_cells)?;
            page.set_right_child(right_child);
            page.set_parent(parent);
            page.set_left_sibling(pid);
            page.set_right_sibling(old_right);
            Ok(())
        })?;

        if old_right.is_valid() {
            self.with_page_mut(old_right, |page| {
                page.set_left_sibling(new_pid);
                Ok(())
            })?;
        }

        for moved in &right_cells {
            self.adopt(node::cell_child::<K>(moved)?, new_pid)?;
        }
        self.adopt(right_child, new_pid)?;

        self.stats.inc_internal_splits();
        tracing::trace!(
            target: "arbor::btree::split",
            left = pid.0,
            right = new_pid.0,
            left_items = cells.len(),
            right_items = right_cells.len(),
            "split intermediate page"
        );
        Ok(promoted)
    }

    /// Places a new root above `left` and `right`.
    fn grow_root(
        &self,
        root: &mut PageId,
        separator: &K,
        left: PageId,
        right: PageId,
        reservation: &mut PageReservation<'_>,
    ) -> Result<()> {
        let new_root = reservation.take()?;
        let cell = node::encode_internal_cell(separator, left)?;

        self.init_page(new_root, PageKind::Root)?;
        self.with_page_mut(new_root, |page| {
            page.insert_cell(0, &cell)?;
            page.set_right_child(right);
            Ok(())
        })?;

        for child in [left, right] {
            self.with_page_mut(child, |page| {
                page.set_parent(new_root);
                if page.kind()? == PageKind::Root {
                    page.set_kind(PageKind::Intermediate);
                }
                Ok(())
            })?;
        }

        *root = new_root;
        let height = self.height.fetch_add(1, Ordering::AcqRel) + 1;
        self.stats.inc_root_splits();
        tracing::debug!(target: "arbor::btree", root = new_root.0, height, "root split");
        Ok(())
    }
}
