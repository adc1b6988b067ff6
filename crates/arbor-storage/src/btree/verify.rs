//! Whole-tree consistency check.

use super::codec::{KeyCodec, PageCodec};
use super::node;
use super::tree::BTree;
use super::types::VerifyReport;
use arbor_common::page::{PageId, PageKind};
use arbor_common::{ArborError, Result};

/// Sibling links recorded for one page during the walk.
#[derive(Debug, Clone, Copy)]
struct LevelLink {
    pid: PageId,
    left: PageId,
    right: PageId,
}

struct Walk {
    height: u32,
    /// Pages per depth in left-to-right order.
    levels: Vec<Vec<LevelLink>>,
    report: VerifyReport,
}

fn corrupted(msg: String) -> ArborError {
    ArborError::BTreeCorrupted(msg)
}

impl<K: KeyCodec, V: PageCodec> BTree<K, V> {
    /// Walks every page reachable from the root and checks the tree's shape.
    ///
    /// Each page is opened with full header validation (version, pid, kind,
    /// layout bounds, crc when enabled). On top of that the walk checks parent
    /// links, the cached fill factor, that kinds match depth, that keys are
    /// strictly ascending within the bounds set by the ancestors, that leaf
    /// values decode, that every level forms one sibling chain, and that the
    /// entry count matches [`BTree::len`].
    ///
    /// Blocks all other operations on the tree while it runs.
    pub fn verify(&self) -> Result<VerifyReport> {
        let root = self.root.write();
        let height = self.height();
        let mut walk = Walk {
            height,
            levels: vec![Vec::new(); height as usize],
            report: VerifyReport {
                height,
                ..Default::default()
            },
        };

        self.verify_page(&mut walk, *root, PageId::INVALID, 0, None, None)?;

        for (depth, level) in walk.levels.iter().enumerate() {
            verify_level(depth, level)?;
        }

        let len = self.len();
        if walk.report.entries != len {
            return Err(corrupted(format!(
                "tree holds {} entries, expected {len}",
                walk.report.entries
            )));
        }
        Ok(walk.report)
    }

    fn verify_page(
        &self,
        walk: &mut Walk,
        pid: PageId,
        parent: PageId,
        depth: usize,
        lower: Option<&K>,
        upper: Option<&K>,
    ) -> Result<()> {
        if depth >= walk.height as usize {
            return Err(corrupted(format!(
                "page {pid} at depth {depth} exceeds height {}",
                walk.height
            )));
        }
        let leaf_depth = walk.height as usize - 1;
        let expected_kind = match (depth, walk.height) {
            (0, 1) => PageKind::Leaf,
            (0, _) => PageKind::Root,
            (d, _) if d == leaf_depth => PageKind::Leaf,
            _ => PageKind::Intermediate,
        };

        let (keys, children, link) = self.with_page(pid, |page| {
            if page.parent() != parent {
                return Err(corrupted(format!(
                    "page {pid} names parent {}, reached from {parent}",
                    page.parent()
                )));
            }
            let kind = page.kind()?;
            if kind != expected_kind {
                return Err(corrupted(format!(
                    "page {pid} at depth {depth} is {kind:?}, expected {expected_kind:?}"
                )));
            }
            if page.fill_factor() != page.computed_fill_factor() {
                return Err(corrupted(format!(
                    "page {pid} caches fill factor {} but uses {}%",
                    page.fill_factor(),
                    page.computed_fill_factor()
                )));
            }

            let items = page.items_count() as usize;
            let keys = (0..items)
                .map(|idx| node::key_at::<K, _>(page, idx))
                .collect::<Result<Vec<_>>>()?;

            let children = if kind.is_leaf() {
                for idx in 0..items {
                    node::leaf_value_at::<K, V, _>(page, idx)?;
                }
                Vec::new()
            } else {
                if depth == 0 && items == 0 {
                    return Err(corrupted(format!("root {pid} has no separators")));
                }
                node::children::<K, _>(page)?
            };

            let link = LevelLink {
                pid,
                left: page.left_sibling(),
                right: page.right_sibling(),
            };
            Ok((keys, children, link))
        })?;

        walk.levels[depth].push(link);

        if keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(corrupted(format!("keys on page {pid} are not strictly ascending")));
        }
        if let (Some(first), Some(lower)) = (keys.first(), lower) {
            if first < lower {
                return Err(corrupted(format!("page {pid} holds {first:?} below bound {lower:?}")));
            }
        }
        if let (Some(last), Some(upper)) = (keys.last(), upper) {
            if last >= upper {
                return Err(corrupted(format!("page {pid} holds {last:?} at or above bound {upper:?}")));
            }
        }

        if children.is_empty() {
            walk.report.leaf_pages += 1;
            walk.report.entries += keys.len();
            return Ok(());
        }

        walk.report.internal_pages += 1;
        for (pos, child) in children.iter().enumerate() {
            if !child.is_valid() {
                return Err(corrupted(format!("page {pid} has an invalid child at {pos}")));
            }
            let child_lower = if pos == 0 { lower } else { Some(&keys[pos - 1]) };
            let child_upper = if pos < keys.len() { Some(&keys[pos]) } else { upper };
            self.verify_page(walk, *child, pid, depth + 1, child_lower, child_upper)?;
        }
        Ok(())
    }
}

/// Checks that the pages of one depth link up left to right.
fn verify_level(depth: usize, level: &[LevelLink]) -> Result<()> {
    let (Some(first), Some(last)) = (level.first(), level.last()) else {
        return Err(corrupted(format!("no pages at depth {depth}")));
    };
    if first.left.is_valid() {
        return Err(corrupted(format!(
            "first page {} at depth {depth} has left sibling {}",
            first.pid, first.left
        )));
    }
    if last.right.is_valid() {
        return Err(corrupted(format!(
            "last page {} at depth {depth} has right sibling {}",
            last.pid, last.right
        )));
    }
    for pair in level.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if a.right != b.pid || b.left != a.pid {
            return Err(corrupted(format!(
                "broken sibling link between pages {} and {} at depth {depth}",
                a.pid, b.pid
            )));
        }
    }
    Ok(())
}
