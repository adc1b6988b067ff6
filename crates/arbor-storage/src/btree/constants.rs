//! B-tree page layout constants.

use arbor_common::page::{PAGE_SIZE, PageHeader};

/// Size of one slot directory entry (a u16 cell offset).
pub const SLOT_SIZE: usize = 2;

/// First byte of the slot directory.
pub const SLOT_AREA_START: usize = PageHeader::SIZE;

/// Bytes shared by the slot directory and the cell area: 8192 - 36 = 8156.
pub const SLOT_AREA_CAPACITY: usize = PAGE_SIZE - PageHeader::SIZE;

/// Largest cell a page accepts, a quarter of the slot area, so that any split
/// leaves two non-empty halves that each fit a page.
pub const MAX_CELL_SIZE: usize = SLOT_AREA_CAPACITY / 4;

/// Width of the child page id stored after an intermediate cell's key.
pub const CHILD_PID_SIZE: usize = 4;

/// Deepest tree the descent path tracks.
pub(crate) const MAX_HEIGHT: usize = 32;

/// Smallest entry count a leaf split can partition into two non-empty pages.
pub(crate) const MIN_LEAF_SPLIT_ITEMS: usize = 2;

/// Smallest separator count an internal split can partition: one each side
/// plus the promoted median.
pub(crate) const MIN_INTERNAL_SPLIT_ITEMS: usize = 3;
