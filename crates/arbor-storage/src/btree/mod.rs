//! Page-organized B-tree over an in-memory page arena.
//!
//! Every node is one 8 KiB slotted page:
//!
//! ```text
//! +--------------------+ 0
//! | header (36 bytes)  |
//! +--------------------+ 36
//! | slot directory     |  u16 cell offsets, grows up
//! +--------------------+
//! |    free space      |
//! +--------------------+ upper
//! | cell area          |  grows down from the page end
//! +--------------------+ 8192
//! ```
//!
//! Leaf cells hold `key ‖ value`, intermediate cells `key ‖ child pid`, with
//! the header's right child covering keys at or above the last separator.
//! Leaves and every intermediate level are chained through sibling links.
//!
//! Keys and values go through [`PageCodec`]: fixed-width little-endian
//! numbers, booleans, and length-prefixed UTF-8 strings.

mod codec;
mod constants;
mod merge;
mod node;
mod page;
mod split;
mod tree;
mod types;
mod verify;

pub use codec::{KeyCodec, PageCodec, encode_to_vec};
pub use constants::{CHILD_PID_SIZE, MAX_CELL_SIZE, SLOT_AREA_CAPACITY, SLOT_AREA_START, SLOT_SIZE};
pub use page::SlottedPage;
pub use tree::BTree;
pub use types::{FindResult, PageSummary, TreeStatsSnapshot, VerifyReport};
