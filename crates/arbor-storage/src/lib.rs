//! Storage engine for Arbor.
//!
//! This crate provides:
//! - Slotted 8 KiB page layout with header validation and checksums
//! - Key/value codecs for the supported page value kinds
//! - A concurrent B-tree whose nodes live in a shared page arena

mod btree;

pub use btree::{
    BTree, CHILD_PID_SIZE, FindResult, KeyCodec, MAX_CELL_SIZE, PageCodec, PageSummary,
    SLOT_AREA_CAPACITY, SLOT_AREA_START, SLOT_SIZE, SlottedPage, TreeStatsSnapshot, VerifyReport,
    encode_to_vec,
};
