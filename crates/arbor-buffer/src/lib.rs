//! Page arena for Arbor.
//!
//! This crate provides the in-memory page store with:
//! - Fixed page count chosen at construction, no eviction
//! - LIFO reuse of freed page ids
//! - Per-page read/write latches
//! - A single lock over allocation bookkeeping

mod arena;
mod frame;

pub use arena::{ArenaStats, PageArena, PageReadGuard, PageWriteGuard};
pub use frame::PageFrame;
