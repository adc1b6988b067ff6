//! Configuration structures for Arbor.

use crate::error::{ArborError, Result};
use crate::page::PAGE_SIZE;
use serde::{Deserialize, Serialize};

/// Largest accepted arena: 2^20 pages (8 GiB). Frames are allocated up front.
pub const MAX_ARENA_PAGES: u32 = 1 << 20;

/// Configuration for the page arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Fixed number of pages. Never grows after construction.
    pub page_count: u32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            page_count: 1024, // 8 MB with 8 KB pages
        }
    }
}

impl ArenaConfig {
    /// Creates a config for an arena with `page_count` pages.
    pub fn with_pages(page_count: u32) -> Self {
        Self { page_count }
    }

    /// Returns the total arena size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.page_count as usize * PAGE_SIZE
    }

    /// Checks that the page count is in `1..=MAX_ARENA_PAGES`.
    pub fn validate(&self) -> Result<()> {
        if self.page_count == 0 || self.page_count > MAX_ARENA_PAGES {
            return Err(ArborError::InvalidParameter {
                name: "page_count".to_string(),
                value: self.page_count.to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration for a B-tree instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Split threshold: fraction of the slot area a page may use after an insert.
    pub max_fill_factor: f64,
    /// Underflow threshold: non-root pages below this fraction are rebalanced.
    pub min_fill_factor: f64,
    /// Maintain the header CRC on every write and verify it on every read.
    pub checksum_pages: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_fill_factor: 0.9,
            min_fill_factor: 0.35,
            checksum_pages: false,
        }
    }
}

impl TreeConfig {
    /// Checks `0 < max_fill_factor <= 1` and `0 < min_fill_factor <
    /// max_fill_factor / 2`, so both halves of a split start above the
    /// underflow threshold.
    pub fn validate(&self) -> Result<()> {
        if !(self.max_fill_factor > 0.0 && self.max_fill_factor <= 1.0) {
            return Err(ArborError::InvalidParameter {
                name: "max_fill_factor".to_string(),
                value: self.max_fill_factor.to_string(),
            });
        }
        if !(self.min_fill_factor > 0.0 && self.min_fill_factor < self.max_fill_factor / 2.0) {
            return Err(ArborError::InvalidParameter {
                name: "min_fill_factor".to_string(),
                value: self.min_fill_factor.to_string(),
            });
        }
        Ok(())
    }

    /// Largest fill two siblings may merge into.
    ///
    /// Lies strictly between `2 * min_fill_factor` and `max_fill_factor`: a
    /// merged page has room to grow before it splits again, and a pair too
    /// large to merge redistributes into halves above the underflow threshold.
    pub fn merge_fill_factor(&self) -> f64 {
        self.min_fill_factor + self.max_fill_factor / 2.0
    }
}
