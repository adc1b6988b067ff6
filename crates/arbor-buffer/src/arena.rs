//! Fixed-capacity page arena.

use crate::frame::PageFrame;
use arbor_common::config::ArenaConfig;
use arbor_common::page::{PAGE_SIZE, PageId};
use arbor_common::{ArborError, Result};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::ops::{Deref, DerefMut};

/// Allocation bookkeeping guarded by the arena lock.
struct AllocState {
    /// Next page that has never been handed out.
    next_unused: u32,
    /// Freed pages, reused LIFO.
    free_list: Vec<PageId>,
}

/// Fixed-capacity, non-evicting pool of pages.
///
/// Manages a fixed set of page frames with:
/// - LIFO reuse of freed page ids before never-used ones
/// - A single lock over the allocation counter and free list
/// - Per-page latches for content access
///
/// All pages stay resident for the arena's lifetime; nothing is ever written
/// to secondary storage.
pub struct PageArena {
    /// Configuration.
    config: ArenaConfig,
    /// One frame per page id.
    frames: Vec<PageFrame>,
    /// Allocation counter and free list.
    alloc: RwLock<AllocState>,
}

impl PageArena {
    /// Creates an arena with `page_count` pages.
    pub fn new(page_count: u32) -> Result<Self> {
        Self::with_config(ArenaConfig::with_pages(page_count))
    }

    /// Creates an arena from a config.
    pub fn with_config(config: ArenaConfig) -> Result<Self> {
        config.validate()?;

        let frames: Vec<_> = (0..config.page_count)
            .map(|i| PageFrame::new(PageId::new(i)))
            .collect();

        tracing::debug!(
            pages = config.page_count,
            bytes = config.size_bytes(),
            "page arena created"
        );

        Ok(Self {
            config,
            frames,
            alloc: RwLock::new(AllocState {
                next_unused: 0,
                free_list: Vec::new(),
            }),
        })
    }

    /// Returns the fixed number of pages.
    pub fn capacity(&self) -> u32 {
        self.config.page_count
    }

    /// Returns the number of pages currently allocated.
    pub fn allocated_count(&self) -> u32 {
        let state = self.alloc.read();
        state.next_unused - state.free_list.len() as u32
    }

    /// Returns the number of pages that can still be allocated.
    pub fn free_count(&self) -> u32 {
        self.capacity() - self.allocated_count()
    }

    /// Allocates a page.
    ///
    /// Reuses the most recently freed page if there is one, otherwise hands out
    /// the next never-used page. The page comes back zeroed and exclusively
    /// latched.
    pub fn allocate(&self) -> Result<PageWriteGuard<'_>> {
        let page_id = {
            let mut state = self.alloc.write();
            let page_id = if let Some(page_id) = state.free_list.pop() {
                page_id
            } else if state.next_unused < self.config.page_count {
                let page_id = PageId::new(state.next_unused);
                state.next_unused += 1;
                page_id
            } else {
                tracing::warn!(capacity = self.config.page_count, "page arena exhausted");
                return Err(ArborError::ArenaExhausted {
                    capacity: self.config.page_count,
                });
            };
            self.frames[page_id.index()].set_in_use(true);
            page_id
        };

        let data = self.frames[page_id.index()].write_data();
        Ok(PageWriteGuard { page_id, data })
    }

    /// Returns a page to the free list.
    ///
    /// The page is zeroed. Fails if the page is not allocated or if any latch
    /// on it is still held.
    pub fn free(&self, page_id: PageId) -> Result<()> {
        let frame = self.frame(page_id)?;

        let mut state = self.alloc.write();
        if !frame.is_in_use() {
            return Err(ArborError::PageNotFound { page_id });
        }
        let Some(mut data) = frame.try_write_data() else {
            return Err(ArborError::PageLatched { page_id });
        };
        data.fill(0);
        frame.set_in_use(false);
        drop(data);

        state.free_list.push(page_id);
        Ok(())
    }

    /// Maps a page id to its frame. Takes no lock.
    #[inline]
    pub fn get(&self, page_id: PageId) -> Result<&PageFrame> {
        let frame = self.frame(page_id)?;
        if !frame.is_in_use() {
            return Err(ArborError::PageNotFound { page_id });
        }
        Ok(frame)
    }

    /// Latches an allocated page in shared mode.
    pub fn read_page(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame = self.get(page_id)?;
        let data = frame.read_data();
        // Freed between lookup and latch
        if !frame.is_in_use() {
            return Err(ArborError::PageNotFound { page_id });
        }
        Ok(PageReadGuard { page_id, data })
    }

    /// Latches an allocated page in exclusive mode.
    pub fn write_page(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame = self.get(page_id)?;
        let data = frame.write_data();
        if !frame.is_in_use() {
            return Err(ArborError::PageNotFound { page_id });
        }
        Ok(PageWriteGuard { page_id, data })
    }

    /// Returns statistics about the arena.
    pub fn stats(&self) -> ArenaStats {
        let state = self.alloc.read();
        ArenaStats {
            total_pages: self.config.page_count,
            allocated_pages: state.next_unused - state.free_list.len() as u32,
            recycled_pages: state.free_list.len() as u32,
            untouched_pages: self.config.page_count - state.next_unused,
        }
    }

    #[inline]
    fn frame(&self, page_id: PageId) -> Result<&PageFrame> {
        self.frames
            .get(page_id.index())
            .filter(|_| page_id.is_valid())
            .ok_or(ArborError::PageNotFound { page_id })
    }
}

impl std::fmt::Debug for PageArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageArena")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Statistics about the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Fixed capacity.
    pub total_pages: u32,
    /// Pages currently handed out.
    pub allocated_pages: u32,
    /// Freed pages waiting on the free list.
    pub recycled_pages: u32,
    /// Pages never handed out.
    pub untouched_pages: u32,
}

/// Shared latch on a page.
pub struct PageReadGuard<'a> {
    page_id: PageId,
    data: RwLockReadGuard<'a, Box<[u8; PAGE_SIZE]>>,
}

impl PageReadGuard<'_> {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data[..]
    }
}

/// Exclusive latch on a page.
#[derive(Debug)]
pub struct PageWriteGuard<'a> {
    page_id: PageId,
    data: RwLockWriteGuard<'a, Box<[u8; PAGE_SIZE]>>,
}

impl PageWriteGuard<'_> {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data[..]
    }
}

impl DerefMut for PageWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data[..]
    }
}
