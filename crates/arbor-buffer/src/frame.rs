//! Arena frame management.

use arbor_common::page::{PAGE_SIZE, PageId};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, Ordering};

/// A slot in the arena holding a single page.
///
/// The frame's `RwLock` is the page latch: shared for reads, exclusive for
/// structural mutation. A frame's page id never changes; only its in-use flag
/// flips as the page is allocated and freed.
pub struct PageFrame {
    /// Identifier of the page stored in this frame.
    page_id: PageId,
    /// Whether the page is currently allocated.
    in_use: AtomicBool,
    /// Page data buffer.
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl PageFrame {
    /// Creates a new, unallocated frame.
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            in_use: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    /// Returns the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns true while the page is allocated.
    #[inline]
    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_in_use(&self, in_use: bool) {
        self.in_use.store(in_use, Ordering::Release);
    }

    /// Latches the page in shared mode.
    #[inline]
    pub fn read_data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Latches the page in exclusive mode.
    #[inline]
    pub fn write_data(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Latches the page in exclusive mode if nobody else holds it.
    #[inline]
    pub fn try_write_data(&self) -> Option<RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>>> {
        self.data.try_write()
    }
}

impl std::fmt::Debug for PageFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFrame")
            .field("page_id", &self.page_id)
            .field("in_use", &self.is_in_use())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_new() {
        let frame = PageFrame::new(PageId::new(4));
        assert_eq!(frame.page_id(), PageId::new(4));
        assert!(!frame.is_in_use());
        assert!(frame.read_data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_frame_in_use_flag() {
        let frame = PageFrame::new(PageId::new(0));
        frame.set_in_use(true);
        assert!(frame.is_in_use());
        frame.set_in_use(false);
        assert!(!frame.is_in_use());
    }

    #[test]
    fn test_frame_write_then_read() {
        let frame = PageFrame::new(PageId::new(0));
        {
            let mut data = frame.write_data();
            data[0] = 0xAB;
            data[PAGE_SIZE - 1] = 0xCD;
        }
        let data = frame.read_data();
        assert_eq!(data[0], 0xAB);
        assert_eq!(data[PAGE_SIZE - 1], 0xCD);
    }

    #[test]
    fn test_try_write_fails_while_latched() {
        let frame = PageFrame::new(PageId::new(0));
        let reader = frame.read_data();
        assert!(frame.try_write_data().is_none());
        drop(reader);
        assert!(frame.try_write_data().is_some());
    }

    #[test]
    fn test_frame_debug() {
        let frame = PageFrame::new(PageId::new(2));
        let debug = format!("{:?}", frame);
        assert!(debug.contains("PageFrame"));
        assert!(debug.contains("in_use: false"));
    }
}
