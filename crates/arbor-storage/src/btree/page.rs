//! Slotted page layout for tree nodes.
//!
//! Page layout:
//! ```text
//! +------------------------+ 0
//! | PageHeader (36 bytes)  |
//! +------------------------+ 36
//! | slot 0: u16 offset     |
//! | slot 1: u16 offset     |
//! | ...  (grows forward)   |
//! +------------------------+ 36 + items * 2
//! |      free space        |
//! +------------------------+ upper
//! | cells (grow backward)  |
//! +------------------------+ 8192
//! ```
//!
//! Slots are kept in ascending key order; cells are placed wherever `upper`
//! was when they were inserted. Every offset read from the page is checked
//! against the header before it is used.

use super::constants::{SLOT_AREA_CAPACITY, SLOT_AREA_START, SLOT_SIZE};
use arbor_common::page::{PAGE_FORMAT_VERSION, PAGE_SIZE, PageHeader, PageId, PageInfo, PageKind};
use arbor_common::{ArborError, Result};

/// Validated accessor over the bytes of one page.
pub struct SlottedPage<B> {
    buf: B,
}

impl<B: AsRef<[u8]>> SlottedPage<B> {
    /// Wraps a page buffer. The buffer must be exactly `PAGE_SIZE` bytes.
    pub fn new(buf: B) -> Result<Self> {
        let len = buf.as_ref().len();
        if len != PAGE_SIZE {
            return Err(ArborError::PageSizeMismatch {
                expected: PAGE_SIZE,
                actual: len,
            });
        }
        Ok(Self { buf })
    }

    /// Returns the raw page bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_ref()
    }

    #[inline]
    fn u16_at(&self, off: usize) -> u16 {
        let data = self.buf.as_ref();
        u16::from_le_bytes([data[off], data[off + 1]])
    }

    #[inline]
    fn u32_at(&self, off: usize) -> u32 {
        let data = self.buf.as_ref();
        u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
    }

    /// Decodes the full header.
    pub fn header(&self) -> Result<PageHeader> {
        PageHeader::from_bytes(self.as_bytes())
    }

    /// Returns the info field.
    #[inline]
    pub fn info(&self) -> PageInfo {
        PageInfo::from_raw(self.u16_at(PageHeader::INFO_OFFSET))
    }

    /// Returns the node kind, failing on the unassigned code.
    pub fn kind(&self) -> Result<PageKind> {
        let info = self.info();
        info.kind().ok_or(ArborError::InvalidNodeType {
            page_id: self.pid(),
            code: info.kind_code(),
        })
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.u16_at(PageHeader::VERSION_OFFSET)
    }

    /// Returns the cached fill percentage.
    #[inline]
    pub fn fill_factor(&self) -> u16 {
        self.u16_at(PageHeader::FILL_FACTOR_OFFSET)
    }

    #[inline]
    pub fn items_count(&self) -> u16 {
        self.u16_at(PageHeader::ITEMS_COUNT_OFFSET)
    }

    #[inline]
    pub fn upper(&self) -> u16 {
        self.u16_at(PageHeader::UPPER_OFFSET)
    }

    #[inline]
    pub fn parent(&self) -> PageId {
        PageId(self.u32_at(PageHeader::PARENT_OFFSET))
    }

    #[inline]
    pub fn left_sibling(&self) -> PageId {
        PageId(self.u32_at(PageHeader::LEFT_SIBLING_OFFSET))
    }

    #[inline]
    pub fn right_sibling(&self) -> PageId {
        PageId(self.u32_at(PageHeader::RIGHT_SIBLING_OFFSET))
    }

    #[inline]
    pub fn crc(&self) -> u32 {
        self.u32_at(PageHeader::CRC_OFFSET)
    }

    #[inline]
    pub fn pid(&self) -> PageId {
        PageId(self.u32_at(PageHeader::PID_OFFSET))
    }

    #[inline]
    pub fn right_child(&self) -> PageId {
        PageId(self.u32_at(PageHeader::RIGHT_CHILD_OFFSET))
    }

    /// Returns true when the page has no parent.
    #[inline]
    pub fn is_root(&self) -> bool {
        !self.parent().is_valid()
    }

    /// Bytes consumed by slots and cells.
    /// used = items * 2 + (PAGE_SIZE - upper)
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.items_count() as usize * SLOT_SIZE + (PAGE_SIZE - self.upper() as usize)
    }

    /// Bytes still available for slots and cells.
    #[inline]
    pub fn free_space(&self) -> usize {
        SLOT_AREA_CAPACITY.saturating_sub(self.used_bytes())
    }

    /// Fraction of the slot area in use.
    #[inline]
    pub fn fill_ratio(&self) -> f64 {
        self.used_bytes() as f64 / SLOT_AREA_CAPACITY as f64
    }

    /// Fill percentage as stored in the header.
    #[inline]
    pub fn computed_fill_factor(&self) -> u16 {
        (self.used_bytes() * 100 / SLOT_AREA_CAPACITY) as u16
    }

    /// Returns the cell offset stored in slot `idx`.
    pub fn slot_offset(&self, idx: usize) -> Result<usize> {
        let items = self.items_count() as usize;
        if idx >= items {
            return Err(ArborError::corrupted(
                self.pid(),
                format!("slot {idx} out of range ({items} items)"),
            ));
        }
        let off = self.u16_at(SLOT_AREA_START + idx * SLOT_SIZE) as usize;
        if off < self.upper() as usize || off >= PAGE_SIZE {
            return Err(ArborError::corrupted(
                self.pid(),
                format!("slot {idx} offset {off} outside cell area"),
            ));
        }
        Ok(off)
    }

    /// Returns the page bytes from the start of cell `idx` to the end of the
    /// page. The cell's own length comes from its encoding.
    pub fn cell(&self, idx: usize) -> Result<&[u8]> {
        let off = self.slot_offset(idx)?;
        Ok(&self.as_bytes()[off..])
    }

    /// CRC-32 of the page with the crc field treated as zero.
    pub fn compute_crc(&self) -> u32 {
        let data = self.as_bytes();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data[..PageHeader::CRC_OFFSET]);
        hasher.update(&[0u8; 4]);
        hasher.update(&data[PageHeader::CRC_OFFSET + 4..]);
        hasher.finalize()
    }

    /// Checks the header against what every opened page must satisfy.
    pub fn validate(&self, expected: PageId, verify_crc: bool) -> Result<()> {
        let pid = self.pid();
        if pid != expected {
            return Err(ArborError::corrupted(
                expected,
                format!("header carries page id {pid}"),
            ));
        }
        let version = self.version();
        if version != PAGE_FORMAT_VERSION {
            return Err(ArborError::corrupted(
                pid,
                format!("unsupported page version {version}"),
            ));
        }
        self.kind()?;

        let info = self.info();
        if info.lock_mode() != 0 {
            return Err(ArborError::corrupted(pid, "lock mode bits set"));
        }
        if info.compression() != 0 {
            return Err(ArborError::corrupted(
                pid,
                format!("unsupported compression kind {}", info.compression()),
            ));
        }

        let upper = self.upper() as usize;
        let slots_end = SLOT_AREA_START + self.items_count() as usize * SLOT_SIZE;
        if upper > PAGE_SIZE || slots_end > upper {
            return Err(ArborError::corrupted(
                pid,
                format!("slot directory end {slots_end} overlaps cell area at {upper}"),
            ));
        }

        if verify_crc {
            let stored = self.crc();
            let computed = self.compute_crc();
            if stored != computed {
                return Err(ArborError::corrupted(
                    pid,
                    format!("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"),
                ));
            }
        }
        Ok(())
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> SlottedPage<B> {
    #[inline]
    fn put_u16(&mut self, off: usize, value: u16) {
        self.buf.as_mut()[off..off + 2].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    fn put_u32(&mut self, off: usize, value: u32) {
        self.buf.as_mut()[off..off + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Formats the page as an empty node of the given kind.
    pub fn init(&mut self, pid: PageId, kind: PageKind) {
        let data = self.buf.as_mut();
        data.fill(0);
        data[..PageHeader::SIZE].copy_from_slice(&PageHeader::new(pid, kind).to_bytes());
    }

    pub fn set_kind(&mut self, kind: PageKind) {
        let mut info = self.info();
        info.set_kind(kind);
        self.put_u16(PageHeader::INFO_OFFSET, info.raw());
    }

    pub fn set_parent(&mut self, pid: PageId) {
        self.put_u32(PageHeader::PARENT_OFFSET, pid.0);
    }

    pub fn set_left_sibling(&mut self, pid: PageId) {
        self.put_u32(PageHeader::LEFT_SIBLING_OFFSET, pid.0);
    }

    pub fn set_right_sibling(&mut self, pid: PageId) {
        self.put_u32(PageHeader::RIGHT_SIBLING_OFFSET, pid.0);
    }

    pub fn set_right_child(&mut self, pid: PageId) {
        self.put_u32(PageHeader::RIGHT_CHILD_OFFSET, pid.0);
    }

    fn set_items_count(&mut self, items: usize) {
        self.put_u16(PageHeader::ITEMS_COUNT_OFFSET, items as u16);
    }

    fn set_upper(&mut self, upper: usize) {
        self.put_u16(PageHeader::UPPER_OFFSET, upper as u16);
    }

    /// Mutable view from the start of cell `idx` to the end of the page.
    pub fn cell_mut(&mut self, idx: usize) -> Result<&mut [u8]> {
        let off = self.slot_offset(idx)?;
        Ok(&mut self.buf.as_mut()[off..])
    }

    /// Places `cell` at the top of the cell area and points a new slot at
    /// position `idx` to it, shifting later slots right by one.
    pub fn insert_cell(&mut self, idx: usize, cell: &[u8]) -> Result<()> {
        let items = self.items_count() as usize;
        if idx > items {
            return Err(ArborError::Internal(format!(
                "slot {idx} past end of page {} ({items} items)",
                self.pid()
            )));
        }
        if SLOT_SIZE + cell.len() > self.free_space() {
            return Err(ArborError::PageFull);
        }

        let upper = self.upper() as usize - cell.len();
        let slot = SLOT_AREA_START + idx * SLOT_SIZE;
        let slots_end = SLOT_AREA_START + items * SLOT_SIZE;

        let data = self.buf.as_mut();
        data[upper..upper + cell.len()].copy_from_slice(cell);
        data.copy_within(slot..slots_end, slot + SLOT_SIZE);

        self.put_u16(slot, upper as u16);
        self.set_items_count(items + 1);
        self.set_upper(upper);
        Ok(())
    }

    /// Removes slot `idx` and its `len`-byte cell, compacting the cell area.
    ///
    /// Cells stored below the removed one move up by `len` and their slot
    /// offsets are adjusted.
    pub fn remove_cell(&mut self, idx: usize, len: usize) -> Result<()> {
        let off = self.slot_offset(idx)?;
        if off + len > PAGE_SIZE {
            return Err(ArborError::corrupted(
                self.pid(),
                format!("cell {idx} of {len} bytes runs past page end"),
            ));
        }
        let items = self.items_count() as usize;
        let upper = self.upper() as usize;
        let slot = SLOT_AREA_START + idx * SLOT_SIZE;
        let slots_end = SLOT_AREA_START + items * SLOT_SIZE;

        let data = self.buf.as_mut();
        data.copy_within(upper..off, upper + len);
        data[upper..upper + len].fill(0);
        data.copy_within(slot + SLOT_SIZE..slots_end, slot);
        data[slots_end - SLOT_SIZE..slots_end].fill(0);

        let remaining = items - 1;
        for i in 0..remaining {
            let slot_off = SLOT_AREA_START + i * SLOT_SIZE;
            let cell_off = self.u16_at(slot_off) as usize;
            if cell_off < off {
                self.put_u16(slot_off, (cell_off + len) as u16);
            }
        }

        self.set_items_count(remaining);
        self.set_upper(upper + len);
        Ok(())
    }

    /// Rewrites the slot directory and cell area from scratch with `cells` in
    /// slot order.
    pub fn replace_cells<C: AsRef<[u8]>>(&mut self, cells: &[C]) -> Result<()> {
        let needed: usize = cells.iter().map(|c| c.as_ref().len() + SLOT_SIZE).sum();
        if needed > SLOT_AREA_CAPACITY {
            return Err(ArborError::PageFull);
        }

        let data = self.buf.as_mut();
        data[SLOT_AREA_START..].fill(0);

        let mut upper = PAGE_SIZE;
        for (idx, cell) in cells.iter().enumerate() {
            let cell = cell.as_ref();
            upper -= cell.len();
            data[upper..upper + cell.len()].copy_from_slice(cell);
            let slot = SLOT_AREA_START + idx * SLOT_SIZE;
            data[slot..slot + SLOT_SIZE].copy_from_slice(&(upper as u16).to_le_bytes());
        }

        self.set_items_count(cells.len());
        self.set_upper(upper);
        Ok(())
    }

    /// Refreshes the cached fill factor and, when enabled, the checksum.
    /// Called after every mutation.
    pub fn seal(&mut self, checksum: bool) {
        let fill = self.computed_fill_factor();
        self.put_u16(PageHeader::FILL_FACTOR_OFFSET, fill);
        let crc = if checksum { self.compute_crc() } else { 0 };
        self.put_u32(PageHeader::CRC_OFFSET, crc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_page(kind: PageKind) -> SlottedPage<Vec<u8>> {
        let mut page = SlottedPage::new(vec![0u8; PAGE_SIZE]).unwrap();
        page.init(PageId::new(1), kind);
        page
    }

    fn cell_offsets(page: &SlottedPage<Vec<u8>>) -> Vec<usize> {
        (0..page.items_count() as usize)
            .map(|i| page.slot_offset(i).unwrap())
            .collect()
    }

    #[test]
    fn test_wrong_buffer_size() {
        let err = SlottedPage::new(vec![0u8; 4096]).err().unwrap();
        assert!(matches!(
            err,
            ArborError::PageSizeMismatch {
                expected: 8192,
                actual: 4096
            }
        ));
    }

    #[test]
    fn test_init_empty_page() {
        let page = create_test_page(PageKind::Leaf);
        assert_eq!(page.kind().unwrap(), PageKind::Leaf);
        assert_eq!(page.items_count(), 0);
        assert_eq!(page.upper() as usize, PAGE_SIZE);
        assert_eq!(page.used_bytes(), 0);
        assert_eq!(page.free_space(), SLOT_AREA_CAPACITY);
        assert!(page.is_root());
        assert_eq!(page.right_child(), PageId::INVALID);
        assert!(page.validate(PageId::new(1), false).is_ok());
    }

    #[test]
    fn test_insert_cells_keep_slot_order() {
        let mut page = create_test_page(PageKind::Leaf);
        page.insert_cell(0, b"bbb").unwrap();
        page.insert_cell(0, b"aa").unwrap();
        page.insert_cell(2, b"cccc").unwrap();

        assert_eq!(page.items_count(), 3);
        assert_eq!(&page.cell(0).unwrap()[..2], b"aa");
        assert_eq!(&page.cell(1).unwrap()[..3], b"bbb");
        assert_eq!(&page.cell(2).unwrap()[..4], b"cccc");
        assert_eq!(page.upper() as usize, PAGE_SIZE - 9);
        assert_eq!(page.used_bytes(), 9 + 3 * SLOT_SIZE);
    }

    #[test]
    fn test_slots_grow_forward_cells_grow_backward() {
        let mut page = create_test_page(PageKind::Leaf);
        for i in 0..3 {
            page.insert_cell(i, &[i as u8; 10]).unwrap();
        }
        assert_eq!(cell_offsets(&page), vec![PAGE_SIZE - 10, PAGE_SIZE - 20, PAGE_SIZE - 30]);
        assert_eq!(page.upper() as usize, PAGE_SIZE - 30);

        // Slot directory starts right after the header
        let bytes = page.as_bytes();
        let slots: Vec<usize> = (0..3)
            .map(|i| {
                let at = SLOT_AREA_START + i * SLOT_SIZE;
                u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize
            })
            .collect();
        assert_eq!(slots, cell_offsets(&page));
    }

    #[test]
    fn test_free_space_invariant() {
        let mut page = create_test_page(PageKind::Leaf);
        let cell = [7u8; 100];
        let mut inserted = 0;
        while page.insert_cell(inserted, &cell).is_ok() {
            inserted += 1;
            let header_and_slots = SLOT_AREA_START + page.items_count() as usize * SLOT_SIZE;
            assert!(header_and_slots + (PAGE_SIZE - page.upper() as usize) <= PAGE_SIZE);
        }
        assert_eq!(inserted, SLOT_AREA_CAPACITY / 102);
        assert!(page.free_space() < 102);
    }

    #[test]
    fn test_insert_cell_page_full() {
        let mut page = create_test_page(PageKind::Leaf);
        let big = vec![1u8; SLOT_AREA_CAPACITY - SLOT_SIZE];
        page.insert_cell(0, &big).unwrap();
        assert_eq!(page.free_space(), 0);
        assert!(matches!(page.insert_cell(1, b"x"), Err(ArborError::PageFull)));
    }

    #[test]
    fn test_insert_cell_index_out_of_range() {
        let mut page = create_test_page(PageKind::Leaf);
        assert!(matches!(
            page.insert_cell(1, b"x"),
            Err(ArborError::Internal(_))
        ));
    }

    #[test]
    fn test_remove_cell_compacts() {
        let mut page = create_test_page(PageKind::Leaf);
        page.insert_cell(0, b"first").unwrap();
        page.insert_cell(1, b"second").unwrap();
        page.insert_cell(2, b"third").unwrap();

        page.remove_cell(0, 5).unwrap();

        assert_eq!(page.items_count(), 2);
        assert_eq!(&page.cell(0).unwrap()[..6], b"second");
        assert_eq!(&page.cell(1).unwrap()[..5], b"third");
        assert_eq!(page.upper() as usize, PAGE_SIZE - 11);
        assert_eq!(page.used_bytes(), 11 + 2 * SLOT_SIZE);

        let offsets = cell_offsets(&page);
        assert!(offsets.iter().all(|&off| off >= page.upper() as usize));
        // Vacated bytes are cleared
        assert!(page.as_bytes()[SLOT_AREA_START + 4..page.upper() as usize]
            .iter()
            .all(|&b| b == 0));
    }

    #[test]
    fn test_remove_then_insert_reuses_space() {
        let mut page = create_test_page(PageKind::Leaf);
        for i in 0..10u8 {
            page.insert_cell(i as usize, &[i; 50]).unwrap();
        }
        let before = page.free_space();
        page.remove_cell(4, 50).unwrap();
        assert_eq!(page.free_space(), before + 52);
        page.insert_cell(4, &[4; 50]).unwrap();
        assert_eq!(page.free_space(), before);

        for i in 0..10u8 {
            assert_eq!(&page.cell(i as usize).unwrap()[..50], &[i; 50]);
        }
    }

    #[test]
    fn test_replace_cells() {
        let mut page = create_test_page(PageKind::Leaf);
        page.insert_cell(0, b"old").unwrap();

        let cells: Vec<Vec<u8>> = vec![b"x1".to_vec(), b"y22".to_vec(), b"z333".to_vec()];
        page.replace_cells(&cells).unwrap();

        assert_eq!(page.items_count(), 3);
        assert_eq!(&page.cell(0).unwrap()[..2], b"x1");
        assert_eq!(&page.cell(2).unwrap()[..4], b"z333");
        assert_eq!(page.upper() as usize, PAGE_SIZE - 9);
    }

    #[test]
    fn test_replace_cells_too_large() {
        let mut page = create_test_page(PageKind::Leaf);
        let cells = vec![vec![0u8; 3000]; 3];
        assert!(matches!(page.replace_cells(&cells), Err(ArborError::PageFull)));
        assert_eq!(page.items_count(), 0);
    }

    #[test]
    fn test_header_setters() {
        let mut page = create_test_page(PageKind::Root);
        page.set_parent(PageId::new(5));
        page.set_left_sibling(PageId::new(6));
        page.set_right_sibling(PageId::new(7));
        page.set_right_child(PageId::new(8));
        page.set_kind(PageKind::Intermediate);

        let header = page.header().unwrap();
        assert_eq!(header.parent_pid, PageId::new(5));
        assert_eq!(header.left_sibling_pid, PageId::new(6));
        assert_eq!(header.right_sibling_pid, PageId::new(7));
        assert_eq!(header.right_child_pid, PageId::new(8));
        assert_eq!(header.kind(), Some(PageKind::Intermediate));
        assert!(!page.is_root());
    }

    #[test]
    fn test_seal_fill_factor_and_crc() {
        let mut page = create_test_page(PageKind::Leaf);
        page.insert_cell(0, &vec![3u8; SLOT_AREA_CAPACITY / 2 - SLOT_SIZE]).unwrap();
        page.seal(true);

        assert_eq!(page.fill_factor(), 50);
        assert_eq!(page.crc(), page.compute_crc());
        assert!(page.validate(PageId::new(1), true).is_ok());

        page.seal(false);
        assert_eq!(page.crc(), 0);
    }

    #[test]
    fn test_validate_rejects_bad_pages() {
        let mut page = create_test_page(PageKind::Leaf);
        assert!(page.validate(PageId::new(2), false).is_err());

        // Corrupt a cell byte after sealing
        page.insert_cell(0, b"data").unwrap();
        page.seal(true);
        page.buf[PAGE_SIZE - 1] ^= 0xFF;
        let err = page.validate(PageId::new(1), true).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
        assert!(page.validate(PageId::new(1), false).is_ok());

        let mut page = create_test_page(PageKind::Leaf);
        page.put_u16(PageHeader::VERSION_OFFSET, 2);
        assert!(page.validate(PageId::new(1), false).is_err());

        let mut page = create_test_page(PageKind::Leaf);
        page.put_u16(PageHeader::INFO_OFFSET, 0x2);
        assert!(matches!(
            page.validate(PageId::new(1), false),
            Err(ArborError::InvalidNodeType { code: 0x2, .. })
        ));

        let mut page = create_test_page(PageKind::Leaf);
        page.put_u16(PageHeader::INFO_OFFSET, 0x13);
        assert!(page.validate(PageId::new(1), false).is_err());

        let mut page = create_test_page(PageKind::Leaf);
        page.put_u16(PageHeader::ITEMS_COUNT_OFFSET, 5000);
        assert!(page.validate(PageId::new(1), false).is_err());
    }

    #[test]
    fn test_slot_offset_checks() {
        let mut page = create_test_page(PageKind::Leaf);
        page.insert_cell(0, b"abc").unwrap();
        assert!(page.slot_offset(1).is_err());

        page.put_u16(SLOT_AREA_START, 100);
        assert!(page.slot_offset(0).is_err());
    }

    #[test]
    fn test_cell_mut_edits_in_place() {
        let mut page = create_test_page(PageKind::Intermediate);
        page.insert_cell(0, &[1, 2, 3, 4]).unwrap();
        page.cell_mut(0).unwrap()[..4].copy_from_slice(&[9, 9, 9, 9]);
        assert_eq!(&page.cell(0).unwrap()[..4], &[9, 9, 9, 9]);
        assert_eq!(page.items_count(), 1);
    }

    #[test]
    fn test_works_over_borrowed_buffers() {
        let mut raw = [0u8; PAGE_SIZE];
        {
            let mut page = SlottedPage::new(&mut raw[..]).unwrap();
            page.init(PageId::new(3), PageKind::Leaf);
            page.insert_cell(0, b"hello").unwrap();
        }
        let page = SlottedPage::new(&raw[..]).unwrap();
        assert_eq!(page.pid(), PageId::new(3));
        assert_eq!(&page.cell(0).unwrap()[..5], b"hello");
    }
}
