//! Page structures for Arbor storage.

use crate::error::{ArborError, Result};
use serde::{Deserialize, Serialize};

/// Page size in bytes (8 KB).
pub const PAGE_SIZE: usize = 8 * 1024;

/// On-page format version written into every page header.
pub const PAGE_FORMAT_VERSION: u16 = 1;

/// Filler written into the header's trailing padding field.
pub const PAGE_HEADER_PADDING: u16 = 0xEFEF;

/// Identifier for a page in the arena.
///
/// Identity is independent of where the page lives in memory. `PageId::INVALID`
/// (`0xFFFF_FFFF`) stands for "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// Sentinel meaning "no page".
    pub const INVALID: PageId = PageId(u32::MAX);

    /// Creates a new PageId.
    pub const fn new(page_num: u32) -> Self {
        Self(page_num)
    }

    /// Returns the raw page number.
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns the page number as an index into the arena.
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// Returns true unless this is the INVALID sentinel.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.0 != u32::MAX
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "invalid")
        }
    }
}

/// Node kind stored in the low two bits of the header's info field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum PageKind {
    /// Internal root of a tree taller than one level.
    Root = 0x0,
    /// Internal node below the root.
    Intermediate = 0x1,
    /// Leaf node (a single-page tree's root is also a leaf).
    Leaf = 0x3,
}

impl PageKind {
    /// Returns the 2-bit on-page code.
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Decodes a 2-bit kind code. 0x2 is not a valid code.
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0 => Some(Self::Root),
            0x1 => Some(Self::Intermediate),
            0x3 => Some(Self::Leaf),
            _ => None,
        }
    }

    /// Returns true for leaf pages.
    #[inline]
    pub const fn is_leaf(self) -> bool {
        matches!(self, Self::Leaf)
    }

    /// Returns true for pages that route to children (Root or Intermediate).
    #[inline]
    pub const fn is_internal(self) -> bool {
        !self.is_leaf()
    }
}

/// The header's 16-bit info field.
///
/// - bits 0-1: node kind
/// - bits 2-3: lock mode (reserved, always zero)
/// - bits 4-7: compression kind (0 = none)
/// - bits 8-15: reserved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo(u16);

impl PageInfo {
    /// Mask for the node kind bits.
    pub const KIND_MASK: u16 = 0b0000_0000_0000_0011;
    /// Mask for the lock mode bits.
    pub const LOCK_MODE_MASK: u16 = 0b0000_0000_0000_1100;
    /// Mask for the compression kind bits.
    pub const COMPRESSION_MASK: u16 = 0b0000_0000_1111_0000;

    /// Creates an info field for the given node kind, all other bits clear.
    pub const fn new(kind: PageKind) -> Self {
        Self(kind.code())
    }

    /// Wraps a raw info value read from a page.
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub const fn raw(&self) -> u16 {
        self.0
    }

    /// Returns the raw kind code.
    pub const fn kind_code(&self) -> u16 {
        self.0 & Self::KIND_MASK
    }

    /// Returns the node kind, or None for the invalid code.
    pub const fn kind(&self) -> Option<PageKind> {
        PageKind::from_code(self.kind_code())
    }

    /// Replaces the node kind, keeping the other bits.
    pub fn set_kind(&mut self, kind: PageKind) {
        self.0 = (self.0 & !Self::KIND_MASK) | kind.code();
    }

    /// Returns the lock mode bits.
    pub const fn lock_mode(&self) -> u16 {
        (self.0 & Self::LOCK_MODE_MASK) >> 2
    }

    /// Returns the compression kind bits.
    pub const fn compression(&self) -> u16 {
        (self.0 & Self::COMPRESSION_MASK) >> 4
    }
}

/// Header structure at the beginning of every page.
///
/// Layout (36 bytes, little-endian):
/// - info: 2 bytes
/// - version: 2 bytes
/// - fill_factor: 2 bytes
/// - items_count: 2 bytes
/// - upper: 2 bytes
/// - parent_pid: 4 bytes
/// - left_sibling_pid: 4 bytes
/// - right_sibling_pid: 4 bytes
/// - crc: 4 bytes
/// - pid: 4 bytes
/// - right_child_pid: 4 bytes
/// - padding: 2 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageHeader {
    /// Node kind and reserved bits.
    pub info: PageInfo,
    /// Page format version.
    pub version: u16,
    /// Cached effective fill percentage.
    pub fill_factor: u16,
    /// Number of populated slots.
    pub items_count: u16,
    /// Start of the cell area (grows down from PAGE_SIZE).
    pub upper: u16,
    /// Parent page.
    pub parent_pid: PageId,
    /// Left neighbour at the same level.
    pub left_sibling_pid: PageId,
    /// Right neighbour at the same level.
    pub right_sibling_pid: PageId,
    /// CRC32 of the page with this field zeroed (0 when unused).
    pub crc: u32,
    /// This page's own identifier.
    pub pid: PageId,
    /// Child covering keys at or above the last separator.
    pub right_child_pid: PageId,
    /// Reserved.
    pub padding: u16,
}

impl PageHeader {
    /// Size of the page header in bytes.
    pub const SIZE: usize = 36;

    pub const INFO_OFFSET: usize = 0;
    pub const VERSION_OFFSET: usize = 2;
    pub const FILL_FACTOR_OFFSET: usize = 4;
    pub const ITEMS_COUNT_OFFSET: usize = 6;
    pub const UPPER_OFFSET: usize = 8;
    pub const PARENT_OFFSET: usize = 10;
    pub const LEFT_SIBLING_OFFSET: usize = 14;
    pub const RIGHT_SIBLING_OFFSET: usize = 18;
    pub const CRC_OFFSET: usize = 22;
    pub const PID_OFFSET: usize = 26;
    pub const RIGHT_CHILD_OFFSET: usize = 30;
    pub const PADDING_OFFSET: usize = 34;

    /// Creates the header of a freshly initialized, empty page.
    pub fn new(pid: PageId, kind: PageKind) -> Self {
        Self {
            info: PageInfo::new(kind),
            version: PAGE_FORMAT_VERSION,
            fill_factor: 0,
            items_count: 0,
            upper: PAGE_SIZE as u16,
            parent_pid: PageId::INVALID,
            left_sibling_pid: PageId::INVALID,
            right_sibling_pid: PageId::INVALID,
            crc: 0,
            pid,
            right_child_pid: PageId::INVALID,
            padding: PAGE_HEADER_PADDING,
        }
    }

    /// Returns the node kind, or None for an invalid code.
    pub fn kind(&self) -> Option<PageKind> {
        self.info.kind()
    }

    /// Serializes the header to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.info.raw().to_le_bytes());
        buf[2..4].copy_from_slice(&self.version.to_le_bytes());
        buf[4..6].copy_from_slice(&self.fill_factor.to_le_bytes());
        buf[6..8].copy_from_slice(&self.items_count.to_le_bytes());
        buf[8..10].copy_from_slice(&self.upper.to_le_bytes());
        buf[10..14].copy_from_slice(&self.parent_pid.0.to_le_bytes());
        buf[14..18].copy_from_slice(&self.left_sibling_pid.0.to_le_bytes());
        buf[18..22].copy_from_slice(&self.right_sibling_pid.0.to_le_bytes());
        buf[22..26].copy_from_slice(&self.crc.to_le_bytes());
        buf[26..30].copy_from_slice(&self.pid.0.to_le_bytes());
        buf[30..34].copy_from_slice(&self.right_child_pid.0.to_le_bytes());
        buf[34..36].copy_from_slice(&self.padding.to_le_bytes());
        buf
    }

    /// Deserializes the header from the first `SIZE` bytes of `buf`.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(ArborError::PageSizeMismatch {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }
        let u16_at = |off: usize| u16::from_le_bytes([buf[off], buf[off + 1]]);
        let u32_at =
            |off: usize| u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);

        Ok(Self {
            info: PageInfo::from_raw(u16_at(Self::INFO_OFFSET)),
            version: u16_at(Self::VERSION_OFFSET),
            fill_factor: u16_at(Self::FILL_FACTOR_OFFSET),
            items_count: u16_at(Self::ITEMS_COUNT_OFFSET),
            upper: u16_at(Self::UPPER_OFFSET),
            parent_pid: PageId(u32_at(Self::PARENT_OFFSET)),
            left_sibling_pid: PageId(u32_at(Self::LEFT_SIBLING_OFFSET)),
            right_sibling_pid: PageId(u32_at(Self::RIGHT_SIBLING_OFFSET)),
            crc: u32_at(Self::CRC_OFFSET),
            pid: PageId(u32_at(Self::PID_OFFSET)),
            right_child_pid: PageId(u32_at(Self::RIGHT_CHILD_OFFSET)),
            padding: u16_at(Self::PADDING_OFFSET),
        })
    }
}
