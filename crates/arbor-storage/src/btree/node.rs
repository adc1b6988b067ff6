//! Typed operations on a single tree page.
//!
//! A leaf cell is `key ‖ value`; an intermediate cell is `key ‖ child pid`.
//! Slot `i` of an intermediate page routes keys below `key_i` (and at or above
//! `key_{i-1}`) to its child; keys at or above the last separator go to the
//! page's right child. Child positions run `0..=items`, with position `items`
//! naming the right child.

use super::codec::{KeyCodec, PageCodec};
use super::constants::{
    CHILD_PID_SIZE, MIN_INTERNAL_SPLIT_ITEMS, MIN_LEAF_SPLIT_ITEMS, SLOT_AREA_CAPACITY, SLOT_SIZE,
};
use super::page::SlottedPage;
use arbor_common::page::{PageId, PageKind};
use arbor_common::{ArborError, Result};
use std::cmp::Ordering;

/// Encodes a leaf cell.
pub(crate) fn encode_leaf_cell<K: PageCodec, V: PageCodec>(key: &K, value: &V) -> Result<Vec<u8>> {
    let key_len = key.serialized_size();
    let mut cell = vec![0u8; key_len + value.serialized_size()];
    key.serialize(&mut cell)?;
    value.serialize(&mut cell[key_len..])?;
    Ok(cell)
}

/// Encodes an intermediate cell.
pub(crate) fn encode_internal_cell<K: PageCodec>(key: &K, child: PageId) -> Result<Vec<u8>> {
    let key_len = key.serialized_size();
    let mut cell = vec![0u8; key_len + CHILD_PID_SIZE];
    key.serialize(&mut cell)?;
    child.serialize(&mut cell[key_len..])?;
    Ok(cell)
}

/// Length of the leaf cell at the start of `src`.
pub(crate) fn leaf_cell_len<K: PageCodec, V: PageCodec>(src: &[u8]) -> Result<usize> {
    let key_len = K::encoded_len(src)?;
    Ok(key_len + V::encoded_len(&src[key_len..])?)
}

/// Length of the intermediate cell at the start of `src`.
pub(crate) fn internal_cell_len<K: PageCodec>(src: &[u8]) -> Result<usize> {
    let key_len = K::encoded_len(src)?;
    Ok(key_len + PageId::encoded_len(&src[key_len..])?)
}

/// Reads the child pid of an encoded intermediate cell.
pub(crate) fn cell_child<K: PageCodec>(cell: &[u8]) -> Result<PageId> {
    let key_len = K::encoded_len(cell)?;
    PageId::deserialize(&cell[key_len..])
}

/// Rewrites the child pid of an encoded intermediate cell.
pub(crate) fn set_cell_child<K: PageCodec>(cell: &mut [u8], child: PageId) -> Result<()> {
    let key_len = K::encoded_len(cell)?;
    child.serialize(&mut cell[key_len..])
}

/// Decodes the key of slot `idx`. Both cell formats start with the key.
pub(crate) fn key_at<K: PageCodec, B: AsRef<[u8]>>(page: &SlottedPage<B>, idx: usize) -> Result<K> {
    K::deserialize(page.cell(idx)?)
}

/// Binary search over the slot directory.
///
/// Returns `Ok(idx)` on an exact match, otherwise `Err(idx)` with the lowest
/// index whose key is greater than `key`.
pub(crate) fn search<K: KeyCodec, B: AsRef<[u8]>>(
    page: &SlottedPage<B>,
    key: &K,
) -> Result<std::result::Result<usize, usize>> {
    let mut low = 0usize;
    let mut high = page.items_count() as usize;

    while low < high {
        let mid = low + (high - low) / 2;
        match key_at::<K, B>(page, mid)?.cmp(key) {
            Ordering::Less => low = mid + 1,
            Ordering::Equal => return Ok(Ok(mid)),
            Ordering::Greater => high = mid,
        }
    }
    Ok(Err(low))
}

/// Returns the child pid at position `pos` (`items` = right child).
pub(crate) fn child_at<K: PageCodec, B: AsRef<[u8]>>(
    page: &SlottedPage<B>,
    pos: usize,
) -> Result<PageId> {
    if pos == page.items_count() as usize {
        return Ok(page.right_child());
    }
    cell_child::<K>(page.cell(pos)?)
}

/// Points position `pos` (`items` = right child) at `child`.
pub(crate) fn set_child_at<K: PageCodec, B: AsRef<[u8]> + AsMut<[u8]>>(
    page: &mut SlottedPage<B>,
    pos: usize,
    child: PageId,
) -> Result<()> {
    if pos == page.items_count() as usize {
        page.set_right_child(child);
        return Ok(());
    }
    set_cell_child::<K>(page.cell_mut(pos)?, child)
}

/// Picks the child of an intermediate page that covers `key`.
///
/// Keys equal to a separator live to its right. Returns the child position and
/// its pid.
pub(crate) fn route<K: KeyCodec, B: AsRef<[u8]>>(
    page: &SlottedPage<B>,
    key: &K,
) -> Result<(usize, PageId)> {
    let pos = match search(page, key)? {
        Ok(idx) => idx + 1,
        Err(idx) => idx,
    };
    let child = child_at::<K, B>(page, pos)?;
    if !child.is_valid() {
        return Err(ArborError::BTreeCorrupted(format!(
            "page {} routes position {pos} to an invalid child",
            page.pid()
        )));
    }
    Ok((pos, child))
}

/// Decodes the value stored in leaf slot `idx`.
pub(crate) fn leaf_value_at<K: PageCodec, V: PageCodec, B: AsRef<[u8]>>(
    page: &SlottedPage<B>,
    idx: usize,
) -> Result<V> {
    let cell = page.cell(idx)?;
    let key_len = K::encoded_len(cell)?;
    V::deserialize(&cell[key_len..])
}

/// Decodes the entry stored in leaf slot `idx`.
pub(crate) fn leaf_entry_at<K: PageCodec, V: PageCodec, B: AsRef<[u8]>>(
    page: &SlottedPage<B>,
    idx: usize,
) -> Result<(K, V)> {
    let cell = page.cell(idx)?;
    let key_len = K::encoded_len(cell)?;
    Ok((K::deserialize(cell)?, V::deserialize(&cell[key_len..])?))
}

/// Copies out every cell of the page in slot order.
pub(crate) fn raw_cells<B: AsRef<[u8]>>(
    page: &SlottedPage<B>,
    cell_len: impl Fn(&[u8]) -> Result<usize>,
) -> Result<Vec<Vec<u8>>> {
    (0..page.items_count() as usize)
        .map(|idx| {
            let cell = page.cell(idx)?;
            Ok(cell[..cell_len(cell)?].to_vec())
        })
        .collect()
}

/// Returns every child pid of an intermediate page, right child last.
pub(crate) fn children<K: PageCodec, B: AsRef<[u8]>>(page: &SlottedPage<B>) -> Result<Vec<PageId>> {
    (0..=page.items_count() as usize)
        .map(|pos| child_at::<K, B>(page, pos))
        .collect()
}

/// Decides whether adding a `cell_len`-byte cell requires splitting the page.
///
/// A split is required when the page would exceed `max_fill` of the slot area
/// or when the cell simply does not fit, provided the resulting entries can be
/// partitioned into two non-empty pages.
pub(crate) fn needs_split<B: AsRef<[u8]>>(
    page: &SlottedPage<B>,
    kind: PageKind,
    cell_len: usize,
    max_fill: f64,
) -> bool {
    let min_items = if kind.is_leaf() {
        MIN_LEAF_SPLIT_ITEMS
    } else {
        MIN_INTERNAL_SPLIT_ITEMS
    };
    if page.items_count() as usize + 1 < min_items {
        return false;
    }
    let after = page.used_bytes() + SLOT_SIZE + cell_len;
    after as f64 / SLOT_AREA_CAPACITY as f64 > max_fill || SLOT_SIZE + cell_len > page.free_space()
}

/// Slot-area bytes that `cells` would occupy on a page.
pub(crate) fn footprint<C: AsRef<[u8]>>(cells: &[C]) -> usize {
    cells.iter().map(|c| c.as_ref().len() + SLOT_SIZE).sum()
}

/// Splits a sorted run of cells at the byte median.
///
/// Returns the index of the first cell of the upper part, clamped so that at
/// least `min_left` cells stay below it and `min_right` cells start at it.
pub(crate) fn byte_median<C: AsRef<[u8]>>(cells: &[C], min_left: usize, min_right: usize) -> usize {
    let half = footprint(cells) / 2;
    let mut acc = 0usize;
    let mut mid = cells.len();
    for (idx, cell) in cells.iter().enumerate() {
        if acc >= half {
            mid = idx;
            break;
        }
        acc += cell.as_ref().len() + SLOT_SIZE;
    }
    mid.min(cells.len().saturating_sub(min_right)).max(min_left)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_common::page::PAGE_SIZE;

    fn create_leaf(entries: &[(u32, &str)]) -> SlottedPage<Vec<u8>> {
        let mut page = SlottedPage::new(vec![0u8; PAGE_SIZE]).unwrap();
        page.init(PageId::new(0), PageKind::Leaf);
        let cells: Vec<_> = entries
            .iter()
            .map(|(k, v)| encode_leaf_cell(k, &v.to_string()).unwrap())
            .collect();
        page.replace_cells(&cells).unwrap();
        page
    }

    fn create_internal(seps: &[(u32, u32)], right_child: u32) -> SlottedPage<Vec<u8>> {
        let mut page = SlottedPage::new(vec![0u8; PAGE_SIZE]).unwrap();
        page.init(PageId::new(0), PageKind::Root);
        let cells: Vec<_> = seps
            .iter()
            .map(|(k, c)| encode_internal_cell(k, PageId::new(*c)).unwrap())
            .collect();
        page.replace_cells(&cells).unwrap();
        page.set_right_child(PageId::new(right_child));
        page
    }

    #[test]
    fn test_leaf_cell_layout() {
        let cell = encode_leaf_cell(&7u32, &String::from("seven")).unwrap();
        assert_eq!(cell.len(), 4 + 8 + 5);
        assert_eq!(leaf_cell_len::<u32, String>(&cell).unwrap(), 17);
        assert_eq!(&cell[..4], &7u32.to_le_bytes());
    }

    #[test]
    fn test_internal_cell_layout() {
        let mut cell = encode_internal_cell(&String::from("m"), PageId::new(42)).unwrap();
        assert_eq!(cell.len(), 8 + 1 + 4);
        assert_eq!(internal_cell_len::<String>(&cell).unwrap(), 13);
        assert_eq!(cell_child::<String>(&cell).unwrap(), PageId::new(42));

        set_cell_child::<String>(&mut cell, PageId::new(9)).unwrap();
        assert_eq!(cell_child::<String>(&cell).unwrap(), PageId::new(9));
        assert_eq!(String::deserialize(&cell).unwrap(), "m");
    }

    #[test]
    fn test_search_lower_bound() {
        let page = create_leaf(&[(10, "a"), (20, "b"), (30, "c")]);
        assert_eq!(search(&page, &20u32).unwrap(), Ok(1));
        assert_eq!(search(&page, &5u32).unwrap(), Err(0));
        assert_eq!(search(&page, &25u32).unwrap(), Err(2));
        assert_eq!(search(&page, &35u32).unwrap(), Err(3));
    }

    #[test]
    fn test_search_empty_page() {
        let page = create_leaf(&[]);
        assert_eq!(search(&page, &1u32).unwrap(), Err(0));
    }

    #[test]
    fn test_leaf_entries() {
        let page = create_leaf(&[(1, "one"), (3, "three"), (5, "five")]);
        assert_eq!(
            leaf_value_at::<u32, String, _>(&page, 1).unwrap(),
            "three"
        );
        assert_eq!(
            leaf_entry_at::<u32, String, _>(&page, 2).unwrap(),
            (5, String::from("five"))
        );
    }

    #[test]
    fn test_route() {
        // child 100: < 10, child 101: [10, 20), right child 102: >= 20
        let page = create_internal(&[(10, 100), (20, 101)], 102);
        assert_eq!(route(&page, &3u32).unwrap(), (0, PageId::new(100)));
        assert_eq!(route(&page, &10u32).unwrap(), (1, PageId::new(101)));
        assert_eq!(route(&page, &15u32).unwrap(), (1, PageId::new(101)));
        assert_eq!(route(&page, &20u32).unwrap(), (2, PageId::new(102)));
        assert_eq!(route(&page, &99u32).unwrap(), (2, PageId::new(102)));
    }

    #[test]
    fn test_route_invalid_child() {
        let page = create_internal(&[(10, 100)], u32::MAX);
        assert!(matches!(
            route(&page, &50u32),
            Err(ArborError::BTreeCorrupted(_))
        ));
    }

    #[test]
    fn test_children_and_set_child() {
        let mut page = create_internal(&[(10, 100), (20, 101)], 102);
        assert_eq!(
            children::<u32, _>(&page).unwrap(),
            vec![PageId::new(100), PageId::new(101), PageId::new(102)]
        );

        set_child_at::<u32, _>(&mut page, 0, PageId::new(200)).unwrap();
        set_child_at::<u32, _>(&mut page, 2, PageId::new(202)).unwrap();
        assert_eq!(child_at::<u32, _>(&page, 0).unwrap(), PageId::new(200));
        assert_eq!(child_at::<u32, _>(&page, 1).unwrap(), PageId::new(101));
        assert_eq!(page.right_child(), PageId::new(202));
        assert_eq!(key_at::<u32, _>(&page, 0).unwrap(), 10);
    }

    #[test]
    fn test_raw_cells() {
        let page = create_leaf(&[(1, "a"), (2, "bb")]);
        let cells = raw_cells(&page, leaf_cell_len::<u32, String>).unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0], encode_leaf_cell(&1u32, &String::from("a")).unwrap());
        assert_eq!(cells[1].len(), 4 + 8 + 2);
    }

    #[test]
    fn test_needs_split() {
        let page = create_leaf(&[(1, "a")]);
        assert!(!needs_split(&page, PageKind::Leaf, 100, 0.9));

        // Crossing the fill threshold
        let mut page = create_leaf(&[]);
        page.insert_cell(0, &vec![0u8; 3000]).unwrap();
        page.insert_cell(1, &vec![0u8; 3000]).unwrap();
        assert!(needs_split(&page, PageKind::Leaf, 1500, 0.9));
        assert!(!needs_split(&page, PageKind::Leaf, 1000, 0.9));

        // An internal page needs three entries before it can split
        let mut page = create_internal(&[], 1);
        page.insert_cell(0, &vec![0u8; 2000]).unwrap();
        assert!(!needs_split(&page, PageKind::Intermediate, 2000, 0.1));
        page.insert_cell(1, &vec![0u8; 2000]).unwrap();
        assert!(needs_split(&page, PageKind::Intermediate, 2000, 0.1));
    }

    #[test]
    fn test_byte_median_equal_cells() {
        let cells = vec![vec![0u8; 10]; 6];
        assert_eq!(byte_median(&cells, 1, 1), 3);
    }

    #[test]
    fn test_byte_median_uneven_cells() {
        let cells = vec![vec![0u8; 1000], vec![0u8; 10], vec![0u8; 10], vec![0u8; 10]];
        assert_eq!(byte_median(&cells, 1, 1), 1);

        let cells = vec![vec![0u8; 10], vec![0u8; 10], vec![0u8; 10], vec![0u8; 1000]];
        // Median lands on the big cell; the clamp keeps one cell on the right.
        assert_eq!(byte_median(&cells, 1, 1), 3);
        assert_eq!(byte_median(&cells, 1, 2), 2);
    }

    #[test]
    fn test_byte_median_two_cells() {
        let cells = vec![vec![0u8; 5], vec![0u8; 500]];
        assert_eq!(byte_median(&cells, 1, 1), 1);
    }

    #[test]
    fn test_footprint() {
        let cells = vec![vec![0u8; 10], vec![0u8; 20]];
        assert_eq!(footprint(&cells), 34);
    }
}
