//! Page header and type definitions.
//!
//! Every page starts with a [`PageHeader`] containing metadata:
//! - [`PageType`] discriminator
//! - CRC32 checksum for integrity
//! - LSN for WAL/recovery
//! - item count / free-byte bookkeeping for the page's own payload
//! - forward/back sibling links for chained pages (B-tree leaves, free list)

use crate::common::PageId;

/// Type of page stored on disk.
///
/// Uses `#[repr(u8)]` to guarantee a 1-byte representation for serialization.
/// Matches the page taxonomy of the on-disk format: every page is exactly one
/// of these seven kinds.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Unallocated or freed page; payload is meaningless.
    #[default]
    Empty = 0,
    /// The database header page (always page 1).
    Header = 1,
    /// The collection/index catalog page.
    Catalog = 2,
    /// A page holding one encoded document.
    Data = 3,
    /// A B-tree node (leaf or internal; distinguished by the node's own
    /// payload, see `crate::index::btree::node`).
    Index = 4,
    /// A page belonging to the in-main-file journal anchor.
    Journal = 5,
    /// An overflow/extension page chained from another page.
    Extension = 6,
}

impl PageType {
    /// Convert from u8, returning `Empty` for unknown values.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PageType::Header,
            2 => PageType::Catalog,
            3 => PageType::Data,
            4 => PageType::Index,
            5 => PageType::Journal,
            6 => PageType::Extension,
            _ => PageType::Empty,
        }
    }
}

/// Metadata stored at the beginning of every page.
///
/// # Layout (29 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       1     page_type (PageType as u8)
/// 1       4     checksum (CRC32, little-endian; excluded from its own computation)
/// 5       8     lsn (Log Sequence Number, little-endian)
/// 13      4     page_id (little-endian)
/// 17      2     item_count (little-endian)
/// 19      2     free_bytes (little-endian)
/// 21      4     prev_page_id (little-endian, PageId::INVALID if none)
/// 25      4     next_page_id (little-endian, PageId::INVALID if none)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Type of this page.
    pub page_type: PageType,
    /// CRC32 checksum of the page contents.
    pub checksum: u32,
    /// Log Sequence Number of last modification.
    pub lsn: u64,
    /// This page's own id (redundant with its file offset; used to detect
    /// torn/misplaced writes).
    pub page_id: PageId,
    /// Number of live items stored in the payload (document count for a
    /// Data page is always 0 or 1 under the one-document-per-page model;
    /// entry count for an Index page).
    pub item_count: u16,
    /// Free bytes remaining in the payload after `item_count` items.
    pub free_bytes: u16,
    /// Previous page in a chain (free list, B-tree leaf list), if any.
    pub prev_page_id: PageId,
    /// Next page in a chain, if any.
    pub next_page_id: PageId,
}

impl Default for PageHeader {
    fn default() -> Self {
        Self {
            page_type: PageType::default(),
            checksum: 0,
            lsn: 0,
            page_id: PageId::INVALID,
            item_count: 0,
            free_bytes: 0,
            prev_page_id: PageId::INVALID,
            next_page_id: PageId::INVALID,
        }
    }
}

impl PageHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 29;

    pub const OFFSET_PAGE_TYPE: usize = 0;
    pub const OFFSET_CHECKSUM: usize = 1;
    pub const OFFSET_LSN: usize = 5;
    pub const OFFSET_PAGE_ID: usize = 13;
    pub const OFFSET_ITEM_COUNT: usize = 17;
    pub const OFFSET_FREE_BYTES: usize = 19;
    pub const OFFSET_PREV_PAGE_ID: usize = 21;
    pub const OFFSET_NEXT_PAGE_ID: usize = 25;

    /// Create a new header with the given page type and id.
    ///
    /// Checksum, LSN, and item bookkeeping start at zero; siblings start
    /// unset.
    pub fn new(page_type: PageType, page_id: PageId) -> Self {
        Self {
            page_type,
            page_id,
            ..Default::default()
        }
    }

    /// Read a header from the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        let page_type = PageType::from_u8(data[Self::OFFSET_PAGE_TYPE]);
        let checksum = read_u32(data, Self::OFFSET_CHECKSUM);
        let lsn = read_u64(data, Self::OFFSET_LSN);
        let page_id = PageId::new(read_u32(data, Self::OFFSET_PAGE_ID));
        let item_count = read_u16(data, Self::OFFSET_ITEM_COUNT);
        let free_bytes = read_u16(data, Self::OFFSET_FREE_BYTES);
        let prev_page_id = PageId::new(read_u32(data, Self::OFFSET_PREV_PAGE_ID));
        let next_page_id = PageId::new(read_u32(data, Self::OFFSET_NEXT_PAGE_ID));

        Self {
            page_type,
            checksum,
            lsn,
            page_id,
            item_count,
            free_bytes,
            prev_page_id,
            next_page_id,
        }
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        data[Self::OFFSET_PAGE_TYPE] = self.page_type as u8;
        data[Self::OFFSET_CHECKSUM..Self::OFFSET_CHECKSUM + 4]
            .copy_from_slice(&self.checksum.to_le_bytes());
        data[Self::OFFSET_LSN..Self::OFFSET_LSN + 8].copy_from_slice(&self.lsn.to_le_bytes());
        data[Self::OFFSET_PAGE_ID..Self::OFFSET_PAGE_ID + 4]
            .copy_from_slice(&self.page_id.0.to_le_bytes());
        data[Self::OFFSET_ITEM_COUNT..Self::OFFSET_ITEM_COUNT + 2]
            .copy_from_slice(&self.item_count.to_le_bytes());
        data[Self::OFFSET_FREE_BYTES..Self::OFFSET_FREE_BYTES + 2]
            .copy_from_slice(&self.free_bytes.to_le_bytes());
        data[Self::OFFSET_PREV_PAGE_ID..Self::OFFSET_PREV_PAGE_ID + 4]
            .copy_from_slice(&self.prev_page_id.0.to_le_bytes());
        data[Self::OFFSET_NEXT_PAGE_ID..Self::OFFSET_NEXT_PAGE_ID + 4]
            .copy_from_slice(&self.next_page_id.0.to_le_bytes());
    }

    /// Compute CRC32 checksum of a page.
    ///
    /// The checksum is computed with the checksum field (bytes 1-4) zeroed
    /// out, so the checksum doesn't include itself.
    pub fn compute_checksum(page_data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&page_data[..Self::OFFSET_CHECKSUM]);
        hasher.update(&[0u8; 4]);
        hasher.update(&page_data[Self::OFFSET_CHECKSUM + 4..]);
        hasher.finalize()
    }

    /// Verify that the stored checksum matches the computed checksum.
    pub fn verify_checksum(&self, page_data: &[u8]) -> bool {
        self.checksum == Self::compute_checksum(page_data)
    }
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_type_from_u8() {
        assert_eq!(PageType::from_u8(0), PageType::Empty);
        assert_eq!(PageType::from_u8(1), PageType::Header);
        assert_eq!(PageType::from_u8(2), PageType::Catalog);
        assert_eq!(PageType::from_u8(3), PageType::Data);
        assert_eq!(PageType::from_u8(4), PageType::Index);
        assert_eq!(PageType::from_u8(5), PageType::Journal);
        assert_eq!(PageType::from_u8(6), PageType::Extension);
        assert_eq!(PageType::from_u8(255), PageType::Empty);
    }

    #[test]
    fn test_page_type_default() {
        assert_eq!(PageType::default(), PageType::Empty);
    }

    #[test]
    fn test_page_header_new() {
        let header = PageHeader::new(PageType::Data, PageId::new(7));
        assert_eq!(header.page_type, PageType::Data);
        assert_eq!(header.page_id, PageId::new(7));
        assert_eq!(header.checksum, 0);
        assert_eq!(header.lsn, 0);
        assert!(!header.prev_page_id.is_valid());
        assert!(!header.next_page_id.is_valid());
    }

    #[test]
    fn test_page_header_roundtrip() {
        let original = PageHeader {
            page_type: PageType::Index,
            checksum: 0xDEADBEEF,
            lsn: 0x123456789ABCDEF0,
            page_id: PageId::new(9),
            item_count: 12,
            free_bytes: 200,
            prev_page_id: PageId::new(3),
            next_page_id: PageId::new(11),
        };

        let mut buffer = [0u8; PageHeader::SIZE];
        original.write_to(&mut buffer);

        let recovered = PageHeader::from_bytes(&buffer);
        assert_eq!(original, recovered);
    }

    #[test]
    fn test_page_header_byte_layout() {
        let header = PageHeader {
            page_type: PageType::Data,
            checksum: 0x04030201,
            lsn: 0x0807060504030201,
            page_id: PageId::new(1),
            item_count: 0,
            free_bytes: 0,
            prev_page_id: PageId::INVALID,
            next_page_id: PageId::INVALID,
        };

        let mut buffer = [0u8; PageHeader::SIZE];
        header.write_to(&mut buffer);

        assert_eq!(buffer[0], 3); // PageType::Data
        assert_eq!(buffer[1], 0x01); // checksum byte 0 (LSB)
        assert_eq!(buffer[4], 0x04); // checksum byte 3 (MSB)
        assert_eq!(buffer[5], 0x01); // lsn byte 0 (LSB)
        assert_eq!(buffer[12], 0x08); // lsn byte 7 (MSB)
    }

    #[test]
    fn test_checksum_deterministic() {
        let mut page_data = [0u8; 4096];
        page_data[100] = 0xAB;
        page_data[1000] = 0xCD;

        let checksum1 = PageHeader::compute_checksum(&page_data);
        let checksum2 = PageHeader::compute_checksum(&page_data);

        assert_eq!(checksum1, checksum2);
        assert_ne!(checksum1, 0);
    }

    #[test]
    fn test_checksum_ignores_checksum_field() {
        let mut page_data = [0u8; 4096];
        page_data[100] = 0xAB;

        let checksum1 = PageHeader::compute_checksum(&page_data);
        page_data[1] = 0xFF;
        page_data[2] = 0xFF;
        page_data[3] = 0xFF;
        page_data[4] = 0xFF;
        let checksum2 = PageHeader::compute_checksum(&page_data);

        assert_eq!(checksum1, checksum2);
    }

    #[test]
    fn test_checksum_verify() {
        let mut page_data = [0u8; 4096];
        page_data[100] = 0xAB;

        let checksum = PageHeader::compute_checksum(&page_data);
        let header = PageHeader {
            checksum,
            ..PageHeader::new(PageType::Data, PageId::new(0))
        };

        assert!(header.verify_checksum(&page_data));
        page_data[100] = 0xFF;
        assert!(!header.verify_checksum(&page_data));
    }
}
