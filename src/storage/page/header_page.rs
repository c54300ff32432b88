//! The database header page (page 1).
//!
//! Unlike every other page, the header page does not start with the generic
//! [`super::PageHeader`] prefix — it defines its own 256-byte layout in full,
//! with its own magic number and its own checksum field. See spec §6.

use crate::common::{Error, PageId, Result};

/// Magic number identifying a Sundial database file: ASCII `"SDB\0"` read as
/// a little-endian u32, i.e. bytes `53 44 42 00`.
pub const MAGIC: u32 = 0x0042_4453;

/// Current on-disk format version (major, minor, patch packed as
/// `major << 16 | minor << 8 | patch`).
pub const CURRENT_VERSION: u32 = (1u32 << 16) | (0 << 8) | 0;

const OFFSET_MAGIC: usize = 0;
const OFFSET_VERSION: usize = 4;
const OFFSET_PAGE_SIZE: usize = 8;
const OFFSET_TOTAL_PAGES: usize = 12;
const OFFSET_USED_PAGES: usize = 16;
const OFFSET_FIRST_FREE_PAGE: usize = 20;
const OFFSET_CATALOG_PAGE: usize = 24;
const OFFSET_INDEX_PAGE: usize = 28;
const OFFSET_JOURNAL_PAGE: usize = 32;
const OFFSET_CREATED_AT: usize = 36;
const OFFSET_MODIFIED_AT: usize = 44;
const OFFSET_CHECKSUM: usize = 52;
const OFFSET_JOURNALING_ENABLED: usize = 56;
const OFFSET_RESERVED: usize = 57;
const RESERVED_LEN: usize = 60;
const OFFSET_DATABASE_NAME: usize = 117;
const DATABASE_NAME_LEN: usize = 64;
const OFFSET_USER_DATA: usize = 181;
const USER_DATA_LEN: usize = 64;

/// Total size of the header layout, in bytes. A database's page size is
/// always at least this large (`MIN_PAGE_SIZE == 4096`).
pub const LAYOUT_SIZE: usize = 256;

/// The database header page, decoded.
///
/// Invariant (enforced by [`HeaderPage::validate`]):
/// `used_pages <= total_pages` and `modified_at >= created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPage {
    pub version: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub used_pages: u32,
    pub first_free_page: PageId,
    pub catalog_page: PageId,
    pub index_page: PageId,
    pub journal_page: PageId,
    /// Ticks: 100ns units since the Unix epoch, matching spec §6.
    pub created_at: u64,
    pub modified_at: u64,
    pub journaling_enabled: bool,
    pub database_name: String,
    pub user_data: [u8; USER_DATA_LEN],
}

impl HeaderPage {
    /// Build a fresh header for a newly created database.
    pub fn new(page_size: u32, database_name: &str, journaling_enabled: bool, now_ticks: u64) -> Self {
        Self {
            version: CURRENT_VERSION,
            page_size,
            total_pages: 1,
            used_pages: 1,
            first_free_page: PageId::INVALID,
            catalog_page: PageId::INVALID,
            index_page: PageId::INVALID,
            journal_page: PageId::INVALID,
            created_at: now_ticks,
            modified_at: now_ticks,
            journaling_enabled,
            database_name: database_name.to_string(),
            user_data: [0u8; USER_DATA_LEN],
        }
    }

    /// Decode a header from the first [`LAYOUT_SIZE`] bytes of page 1.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < LAYOUT_SIZE {
            return Err(Error::corrupt("header page shorter than layout"));
        }

        let magic = read_u32(data, OFFSET_MAGIC);
        if magic != MAGIC {
            return Err(Error::corrupt(format!(
                "bad magic: expected {MAGIC:#010x}, found {magic:#010x}"
            )));
        }

        let version = read_u32(data, OFFSET_VERSION);
        if (version >> 16) != (CURRENT_VERSION >> 16) {
            return Err(Error::VersionUnsupported(version));
        }

        let checksum = read_u32(data, OFFSET_CHECKSUM);
        if checksum != Self::compute_checksum(data) {
            return Err(Error::corrupt("header checksum mismatch"));
        }

        let name_bytes = &data[OFFSET_DATABASE_NAME..OFFSET_DATABASE_NAME + DATABASE_NAME_LEN];
        let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let database_name = String::from_utf8_lossy(&name_bytes[..name_end]).into_owned();

        let mut user_data = [0u8; USER_DATA_LEN];
        user_data.copy_from_slice(&data[OFFSET_USER_DATA..OFFSET_USER_DATA + USER_DATA_LEN]);

        let header = Self {
            version,
            page_size: read_u32(data, OFFSET_PAGE_SIZE),
            total_pages: read_u32(data, OFFSET_TOTAL_PAGES),
            used_pages: read_u32(data, OFFSET_USED_PAGES),
            first_free_page: PageId::new(read_u32(data, OFFSET_FIRST_FREE_PAGE)),
            catalog_page: PageId::new(read_u32(data, OFFSET_CATALOG_PAGE)),
            index_page: PageId::new(read_u32(data, OFFSET_INDEX_PAGE)),
            journal_page: PageId::new(read_u32(data, OFFSET_JOURNAL_PAGE)),
            created_at: read_u64(data, OFFSET_CREATED_AT),
            modified_at: read_u64(data, OFFSET_MODIFIED_AT),
            journaling_enabled: data[OFFSET_JOURNALING_ENABLED] != 0,
            database_name,
            user_data,
        };

        header.validate()?;
        Ok(header)
    }

    /// Encode into a buffer of at least [`LAYOUT_SIZE`] bytes (the rest of
    /// the page, if larger, is left untouched by this call).
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= LAYOUT_SIZE, "buffer too small for header page");

        data[OFFSET_MAGIC..OFFSET_MAGIC + 4].copy_from_slice(&MAGIC.to_le_bytes());
        data[OFFSET_VERSION..OFFSET_VERSION + 4].copy_from_slice(&self.version.to_le_bytes());
        data[OFFSET_PAGE_SIZE..OFFSET_PAGE_SIZE + 4].copy_from_slice(&self.page_size.to_le_bytes());
        data[OFFSET_TOTAL_PAGES..OFFSET_TOTAL_PAGES + 4]
            .copy_from_slice(&self.total_pages.to_le_bytes());
        data[OFFSET_USED_PAGES..OFFSET_USED_PAGES + 4].copy_from_slice(&self.used_pages.to_le_bytes());
        data[OFFSET_FIRST_FREE_PAGE..OFFSET_FIRST_FREE_PAGE + 4]
            .copy_from_slice(&self.first_free_page.0.to_le_bytes());
        data[OFFSET_CATALOG_PAGE..OFFSET_CATALOG_PAGE + 4]
            .copy_from_slice(&self.catalog_page.0.to_le_bytes());
        data[OFFSET_INDEX_PAGE..OFFSET_INDEX_PAGE + 4].copy_from_slice(&self.index_page.0.to_le_bytes());
        data[OFFSET_JOURNAL_PAGE..OFFSET_JOURNAL_PAGE + 4]
            .copy_from_slice(&self.journal_page.0.to_le_bytes());
        data[OFFSET_CREATED_AT..OFFSET_CREATED_AT + 8].copy_from_slice(&self.created_at.to_le_bytes());
        data[OFFSET_MODIFIED_AT..OFFSET_MODIFIED_AT + 8]
            .copy_from_slice(&self.modified_at.to_le_bytes());
        data[OFFSET_JOURNALING_ENABLED] = self.journaling_enabled as u8;
        data[OFFSET_RESERVED..OFFSET_RESERVED + RESERVED_LEN].fill(0);

        let mut name_buf = [0u8; DATABASE_NAME_LEN];
        let name_bytes = self.database_name.as_bytes();
        let copy_len = name_bytes.len().min(DATABASE_NAME_LEN - 1);
        name_buf[..copy_len].copy_from_slice(&name_bytes[..copy_len]);
        data[OFFSET_DATABASE_NAME..OFFSET_DATABASE_NAME + DATABASE_NAME_LEN].copy_from_slice(&name_buf);

        data[OFFSET_USER_DATA..OFFSET_USER_DATA + USER_DATA_LEN].copy_from_slice(&self.user_data);

        // Checksum last, over everything above with the checksum field zeroed.
        let checksum = Self::compute_checksum(data);
        data[OFFSET_CHECKSUM..OFFSET_CHECKSUM + 4].copy_from_slice(&checksum.to_le_bytes());
    }

    /// CRC32 over the full [`LAYOUT_SIZE`]-byte layout with the checksum
    /// field zeroed.
    pub fn compute_checksum(data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data[..OFFSET_CHECKSUM]);
        hasher.update(&[0u8; 4]);
        hasher.update(&data[OFFSET_CHECKSUM + 4..LAYOUT_SIZE]);
        hasher.finalize()
    }

    /// Check the `used_pages <= total_pages` and `modified >= created`
    /// invariants from spec §3.
    pub fn validate(&self) -> Result<()> {
        if self.used_pages > self.total_pages {
            return Err(Error::corrupt(format!(
                "used_pages ({}) exceeds total_pages ({})",
                self.used_pages, self.total_pages
            )));
        }
        if self.modified_at < self.created_at {
            return Err(Error::corrupt("modified_at precedes created_at"));
        }
        Ok(())
    }
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
