//! Disk Manager - low-level file I/O for database pages.
//!
//! The [`DiskManager`] handles all direct file operations:
//! - Reading and writing pages
//! - Allocating new pages
//! - Managing the database file

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;

/// Manages disk I/O for a single database file.
///
/// # File Layout
/// The database is stored as a single file with pages laid out sequentially:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Page 0  │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │(page_sz)│(page_sz)│(page_sz)│         │(page_sz)│
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0    page_sz   2×page_sz  ...    N×page_sz
/// ```
///
/// Page N is located at file offset `N × page_size`. `page_size` is fixed
/// for the lifetime of the file and is read back from the header page
/// (page 0) by the caller on open; `DiskManager` itself takes it as a
/// constructor argument and never infers it.
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. The `BufferPoolManager` is responsible
/// for serializing access to the disk manager.
///
/// # Durability
/// All writes are followed by `fsync()` to ensure durability. This is
/// conservative; the journal's own checkpoint/sync policy (spec §5) governs
/// how often the hot path actually calls down into this layer.
pub struct DiskManager {
    file: File,
    page_size: u32,
    /// Number of pages in the file.
    page_count: u32,
}

impl DiskManager {
    /// Create a new database file sized for `page_size`-byte pages.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, page_size: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            page_size,
            page_count: 0,
        })
    }

    /// Open an existing database file whose pages are `page_size` bytes.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist, cannot be opened, or its
    /// size is not an exact multiple of `page_size`.
    pub fn open<P: AsRef<Path>>(path: P, page_size: u32) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let metadata = file.metadata()?;
        let file_size = metadata.len();
        if file_size % (page_size as u64) != 0 {
            return Err(Error::corrupt(format!(
                "file size {file_size} is not a multiple of page size {page_size}"
            )));
        }
        let page_count = (file_size / page_size as u64) as u32;

        Ok(Self {
            file,
            page_size,
            page_count,
        })
    }

    /// Open an existing database file, or create if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P, page_size: u32) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, page_size)
        } else {
            Self::create(path, page_size)
        }
    }

    /// Read a page from disk.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the page doesn't exist.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        if page_id.0 >= self.page_count {
            return Err(Error::not_found(format!("page {}", page_id.0)));
        }

        let offset = (page_id.0 as u64) * (self.page_size as u64);
        self.file.seek(SeekFrom::Start(offset))?;

        let mut page = Page::new(self.page_size as usize);
        self.file.read_exact(page.as_mut_slice())?;

        Ok(page)
    }

    /// Write a page to disk.
    ///
    /// The page must have been previously allocated with `allocate_page()`.
    ///
    /// # Durability
    /// This method calls `fsync()` after writing to ensure the data is
    /// persisted to disk.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the page hasn't been allocated.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        if page_id.0 >= self.page_count {
            return Err(Error::not_found(format!("page {}", page_id.0)));
        }

        let offset = (page_id.0 as u64) * (self.page_size as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.as_slice())?;
        self.file.sync_all()?;

        Ok(())
    }

    /// Allocate a new page on disk.
    ///
    /// Returns the `PageId` of the newly allocated page. The page is
    /// initialized with zeros.
    ///
    /// # Durability
    /// This method extends the file and calls `fsync()` to ensure the
    /// allocation is durable.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        let page_id = PageId::new(self.page_count);

        let offset = (page_id.0 as u64) * (self.page_size as u64);
        self.file.seek(SeekFrom::Start(offset))?;

        let zeros = vec![0u8; self.page_size as usize];
        self.file.write_all(&zeros)?;
        self.file.sync_all()?;

        self.page_count += 1;
        Ok(page_id)
    }

    /// Page size this disk manager was opened or created with.
    #[inline]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Get the number of pages in the database.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Get the total size of the database file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.page_count as u64) * (self.page_size as u64)
    }
}
