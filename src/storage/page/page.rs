//! Page - the fundamental unit of storage.
//!
//! A [`Page`] is a raw byte buffer that serves as the unit of I/O between
//! disk and memory. Pages are stored in `Frame`s within the buffer pool.
//! Unlike a fixed 4 KiB compile-time buffer, a `Page`'s size is set once per
//! database at creation time (`DatabaseOptions::page_size`, spec §6) and is
//! immutable thereafter, so the buffer is heap-allocated at that size rather
//! than a `[u8; N]` array.

use super::page_header::PageHeader;

/// A page of data, `page_size` bytes.
///
/// This is the fundamental unit of I/O between disk and memory. The buffer
/// pool manages these in frames.
///
/// # Clone
/// `Page` does not implement `Clone` in non-test code to match production
/// database behavior: copying a page is expensive and should be explicit.
/// A `#[cfg(test)]` `Clone` is provided for tests.
///
/// # Example
/// ```
/// use sundial::storage::page::Page;
///
/// let mut page = Page::new(4096);
/// page.as_mut_slice()[0] = 0xFF;
/// assert_eq!(page.as_slice()[0], 0xFF);
/// ```
pub struct Page {
    data: Box<[u8]>,
}

impl Page {
    /// Create a new zeroed page of the given size.
    ///
    /// # Panics
    /// Panics if `page_size` is 0.
    #[inline]
    pub fn new(page_size: usize) -> Self {
        assert!(page_size > 0, "page_size must be > 0");
        Self {
            data: vec![0u8; page_size].into_boxed_slice(),
        }
    }

    /// Get immutable slice of page data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable slice of page data.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the entire page.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Size of this page in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Usable payload bytes after the fixed-size [`PageHeader`] prefix.
    #[inline]
    pub fn payload_capacity(&self) -> usize {
        self.data.len() - PageHeader::SIZE
    }

    /// Immutable view of the payload area (after the header).
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[PageHeader::SIZE..]
    }

    /// Mutable view of the payload area (after the header).
    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data[PageHeader::SIZE..]
    }

    /// Read the page header.
    pub fn header(&self) -> PageHeader {
        PageHeader::from_bytes(&self.data)
    }

    /// Write a page header.
    pub fn set_header(&mut self, header: &PageHeader) {
        header.write_to(&mut self.data);
    }

    /// Compute and store checksum in the header.
    ///
    /// Call this after all modifications to the page are complete.
    pub fn update_checksum(&mut self) {
        let checksum = PageHeader::compute_checksum(&self.data);
        let checksum_bytes = checksum.to_le_bytes();
        self.data[PageHeader::OFFSET_CHECKSUM..PageHeader::OFFSET_CHECKSUM + 4]
            .copy_from_slice(&checksum_bytes);
    }

    /// Verify the page checksum is valid.
    pub fn verify_checksum(&self) -> bool {
        self.header().verify_checksum(&self.data)
    }
}

// Clone only available in tests - forces explicit copying in production.
#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size() {
        let page = Page::new(4096);
        assert_eq!(page.size(), 4096);
        assert_eq!(page.payload_capacity(), 4096 - PageHeader::SIZE);
    }

    #[test]
    fn test_page_new_is_zeroed() {
        let page = Page::new(4096);
        assert_eq!(page.as_slice()[0], 0);
        assert_eq!(page.as_slice()[4095], 0);
    }

    #[test]
    fn test_page_read_write() {
        let mut page = Page::new(4096);

        page.as_mut_slice()[0] = 0xFF;
        page.as_mut_slice()[100] = 0xAB;
        page.as_mut_slice()[4095] = 0xCD;

        assert_eq!(page.as_slice()[0], 0xFF);
        assert_eq!(page.as_slice()[100], 0xAB);
        assert_eq!(page.as_slice()[4095], 0xCD);
    }

    #[test]
    fn test_page_reset() {
        let mut page = Page::new(4096);
        page.as_mut_slice()[0] = 0xFF;
        page.as_mut_slice()[100] = 0xAB;

        page.reset();

        assert_eq!(page.as_slice()[0], 0);
        assert_eq!(page.as_slice()[100], 0);
    }

    #[test]
    fn test_page_clone_in_tests() {
        let mut page = Page::new(4096);
        page.as_mut_slice()[0] = 0xAB;

        let cloned = page.clone();
        assert_eq!(cloned.as_slice()[0], 0xAB);
        assert_eq!(page.as_slice()[0], 0xAB);
    }

    #[test]
    #[should_panic(expected = "page_size must be > 0")]
    fn test_page_zero_size_panics() {
        Page::new(0);
    }
}
