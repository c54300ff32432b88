//! Configuration constants for Sundial.

/// Default page size in bytes (4 KiB).
///
/// The page size is fixed per-database at creation time (see
/// [`crate::config::DatabaseOptions::page_size`]) and must be a power of two
/// in `[MIN_PAGE_SIZE, MAX_PAGE_SIZE]`. 4 KiB is chosen to match:
/// - OS page size on most systems
/// - Common database page sizes
/// - Efficient alignment for direct I/O
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest page size a database may be created with.
pub const MIN_PAGE_SIZE: usize = 4096;

/// Largest page size a database may be created with.
pub const MAX_PAGE_SIZE: usize = 65536;

/// Maximum number of pages with a 32-bit [`crate::common::PageId`].
pub const MAX_PAGES: u64 = (u32::MAX as u64) + 1;

/// Default number of frames kept resident in the buffer pool.
pub const DEFAULT_CACHE_SIZE: usize = 1000;

/// Default cap on simultaneously active transactions.
pub const DEFAULT_MAX_TRANSACTIONS: usize = 64;

/// Default transaction auto-abort threshold, in milliseconds.
pub const DEFAULT_TRANSACTION_TIMEOUT_MS: u64 = 30_000;

/// Default soft cap on a transaction's operation-log length.
pub const DEFAULT_MAX_TRANSACTION_SIZE: usize = 10_000;

/// Minimum accepted length for an encryption key, in bytes.
pub const MIN_ENCRYPTION_KEY_LEN: usize = 16;

/// Size in bytes of the database header page (page 1). See the layout table
/// in spec §6; the header occupies the first 256 bytes of page 1 regardless
/// of the configured page size.
pub const HEADER_PAGE_LAYOUT_SIZE: usize = 256;
