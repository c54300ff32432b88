//! Database-wide configuration (spec §6).

use crate::common::config::{
    DEFAULT_CACHE_SIZE, DEFAULT_MAX_TRANSACTIONS, DEFAULT_MAX_TRANSACTION_SIZE, DEFAULT_PAGE_SIZE,
    DEFAULT_TRANSACTION_TIMEOUT_MS, MAX_PAGE_SIZE, MIN_ENCRYPTION_KEY_LEN, MIN_PAGE_SIZE,
};
use crate::common::{Error, Result};

/// How aggressively a commit flushes before returning (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteConcern {
    /// Append journal records without fsyncing either the journal or the
    /// main file. Fastest, crash-unsafe.
    None,
    /// Fsync the journal at commit; the main file is flushed lazily by the
    /// next checkpoint.
    Journaled,
    /// Fsync the journal, flush and fsync the main file, then append and
    /// fsync a `Checkpoint` record. Full durability.
    #[default]
    Synced,
}

/// Every option spec §6's configuration table names.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// Power of two in `[MIN_PAGE_SIZE, MAX_PAGE_SIZE]`; fixed at `create`.
    pub page_size: u32,
    /// Max pages kept resident in the buffer pool.
    pub cache_size: usize,
    /// If false, disables the write-ahead log entirely - crash-unsafe but
    /// faster.
    pub enable_journaling: bool,
    pub write_concern: WriteConcern,
    /// Active-transaction cap (`Error::TooManyTransactions` beyond this).
    pub max_transactions: usize,
    /// Auto-abort threshold for an idle/long-running transaction, in
    /// milliseconds.
    pub transaction_timeout_ms: u64,
    /// Soft cap on a transaction's operation-log length.
    pub max_transaction_size: usize,
    /// Rejects all mutating operations when set.
    pub read_only: bool,
    /// Rejects unknown fields in schema-validated collections. Schema
    /// validation itself is a host-side concern (spec §1 Out of scope);
    /// this flag is carried through for collaborators that implement it.
    pub strict_mode: bool,
    /// Reserved: encrypts page payloads at rest. Not implemented by this
    /// engine (spec §6 marks it "Reserved"); validated but otherwise inert.
    pub enable_encryption: bool,
    pub encryption_key: Option<Vec<u8>>,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE as u32,
            cache_size: DEFAULT_CACHE_SIZE,
            enable_journaling: true,
            write_concern: WriteConcern::default(),
            max_transactions: DEFAULT_MAX_TRANSACTIONS,
            transaction_timeout_ms: DEFAULT_TRANSACTION_TIMEOUT_MS,
            max_transaction_size: DEFAULT_MAX_TRANSACTION_SIZE,
            read_only: false,
            strict_mode: false,
            enable_encryption: false,
            encryption_key: None,
        }
    }
}

impl DatabaseOptions {
    /// Validate the option set, matching spec §6's constraints. Called once
    /// by `Database::open`.
    pub fn validate(&self) -> Result<()> {
        if !(self.page_size as usize).is_power_of_two() {
            return Err(Error::invalid_argument(format!(
                "page_size {} is not a power of two",
                self.page_size
            )));
        }
        if (self.page_size as usize) < MIN_PAGE_SIZE || (self.page_size as usize) > MAX_PAGE_SIZE {
            return Err(Error::invalid_argument(format!(
                "page_size {} out of range [{MIN_PAGE_SIZE}, {MAX_PAGE_SIZE}]",
                self.page_size
            )));
        }
        if self.max_transactions == 0 {
            return Err(Error::invalid_argument("max_transactions must be > 0"));
        }
        if self.enable_encryption {
            let key_len = self.encryption_key.as_ref().map(|k| k.len()).unwrap_or(0);
            if key_len < MIN_ENCRYPTION_KEY_LEN {
                return Err(Error::invalid_argument(format!(
                    "encryption_key must be at least {MIN_ENCRYPTION_KEY_LEN} bytes"
                )));
            }
        }
        Ok(())
    }
}
