//! Error types for Sundial.

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in Sundial.
///
/// This enum represents every error that can occur in the database. By
/// having a single error type, error handling stays consistent across every
/// layer: page storage, journal, transactions, indexes, and collections.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from disk or journal operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page, document, collection, index, or transaction does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique index already maps the given key tuple to a different locator.
    #[error("duplicate key in index {index}: {key}")]
    DuplicateKey {
        /// Name of the index that rejected the insert.
        index: String,
        /// Debug rendering of the offending key tuple.
        key: String,
    },

    /// An encoded document exceeds the page payload available to hold it.
    #[error("document of {size} bytes exceeds page payload of {capacity} bytes")]
    DocumentTooLarge {
        /// Encoded size of the document.
        size: usize,
        /// Usable payload bytes per page.
        capacity: usize,
    },

    /// The document codec encountered an invalid byte stream.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// A page failed its checksum or the journal's recovery invariants.
    #[error("corrupt: {0}")]
    Corrupt(String),

    /// The on-disk format version is not supported by this build.
    #[error("unsupported database format version {0}")]
    VersionUnsupported(u32),

    /// A mutating operation was attempted against a read-only database.
    #[error("database is opened read-only")]
    ReadOnly,

    /// The active-transaction cap (`max_transactions`) has been reached.
    #[error("too many active transactions (limit {0})")]
    TooManyTransactions(usize),

    /// An operation was attempted against a transaction in the wrong state.
    #[error("transaction {id} is {state}, expected Active")]
    TransactionInvalidState {
        /// The transaction's id.
        id: String,
        /// Human-readable current state.
        state: String,
    },

    /// A transaction exceeded `transaction_timeout` and was aborted.
    #[error("transaction {0} timed out")]
    TransactionTimeout(String),

    /// A configuration value or call argument is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Every buffer pool frame is pinned; no victim is available for eviction.
    #[error("buffer pool exhausted: all frames pinned")]
    BufferPoolFull,
}

impl Error {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub(crate) fn invalid_argument(what: impl Into<String>) -> Self {
        Error::InvalidArgument(what.into())
    }

    pub(crate) fn malformed(what: impl Into<String>) -> Self {
        Error::Malformed(what.into())
    }

    pub(crate) fn corrupt(what: impl Into<String>) -> Self {
        Error::Corrupt(what.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("page 42");
        assert_eq!(format!("{}", err), "not found: page 42");

        let err = Error::TooManyTransactions(64);
        assert_eq!(
            format!("{}", err),
            "too many active transactions (limit 64)"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_result_type_alias() {
        fn might_fail() -> Result<u32> {
            Ok(42)
        }

        assert_eq!(might_fail().unwrap(), 42);
    }
}
