//! ObjectId - a 12-byte globally-unique document identifier.
//!
//! Layout: 4-byte seconds-since-epoch timestamp, 5-byte per-process random
//! nonce (generated once and reused for the life of the process), 3-byte
//! big-endian counter that increments per id and wraps on overflow.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

/// A 12-byte document identifier, ordered first by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

static COUNTER: AtomicU32 = AtomicU32::new(0);
static NONCE: OnceLock<[u8; 5]> = OnceLock::new();

fn process_nonce() -> [u8; 5] {
    *NONCE.get_or_init(|| {
        let mut bytes = [0u8; 5];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    })
}

impl ObjectId {
    /// Generate a fresh id from the current time, the process nonce, and an
    /// incrementing counter.
    pub fn new() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        let counter = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00FF_FFFF;

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&process_nonce());
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        Self(bytes)
    }

    /// Wrap 12 raw bytes, e.g. decoded from the wire format.
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// The raw 12 bytes, in wire order.
    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// Seconds-since-epoch timestamp this id was minted with.
    pub fn timestamp_secs(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_distinct() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_roundtrip_bytes() {
        let id = ObjectId::new();
        let restored = ObjectId::from_bytes(*id.as_bytes());
        assert_eq!(id, restored);
    }

    #[test]
    fn test_monotonic_counter_orders_same_second_ids() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        // Same process nonce and (usually) same second: counter breaks ties.
        if a.timestamp_secs() == b.timestamp_secs() {
            assert!(a < b);
        }
    }

    #[test]
    fn test_display_is_24_hex_chars() {
        let id = ObjectId::new();
        assert_eq!(format!("{id}").len(), 24);
    }
}
