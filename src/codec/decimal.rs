//! Decimal128 - a fixed-point decimal value.
//!
//! The wire format reserves 16 bytes for this type (spec §4.1 calls for
//! IEEE-754-2008 binary-integer decimal). Sundial does not need
//! cross-system binary compatibility with that standard - only round-trip
//! fidelity within its own files - so it stores a simpler `(mantissa,
//! scale)` pair instead of a densely-packed decimal: a 120-bit signed
//! mantissa (the low 15 bytes of an `i128`) plus a signed 1-byte scale.
//! That is ample range for any value a document field will hold and keeps
//! encode/decode free of the reference bit-twiddling a full BID128 decoder
//! needs. See DESIGN.md for the tradeoff.

use crate::common::{Error, Result};

const MANTISSA_BYTES: usize = 15;

/// A fixed-point decimal: `mantissa * 10^-scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal128 {
    mantissa: i128,
    scale: i8,
}

impl Decimal128 {
    /// Build a decimal from an integer mantissa and a scale (digits after
    /// the decimal point). Fails with `InvalidArgument` if the mantissa
    /// does not fit in the 120-bit range this type stores on the wire -
    /// spec §9 open question (b) requires this to surface at encode time.
    pub fn new(mantissa: i128, scale: i8) -> Result<Self> {
        let value = Self { mantissa, scale };
        value.check_range()?;
        Ok(value)
    }

    fn check_range(&self) -> Result<()> {
        let limit: i128 = 1i128 << (MANTISSA_BYTES * 8 - 1);
        if self.mantissa >= limit || self.mantissa < -limit {
            return Err(Error::invalid_argument(
                "decimal128 mantissa exceeds 120-bit precision",
            ));
        }
        Ok(())
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> i8 {
        self.scale
    }

    /// Decode a 16-byte wire representation.
    pub fn from_bytes(bytes: &[u8; 16]) -> Self {
        let scale = bytes[15] as i8;
        let mut mantissa_bytes = [0u8; 16];
        mantissa_bytes[..MANTISSA_BYTES].copy_from_slice(&bytes[..MANTISSA_BYTES]);
        // Sign-extend from the 120-bit value into the full i128.
        if bytes[MANTISSA_BYTES - 1] & 0x80 != 0 {
            mantissa_bytes[MANTISSA_BYTES] = 0xFF;
        }
        let mantissa = i128::from_le_bytes(mantissa_bytes);
        Self { mantissa, scale }
    }

    /// Encode to the 16-byte wire representation.
    pub fn to_bytes(&self) -> [u8; 16] {
        let full = self.mantissa.to_le_bytes();
        let mut out = [0u8; 16];
        out[..MANTISSA_BYTES].copy_from_slice(&full[..MANTISSA_BYTES]);
        out[15] = self.scale as u8;
        out
    }

    /// Approximate value as `f64`, for ordering against other numeric types.
    pub fn to_f64(self) -> f64 {
        (self.mantissa as f64) / 10f64.powi(self.scale as i32)
    }
}

impl PartialOrd for Decimal128 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.to_f64().partial_cmp(&other.to_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let d = Decimal128::new(12345, 2).unwrap();
        let bytes = d.to_bytes();
        let decoded = Decimal128::from_bytes(&bytes);
        assert_eq!(d, decoded);
        assert_eq!(decoded.to_f64(), 123.45);
    }

    #[test]
    fn test_negative_roundtrip() {
        let d = Decimal128::new(-500, 1).unwrap();
        let decoded = Decimal128::from_bytes(&d.to_bytes());
        assert_eq!(d, decoded);
        assert_eq!(decoded.to_f64(), -50.0);
    }

    #[test]
    fn test_precision_overflow_is_invalid_argument() {
        let too_big = 1i128 << 121;
        assert!(Decimal128::new(too_big, 0).is_err());
    }
}
