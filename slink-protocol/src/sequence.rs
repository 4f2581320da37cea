use crate::error::{ProtocolError, Result};

/// A SeedLink packet sequence number.
///
/// Sequence numbers occupy 24 bits and wrap modulo 2^24. On the wire
/// they appear as exactly 6 uppercase hex digits. [`UNSET`](Self::UNSET)
/// stands in for the historical `-1` "no sequence yet" sentinel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SequenceNumber(u32);

impl SequenceNumber {
    /// Sentinel: sequence not set (resume from next available data).
    pub const UNSET: Self = Self(u32::MAX);

    /// Maximum sequence value (6 hex digits).
    pub const MAX: u32 = 0xFF_FFFF;

    pub fn new(value: u32) -> Self {
        debug_assert!(value <= Self::MAX || value == u32::MAX);
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn is_unset(self) -> bool {
        self == Self::UNSET
    }

    /// The following sequence number, wrapping modulo 2^24.
    pub fn next(self) -> Self {
        Self((self.0 + 1) & Self::MAX)
    }

    /// Parse the wire representation: exactly 6 hex digits.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ProtocolError::InvalidSequence(format!(
                "expected 6 hex digits, got {hex:?}"
            )));
        }
        let value = u32::from_str_radix(hex, 16)
            .map_err(|_| ProtocolError::InvalidSequence(format!("invalid hex: {hex:?}")))?;
        Ok(Self(value))
    }

    /// Serialize to the wire representation (6 uppercase hex digits).
    pub fn to_hex(self) -> String {
        format!("{:06X}", self.0)
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Self::UNSET {
            write!(f, "UNSET")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_valid() {
        let seq = SequenceNumber::from_hex("00001A").unwrap();
        assert_eq!(seq.value(), 26);
        assert_eq!(seq.to_hex(), "00001A");
    }

    #[test]
    fn hex_boundaries() {
        assert_eq!(SequenceNumber::from_hex("000000").unwrap().value(), 0);
        assert_eq!(
            SequenceNumber::from_hex("FFFFFF").unwrap().value(),
            0xFFFFFF
        );
    }

    #[test]
    fn hex_lowercase_accepted() {
        assert_eq!(SequenceNumber::from_hex("00abcd").unwrap().value(), 0xABCD);
    }

    #[test]
    fn hex_invalid() {
        assert!(SequenceNumber::from_hex("ZZZZZZ").is_err());
        assert!(SequenceNumber::from_hex("001A").is_err());
        assert!(SequenceNumber::from_hex("0000001A").is_err());
        assert!(SequenceNumber::from_hex("").is_err());
    }

    #[test]
    fn hex_roundtrip_samples() {
        for val in [0u32, 1, 255, 0xABCD, 0xFFFFFF] {
            let seq = SequenceNumber::new(val);
            assert_eq!(SequenceNumber::from_hex(&seq.to_hex()).unwrap(), seq);
        }
    }

    #[test]
    fn hex_roundtrip_full_domain_stride() {
        // Full 24-bit sweep is slow in debug builds; stride covers every
        // byte boundary pattern.
        let mut val = 0u32;
        while val <= SequenceNumber::MAX {
            let seq = SequenceNumber::new(val);
            assert_eq!(SequenceNumber::from_hex(&seq.to_hex()).unwrap(), seq);
            val += 257;
        }
    }

    #[test]
    fn next_wraps() {
        assert_eq!(SequenceNumber::new(5).next(), SequenceNumber::new(6));
        assert_eq!(
            SequenceNumber::new(0xFFFFFF).next(),
            SequenceNumber::new(0)
        );
    }

    #[test]
    fn display() {
        assert_eq!(SequenceNumber::UNSET.to_string(), "UNSET");
        assert_eq!(SequenceNumber::new(42).to_string(), "42");
    }
}
