use crate::error::{ProtocolError, Result};
use crate::sequence::SequenceNumber;

/// SeedLink frame signature, first two header bytes.
pub const SIGNATURE: &[u8; 2] = b"SL";
/// Signature of INFO response frames, first six header bytes.
pub const INFO_SIGNATURE: &[u8; 6] = b"SLINFO";
/// Length of the SeedLink frame header. The layout beyond these eight
/// bytes is opaque to this crate.
pub const HEADER_LEN: usize = 8;

/// A decoded 8-byte SeedLink frame header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameHeader {
    /// Data frame: `"SL"` followed by a 6-hex-digit sequence number.
    Data { sequence: SequenceNumber },
    /// INFO frame: `"SLINFO"` with byte 7 marking the terminator (`*`)
    /// or a continuation (space).
    Info { terminated: bool },
}

impl FrameHeader {
    /// Decode the first [`HEADER_LEN`] bytes of a frame.
    ///
    /// Anything not starting with `"SL"` is a hard protocol error; after
    /// negotiation the stream carries nothing but frames.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::FrameTooShort {
                expected: HEADER_LEN,
                actual: data.len(),
            });
        }

        if &data[0..2] != SIGNATURE.as_slice() {
            return Err(ProtocolError::InvalidSignature {
                actual: [data[0], data[1]],
            });
        }

        if &data[0..6] == INFO_SIGNATURE.as_slice() {
            return Ok(Self::Info {
                terminated: data[HEADER_LEN - 1] == b'*',
            });
        }

        let hex = std::str::from_utf8(&data[2..8]).map_err(|_| {
            ProtocolError::InvalidSequence("sequence bytes are not ASCII".into())
        })?;
        let sequence = SequenceNumber::from_hex(hex)?;

        Ok(Self::Data { sequence })
    }

    /// Encode a data frame header.
    pub fn encode_data(sequence: SequenceNumber) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[0..2].copy_from_slice(SIGNATURE);
        header[2..8].copy_from_slice(sequence.to_hex().as_bytes());
        header
    }

    /// Encode an INFO frame header.
    pub fn encode_info(terminated: bool) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[0..6].copy_from_slice(INFO_SIGNATURE);
        header[6] = b' ';
        header[7] = if terminated { b'*' } else { b' ' };
        header
    }
}
