//! miniSEED record detection and header-level inspection.
//!
//! The detector identifies record boundaries in a raw byte buffer
//! without decoding samples: it recognizes both the 2.x and 3.x fixed
//! headers, infers the byte order of 2.x records from header content,
//! walks the blockette chain to a B1000 for the record length, and
//! falls back to scanning for the next fixed header at 64-byte offsets
//! when no B1000 is present.
//!
//! Sample payloads are never interpreted here; records are forwarded
//! verbatim and decompression is left to external libraries.

use crate::error::{ProtocolError, Result};

/// Minimum supported miniSEED record size.
pub const MIN_RECORD_LEN: usize = 48;
/// Maximum supported miniSEED record size.
pub const MAX_RECORD_LEN: usize = 4096;
/// Maximum offset at which record-header blockettes can appear.
pub const MAX_HEADER_LEN: usize = 128;

/// Length of the miniSEED 3 fixed header (before the source identifier).
const MS3_FIXED_LEN: usize = 40;

/// Major format version of a detected record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FormatVersion {
    V2,
    V3,
}

/// Byte order of a miniSEED 2.x record, inferred from header content.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

/// Outcome of a successful detection pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Detection {
    /// The buffer holds the start of a record but not enough bytes to
    /// determine its length; read more and retry.
    Incomplete,
    /// A record of `length` bytes begins at the start of the buffer.
    Record {
        length: usize,
        format: FormatVersion,
    },
}

/// Determine whether the buffer begins with a miniSEED record and, if
/// so, its exact length.
///
/// Errors correspond to non-miniSEED data or a corrupt header chain;
/// after stream negotiation either is unrecoverable.
pub fn detect(buf: &[u8]) -> Result<Detection> {
    if buf.len() < MIN_RECORD_LEN {
        return Ok(Detection::Incomplete);
    }

    if is_valid_ms3_header(buf) {
        let sid_len = buf[33] as usize;
        let extra_len = u16::from_le_bytes([buf[34], buf[35]]) as usize;
        let data_len = u32::from_le_bytes([buf[36], buf[37], buf[38], buf[39]]) as usize;
        let length = MS3_FIXED_LEN + sid_len + extra_len + data_len;
        return checked_length(length, FormatVersion::V3);
    }

    let Some(order) = ms2_byte_order(buf) else {
        return Err(ProtocolError::UnrecognizedRecord);
    };

    // Walk the blockette chain looking for a B1000 record-length byte.
    let mut offset = read_u16(buf, 46, order) as usize;
    while offset != 0 && offset > 47 {
        if offset + 4 > buf.len() {
            return Ok(Detection::Incomplete);
        }

        let blkt_type = read_u16(buf, offset, order);
        let next = read_u16(buf, offset + 2, order) as usize;

        if blkt_type == 1000 {
            // Record length byte is field 3 of the B1000, a power of two.
            if offset + 7 > buf.len() {
                return Ok(Detection::Incomplete);
            }
            let power = buf[offset + 6];
            if power >= usize::BITS as u8 {
                return Err(ProtocolError::RecordLengthOutOfRange(usize::MAX));
            }
            return checked_length(1 << power, FormatVersion::V2);
        }

        if next != 0 && (next < 4 || next - 4 <= offset) {
            return Err(ProtocolError::BadBlocketteChain { offset, next });
        }

        offset = next;
    }

    // No B1000: scan at 64-byte offsets for the next fixed header, the
    // gap to it implies the record length.
    let mut candidate = 64;
    while candidate + MIN_RECORD_LEN <= buf.len() {
        if ms2_byte_order(&buf[candidate..]).is_some() {
            return checked_length(candidate, FormatVersion::V2);
        }
        candidate += 64;
    }

    Ok(Detection::Incomplete)
}

fn checked_length(length: usize, format: FormatVersion) -> Result<Detection> {
    if !(MIN_RECORD_LEN..=MAX_RECORD_LEN).contains(&length) {
        return Err(ProtocolError::RecordLengthOutOfRange(length));
    }
    Ok(Detection::Record { length, format })
}

/// miniSEED 3 fixed-header check: `"MS"` signature, format version 3,
/// and plausible start-time fields. All multi-byte fields are
/// little-endian by definition.
fn is_valid_ms3_header(buf: &[u8]) -> bool {
    buf.len() >= MS3_FIXED_LEN
        && buf[0] == b'M'
        && buf[1] == b'S'
        && buf[2] == 3
        && (1..=366).contains(&u16::from_le_bytes([buf[10], buf[11]]))
        && buf[12] <= 23
        && buf[13] <= 59
        && buf[14] <= 60
}

/// miniSEED 2 fixed-header check, returning the inferred byte order.
///
/// The sequence field must be ASCII digits (space/NUL padded), the
/// data-header-quality indicator one of `DRQM`, and the start-time
/// year/day plausible in exactly one byte order.
fn ms2_byte_order(buf: &[u8]) -> Option<ByteOrder> {
    if buf.len() < MIN_RECORD_LEN {
        return None;
    }

    if !buf[0..6]
        .iter()
        .all(|&b| b.is_ascii_digit() || b == b' ' || b == 0)
    {
        return None;
    }

    if !matches!(buf[6], b'D' | b'R' | b'Q' | b'M') {
        return None;
    }

    let year_be = u16::from_be_bytes([buf[20], buf[21]]);
    let day_be = u16::from_be_bytes([buf[22], buf[23]]);
    if is_valid_year_day(year_be, day_be) {
        return Some(ByteOrder::Big);
    }

    let year_le = u16::from_le_bytes([buf[20], buf[21]]);
    let day_le = u16::from_le_bytes([buf[22], buf[23]]);
    if is_valid_year_day(year_le, day_le) {
        return Some(ByteOrder::Little);
    }

    None
}

fn is_valid_year_day(year: u16, day: u16) -> bool {
    (1900..=2050).contains(&year) && (1..=366).contains(&day)
}

fn read_u16(buf: &[u8], offset: usize, order: ByteOrder) -> u16 {
    let bytes = [buf[offset], buf[offset + 1]];
    match order {
        ByteOrder::Big => u16::from_be_bytes(bytes),
        ByteOrder::Little => u16::from_le_bytes(bytes),
    }
}

fn read_i16(buf: &[u8], offset: usize, order: ByteOrder) -> i16 {
    read_u16(buf, offset, order) as i16
}

/// Parsed fixed section of a miniSEED 2.x data header.
///
/// Codes are cleaned of the fixed-width space/NUL padding used on the
/// wire. Only header-level fields needed for stream bookkeeping,
/// archiving, and display are carried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ms2Header {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub year: u16,
    pub day: u16,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub fract: u16,
    pub num_samples: u16,
    pub samprate_factor: i16,
    pub begin_data: u16,
    pub begin_blockette: u16,
    pub byte_order: ByteOrder,
}

impl Ms2Header {
    /// Parse the 48-byte fixed section at the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let order = ms2_byte_order(buf).ok_or(ProtocolError::UnrecognizedRecord)?;

        Ok(Self {
            network: clean_code(&buf[18..20]),
            station: clean_code(&buf[8..13]),
            location: clean_code(&buf[13..15]),
            channel: clean_code(&buf[15..18]),
            year: read_u16(buf, 20, order),
            day: read_u16(buf, 22, order),
            hour: buf[24],
            minute: buf[25],
            second: buf[26],
            fract: read_u16(buf, 28, order),
            num_samples: read_u16(buf, 30, order),
            samprate_factor: read_i16(buf, 32, order),
            begin_data: read_u16(buf, 44, order),
            begin_blockette: read_u16(buf, 46, order),
            byte_order: order,
        })
    }

    /// Record start time formatted `YYYY,MM,DD,HH,MM,SS`.
    pub fn start_time_string(&self) -> String {
        let (month, mday) = doy_to_month_day(self.year, self.day).unwrap_or((0, 0));
        format!(
            "{:04},{:02},{:02},{:02},{:02},{:02}",
            self.year, month, mday, self.hour, self.minute, self.second
        )
    }
}

/// Strip the space/NUL padding from a fixed-width header code.
fn clean_code(raw: &[u8]) -> String {
    raw.iter()
        .filter(|&&b| b != b' ' && b != 0)
        .map(|&b| b as char)
        .collect()
}

/// Convert a day-of-year to (month, day-of-month), leap-year aware.
pub fn doy_to_month_day(year: u16, doy: u16) -> Option<(u8, u8)> {
    let leap = year % 4 == 0 && (year % 100 != 0 || year % 400 == 0);
    let lengths: [u16; 12] = [
        31,
        if leap { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];

    if doy == 0 || doy > if leap { 366 } else { 365 } {
        return None;
    }

    let mut remaining = doy;
    for (idx, &len) in lengths.iter().enumerate() {
        if remaining <= len {
            return Some((idx as u8 + 1, remaining as u8));
        }
        remaining -= len;
    }
    None
}

/// Identification fields of a record, independent of format version.
///
/// For 2.x records these come from the fixed header; for 3.x records
/// the codes are split out of the FDSN source identifier and the time
/// fields read from the (little-endian) fixed header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordIdent {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub year: u16,
    pub day: u16,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub fract: u16,
}

impl RecordIdent {
    pub fn parse(buf: &[u8], format: FormatVersion) -> Result<Self> {
        match format {
            FormatVersion::V2 => Ok(Ms2Header::parse(buf)?.into()),
            FormatVersion::V3 => Self::parse_ms3(buf),
        }
    }

    fn parse_ms3(buf: &[u8]) -> Result<Self> {
        if !is_valid_ms3_header(buf) {
            return Err(ProtocolError::UnrecognizedRecord);
        }

        let sid_len = buf[33] as usize;
        if MS3_FIXED_LEN + sid_len > buf.len() {
            return Err(ProtocolError::UnrecognizedRecord);
        }
        let sid = std::str::from_utf8(&buf[MS3_FIXED_LEN..MS3_FIXED_LEN + sid_len])
            .map_err(|_| ProtocolError::UnrecognizedRecord)?;

        // FDSN source identifier: "FDSN:NET_STA_LOC_B_S_SS".
        let mut parts = sid.strip_prefix("FDSN:").unwrap_or(sid).split('_');
        let network = parts.next().unwrap_or("").to_owned();
        let station = parts.next().unwrap_or("").to_owned();
        let location = parts.next().unwrap_or("").to_owned();
        let channel: String = parts.collect();

        // Nanoseconds reduced to the 2.x 1/10000 s resolution.
        let nanos = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);

        Ok(Self {
            network,
            station,
            location,
            channel,
            year: u16::from_le_bytes([buf[8], buf[9]]),
            day: u16::from_le_bytes([buf[10], buf[11]]),
            hour: buf[12],
            minute: buf[13],
            second: buf[14],
            fract: (nanos / 100_000) as u16,
        })
    }

    /// Record start time formatted `YYYY,MM,DD,HH,MM,SS`.
    pub fn start_time_string(&self) -> String {
        let (month, mday) = doy_to_month_day(self.year, self.day).unwrap_or((0, 0));
        format!(
            "{:04},{:02},{:02},{:02},{:02},{:02}",
            self.year, month, mday, self.hour, self.minute, self.second
        )
    }
}

impl From<Ms2Header> for RecordIdent {
    fn from(h: Ms2Header) -> Self {
        Self {
            network: h.network,
            station: h.station,
            location: h.location,
            channel: h.channel,
            year: h.year,
            day: h.day,
            hour: h.hour,
            minute: h.minute,
            second: h.second,
            fract: h.fract,
        }
    }
}

/// Record classification derived from the blockette chain, used for
/// archive type codes and display.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketType {
    /// Waveform data.
    Data,
    /// Event detection record (blockettes 200-299).
    Event,
    /// Calibration record (blockettes 300-399).
    Calibration,
    /// Timing exception record (blockettes 500-599).
    Timing,
    /// Log/message record (no sample rate, has "samples").
    Message,
    /// Opaque data record (B2000).
    Opaque,
    /// INFO response record.
    Info,
    Unknown,
}

impl PacketType {
    /// Single-letter code used in archive path templates.
    pub fn code(self) -> char {
        match self {
            Self::Data => 'D',
            Self::Event => 'E',
            Self::Calibration => 'C',
            Self::Timing => 'T',
            Self::Message => 'L',
            Self::Opaque => 'O',
            Self::Info => 'I',
            Self::Unknown => 'U',
        }
    }
}

/// Classify a 2.x record by its first marker blockette.
pub fn packet_type(buf: &[u8]) -> PacketType {
    let Ok(header) = Ms2Header::parse(buf) else {
        return PacketType::Unknown;
    };
    let order = header.byte_order;

    let mut b2000 = false;
    let mut offset = header.begin_blockette as usize;

    while offset != 0 && offset + 4 <= buf.len() {
        if offset > MAX_HEADER_LEN {
            return PacketType::Unknown;
        }

        match read_u16(buf, offset, order) {
            200..=299 => return PacketType::Event,
            300..=399 => return PacketType::Calibration,
            500..=599 => return PacketType::Timing,
            2000 => b2000 = true,
            _ => {}
        }

        let next = read_u16(buf, offset + 2, order) as usize;
        if next <= offset {
            break;
        }
        offset = next;
    }

    if header.samprate_factor == 0 {
        if header.num_samples != 0 {
            return PacketType::Message;
        }
        if b2000 {
            return PacketType::Opaque;
        }
    }

    PacketType::Data
}

/// Extract the ASCII payload span of a log-type record.
///
/// INFO responses arrive as log records whose payload (starting at the
/// data offset, `num_samples` bytes long) is a fragment of XML.
pub fn log_payload(buf: &[u8]) -> Option<&[u8]> {
    let header = Ms2Header::parse(buf).ok()?;
    let start = header.begin_data as usize;
    let len = header.num_samples as usize;
    if start < MIN_RECORD_LEN || start + len > buf.len() {
        return None;
    }
    Some(&buf[start..start + len])
}
