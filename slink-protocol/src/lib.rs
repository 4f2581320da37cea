//! SeedLink protocol types, commands, and record detection.
//!
//! This crate provides the wire-level protocol layer shared by the
//! connection engine and the command-line tool: ASCII command encoding,
//! the 8-byte SeedLink frame header, and a resynchronizing miniSEED
//! record boundary detector for both 2.x and 3.x format records.

pub mod command;
pub mod error;
pub mod frame;
pub mod info;
pub mod mseed;
pub mod response;
pub mod selector;
pub mod sequence;
pub mod version;

pub use command::Command;
pub use error::{ProtocolError, Result};
pub use frame::FrameHeader;
pub use info::InfoLevel;
pub use mseed::{Detection, FormatVersion, Ms2Header, PacketType, RecordIdent};
pub use response::Response;
pub use sequence::SequenceNumber;
pub use version::ServerVersion;
