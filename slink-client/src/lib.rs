//! Async SeedLink connection engine for real-time seismic data streaming.
//!
//! The engine manages a long-lived connection to a SeedLink server:
//! negotiation, stream subscription with sequence-numbered resume,
//! keepalives, network timeouts, and indefinite reconnection. Received
//! miniSEED records are delivered to the caller one at a time through
//! [`SeedLinkEngine::collect`].
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> slink_client::Result<()> {
//! use slink_client::{Collected, EngineConfig, SeedLinkEngine, StreamRegistry};
//!
//! let mut registry = StreamRegistry::new();
//! registry.add_stream("IU", "ANMO", vec!["BHZ".into()], None, "")?;
//!
//! let config = EngineConfig::new("rtserve.iris.washington.edu:18000");
//! let mut engine = SeedLinkEngine::new(config, registry)?;
//!
//! loop {
//!     match engine.collect().await? {
//!         Collected::Packet(packet) => {
//!             println!("seq={}, {} bytes", packet.sequence, packet.payload.len());
//!         }
//!         Collected::Terminated => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub(crate) mod buffer;
pub mod config;
pub(crate) mod engine;
pub(crate) mod error;
#[cfg(test)]
pub(crate) mod mock;
pub(crate) mod registry;
pub mod statefile;
pub mod streamlist;
pub(crate) mod timer;
pub(crate) mod transport;

pub use archive::ArchiveSink;
pub use config::EngineConfig;
pub use engine::{BatchMode, Collected, SeedLinkEngine, ServerId, SlPacket, State};
pub use error::{EngineError, Result};
pub use registry::{StreamEntry, StreamRegistry, UNI_NETWORK, UNI_STATION};
