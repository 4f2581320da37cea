use std::time::Duration;

use crate::error::{EngineError, Result};

/// Default SeedLink server port.
pub const DEFAULT_PORT: u16 = 18000;

/// Configuration for a [`SeedLinkEngine`](crate::SeedLinkEngine)
/// connection.
///
/// Defaults match the historical client library: 600 s network
/// timeout, 30 s reconnect delay, keepalives disabled, resume enabled.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Server address as `host[:port]`; port defaults to 18000 and a
    /// bare `:port` means localhost.
    pub address: String,
    /// Reconnect if no data arrives within this window. `None` disables.
    pub netto: Option<Duration>,
    /// Delay between reconnection attempts.
    pub netdly: Duration,
    /// Interval for keepalive `INFO ID` probes while streaming. `None`
    /// disables.
    pub keepalive: Option<Duration>,
    /// Timeout for individual network operations (connect, response
    /// lines).
    pub iotimeout: Duration,
    /// Dial-up mode: request buffered data with `FETCH`, expect the
    /// server to finish with `END`.
    pub dialup: bool,
    /// Request batch mode (suppressed per-command acks, protocol >= 3.0).
    pub batch: bool,
    /// Resume from saved sequence numbers when available.
    pub resume: bool,
    /// Server-side time window start, `YYYY,MM,DD,HH,MM,SS`. Overrides
    /// per-entry resume points.
    pub begin_time: Option<String>,
    /// Server-side time window end; requires `begin_time`.
    pub end_time: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            netto: Some(Duration::from_secs(600)),
            netdly: Duration::from_secs(30),
            keepalive: None,
            iotimeout: Duration::from_secs(60),
            dialup: false,
            batch: false,
            resume: true,
            begin_time: None,
            end_time: None,
        }
    }
}

impl EngineConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Validate the configuration and return the normalized
    /// `host:port` address.
    pub(crate) fn validate(&self) -> Result<String> {
        if self.end_time.is_some() && self.begin_time.is_none() {
            return Err(EngineError::ConfigInvalid(
                "end time requires a begin time".into(),
            ));
        }
        normalize_address(&self.address)
    }
}

/// Expand an address into `host:port`: bare `:port` means localhost,
/// a missing port means 18000.
pub(crate) fn normalize_address(address: &str) -> Result<String> {
    let address = address.trim();
    if address.is_empty() || address == ":" {
        return Err(EngineError::ConfigInvalid("empty server address".into()));
    }

    Ok(if let Some(port) = address.strip_prefix(':') {
        format!("localhost:{port}")
    } else if address.contains(':') {
        address.to_owned()
    } else {
        format!("{address}:{DEFAULT_PORT}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.netto, Some(Duration::from_secs(600)));
        assert_eq!(config.netdly, Duration::from_secs(30));
        assert_eq!(config.keepalive, None);
        assert!(config.resume);
        assert!(!config.dialup);
    }

    #[test]
    fn normalize_full_address() {
        assert_eq!(
            normalize_address("geofon.gfz.de:18000").unwrap(),
            "geofon.gfz.de:18000"
        );
    }

    #[test]
    fn normalize_adds_default_port() {
        assert_eq!(normalize_address("geofon.gfz.de").unwrap(), "geofon.gfz.de:18000");
    }

    #[test]
    fn normalize_bare_port_means_localhost() {
        assert_eq!(normalize_address(":18500").unwrap(), "localhost:18500");
    }

    #[test]
    fn normalize_rejects_empty() {
        assert!(normalize_address("").is_err());
        assert!(normalize_address("   ").is_err());
    }

    #[test]
    fn validate_time_window() {
        let mut config = EngineConfig::new("localhost:18000");
        config.end_time = Some("2024,01,02,00,00,00".into());
        assert!(matches!(
            config.validate(),
            Err(EngineError::ConfigInvalid(_))
        ));

        config.begin_time = Some("2024,01,01,00,00,00".into());
        assert!(config.validate().is_ok());
    }
}
