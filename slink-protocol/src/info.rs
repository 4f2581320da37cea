use crate::error::{ProtocolError, Result};

/// Detail level of a server `INFO` request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InfoLevel {
    /// Server identification. Also used as the keepalive probe.
    Id,
    Capabilities,
    Stations,
    Streams,
    Gaps,
    Connections,
    All,
}

impl InfoLevel {
    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "ID" => Ok(Self::Id),
            "CAPABILITIES" => Ok(Self::Capabilities),
            "STATIONS" => Ok(Self::Stations),
            "STREAMS" => Ok(Self::Streams),
            "GAPS" => Ok(Self::Gaps),
            "CONNECTIONS" => Ok(Self::Connections),
            "ALL" => Ok(Self::All),
            _ => Err(ProtocolError::InvalidInfoLevel(s.to_owned())),
        }
    }

    /// Wire representation (uppercase).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Capabilities => "CAPABILITIES",
            Self::Stations => "STATIONS",
            Self::Streams => "STREAMS",
            Self::Gaps => "GAPS",
            Self::Connections => "CONNECTIONS",
            Self::All => "ALL",
        }
    }
}

impl std::fmt::Display for InfoLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        let levels = [
            InfoLevel::Id,
            InfoLevel::Capabilities,
            InfoLevel::Stations,
            InfoLevel::Streams,
            InfoLevel::Gaps,
            InfoLevel::Connections,
            InfoLevel::All,
        ];
        for level in levels {
            assert_eq!(InfoLevel::parse(level.as_str()).unwrap(), level);
        }
    }

    #[test]
    fn parse_case_insensitive() {
        assert_eq!(InfoLevel::parse("id").unwrap(), InfoLevel::Id);
        assert_eq!(InfoLevel::parse("Streams").unwrap(), InfoLevel::Streams);
    }

    #[test]
    fn parse_invalid() {
        assert!(InfoLevel::parse("UNKNOWN").is_err());
        assert!(InfoLevel::parse("").is_err());
    }
}
