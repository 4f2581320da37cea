use crate::error::{ProtocolError, Result};
use crate::version::ServerVersion;

/// A text-line response from a SeedLink server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Ok,
    Error(String),
    End,
    /// Two-line HELLO response: server identification and site/organization.
    Hello {
        software: String,
        organization: String,
        version: Option<ServerVersion>,
    },
}

impl Response {
    /// Parse a single-line response: `OK`, `ERROR`, `END`.
    pub fn parse_line(line: &str) -> Result<Self> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');

        if line.eq_ignore_ascii_case("OK") {
            return Ok(Self::Ok);
        }

        if line.eq_ignore_ascii_case("END") {
            return Ok(Self::End);
        }

        if let Some(keyword) = line.get(..5)
            && keyword.eq_ignore_ascii_case("ERROR")
        {
            return Ok(Self::Error(line[5..].trim().to_owned()));
        }

        Err(ProtocolError::InvalidResponse(format!(
            "unrecognized response: {line:?}"
        )))
    }

    /// Parse a two-line HELLO response.
    ///
    /// Line 1: `"SeedLink v3.1 (2020.075)"`, line 2: `"GEOFON"`.
    /// The protocol version is the second whitespace token of line 1;
    /// servers that do not advertise one yield `version: None`.
    pub fn parse_hello(line1: &str, line2: &str) -> Result<Self> {
        let line1 = line1.trim_end_matches('\n').trim_end_matches('\r');
        let line2 = line2.trim_end_matches('\n').trim_end_matches('\r');

        let mut parts = line1.split_whitespace();
        let software = parts
            .next()
            .ok_or_else(|| ProtocolError::InvalidResponse("empty HELLO line".into()))?
            .to_owned();
        let version = parts.next().and_then(ServerVersion::parse_token);

        Ok(Self::Hello {
            software,
            organization: line2.to_owned(),
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ok() {
        assert_eq!(Response::parse_line("OK").unwrap(), Response::Ok);
        assert_eq!(Response::parse_line("ok\r\n").unwrap(), Response::Ok);
    }

    #[test]
    fn parse_end() {
        assert_eq!(Response::parse_line("END").unwrap(), Response::End);
    }

    #[test]
    fn parse_error_bare() {
        assert_eq!(
            Response::parse_line("ERROR\r\n").unwrap(),
            Response::Error(String::new())
        );
    }

    #[test]
    fn parse_error_with_description() {
        assert_eq!(
            Response::parse_line("ERROR bad station").unwrap(),
            Response::Error("bad station".into())
        );
    }

    #[test]
    fn parse_unknown() {
        assert!(Response::parse_line("FOOBAR").is_err());
    }

    #[test]
    fn parse_hello_with_version() {
        let resp = Response::parse_hello("SeedLink v3.1 (2020.075)\r\n", "GEOFON\r\n").unwrap();
        assert_eq!(
            resp,
            Response::Hello {
                software: "SeedLink".into(),
                organization: "GEOFON".into(),
                version: Some(ServerVersion::new(3, 1)),
            }
        );
    }

    #[test]
    fn parse_hello_without_version() {
        let resp = Response::parse_hello("SeedLink", "somewhere").unwrap();
        assert_eq!(
            resp,
            Response::Hello {
                software: "SeedLink".into(),
                organization: "somewhere".into(),
                version: None,
            }
        );
    }

    #[test]
    fn parse_hello_empty_line_is_error() {
        assert!(Response::parse_hello("", "site").is_err());
    }
}
