/// Protocol version advertised by a server in its HELLO response.
///
/// Carried as integer components rather than the historical float so
/// that gate checks like "at least 2.5" are exact.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerVersion {
    pub major: u8,
    pub minor: u8,
}

impl ServerVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Extract a version from a HELLO token such as `"v3.1"` or `"3.1"`.
    pub fn parse_token(token: &str) -> Option<Self> {
        let token = token.strip_prefix(['v', 'V']).unwrap_or(token);
        let (major, minor) = match token.split_once('.') {
            Some((maj, min)) => (maj, min),
            None => (token, "0"),
        };
        // Trailing junk after the minor digits (e.g. "3.1beta") is dropped.
        let minor: String = minor.chars().take_while(|c| c.is_ascii_digit()).collect();
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }

    pub fn at_least(self, major: u8, minor: u8) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl std::fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
