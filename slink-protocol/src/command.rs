use crate::info::InfoLevel;
use crate::sequence::SequenceNumber;

/// A SeedLink protocol command as emitted by a client.
///
/// All commands serialize to a single ASCII line terminated by `\r\n`.
/// Times are preformatted `YYYY,MM,DD,HH,MM,SS` strings and pass
/// through opaquely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Hello,
    Cat,
    Bye,
    Batch,
    Station {
        station: String,
        network: String,
    },
    /// `SELECT <pattern>`; `None` sends a bare `SELECT`, which clears
    /// all previous selectors for the current station.
    Select {
        pattern: Option<String>,
    },
    Data {
        sequence: Option<SequenceNumber>,
        time: Option<String>,
    },
    /// Same shape as `DATA`, but implies dial-up mode: the server sends
    /// buffered data and closes.
    Fetch {
        sequence: Option<SequenceNumber>,
        time: Option<String>,
    },
    Time {
        start: String,
        end: Option<String>,
    },
    End,
    Info {
        level: InfoLevel,
    },
}

impl Command {
    /// Serialize to the wire line, without the trailing `\r\n`.
    pub fn to_line(&self) -> String {
        match self {
            Self::Hello => "HELLO".into(),
            Self::Cat => "CAT".into(),
            Self::Bye => "BYE".into(),
            Self::Batch => "BATCH".into(),
            Self::Station { station, network } => format!("STATION {station} {network}"),
            Self::Select { pattern } => match pattern {
                Some(p) => format!("SELECT {p}"),
                None => "SELECT".into(),
            },
            Self::Data { sequence, time } => resume_line("DATA", *sequence, time.as_deref()),
            Self::Fetch { sequence, time } => resume_line("FETCH", *sequence, time.as_deref()),
            Self::Time { start, end } => match end {
                Some(e) => format!("TIME {start} {e}"),
                None => format!("TIME {start}"),
            },
            Self::End => "END".into(),
            Self::Info { level } => format!("INFO {}", level.as_str()),
        }
    }

    /// Serialize to wire bytes, `\r\n` terminated.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.to_line().into_bytes();
        bytes.extend_from_slice(b"\r\n");
        bytes
    }
}

/// Format `DATA`/`FETCH` with the optional resume point.
///
/// A time argument is only meaningful together with a sequence number,
/// matching the historical command grammar.
fn resume_line(keyword: &str, sequence: Option<SequenceNumber>, time: Option<&str>) -> String {
    let mut line = keyword.to_owned();
    if let Some(seq) = sequence {
        line.push(' ');
        line.push_str(&seq.to_hex());
        if let Some(t) = time {
            line.push(' ');
            line.push_str(t);
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello() {
        assert_eq!(Command::Hello.to_bytes(), b"HELLO\r\n");
    }

    #[test]
    fn station() {
        let cmd = Command::Station {
            station: "ANMO".into(),
            network: "IU".into(),
        };
        assert_eq!(cmd.to_bytes(), b"STATION ANMO IU\r\n");
    }

    #[test]
    fn select_with_pattern() {
        let cmd = Command::Select {
            pattern: Some("BHZ.D".into()),
        };
        assert_eq!(cmd.to_bytes(), b"SELECT BHZ.D\r\n");
    }

    #[test]
    fn select_bare_clears() {
        assert_eq!(Command::Select { pattern: None }.to_bytes(), b"SELECT\r\n");
    }

    #[test]
    fn data_plain() {
        let cmd = Command::Data {
            sequence: None,
            time: None,
        };
        assert_eq!(cmd.to_bytes(), b"DATA\r\n");
    }

    #[test]
    fn data_with_sequence() {
        let cmd = Command::Data {
            sequence: Some(SequenceNumber::new(0xABCD)),
            time: None,
        };
        assert_eq!(cmd.to_bytes(), b"DATA 00ABCD\r\n");
    }

    #[test]
    fn data_with_sequence_and_time() {
        let cmd = Command::Data {
            sequence: Some(SequenceNumber::new(26)),
            time: Some("2024,01,15,10,30,00".into()),
        };
        assert_eq!(cmd.to_bytes(), b"DATA 00001A 2024,01,15,10,30,00\r\n");
    }

    #[test]
    fn data_time_without_sequence_is_omitted() {
        let cmd = Command::Data {
            sequence: None,
            time: Some("2024,01,15,10,30,00".into()),
        };
        assert_eq!(cmd.to_bytes(), b"DATA\r\n");
    }

    #[test]
    fn fetch_with_sequence() {
        let cmd = Command::Fetch {
            sequence: Some(SequenceNumber::new(0x4F)),
            time: None,
        };
        assert_eq!(cmd.to_bytes(), b"FETCH 00004F\r\n");
    }

    #[test]
    fn time_window() {
        let cmd = Command::Time {
            start: "2024,01,15,00,00,00".into(),
            end: None,
        };
        assert_eq!(cmd.to_bytes(), b"TIME 2024,01,15,00,00,00\r\n");

        let cmd = Command::Time {
            start: "2024,01,15,00,00,00".into(),
            end: Some("2024,01,16,00,00,00".into()),
        };
        assert_eq!(
            cmd.to_bytes(),
            b"TIME 2024,01,15,00,00,00 2024,01,16,00,00,00\r\n"
        );
    }

    #[test]
    fn info() {
        let cmd = Command::Info {
            level: InfoLevel::Id,
        };
        assert_eq!(cmd.to_bytes(), b"INFO ID\r\n");
    }

    #[test]
    fn batch_end_cat_bye() {
        assert_eq!(Command::Batch.to_bytes(), b"BATCH\r\n");
        assert_eq!(Command::End.to_bytes(), b"END\r\n");
        assert_eq!(Command::Cat.to_bytes(), b"CAT\r\n");
        assert_eq!(Command::Bye.to_bytes(), b"BYE\r\n");
    }
}
