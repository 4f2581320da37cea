#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame header too short: expected {expected}, actual {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    #[error("invalid signature: expected \"SL\", actual {actual:?}")]
    InvalidSignature { actual: [u8; 2] },

    #[error("invalid sequence: {0}")]
    InvalidSequence(String),

    #[error("buffer does not contain a miniSEED record")]
    UnrecognizedRecord,

    #[error("invalid blockette chain: next offset {next} at blockette offset {offset}")]
    BadBlocketteChain { offset: usize, next: usize },

    #[error("record length {0} outside supported range")]
    RecordLengthOutOfRange(usize),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("invalid info level: {0}")]
    InvalidInfoLevel(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
