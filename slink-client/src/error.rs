use std::time::Duration;

use slink_protocol::ProtocolError;

/// Errors surfaced by the connection engine and its collaborators.
///
/// Network-level failures (I/O, timeouts, disconnects) are handled
/// internally by the reconnect logic and normally never reach the
/// caller of `collect`; they surface only from one-shot operations
/// such as `ping`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration rejected before any connection attempt.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Uni-station and multi-station subscriptions cannot be mixed.
    #[error("uni-station and multi-station modes cannot be mixed")]
    ModeConflict,

    /// TCP or socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol parsing error outside the data stream.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Non-miniSEED data received mid-stream; the connection context is
    /// not recoverable.
    #[error("non-miniSEED data received: {0}")]
    DecodeFatal(ProtocolError),

    /// Operation exceeded its timeout.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Server closed the connection.
    #[error("disconnected")]
    Disconnected,

    /// Server rejected a command during negotiation.
    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    /// Server reported a stream-level error after negotiation.
    #[error("server error: {0}")]
    ServerError(String),

    /// An INFO request is already in flight.
    #[error("an INFO request is already pending")]
    InfoPending,
}

/// Convenience alias for `Result<T, EngineError>`.
pub type Result<T> = std::result::Result<T, EngineError>;
