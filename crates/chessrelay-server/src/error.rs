use chessrelay_wire::DecodeError;

/// Errors that can surface while servicing a connection. Not every one is
/// fatal to the worker that hit it: most are logged through the
/// [`crate::error_sink::ErrorSink`] and the offending connection is dropped,
/// the worker itself keeps running.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Decode(#[from] DecodeError),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("lobby is at capacity")]
    CapacityExceeded,

    #[error("message type is not legal in this context")]
    IllegalMessage,
}
