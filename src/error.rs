//! Error types for the replication client.
//!
//! A single enum covers every failure surface named in the transport,
//! protocol, snapshot decoding, and callback layers so a session's outcome
//! can always be reported as one `Result`.

use std::io;

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum CanalError {
    /// Connect/read/write/TLS-handshake failure. Fatal for the session.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Malformed RESP or RDB input: bad length, wrong terminator, unexpected
    /// reply where `OK`/`PONG` was expected, unknown RDB version or object
    /// type, invalid zipmap length, and similar. Fatal.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A module-typed RDB value (type 6 or 7) was encountered.
    #[error("not supported load module")]
    UnsupportedModule,

    /// The user's `Command` sink returned an error. Fatal for the session.
    #[error("callback error: {0}")]
    Callback(Box<dyn std::error::Error + Send + Sync>),

    /// `REPLCONF ACK` write failed on the ack thread.
    #[error("ack write error: {0}")]
    AckWrite(io::Error),
}

pub type Result<T> = std::result::Result<T, CanalError>;

impl CanalError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        CanalError::Protocol(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_displays_message() {
        let err = CanalError::protocol("invalid bulk length");
        assert_eq!(err.to_string(), "protocol error: invalid bulk length");
    }

    #[test]
    fn transport_error_wraps_io_error() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let err: CanalError = io_err.into();
        assert!(matches!(err, CanalError::Transport(_)));
    }
}
