use crate::fault::ErrorKind;
use thiserror::Error;
use tracker_shared::codec::CodecError;

/// Errors raised by a cloud transport or the connection task
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed")]
    Closed,

    #[error("Connect timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl TransportError {
    /// Classify for escalation
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::NotConnected | TransportError::Timeout | TransportError::Io(_) => {
                ErrorKind::TransportRecoverable
            }
            TransportError::Closed => ErrorKind::TransportIrrecoverable,
            TransportError::Codec(_) => ErrorKind::Cloud,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(
            TransportError::NotConnected.kind(),
            ErrorKind::TransportRecoverable
        );
        assert_eq!(
            TransportError::Io(std::io::ErrorKind::BrokenPipe.into()).kind(),
            ErrorKind::TransportRecoverable
        );
        assert_eq!(
            TransportError::Closed.kind(),
            ErrorKind::TransportIrrecoverable
        );
        assert_eq!(
            TransportError::Codec(CodecError::EmptyBatch).kind(),
            ErrorKind::Cloud
        );
    }
}
