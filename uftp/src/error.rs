//! Error taxonomy for the transfer layer and the command session on top.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::command::CommandError;
use crate::config::ConfigError;
use crate::packet::SEQ_LEN;

/// Every way a single file transfer can end other than success.
///
/// [`TransferError::Timeout`] and [`TransferError::ShortMessage`] are
/// absorbed inside the sender and receiver loops; callers of
/// [`crate::sender::send_file`] and [`crate::receiver::receive_file`] only
/// see the terminal variants.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The source file is absent: locally for the sender, or the peer
    /// reported `DNE` to the receiver.
    #[error("source file not found")]
    SourceNotFound,

    /// A chunk went unacknowledged for the whole retry budget and `FAIL`
    /// was sent to the peer.
    #[error("chunk {seq} unacknowledged after {attempts} attempts; transfer aborted")]
    RetryBudgetExhausted { seq: u32, attempts: u32 },

    /// The peer sent `FAIL`; the partially written file was removed.
    #[error("peer aborted the transfer")]
    PeerAborted,

    /// A datagram too short to carry a sequence number.
    #[error("short message: {len} bytes, need at least {SEQ_LEN}")]
    ShortMessage { len: usize },

    /// No acknowledgement arrived within the configured window.
    #[error("timed out waiting for acknowledgement")]
    Timeout,

    /// The file needs more chunks than a 32-bit sequence number can name.
    #[error("sequence number space exhausted")]
    SequenceExhausted,

    /// The transfer settings cannot run the protocol; nothing was read.
    #[error("invalid transfer settings: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// File or socket failure.
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// `true` for outcomes the peer was told about with a control token.
    pub fn is_signaled(&self) -> bool {
        matches!(
            self,
            TransferError::SourceNotFound
                | TransferError::RetryBudgetExhausted { .. }
                | TransferError::PeerAborted
                | TransferError::InvalidConfig(_)
        )
    }
}

/// Failures of one client/server command exchange.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Command(#[from] CommandError),

    /// `put` was asked for a file the client does not have.
    #[error("local file {} does not exist", .0.display())]
    LocalFileMissing(PathBuf),

    #[error("no reply from server within {0:?}")]
    NoReply(Duration),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_distinguish_terminal_outcomes() {
        let missing = TransferError::SourceNotFound.to_string();
        let aborted = TransferError::RetryBudgetExhausted { seq: 2, attempts: 5 }.to_string();
        assert_eq!(missing, "source file not found");
        assert!(aborted.contains("chunk 2"));
        assert!(aborted.contains("5 attempts"));
    }

    #[test]
    fn config_errors_convert() {
        let e: TransferError = ConfigError::ChunkSize(0).into();
        assert!(matches!(e, TransferError::InvalidConfig(ConfigError::ChunkSize(0))));
        assert!(e.to_string().contains("chunk size 0"));
    }

    #[test]
    fn io_errors_convert() {
        let e: TransferError = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(matches!(e, TransferError::Io(_)));
        assert!(!e.is_signaled());
    }

    #[test]
    fn session_error_wraps_transfer_outcome() {
        let e: SessionError = TransferError::PeerAborted.into();
        assert_eq!(e.to_string(), "peer aborted the transfer");
        assert!(matches!(
            e,
            SessionError::Transfer(TransferError::PeerAborted)
        ));
    }
}
