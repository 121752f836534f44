//! Tunable transfer parameters.
//!
//! [`TransferConfig`] is threaded explicitly through every sender, receiver,
//! server, and client call.  Nothing here is global: the ack timeout in
//! particular is passed to each receive rather than stored on the socket.

use std::time::Duration;

/// Default maximum payload bytes per data packet.
pub const DEFAULT_CHUNK_SIZE: usize = 16_000;

/// Default number of transmissions per chunk before the sender gives up.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Largest payload that still fits a single IPv4 UDP datagram after the
/// 4-byte sequence header.
pub const MAX_CHUNK_SIZE: usize = 65_507 - crate::packet::SEQ_LEN;

/// Adjustable transfer parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Maximum payload bytes per data packet (`CHUNK_MAX`).
    pub chunk_size: usize,
    /// Transmissions allowed per chunk, first send included.
    pub max_retries: u32,
    /// How long the sender waits for each acknowledgement.
    pub ack_timeout: Duration,
    /// How long a client waits for a textual reply from the server.
    pub reply_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            ack_timeout: Duration::from_secs(2),
            reply_timeout: Duration::from_secs(5),
        }
    }
}

impl TransferConfig {
    /// Reject settings the protocol cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::ChunkSize(self.chunk_size));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        if self.ack_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("ack"));
        }
        if self.reply_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("reply"));
        }
        Ok(())
    }
}

/// Invalid [`TransferConfig`] values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunk size {0} outside 1..={MAX_CHUNK_SIZE}")]
    ChunkSize(usize),
    #[error("max retries must be at least 1")]
    ZeroRetries,
    #[error("{0} timeout must be non-zero")]
    ZeroTimeout(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let c = TransferConfig::default();
        assert_eq!(c.chunk_size, 16_000);
        assert_eq!(c.max_retries, 5);
        assert_eq!(c.ack_timeout, Duration::from_secs(2));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn oversized_chunk_rejected() {
        let c = TransferConfig {
            chunk_size: MAX_CHUNK_SIZE + 1,
            ..Default::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::ChunkSize(MAX_CHUNK_SIZE + 1)));
    }

    #[test]
    fn zero_values_rejected() {
        let c = TransferConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());

        let c = TransferConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::ZeroRetries));

        let c = TransferConfig {
            ack_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::ZeroTimeout("ack")));
    }
}
