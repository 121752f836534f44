//! Stop-and-wait acceptor.
//!
//! [`receive_file`] writes an incoming transfer to disk:
//!
//! - Only the **next expected** sequence number is accepted and written.
//! - Duplicates and out-of-order packets are discarded without buffering.
//! - Every data packet, accepted or not, is acknowledged with **its own**
//!   sequence number so the sender can tell a late duplicate from progress.
//! - `EOF` completes the file, `DNE` leaves an empty file behind, `FAIL`
//!   deletes whatever was written.
//!
//! [`Receiver`] only tracks the counters; [`receive_file`] owns the channel
//! and the file handle.

use std::net::SocketAddr;
use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::TransferError;
use crate::packet::{encode_ack, Message};
use crate::socket::{is_transient_io_error, Channel, MAX_DATAGRAM};

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Receive-side state for one transfer.
#[derive(Debug, Default)]
pub struct Receiver {
    /// Next sequence number that will be written.
    ///
    /// Advances by exactly one per accepted packet.
    pub expected_seq: u32,

    chunks: u32,
    bytes: u64,
    duplicates: u32,
}

impl Receiver {
    /// Create a receiver expecting sequence number 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process an inbound data packet header.
    ///
    /// Returns `true` if the packet is the next expected one and its payload
    /// must be written.  Returns `false` for a duplicate (seq < expected) or
    /// an out-of-order packet (seq > expected); nothing advances.  The caller
    /// acknowledges `seq` in both cases.
    pub fn on_data(&mut self, seq: u32, payload_len: usize) -> bool {
        if seq != self.expected_seq {
            self.duplicates += 1;
            return false;
        }
        // A 2^32-th chunk cannot be named; the sender refuses to produce it.
        self.expected_seq = self.expected_seq.wrapping_add(1);
        self.chunks += 1;
        self.bytes += payload_len as u64;
        true
    }

    /// Snapshot of the counters so far.
    pub fn report(&self) -> ReceiveReport {
        ReceiveReport {
            chunks: self.chunks,
            bytes: self.bytes,
            duplicates: self.duplicates,
        }
    }
}

/// Summary of a completed download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    /// Chunks written to the file.
    pub chunks: u32,
    /// Payload bytes written to the file.
    pub bytes: u64,
    /// Data packets acknowledged but not written.
    pub duplicates: u32,
}

/// How the sender ended the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Eof,
    Fail,
    Dne,
}

// ---------------------------------------------------------------------------
// Transfer driver
// ---------------------------------------------------------------------------

/// Receive a file from `peer` into `path`, creating or truncating it.
///
/// Blocks without a timeout until the sender ends the stream: the sender's
/// retries and control tokens drive progress.  Datagrams from any address
/// other than `peer` are ignored, as are datagrams too short to decode.
pub async fn receive_file<C: Channel>(
    path: &Path,
    channel: &C,
    peer: SocketAddr,
) -> Result<ReceiveReport, TransferError> {
    let file = File::create(path).await?;
    receive_into(file, path, channel, peer).await
}

/// Like [`receive_file`], but writes to `file`, already created at `path`.
///
/// Lets a caller make sure the destination is writable before asking the
/// peer to start sending.  `path` is removed if the sender aborts.
pub async fn receive_into<C: Channel>(
    mut file: File,
    path: &Path,
    channel: &C,
    peer: SocketAddr,
) -> Result<ReceiveReport, TransferError> {
    let mut receiver = Receiver::new();

    let end = accept_stream(&mut file, &mut receiver, channel, peer).await;
    let flushed = file.flush().await;
    drop(file);

    match end? {
        StreamEnd::Eof => {
            flushed?;
            let report = receiver.report();
            log::info!(
                "[recv] {} complete: {} chunk(s), {} byte(s), {} duplicate(s)",
                path.display(),
                report.chunks,
                report.bytes,
                report.duplicates
            );
            Ok(report)
        }
        StreamEnd::Dne => {
            log::info!("[recv] remote source for {} absent", path.display());
            Err(TransferError::SourceNotFound)
        }
        StreamEnd::Fail => {
            log::warn!("[recv] sender aborted; removing {}", path.display());
            if let Err(e) = tokio::fs::remove_file(path).await {
                log::warn!("[recv] could not remove {}: {e}", path.display());
            }
            Err(TransferError::PeerAborted)
        }
    }
}

/// Accept packets until a control token arrives.
async fn accept_stream<C: Channel>(
    file: &mut File,
    receiver: &mut Receiver,
    channel: &C,
    peer: SocketAddr,
) -> Result<StreamEnd, TransferError> {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let (n, from) = match channel.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) if is_transient_io_error(&e) => {
                log::debug!("[recv] transient receive error: {e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if from != peer {
            log::debug!("[recv] ignoring datagram from {from}");
            continue;
        }

        let (seq, payload) = match Message::decode(&buf[..n]) {
            Ok(Message::Eof) => return Ok(StreamEnd::Eof),
            Ok(Message::Fail) => return Ok(StreamEnd::Fail),
            Ok(Message::Dne) => return Ok(StreamEnd::Dne),
            Ok(Message::Data { seq, payload }) => (seq, payload),
            Err(e) => {
                log::warn!("[recv] dropping undecodable datagram: {e}");
                continue;
            }
        };

        let accepted = receiver.on_data(seq, payload.len());
        if accepted {
            file.write_all(payload).await?;
        }
        if let Err(e) = channel.send_to(&encode_ack(seq), peer).await {
            log::warn!("[recv] failed to send ACK {seq}: {e}");
        }
        log::debug!(
            "[recv] ← DATA seq={seq} len={} accepted={accepted}; → ACK {seq}",
            payload.len()
        );
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
