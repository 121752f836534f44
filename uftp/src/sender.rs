//! Stop-and-wait transmitter.
//!
//! [`send_file`] streams a file to a peer one chunk at a time.  Each chunk is
//! framed with a sequence number and retransmitted until the peer echoes that
//! sequence number back or the retry budget runs out.
//!
//! [`Sender`] holds the per-transfer state and does **not** touch the
//! channel; [`send_file`] owns the actual send/receive loop.
//!
//! # Stop-and-Wait contract
//! - At most **one** chunk is in flight at any moment (`unacked`).
//! - A new chunk may only be loaded once `unacked` is `None`.
//! - On matching ACK: advance `next_seq` by one; clear `unacked`.
//! - On timeout or mismatched ACK: resend the same datagram unchanged.
//! - After `max_retries` transmissions without a match: send `FAIL` and stop.

use std::net::SocketAddr;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::packet::{encode_data, parse_ack, Control};
use crate::socket::Channel;

/// Acks are short decimal strings; anything longer is garbage anyway.
const ACK_BUF_LEN: usize = 64;

// ---------------------------------------------------------------------------
// RetransmitEntry
// ---------------------------------------------------------------------------

/// A chunk that has been framed but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitEntry {
    /// Sequence number carried by `datagram`.
    pub seq: u32,
    /// The framed data packet, resent byte-for-byte on every attempt.
    pub datagram: Vec<u8>,
    /// How many times this chunk has been transmitted (1 = first send).
    pub tx_count: u32,
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Stop-and-wait send-side state for one transfer.
#[derive(Debug)]
pub struct Sender {
    /// Sequence number for the **next** chunk to load.
    ///
    /// `None` once `u32::MAX` has been used.
    pub next_seq: Option<u32>,

    /// The in-flight chunk, or `None` when the sender is idle.
    pub unacked: Option<RetransmitEntry>,

    max_retries: u32,
    retransmissions: u32,
}

impl Sender {
    /// Create an idle sender that will number chunks from 0.
    pub fn new(max_retries: u32) -> Self {
        Self {
            next_seq: Some(0),
            unacked: None,
            max_retries,
            retransmissions: 0,
        }
    }

    /// Frame `payload` as the next chunk and place it in the in-flight slot.
    ///
    /// Returns the sequence number assigned.
    pub fn load(&mut self, payload: &[u8]) -> Result<u32, TransferError> {
        debug_assert!(
            self.unacked.is_none(),
            "load called while a chunk is already in flight"
        );
        let seq = self.next_seq.ok_or(TransferError::SequenceExhausted)?;
        self.unacked = Some(RetransmitEntry {
            seq,
            datagram: encode_data(seq, payload),
            tx_count: 0,
        });
        Ok(seq)
    }

    /// Count one transmission of the in-flight chunk and return its bytes.
    ///
    /// Returns `None` when idle or when the retry budget is already spent.
    pub fn on_transmit(&mut self) -> Option<&[u8]> {
        let entry = self.unacked.as_mut()?;
        if entry.tx_count >= self.max_retries {
            return None;
        }
        if entry.tx_count > 0 {
            self.retransmissions += 1;
        }
        entry.tx_count += 1;
        Some(&entry.datagram)
    }

    /// Process an inbound ACK value.
    ///
    /// Returns `true` if it names the in-flight chunk; the slot is cleared and
    /// `next_seq` advances.  Returns `false` for a stale or unexpected ACK.
    pub fn on_ack(&mut self, ack: u32) -> bool {
        match self.unacked {
            Some(ref entry) if entry.seq == ack => {
                self.next_seq = ack.checked_add(1);
                self.unacked = None;
                true
            }
            _ => false,
        }
    }

    /// `true` once the in-flight chunk has used every allowed transmission.
    pub fn is_exhausted(&self) -> bool {
        self.unacked
            .as_ref()
            .is_some_and(|e| e.tx_count >= self.max_retries)
    }

    /// Number of times the in-flight chunk has been sent, or `0` when idle.
    pub fn retransmit_count(&self) -> u32 {
        self.unacked.as_ref().map_or(0, |e| e.tx_count)
    }

    /// Transmissions beyond the first, summed over the whole transfer.
    pub fn retransmissions(&self) -> u32 {
        self.retransmissions
    }

    /// `true` when a chunk is waiting for an ACK.
    pub fn has_unacked(&self) -> bool {
        self.unacked.is_some()
    }
}

// ---------------------------------------------------------------------------
// Transfer driver
// ---------------------------------------------------------------------------

/// Summary of a completed upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Chunks delivered (and acknowledged).
    pub chunks: u32,
    /// Payload bytes delivered.
    pub bytes: u64,
    /// Transmissions beyond the first, over all chunks.
    pub retransmissions: u32,
}

/// Reliably send the file at `path` to `peer`.
///
/// - Invalid `config`: `FAIL` is sent once so the peer does not wait, and
///   [`TransferError::InvalidConfig`] returned before the source is opened.
/// - Missing source: `DNE` is sent once and [`TransferError::SourceNotFound`]
///   returned.
/// - Retry budget exhausted on some chunk: `FAIL` is sent once and
///   [`TransferError::RetryBudgetExhausted`] returned; no further chunks are
///   read.
/// - Otherwise every chunk is acknowledged in order and `EOF` is sent.
///
/// The ack timeout applies only to the receives made inside this call.
pub async fn send_file<C: Channel>(
    path: &Path,
    channel: &C,
    peer: SocketAddr,
    config: &TransferConfig,
) -> Result<SendReport, TransferError> {
    if let Err(e) = config.validate() {
        log::warn!("[send] refusing {}: {e}", path.display());
        if let Err(io) = send_control(channel, peer, Control::Fail).await {
            log::warn!("[send] could not deliver FAIL: {io}");
        }
        return Err(e.into());
    }

    let mut file = match File::open(path).await {
        Ok(f) => f,
        Err(e) => {
            log::warn!("[send] cannot open {}: {e}", path.display());
            if let Err(io) = send_control(channel, peer, Control::Dne).await {
                log::warn!("[send] could not deliver DNE: {io}");
            }
            return Err(if e.kind() == std::io::ErrorKind::NotFound {
                TransferError::SourceNotFound
            } else {
                TransferError::Io(e)
            });
        }
    };

    let mut sender = Sender::new(config.max_retries);
    match stream_chunks(&mut file, &mut sender, channel, peer, config).await {
        Ok(mut report) => {
            send_control(channel, peer, Control::Eof).await?;
            report.retransmissions = sender.retransmissions();
            log::info!(
                "[send] {} complete: {} chunk(s), {} byte(s), {} retransmission(s)",
                path.display(),
                report.chunks,
                report.bytes,
                report.retransmissions
            );
            Ok(report)
        }
        Err(e) => {
            log::warn!("[send] {} aborted: {e}", path.display());
            if let Err(io) = send_control(channel, peer, Control::Fail).await {
                log::warn!("[send] could not deliver FAIL: {io}");
            }
            Err(e)
        }
    }
}

/// Read, frame, and deliver every chunk of `file` in order.
async fn stream_chunks<C: Channel>(
    file: &mut File,
    sender: &mut Sender,
    channel: &C,
    peer: SocketAddr,
    config: &TransferConfig,
) -> Result<SendReport, TransferError> {
    let mut chunk = vec![0u8; config.chunk_size];
    let mut ack_buf = [0u8; ACK_BUF_LEN];
    let mut report = SendReport::default();

    loop {
        let n = read_chunk(file, &mut chunk).await?;
        if n == 0 {
            return Ok(report);
        }
        let seq = sender.load(&chunk[..n])?;
        deliver(sender, channel, peer, config, &mut ack_buf).await?;
        log::debug!("[send] ← ACK {seq}");
        report.chunks += 1;
        report.bytes += n as u64;
    }
}

/// Transmit the in-flight chunk until it is acknowledged or the budget runs out.
async fn deliver<C: Channel>(
    sender: &mut Sender,
    channel: &C,
    peer: SocketAddr,
    config: &TransferConfig,
    ack_buf: &mut [u8],
) -> Result<(), TransferError> {
    let seq = match sender.unacked {
        Some(ref e) => e.seq,
        None => return Ok(()),
    };

    while let Some(datagram) = sender.on_transmit() {
        let sent = channel.send_to(datagram, peer).await;
        let attempt = sender.retransmit_count();
        if let Err(e) = sent {
            log::warn!("[send] seq={seq} send failed: {e}");
        } else {
            log::debug!("[send] → DATA seq={seq} attempt={attempt}");
            match await_ack(channel, peer, ack_buf, config).await {
                Ok(Some(ack)) if sender.on_ack(ack) => return Ok(()),
                Ok(Some(ack)) => log::debug!("[send] ← stale ACK {ack} while waiting for {seq}"),
                Ok(None) => log::debug!("[send] ← unusable datagram while waiting for {seq}"),
                Err(TransferError::Timeout) => {
                    log::debug!("[send] seq={seq} no ACK within {:?}", config.ack_timeout)
                }
                Err(e) => log::warn!("[send] seq={seq} receive failed: {e}"),
            }
        }
        if !sender.is_exhausted() {
            log::warn!(
                "[send] retrying seq={seq} ({attempt}/{} attempts used)",
                config.max_retries
            );
        }
    }

    log::warn!("[send] maximum retries reached for seq={seq}");
    Err(TransferError::RetryBudgetExhausted {
        seq,
        attempts: config.max_retries,
    })
}

/// Wait one ack window for a reply from `peer`.
///
/// Datagrams from other addresses are skipped without ending the window.
/// `Ok(None)` means the peer sent something that is not an ACK.
async fn await_ack<C: Channel>(
    channel: &C,
    peer: SocketAddr,
    buf: &mut [u8],
    config: &TransferConfig,
) -> Result<Option<u32>, TransferError> {
    let deadline = Instant::now() + config.ack_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match channel.recv_from_timeout(buf, remaining).await? {
            None => return Err(TransferError::Timeout),
            Some((_, from)) if from != peer => {
                log::debug!("[send] ignoring datagram from {from}");
            }
            Some((n, _)) => return Ok(parse_ack(&buf[..n])),
        }
    }
}

/// Fill `buf` from `file`, stopping early only at end of file.
async fn read_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

async fn send_control<C: Channel>(
    channel: &C,
    peer: SocketAddr,
    control: Control,
) -> Result<(), TransferError> {
    channel.send_to(control.as_bytes(), peer).await?;
    log::debug!("[send] → {control:?}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
