//! Wire-format definitions for transfer messages.
//!
//! Every datagram exchanged during a transfer is one of:
//! - a **data packet**: sequence number followed by a payload chunk,
//! - a **control token**: `EOF`, `FAIL`, or `DNE` as raw ASCII,
//! - an **acknowledgement**: the ASCII decimal of a sequence number.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Data packet layout
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |              Sequence Number (native byte order)              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! There is no length field: the payload runs to the end of the datagram.

use crate::error::TransferError;

/// Byte length of the sequence-number header on a data packet.
pub const SEQ_LEN: usize = 4;

/// Raw control tokens.
pub mod tokens {
    /// Sender finished; every chunk was acknowledged.
    pub const EOF: &[u8] = b"EOF";
    /// Sender gave up after exhausting its retry budget.
    pub const FAIL: &[u8] = b"FAIL";
    /// Requested source file does not exist.
    pub const DNE: &[u8] = b"DNE";
}

/// Outcome signal carried by a control token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Eof,
    Fail,
    Dne,
}

impl Control {
    /// Raw bytes put on the wire for this token.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Control::Eof => tokens::EOF,
            Control::Fail => tokens::FAIL,
            Control::Dne => tokens::DNE,
        }
    }

    /// Classify `buf` as a control token by case-sensitive prefix match.
    ///
    /// Must run before [`decode_data`]: `EOF` and `DNE` are shorter than the
    /// sequence header and would otherwise be reported as short messages.
    pub fn classify(buf: &[u8]) -> Option<Self> {
        if buf.starts_with(tokens::EOF) {
            Some(Control::Eof)
        } else if buf.starts_with(tokens::FAIL) {
            Some(Control::Fail)
        } else if buf.starts_with(tokens::DNE) {
            Some(Control::Dne)
        } else {
            None
        }
    }
}

/// A received transfer datagram, decoded once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<'a> {
    Data { seq: u32, payload: &'a [u8] },
    Eof,
    Fail,
    Dne,
}

impl<'a> Message<'a> {
    /// Parse a raw datagram.
    ///
    /// Control tokens win over data framing; anything else must carry at
    /// least [`SEQ_LEN`] bytes.
    pub fn decode(buf: &'a [u8]) -> Result<Self, TransferError> {
        match Control::classify(buf) {
            Some(Control::Eof) => Ok(Message::Eof),
            Some(Control::Fail) => Ok(Message::Fail),
            Some(Control::Dne) => Ok(Message::Dne),
            None => {
                let (seq, payload) = decode_data(buf)?;
                Ok(Message::Data { seq, payload })
            }
        }
    }

    /// Serialise this message into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::Data { seq, payload } => encode_data(*seq, payload),
            Message::Eof => tokens::EOF.to_vec(),
            Message::Fail => tokens::FAIL.to_vec(),
            Message::Dne => tokens::DNE.to_vec(),
        }
    }
}

/// Frame `payload` behind its sequence number.
///
/// The caller keeps `payload` within the configured chunk size; this
/// function does not split.
pub fn encode_data(seq: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SEQ_LEN + payload.len());
    buf.extend_from_slice(&seq.to_ne_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Split a data packet into `(seq, payload)`.
pub fn decode_data(buf: &[u8]) -> Result<(u32, &[u8]), TransferError> {
    if buf.len() < SEQ_LEN {
        return Err(TransferError::ShortMessage { len: buf.len() });
    }
    let (head, payload) = buf.split_at(SEQ_LEN);
    let seq = u32::from_ne_bytes([head[0], head[1], head[2], head[3]]);
    Ok((seq, payload))
}

/// ASCII decimal acknowledgement for `seq`.
pub fn encode_ack(seq: u32) -> Vec<u8> {
    seq.to_string().into_bytes()
}

/// Parse an acknowledgement.
///
/// Trailing NUL padding and surrounding whitespace are tolerated; anything
/// that is not a plain decimal `u32` yields `None`.
pub fn parse_ack(buf: &[u8]) -> Option<u32> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let text = std::str::from_utf8(&buf[..end]).ok()?.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
