//! Datagram channel abstraction.
//!
//! [`Channel`] is the only thing the transfer layer knows about the network:
//! send a datagram to an address, receive one, optionally with a deadline.
//! [`Socket`] implements it over `tokio::net::UdpSocket`;
//! [`crate::simulator::Simulator`] wraps any channel to inject faults.
//!
//! The receive timeout is an argument of [`Channel::recv_from_timeout`], not
//! socket state, so no call can leak a stale timeout into the next one.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

/// Maximum UDP payload size (theoretical limit; in practice kept much smaller).
pub const MAX_DATAGRAM: usize = 65_535;

/// A bound, message-oriented endpoint.
///
/// All methods take `&self` so one channel can be lent to the sender or
/// receiver while the caller keeps ownership.
#[allow(async_fn_in_trait)]
pub trait Channel {
    /// Send `bytes` as a single datagram to `dest`.
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<()>;

    /// Block until the next datagram arrives; returns `(len, source)`.
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Like [`Channel::recv_from`], but gives up after `timeout`.
    ///
    /// Returns `Ok(None)` when the deadline passes with nothing received.
    async fn recv_from_timeout(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        match tokio::time::timeout(timeout, self.recv_from(buf)).await {
            Ok(result) => result.map(Some),
            Err(_elapsed) => Ok(None),
        }
    }
}

impl<C: Channel + ?Sized> Channel for &C {
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<()> {
        (**self).send_to(bytes, dest).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        (**self).recv_from(buf).await
    }

    async fn recv_from_timeout(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        (**self).recv_from_timeout(buf, timeout).await
    }
}

/// Returns true if a receive error is likely a leftover ICMP bounce or an
/// interrupted call, and the next receive may succeed.
pub fn is_transient_io_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
    )
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async UDP socket speaking raw datagrams.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }
}

impl Channel for Socket {
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<()> {
        let n = self.inner.send_to(bytes, dest).await?;
        if n != bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("datagram truncated: sent {n} of {} bytes", bytes.len()),
            ));
        }
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }
}
