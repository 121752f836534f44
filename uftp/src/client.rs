//! Command client.
//!
//! Each operation sends one command datagram to the server, then either runs
//! a transfer (`get`, `put`) or waits for a one-datagram text reply.
//!
//! Before every command the socket is drained, so late ACKs or retransmits
//! from a previous transfer are never mistaken for the next reply.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::time::Instant;

use crate::command::Command;
use crate::config::{ConfigError, TransferConfig};
use crate::error::SessionError;
use crate::packet::parse_ack;
use crate::receiver::{receive_into, ReceiveReport};
use crate::sender::{send_file, SendReport};
use crate::socket::{is_transient_io_error, Channel, MAX_DATAGRAM};

/// What a successful command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A file arrived from the server.
    Received(ReceiveReport),
    /// A file was uploaded; `reply` is the server's verdict.
    Sent { report: SendReport, reply: String },
    /// Text reply to `delete`, `ls` or `exit`.
    Reply(String),
}

/// Talks to one server over `channel`.
#[derive(Debug)]
pub struct Client<C> {
    channel: C,
    server: SocketAddr,
    local_dir: PathBuf,
    config: TransferConfig,
}

impl<C: Channel> Client<C> {
    /// Files are read from and written to the current directory.
    ///
    /// Fails if `config` does not pass [`TransferConfig::validate`].
    pub fn new(
        channel: C,
        server: SocketAddr,
        config: TransferConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            channel,
            server,
            local_dir: PathBuf::from("."),
            config,
        })
    }

    /// Use `dir` instead of the current directory for local files.
    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = dir.into();
        self
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Run `command` against the server.
    pub async fn execute(&self, command: &Command) -> Result<Outcome, SessionError> {
        match command {
            Command::Get(name) => self.get(name).await.map(Outcome::Received),
            Command::Put(name) => {
                let (report, reply) = self.put(name).await?;
                Ok(Outcome::Sent { report, reply })
            }
            Command::Delete(name) => self.delete(name).await.map(Outcome::Reply),
            Command::Ls => self.ls().await.map(Outcome::Reply),
            Command::Exit => self.exit().await.map(Outcome::Reply),
        }
    }

    /// Download `name` into the local directory.
    ///
    /// The local file is created first; if that fails nothing is sent.  If
    /// the server lacks the file, the empty local file is left behind and
    /// [`crate::error::TransferError::SourceNotFound`] is returned.
    pub async fn get(&self, name: &str) -> Result<ReceiveReport, SessionError> {
        let path = self.local_dir.join(name);
        let file = File::create(&path).await?;
        self.send_command(&Command::Get(name.to_string())).await?;
        let report = receive_into(file, &path, &self.channel, self.server).await?;
        Ok(report)
    }

    /// Upload `name` from the local directory; returns the server's reply.
    ///
    /// Nothing is sent if the local file does not exist.
    pub async fn put(&self, name: &str) -> Result<(SendReport, String), SessionError> {
        let path = self.local_dir.join(name);
        let is_file = tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file());
        if !is_file {
            return Err(SessionError::LocalFileMissing(path));
        }

        self.send_command(&Command::Put(name.to_string())).await?;
        let sent = send_file(&path, &self.channel, self.server, &self.config).await;
        let reply = self.await_reply(true).await;
        match sent {
            Ok(report) => Ok((report, reply?)),
            Err(e) => {
                if let Ok(reply) = reply {
                    log::info!("[client] server: {reply}");
                }
                Err(e.into())
            }
        }
    }

    pub async fn delete(&self, name: &str) -> Result<String, SessionError> {
        self.request(&Command::Delete(name.to_string())).await
    }

    pub async fn ls(&self) -> Result<String, SessionError> {
        self.request(&Command::Ls).await
    }

    pub async fn exit(&self) -> Result<String, SessionError> {
        self.request(&Command::Exit).await
    }

    async fn request(&self, command: &Command) -> Result<String, SessionError> {
        self.send_command(command).await?;
        self.await_reply(false).await
    }

    async fn send_command(&self, command: &Command) -> Result<(), SessionError> {
        self.drain_stale().await?;
        self.channel.send_to(&command.encode(), self.server).await?;
        log::debug!("[client] → {command}");
        Ok(())
    }

    /// Discard every datagram already queued on the socket.
    async fn drain_stale(&self) -> Result<(), SessionError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            match self.channel.recv_from_timeout(&mut buf, Duration::ZERO).await {
                Ok(Some((n, from))) => {
                    log::debug!("[client] discarding stale {n} byte datagram from {from}")
                }
                Ok(None) => return Ok(()),
                Err(e) if is_transient_io_error(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Wait up to the reply timeout for a text datagram from the server.
    ///
    /// With `skip_acks`, all-digit datagrams are treated as stray ACKs from
    /// the preceding transfer and skipped.
    async fn await_reply(&self, skip_acks: bool) -> Result<String, SessionError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let deadline = Instant::now() + self.config.reply_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let (n, from) = match self.channel.recv_from_timeout(&mut buf, remaining).await {
                Ok(Some(v)) => v,
                Ok(None) => return Err(SessionError::NoReply(self.config.reply_timeout)),
                Err(e) if is_transient_io_error(&e) => continue,
                Err(e) => return Err(e.into()),
            };
            if from != self.server {
                log::debug!("[client] ignoring datagram from {from}");
                continue;
            }
            if skip_acks && parse_ack(&buf[..n]).is_some() {
                log::debug!("[client] skipping stray ACK");
                continue;
            }
            let reply = String::from_utf8_lossy(&buf[..n]).into_owned();
            log::debug!("[client] ← {reply:?}");
            return Ok(reply);
        }
    }
}

/// Resolve `host:port`, preferring an IPv4 address.
///
/// A server bound to `0.0.0.0` is unreachable over `::1`, and resolvers
/// often list `::1` first for `localhost`.
pub async fn resolve_server(host: &str) -> io::Result<SocketAddr> {
    let addrs = tokio::net::lookup_host(host).await?;
    prefer_ipv4(addrs).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no address found for {host}"),
        )
    })
}

/// First IPv4 address in `addrs`, else the first address of any family.
pub fn prefer_ipv4(addrs: impl IntoIterator<Item = SocketAddr>) -> Option<SocketAddr> {
    let mut fallback = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr);
        }
        fallback = fallback.or(Some(addr));
    }
    fallback
}
