//! Command server.
//!
//! One task, one socket, one client at a time:
//!
//! ```text
//!  recv command ──▶ parse ──▶ get    ─▶ send_file(root/name)
//!       ▲                  ├─▶ put    ─▶ receive_file(root/name) ─▶ reply
//!       │                  ├─▶ delete ─▶ remove_file             ─▶ reply
//!       │                  ├─▶ ls     ─▶ read_dir                ─▶ reply
//!       │                  └─▶ exit   ─▶ reply
//!       └──────────────────────────────────────────────────────────┘
//! ```
//!
//! A transfer runs to completion before the next command is read, so the
//! transfer owns the socket for its whole duration.  Unparseable datagrams
//! are logged and dropped without a reply.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::command::Command;
use crate::config::{ConfigError, TransferConfig};
use crate::error::{SessionError, TransferError};
use crate::receiver::receive_file;
use crate::sender::send_file;
use crate::socket::{is_transient_io_error, Channel, MAX_DATAGRAM};

/// Largest text reply the server sends in one datagram.
pub const MAX_REPLY: usize = 8192;

/// Sent in answer to `exit`.
pub const GOODBYE: &str = "Goodbye Client. Done with all operations!";

/// `ls` reply for a directory with no entries.
pub const EMPTY_LISTING: &str = "(empty)";

/// Serves files under `root` to whoever sends commands to `channel`.
#[derive(Debug)]
pub struct Server<C> {
    channel: C,
    root: PathBuf,
    config: TransferConfig,
}

impl<C: Channel> Server<C> {
    /// Fails if `config` does not pass [`TransferConfig::validate`].
    pub fn new(
        channel: C,
        root: impl Into<PathBuf>,
        config: TransferConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            channel,
            root: root.into(),
            config,
        })
    }

    /// Directory served.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serve commands until receiving from the socket fails.
    ///
    /// Errors from a single command are logged and do not stop the loop.
    pub async fn run(&self) -> Result<(), SessionError> {
        log::info!("[server] serving {}", self.root.display());
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (n, client) = match self.channel.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) if is_transient_io_error(&e) => continue,
                Err(e) => {
                    log::error!("[server] socket failure: {e}");
                    return Err(e.into());
                }
            };
            if let Err(e) = self.handle(&buf[..n], client).await {
                log::warn!("[server] command from {client} failed: {e}");
            }
        }
    }

    /// Receive and execute exactly one command datagram.
    ///
    /// Returns the command handled, or `None` if the datagram did not parse.
    pub async fn serve_one(&self) -> Result<Option<Command>, SessionError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, client) = self.channel.recv_from(&mut buf).await?;
        self.handle(&buf[..n], client).await
    }

    async fn handle(
        &self,
        datagram: &[u8],
        client: SocketAddr,
    ) -> Result<Option<Command>, SessionError> {
        let command = match Command::from_datagram(datagram) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("[server] ignoring datagram from {client}: {e}");
                return Ok(None);
            }
        };
        log::info!("[server] {client} → {command}");
        self.dispatch(&command, client).await?;
        Ok(Some(command))
    }

    async fn dispatch(&self, command: &Command, client: SocketAddr) -> Result<(), SessionError> {
        match command {
            Command::Get(name) => self.get(name, client).await,
            Command::Put(name) => self.put(name, client).await,
            Command::Delete(name) => {
                let reply = self.delete(name).await;
                self.reply(&reply, client).await
            }
            Command::Ls => {
                let listing = match list_dir(&self.root).await {
                    Ok(listing) => listing,
                    Err(e) => {
                        log::warn!("[server] ls {}: {e}", self.root.display());
                        format!("Could not list directory: {e}")
                    }
                };
                self.reply(&listing, client).await
            }
            Command::Exit => self.reply(GOODBYE, client).await,
        }
    }

    async fn get(&self, name: &str, client: SocketAddr) -> Result<(), SessionError> {
        match send_file(&self.root.join(name), &self.channel, client, &self.config).await {
            Ok(report) => {
                log::info!("[server] sent {name} ({} bytes)", report.bytes);
                Ok(())
            }
            // The client has been told with DNE or FAIL.
            Err(e) if e.is_signaled() => {
                log::info!("[server] get {name}: {e}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, name: &str, client: SocketAddr) -> Result<(), SessionError> {
        let outcome = receive_file(&self.root.join(name), &self.channel, client).await;
        let reply = match &outcome {
            Ok(_) => format!("Put {name} successful!"),
            Err(_) => format!("Put {name} not successful!"),
        };
        self.reply(&reply, client).await?;
        match outcome {
            Ok(report) => {
                log::info!("[server] stored {name} ({} bytes)", report.bytes);
                Ok(())
            }
            Err(TransferError::PeerAborted | TransferError::SourceNotFound) => {
                log::info!("[server] put {name} abandoned by client");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> String {
        match tokio::fs::remove_file(self.root.join(name)).await {
            Ok(()) => {
                log::info!("[server] deleted {name}");
                format!("Delete {name} successful!")
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                format!("{name} does not exist on server!")
            }
            Err(e) => {
                log::warn!("[server] delete {name}: {e}");
                format!("Delete {name} not successful: {e}")
            }
        }
    }

    async fn reply(&self, text: &str, client: SocketAddr) -> Result<(), SessionError> {
        self.channel.send_to(text.as_bytes(), client).await?;
        log::debug!("[server] → {client}: {} byte reply", text.len());
        Ok(())
    }
}

/// Sorted entry names of `dir`, one per line, directories marked with `/`.
///
/// Entries that would push the reply past [`MAX_REPLY`] are left off.
pub async fn list_dir(dir: &Path) -> io::Result<String> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    if names.is_empty() {
        return Ok(EMPTY_LISTING.to_string());
    }
    names.sort();

    let mut listing = String::new();
    for name in names {
        let sep = usize::from(!listing.is_empty());
        if listing.len() + sep + name.len() > MAX_REPLY {
            log::warn!("[server] listing truncated at {} bytes", listing.len());
            break;
        }
        if sep == 1 {
            listing.push('\n');
        }
        listing.push_str(&name);
    }
    Ok(listing)
}
