//! `uftp`: reliable file transfer over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  DATA(seq) / EOF / FAIL / DNE   ┌──────────┐
//!  │  sender  │────────────────────────────────▶│ receiver │
//!  └────┬─────┘                                 └─────┬────┘
//!       │◀──────────── ACK "seq" ─────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────────────────────────┐
//!  │  server / client   (command session: get put delete   │
//!  │                     ls exit, one command at a time)   │
//!  └────┬──────────────────────────────────────────────────┘
//!       │ raw UDP datagrams
//!  ┌────▼──────┐      ┌───────────┐
//!  │  Socket   │◀─────│ Simulator │  (optional fault injection)
//!  └───────────┘      └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]:     wire format (data packets, control tokens, acks)
//! - [`sender`]:     stop-and-wait transmitter with bounded retries
//! - [`receiver`]:   in-order acceptor that writes the destination file
//! - [`command`]:    session command parsing and validation
//! - [`server`]:     single-task command dispatcher
//! - [`client`]:     client side of each command
//! - [`config`]:     transfer tunables
//! - [`error`]:      error types
//! - [`simulator`]:  lossy/duplicating/reordering channel for testing
//! - [`socket`]:     datagram channel trait and async UDP socket

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod simulator;
pub mod socket;

pub use client::{Client, Outcome};
pub use command::{Command, CommandError};
pub use config::TransferConfig;
pub use error::{SessionError, TransferError};
pub use receiver::{receive_file, ReceiveReport};
pub use sender::{send_file, SendReport};
pub use server::Server;
pub use socket::{Channel, Socket};
