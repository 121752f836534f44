//! Entry point for `uftp`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! All protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, argument parsing) and the interactive prompt.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use uftp::client::resolve_server;
use uftp::config::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES};
use uftp::{Client, Command, Outcome, Server, SessionError, Socket, TransferConfig, TransferError};

/// Reliable file transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Serve files from a directory.
    Server {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Directory to serve.
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
        #[command(flatten)]
        transfer: TransferArgs,
    },
    /// Connect to a server and run commands typed on stdin.
    Client {
        /// Remote server address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        server: String,
        /// Local directory for downloads and uploads.
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
        #[command(flatten)]
        transfer: TransferArgs,
    },
}

#[derive(Args)]
struct TransferArgs {
    /// Maximum payload bytes per data packet.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    /// Transmissions per chunk before giving up.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,
    /// Acknowledgement timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    ack_timeout_ms: u64,
    /// Server reply timeout in milliseconds.
    #[arg(long, default_value_t = 5000)]
    reply_timeout_ms: u64,
}

impl TransferArgs {
    fn into_config(self) -> Result<TransferConfig> {
        let config = TransferConfig {
            chunk_size: self.chunk_size,
            max_retries: self.max_retries,
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            reply_timeout: Duration::from_millis(self.reply_timeout_ms),
        };
        config.validate().context("invalid transfer settings")?;
        Ok(config)
    }
}

const MENU: &str = "\
Commands:
  get <file>      download a file from the server
  put <file>      upload a file to the server
  delete <file>   delete a file on the server
  ls              list the server's directory
  exit            end the session";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server {
            bind,
            root,
            transfer,
        } => {
            let config = transfer.into_config()?;
            if !root.is_dir() {
                bail!("{} is not a directory", root.display());
            }
            let socket = Socket::bind(bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            log::info!("Starting server on {}", socket.local_addr);
            Server::new(socket, root, config)
                .context("invalid server settings")?
                .run()
                .await
                .context("server stopped")?;
        }
        Mode::Client {
            server,
            dir,
            transfer,
        } => {
            let config = transfer.into_config()?;
            let server_addr = resolve_server(&server)
                .await
                .with_context(|| format!("cannot resolve {server}"))?;
            let local: SocketAddr = if server_addr.is_ipv4() {
                "0.0.0.0:0".parse()?
            } else {
                "[::]:0".parse()?
            };
            let socket = Socket::bind(local)
                .await
                .context("failed to bind client socket")?;
            log::info!("Starting client, talking to {server_addr}");
            let client = Client::new(socket, server_addr, config)
                .context("invalid client settings")?
                .with_local_dir(dir);
            prompt(&client).await?;
        }
    }

    Ok(())
}

/// Read commands from stdin until `exit` or end of input.
async fn prompt(client: &Client<Socket>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("{MENU}");
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(c) => c,
            Err(e) => {
                println!("Invalid command: {e}");
                println!("{MENU}");
                continue;
            }
        };

        let started = Instant::now();
        let result = client.execute(&command).await;
        report(&command, result, started.elapsed());

        if command == Command::Exit {
            break;
        }
    }
    Ok(())
}

fn report(command: &Command, result: Result<Outcome, SessionError>, elapsed: Duration) {
    let name = command.filename().unwrap_or_default();
    match result {
        Ok(Outcome::Received(r)) => {
            println!("File {name} received successfully ({} bytes).", r.bytes);
            println!("Time elapsed: {elapsed:.3?}");
        }
        Ok(Outcome::Sent { report, reply }) => {
            println!("{reply} ({} bytes sent)", report.bytes);
            println!("Time elapsed: {elapsed:.3?}");
        }
        Ok(Outcome::Reply(text)) => println!("{text}"),
        Err(SessionError::Transfer(TransferError::SourceNotFound)) => match command {
            Command::Get(_) => println!("File {name} does not exist on server!"),
            _ => println!("File {name} could not be read."),
        },
        Err(SessionError::Transfer(TransferError::RetryBudgetExhausted { seq, attempts })) => {
            println!("Transfer of {name} aborted after {attempts} attempts on chunk {seq}.");
        }
        Err(SessionError::Transfer(TransferError::PeerAborted)) => {
            println!("File {name} not received successfully. Please try again.");
        }
        Err(SessionError::LocalFileMissing(path)) => {
            println!("File {} does not exist.", path.display());
        }
        Err(e) => println!("Error: {e}"),
    }
}
