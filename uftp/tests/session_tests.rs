//! Integration tests for the command session.
//!
//! Each test starts a real [`Server`] on loopback in a background task,
//! serving a temporary directory, and drives it with a [`Client`] whose
//! local files live in a second temporary directory.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tokio::task::JoinHandle;

use uftp::{
    client::{Client, Outcome},
    command::Command,
    config::{ConfigError, TransferConfig},
    error::{SessionError, TransferError},
    packet::encode_data,
    server::{Server, EMPTY_LISTING, GOODBYE},
    simulator::Simulator,
    socket::{Channel, Socket},
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn ephemeral() -> Socket {
    Socket::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind failed")
}

fn config() -> TransferConfig {
    TransferConfig {
        chunk_size: 1_000,
        ack_timeout: Duration::from_millis(100),
        reply_timeout: Duration::from_secs(2),
        ..TransferConfig::default()
    }
}

struct Session {
    server_dir: TempDir,
    client_dir: TempDir,
    client: Client<Socket>,
    server_addr: SocketAddr,
    server_task: JoinHandle<()>,
}

impl Session {
    async fn start() -> Self {
        let socket = ephemeral().await;
        let server_addr = socket.local_addr;
        let server_dir = tempfile::tempdir().unwrap();
        let server = Server::new(socket, server_dir.path(), config()).unwrap();
        let server_task = tokio::spawn(async move {
            let _ = server.run().await;
        });
        Self::attach(server_dir, server_addr, server_task).await
    }

    /// Connect a fresh client to a server already running on `server_addr`.
    async fn attach(
        server_dir: TempDir,
        server_addr: SocketAddr,
        server_task: JoinHandle<()>,
    ) -> Self {
        let client_dir = tempfile::tempdir().unwrap();
        let client = Client::new(ephemeral().await, server_addr, config())
            .unwrap()
            .with_local_dir(client_dir.path());
        Self {
            server_dir,
            client_dir,
            client,
            server_addr,
            server_task,
        }
    }

    fn server_file(&self, name: &str) -> PathBuf {
        self.server_dir.path().join(name)
    }

    fn client_file(&self, name: &str) -> PathBuf {
        self.client_dir.path().join(name)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}

fn write(path: &Path, data: &[u8]) {
    std::fs::write(path, data).unwrap();
}

fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

// ---------------------------------------------------------------------------
// ls / delete / exit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ls_on_empty_directory() {
    let s = Session::start().await;
    assert_eq!(s.client.ls().await.unwrap(), EMPTY_LISTING);
}

#[tokio::test]
async fn ls_lists_sorted_names() {
    let s = Session::start().await;
    write(&s.server_file("zeta.txt"), b"z");
    write(&s.server_file("alpha.txt"), b"a");
    assert_eq!(s.client.ls().await.unwrap(), "alpha.txt\nzeta.txt");
}

#[tokio::test]
async fn delete_existing_and_missing() {
    let s = Session::start().await;
    write(&s.server_file("old.log"), b"bye");

    assert_eq!(
        s.client.delete("old.log").await.unwrap(),
        "Delete old.log successful!"
    );
    assert!(!s.server_file("old.log").exists());

    assert_eq!(
        s.client.delete("old.log").await.unwrap(),
        "old.log does not exist on server!"
    );
}

#[tokio::test]
async fn exit_replies_and_server_keeps_serving() {
    let s = Session::start().await;
    assert_eq!(s.client.exit().await.unwrap(), GOODBYE);
    // A fresh command after exit is still answered.
    assert_eq!(s.client.ls().await.unwrap(), EMPTY_LISTING);
}

#[tokio::test]
async fn invalid_datagrams_get_no_reply() {
    let s = Session::start().await;
    let raw = ephemeral().await;
    for junk in [&b"fetch everything"[..], b"get ../../etc/passwd", b"", b"\xff\xfe"] {
        raw.send_to(junk, s.server_addr).await.unwrap();
    }
    let mut buf = [0u8; 256];
    let reply = raw
        .recv_from_timeout(&mut buf, Duration::from_millis(300))
        .await
        .unwrap();
    assert!(reply.is_none(), "server answered an invalid command");

    assert_eq!(s.client.ls().await.unwrap(), EMPTY_LISTING);
}

// ---------------------------------------------------------------------------
// get / put
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_downloads_file() {
    let s = Session::start().await;
    let data = content(4_500);
    write(&s.server_file("data.bin"), &data);

    let report = s.client.get("data.bin").await.unwrap();
    assert_eq!(report.chunks, 5);
    assert_eq!(report.bytes, 4_500);
    assert_eq!(std::fs::read(s.client_file("data.bin")).unwrap(), data);
}

#[tokio::test]
async fn get_missing_file_reports_not_found() {
    let s = Session::start().await;
    let err = s.client.get("ghost.bin").await.unwrap_err();
    assert!(
        matches!(err, SessionError::Transfer(TransferError::SourceNotFound)),
        "got {err:?}"
    );
    // The download target was created before the server answered.
    assert!(std::fs::read(s.client_file("ghost.bin")).unwrap().is_empty());
}

#[tokio::test]
async fn put_uploads_file_and_server_confirms() {
    let s = Session::start().await;
    let data = content(2_345);
    write(&s.client_file("up.bin"), &data);

    let (report, reply) = s.client.put("up.bin").await.unwrap();
    assert_eq!(report.bytes, 2_345);
    assert_eq!(reply, "Put up.bin successful!");
    assert_eq!(std::fs::read(s.server_file("up.bin")).unwrap(), data);

    assert_eq!(s.client.ls().await.unwrap(), "up.bin");
}

#[tokio::test]
async fn put_missing_local_file_sends_nothing() {
    let s = Session::start().await;
    let err = s.client.put("nowhere.bin").await.unwrap_err();
    assert!(matches!(err, SessionError::LocalFileMissing(_)), "got {err:?}");
    // The server never saw a put, so it is idle and answers ls.
    assert_eq!(s.client.ls().await.unwrap(), EMPTY_LISTING);
}

#[tokio::test]
async fn get_into_unwritable_dir_sends_nothing() {
    let server = ephemeral().await;
    let client_dir = tempfile::tempdir().unwrap();
    let client = Client::new(ephemeral().await, server.local_addr, config())
        .unwrap()
        .with_local_dir(client_dir.path().join("missing"));

    let err = client.get("data.bin").await.unwrap_err();
    assert!(matches!(err, SessionError::Io(_)), "got {err:?}");

    let mut buf = [0u8; 256];
    let heard = server
        .recv_from_timeout(&mut buf, Duration::from_millis(200))
        .await
        .unwrap();
    assert!(heard.is_none(), "get was sent without a local file");
}

#[tokio::test]
async fn server_rejects_zero_chunk_size() {
    let dir = tempfile::tempdir().unwrap();
    let bad = TransferConfig {
        chunk_size: 0,
        ..config()
    };
    let err = Server::new(ephemeral().await, dir.path(), bad).unwrap_err();
    assert_eq!(err, ConfigError::ChunkSize(0));
}

#[tokio::test]
async fn execute_dispatches_by_command() {
    let s = Session::start().await;
    write(&s.server_file("a.txt"), b"hello");

    let get: Command = "get a.txt".parse().unwrap();
    let got = s.client.execute(&get).await.unwrap();
    assert!(matches!(got, Outcome::Received(r) if r.bytes == 5));

    let listed = s.client.execute(&Command::Ls).await.unwrap();
    assert_eq!(listed, Outcome::Reply("a.txt".to_string()));
}

/// Data from the server is lost twice; the download still completes.
#[tokio::test]
async fn get_survives_lost_data_packets() {
    let socket = ephemeral().await;
    let server_addr = socket.local_addr;
    let data = content(2_500);

    let lossy = Simulator::pass_through(socket);
    lossy.drop_next(&encode_data(1, &data[1_000..2_000]), 2);
    let server_dir = tempfile::tempdir().unwrap();
    let server = Server::new(lossy, server_dir.path(), config()).unwrap();
    let server_task = tokio::spawn(async move {
        let _ = server.run().await;
    });
    let s = Session::attach(server_dir, server_addr, server_task).await;
    write(&s.server_file("lossy.bin"), &data);

    let report = s.client.get("lossy.bin").await.unwrap();
    assert_eq!(report.bytes, 2_500);
    assert_eq!(report.duplicates, 0);
    assert_eq!(std::fs::read(s.client_file("lossy.bin")).unwrap(), data);
}
