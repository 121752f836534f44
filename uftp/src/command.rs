//! Session commands: `get`, `put`, `delete`, `ls`, `exit`.
//!
//! A command travels as one ASCII datagram, `"<op> <filename>"`, from the
//! client to the server.  The same parser validates user input on the client
//! and incoming datagrams on the server.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Longest filename accepted in a command.
pub const MAX_FILENAME_LEN: usize = 255;

/// One remote file operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Download `name` from the server.
    Get(String),
    /// Upload `name` to the server.
    Put(String),
    /// Remove `name` on the server.
    Delete(String),
    /// List the server's directory.
    Ls,
    /// End the session.
    Exit,
}

/// Reasons a line or datagram is not a valid [`Command`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown operation `{0}`; expected get, put, delete, ls or exit")]
    UnknownOp(String),
    #[error("`{0}` needs a filename")]
    MissingFilename(&'static str),
    #[error("invalid filename `{0}`: must be a plain file name")]
    InvalidFilename(String),
    #[error("command is not valid UTF-8")]
    NotUtf8,
}

impl Command {
    /// Parse a command from the raw bytes of a datagram.
    pub fn from_datagram(buf: &[u8]) -> Result<Self, CommandError> {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        std::str::from_utf8(&buf[..end])
            .map_err(|_| CommandError::NotUtf8)?
            .parse()
    }

    /// Wire form sent by the client.
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// The operation keyword.
    pub fn op(&self) -> &'static str {
        match self {
            Command::Get(_) => "get",
            Command::Put(_) => "put",
            Command::Delete(_) => "delete",
            Command::Ls => "ls",
            Command::Exit => "exit",
        }
    }

    /// The filename argument, for operations that take one.
    pub fn filename(&self) -> Option<&str> {
        match self {
            Command::Get(name) | Command::Put(name) | Command::Delete(name) => Some(name),
            Command::Ls | Command::Exit => None,
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    /// Parse `"<op> [filename]"`.  Extra words after the filename are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let op = words.next().ok_or(CommandError::Empty)?;
        let name = words.next();

        let named = |op: &'static str| -> Result<String, CommandError> {
            let name = name.ok_or(CommandError::MissingFilename(op))?;
            validate_filename(name)?;
            Ok(name.to_string())
        };

        match op {
            "get" => Ok(Command::Get(named("get")?)),
            "put" => Ok(Command::Put(named("put")?)),
            "delete" => Ok(Command::Delete(named("delete")?)),
            "ls" => Ok(Command::Ls),
            "exit" => Ok(Command::Exit),
            other => Err(CommandError::UnknownOp(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.filename() {
            Some(name) => write!(f, "{} {}", self.op(), name),
            None => f.write_str(self.op()),
        }
    }
}

/// Accept only names that stay inside the server's root directory.
pub fn validate_filename(name: &str) -> Result<(), CommandError> {
    let bad = name.is_empty()
        || name.len() > MAX_FILENAME_LEN
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(CommandError::InvalidFilename(name.to_string()));
    }
    Ok(())
}
