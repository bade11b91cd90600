use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::path::{file_name_only, MountToken, PathError, VirtualPath};

/// Upper bound on a single command line.
pub const MAX_COMMAND_LEN: usize = 1024;

/// How long the rest of a line may lag behind its first segment.
pub const COMMAND_SETTLE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Upload,
    Download,
    Remove,
    Tar,
    List,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Upload => "uploadf",
            Verb::Download => "downlf",
            Verb::Remove => "removef",
            Verb::Tar => "downltar",
            Verb::List => "dispfnames",
        }
    }

    fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "uploadf" => Some(Verb::Upload),
            "downlf" => Some(Verb::Download),
            "removef" => Some(Verb::Remove),
            "downltar" => Some(Verb::Tar),
            "dispfnames" => Some(Verb::List),
            _ => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload { file_name: String, dest: VirtualPath },
    Download { path: VirtualPath },
    Remove { path: VirtualPath },
    /// The extension is kept raw: an unknown or malformed type is answered
    /// with the tar-specific error rather than a format error.
    Tar { extension: Option<String> },
    List { path: VirtualPath },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}")]
    UnknownVerb(String),
    #[error("missing arguments for {0}")]
    MissingArgument(Verb),
    #[error("invalid path for {verb}: {source}")]
    InvalidPath {
        verb: Verb,
        #[source]
        source: PathError,
    },
}

impl Command {
    pub fn parse(line: &str, mount: &MountToken) -> Result<Self, CommandError> {
        let mut tokens = line.split_whitespace();
        let raw_verb = tokens.next().ok_or(CommandError::Empty)?;
        let verb = Verb::from_wire(raw_verb)
            .ok_or_else(|| CommandError::UnknownVerb(raw_verb.to_string()))?;

        let invalid_path = |source| CommandError::InvalidPath { verb, source };
        let mut required = || tokens.next().ok_or(CommandError::MissingArgument(verb));

        let command = match verb {
            Verb::Upload => {
                let file_name = required()?;
                let dest = required()?;
                let file_name = file_name_only(file_name).map_err(invalid_path)?.to_string();
                let dest = mount.parse(dest).map_err(invalid_path)?;
                Command::Upload { file_name, dest }
            }
            Verb::Download => Command::Download {
                path: mount.parse(required()?).map_err(invalid_path)?,
            },
            Verb::Remove => Command::Remove {
                path: mount.parse(required()?).map_err(invalid_path)?,
            },
            Verb::Tar => Command::Tar {
                extension: required().ok().map(str::to_string),
            },
            Verb::List => Command::List {
                path: mount.parse(required()?).map_err(invalid_path)?,
            },
        };
        Ok(command)
    }

    pub fn verb(&self) -> Verb {
        match self {
            Command::Upload { .. } => Verb::Upload,
            Command::Download { .. } => Verb::Download,
            Command::Remove { .. } => Verb::Remove,
            Command::Tar { .. } => Verb::Tar,
            Command::List { .. } => Verb::List,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Upload { file_name, dest } => write!(f, "uploadf {} {}", file_name, dest),
            Command::Download { path } => write!(f, "downlf {}", path),
            Command::Remove { path } => write!(f, "removef {}", path),
            Command::Tar {
                extension: Some(ext),
            } => write!(f, "downltar {}", ext),
            Command::Tar { extension: None } => f.write_str("downltar"),
            Command::List { path } => write!(f, "dispfnames {}", path),
        }
    }
}

/// Read one command line. Trailing newlines and NUL padding are tolerated.
///
/// The protocol has no terminator, so the line is whatever arrives first;
/// if that lacks a newline, later segments are still taken while they keep
/// coming within [`COMMAND_SETTLE`]. The first byte must arrive within
/// `idle`.
///
/// `None` means the peer closed without sending anything.
pub async fn read_command_line<R>(reader: &mut R, idle: Duration) -> io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; MAX_COMMAND_LEN];
    let mut filled = match timeout(idle, reader.read(&mut buf)).await {
        Ok(read) => read?,
        Err(_) => {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no command within {:?}", idle),
            ))
        }
    };
    if filled == 0 {
        return Ok(None);
    }

    while filled < buf.len() && !buf[..filled].contains(&b'\n') {
        match timeout(COMMAND_SETTLE, reader.read(&mut buf[filled..])).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => filled += n,
            Ok(Err(e)) => return Err(e),
        }
    }

    let line = String::from_utf8_lossy(&buf[..filled]);
    Ok(Some(line.trim_end_matches(['\r', '\n', '\0']).to_string()))
}

pub async fn write_command<W>(writer: &mut W, command: &Command) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(command.to_string().as_bytes()).await?;
    writer.flush().await
}
