use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::command::{CommandError, Verb};

/// Acknowledgement sent before an upload body, no terminator.
pub const READY: &[u8; 5] = b"READY";

/// Cap on a status reply read from a peer.
pub const MAX_REPLY_LEN: usize = 4096;

/// Human readable status replies.
///
/// Clients string-match these, so the rendered text is part of the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Uploaded { store: String },
    Stored { label: String, store: String },
    Deleted { label: String, store: String },
    NotFoundIn { label: String, store: String },
    FileNotFound,
    NoExtension,
    UnsupportedType,
    UnsupportedTarType,
    CreateDirFailed,
    CreateFileFailed,
    TransferFailed,
    ForwardFailed,
    ContactFailed,
    InvalidPath,
    InvalidCommand,
    UnknownCommand,
    InvalidFormat(Verb),
}

impl Reply {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Reply::Uploaded { .. } | Reply::Stored { .. } | Reply::Deleted { .. }
        )
    }
}

impl From<&CommandError> for Reply {
    fn from(err: &CommandError) -> Self {
        match err {
            CommandError::Empty => Reply::InvalidCommand,
            CommandError::UnknownVerb(_) => Reply::UnknownCommand,
            CommandError::MissingArgument(verb) => Reply::InvalidFormat(*verb),
            CommandError::InvalidPath { .. } => Reply::InvalidPath,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Uploaded { store } => write!(f, "SUCCESS: File uploaded to {}", store),
            Reply::Stored { label, store } => write!(f, "SUCCESS: {} stored in {}", label, store),
            Reply::Deleted { label, store } => {
                write!(f, "SUCCESS: {} deleted from {}", label, store)
            }
            Reply::NotFoundIn { label, store } => {
                write!(f, "ERROR: {} not found in {}", label, store)
            }
            Reply::FileNotFound => f.write_str("ERROR: File not found"),
            Reply::NoExtension => f.write_str("ERROR: File has no extension"),
            Reply::UnsupportedType => f.write_str("ERROR: Unsupported file type"),
            Reply::UnsupportedTarType => f.write_str("ERROR: Unsupported filetype for tar"),
            Reply::CreateDirFailed => f.write_str("ERROR: Failed to create directory"),
            Reply::CreateFileFailed => f.write_str("ERROR: Failed to create file"),
            Reply::TransferFailed => f.write_str("ERROR: File transfer failed"),
            Reply::ForwardFailed => f.write_str("ERROR: Failed to forward file"),
            Reply::ContactFailed => f.write_str("ERROR: Failed to contact server"),
            Reply::InvalidPath => f.write_str("ERROR: Invalid path"),
            Reply::InvalidCommand => f.write_str("ERROR: Invalid command"),
            Reply::UnknownCommand => f.write_str("ERROR: Unknown command"),
            Reply::InvalidFormat(verb) => write!(f, "ERROR: Invalid {} format", verb),
        }
    }
}

pub async fn write_reply<W>(writer: &mut W, reply: &Reply) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(reply.to_string().as_bytes()).await?;
    writer.flush().await
}

pub async fn write_ready<W>(writer: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(READY).await?;
    writer.flush().await
}

/// Read the peer's acknowledgement; returns what was received instead of
/// `READY` as the error text.
pub async fn expect_ready<R>(reader: &mut R) -> std::io::Result<Result<(), String>>
where
    R: AsyncRead + Unpin,
{
    let mut ack = [0u8; READY.len()];
    reader.read_exact(&mut ack).await?;
    if &ack == READY {
        Ok(Ok(()))
    } else {
        let mut rest = read_reply(reader).await?;
        rest.insert_str(0, &String::from_utf8_lossy(&ack));
        Ok(Err(rest))
    }
}

/// Read a status reply until the peer closes the connection.
pub async fn read_reply<R>(reader: &mut R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    read_until_close(reader, MAX_REPLY_LEN).await
}

/// Read text until the peer closes, keeping at most `limit` bytes.
pub async fn read_until_close<R>(reader: &mut R, limit: usize) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader.take(limit as u64).read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_status_text() {
        assert_eq!(
            Reply::UnsupportedTarType.to_string(),
            "ERROR: Unsupported filetype for tar"
        );
        assert_eq!(
            Reply::InvalidFormat(Verb::Upload).to_string(),
            "ERROR: Invalid uploadf format"
        );
        assert_eq!(
            Reply::Stored {
                label: "TXT".to_string(),
                store: "S3".to_string()
            }
            .to_string(),
            "SUCCESS: TXT stored in S3"
        );
        assert_eq!(
            Reply::Uploaded {
                store: "S1".to_string()
            }
            .to_string(),
            "SUCCESS: File uploaded to S1"
        );
    }

    #[test]
    fn test_success_classification() {
        assert!(Reply::Deleted {
            label: "File".to_string(),
            store: "S1".to_string()
        }
        .is_success());
        assert!(!Reply::FileNotFound.is_success());
    }

    #[tokio::test]
    async fn test_expect_ready_reports_error_text() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_reply(&mut server, &Reply::InvalidPath).await.unwrap();
        drop(server);
        let ack = expect_ready(&mut client).await.unwrap();
        assert_eq!(ack, Err("ERROR: Invalid path".to_string()));
    }

    #[tokio::test]
    async fn test_expect_ready_accepts_ready() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_ready(&mut server).await.unwrap();
        assert_eq!(expect_ready(&mut client).await.unwrap(), Ok(()));
    }
}
