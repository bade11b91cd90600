//! Length-prefixed file transfer framing.
//!
//! ```text
//! +----------------------+---------------------------+
//! | size: i64 (LE, 8 B)  | body: exactly `size` bytes |
//! +----------------------+---------------------------+
//! ```
//!
//! A negative size means the sender could not produce the file; no body
//! follows. Receivers must read exactly `size` bytes: a peer closing early is
//! reported as [`TransferError::Truncated`] and whatever was written to the
//! destination is left in place.
//!
//! Every read and write of a body chunk is bounded by an idle deadline. A
//! slow peer that keeps making progress is never cut off; one that stops
//! moving for longer than the deadline gets [`TransferError::Stalled`].

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Bodies are streamed in chunks of this size.
pub const CHUNK_SIZE: usize = 1024;

/// Width of the size prefix.
pub const SIZE_FIELD_LEN: usize = 8;

pub const FAILURE_SENTINEL: i64 = -1;

/// How long a single read or write may make no progress.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The local source file could not be opened or stat'ed. Nothing has been
    /// written to the peer yet.
    #[error("cannot open transfer source: {0}")]
    Source(#[source] std::io::Error),
    #[error("transfer I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transfer truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },
    #[error("file of {0} bytes does not fit the size field")]
    TooLarge(u64),
    #[error("peer made no progress for {0:?}")]
    Stalled(Duration),
}

/// Run one I/O step, failing with [`TransferError::Stalled`] if it does not
/// finish within `idle`.
pub async fn within<T, F>(idle: Duration, step: F) -> Result<T, TransferError>
where
    F: Future<Output = std::io::Result<T>>,
{
    match timeout(idle, step).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(TransferError::Stalled(idle)),
    }
}

/// Decoded size prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    Size(u64),
    Failed,
}

impl Header {
    pub fn from_raw(raw: i64) -> Self {
        u64::try_from(raw).map_or(Header::Failed, Header::Size)
    }

    pub fn to_raw(self) -> Result<i64, TransferError> {
        match self {
            Header::Size(size) => i64::try_from(size).map_err(|_| TransferError::TooLarge(size)),
            Header::Failed => Ok(FAILURE_SENTINEL),
        }
    }
}

pub async fn read_header<R>(reader: &mut R) -> Result<Header, TransferError>
where
    R: AsyncRead + Unpin,
{
    let raw = reader.read_i64_le().await?;
    Ok(Header::from_raw(raw))
}

pub async fn write_header<W>(writer: &mut W, header: Header) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_i64_le(header.to_raw()?).await?;
    Ok(())
}

/// Tell the peer the requested transfer cannot happen.
pub async fn write_failure<W>(writer: &mut W) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin,
{
    write_header(writer, Header::Failed).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the size prefix, giving up after `idle` without it.
pub async fn read_header_within<R>(reader: &mut R, idle: Duration) -> Result<Header, TransferError>
where
    R: AsyncRead + Unpin,
{
    match timeout(idle, read_header(reader)).await {
        Ok(header) => header,
        Err(_) => Err(TransferError::Stalled(idle)),
    }
}

/// Copy exactly `len` bytes, chunk by chunk. Each chunk's read and write
/// must complete within `idle`.
pub async fn copy_exact<R, W>(
    reader: &mut R,
    writer: &mut W,
    len: u64,
    idle: Duration,
) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let n = within(idle, reader.read(&mut buf[..want])).await?;
        if n == 0 {
            return Err(TransferError::Truncated {
                expected: len,
                received: len - remaining,
            });
        }
        within(idle, writer.write_all(&buf[..n])).await?;
        remaining -= n as u64;
    }
    within(idle, writer.flush()).await?;
    Ok(len)
}

/// Frame and stream a local file. Returns the number of body bytes sent.
pub async fn send_file<W>(writer: &mut W, path: &Path, idle: Duration) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin,
{
    let mut file = File::open(path).await.map_err(TransferError::Source)?;
    let len = file.metadata().await.map_err(TransferError::Source)?.len();

    let raw = Header::Size(len).to_raw()?;
    within(idle, writer.write_i64_le(raw)).await?;
    copy_exact(&mut file, writer, len, idle).await
}

/// Receive one envelope into `dest`, truncating or creating it first.
///
/// Returns `Ok(None)` when the peer sent the failure sentinel; the
/// destination is not touched in that case.
pub async fn receive_file<R>(
    reader: &mut R,
    dest: &Path,
    idle: Duration,
) -> Result<Option<u64>, TransferError>
where
    R: AsyncRead + Unpin,
{
    match read_header_within(reader, idle).await? {
        Header::Failed => Ok(None),
        Header::Size(len) => {
            let mut file = File::create(dest).await?;
            let received = copy_exact(reader, &mut file, len, idle).await?;
            file.sync_all().await?;
            Ok(Some(received))
        }
    }
}

/// Read and throw away `len` body bytes.
pub async fn discard_body<R>(reader: &mut R, len: u64, idle: Duration) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
{
    copy_exact(reader, &mut tokio::io::sink(), len, idle).await
}
