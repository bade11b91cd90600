//! Accept loop shared by the router and the backend stores.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::Instrument;

use common::path::MountToken;
use common::protocol::{
    envelope, read_command_line, write_reply, Command, CommandError, Reply, Verb,
};

use crate::config::Limits;
use crate::error::ServiceError;

/// Pause after a failed `accept` so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Serves one request on one accepted connection.
#[async_trait::async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), ServiceError>;
}

pub async fn bind(addr: &str) -> Result<TcpListener, ServiceError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServiceError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Accept connections until `shutdown_rx` fires, handing each one to its
/// own task. In-flight requests are cancelled on shutdown; otherwise each
/// read or write is bounded by `limits.idle_timeout` and the whole request
/// by `limits.request_timeout`.
pub async fn serve<H>(
    listener: TcpListener,
    handler: Arc<H>,
    limits: Limits,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), ServiceError>
where
    H: ConnectionHandler,
{
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                tracing::info!(addr = %local_addr, "accept loop shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let handler = handler.clone();
                    let conn_shutdown = shutdown_rx.clone();
                    let span = tracing::info_span!("conn", %peer);
                    tokio::spawn(
                        run_connection(handler, stream, peer, limits, conn_shutdown).instrument(span),
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                    accept_backoff().await;
                }
            }
        }
    }

    Ok(())
}

async fn accept_backoff() {
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

async fn run_connection<H>(
    handler: Arc<H>,
    stream: TcpStream,
    peer: SocketAddr,
    limits: Limits,
    mut shutdown_rx: watch::Receiver<()>,
) where
    H: ConnectionHandler,
{
    tokio::select! {
        result = timeout(limits.request_timeout, handler.handle(stream, peer)) => match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "request failed"),
            Err(_) => tracing::warn!(
                "request exceeded {}s deadline, dropping connection",
                limits.request_timeout.as_secs()
            ),
        },
        _ = shutdown_rx.changed() => {
            tracing::debug!("request cancelled by shutdown");
        }
    }
}

/// Read and parse the single command of a connection.
///
/// Parse failures are answered here; `Ok(None)` means there is nothing left
/// to do on this connection.
pub(crate) async fn accept_command<S>(
    stream: &mut S,
    mount: &MountToken,
    idle: Duration,
) -> Result<Option<Command>, ServiceError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(line) = read_command_line(stream, idle).await? else {
        tracing::debug!("peer closed without a command");
        return Ok(None);
    };

    match Command::parse(&line, mount) {
        Ok(command) => {
            tracing::info!(%command, "request");
            Ok(Some(command))
        }
        Err(err) => {
            tracing::info!(line = %line, error = %err, "rejected command");
            reject(stream, &err).await?;
            Ok(None)
        }
    }
}

/// Answer a malformed command in the shape its verb's client expects.
async fn reject<S>(stream: &mut S, err: &CommandError) -> Result<(), ServiceError>
where
    S: AsyncWrite + Unpin,
{
    match err {
        CommandError::InvalidPath {
            verb: Verb::Download,
            ..
        } => envelope::write_failure(stream).await?,
        // an empty listing
        CommandError::InvalidPath {
            verb: Verb::List, ..
        } => {}
        other => write_reply(stream, &Reply::from(other)).await?,
    }
    Ok(())
}
