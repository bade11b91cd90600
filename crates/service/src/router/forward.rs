use std::path::Path;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use common::path::VirtualPath;
use common::protocol::envelope::{self, Header};
use common::protocol::{
    expect_ready, read_reply, read_until_close, write_command, Command, TransferError,
};
use common::routing::Extension;

use crate::config::{BackendEndpoint, Limits};

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("backend {name} at {addr} unreachable: {source}")]
    Connect {
        name: String,
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out after {timeout:?} connecting to backend {name} at {addr}")]
    ConnectTimeout {
        name: String,
        addr: String,
        timeout: Duration,
    },
    #[error("backend {name} at {addr} gave no answer within {timeout:?}")]
    Stalled {
        name: String,
        addr: String,
        timeout: Duration,
    },
    #[error("backend {name} refused the upload: {reply}")]
    Refused { name: String, reply: String },
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Dials one backend store, one fresh connection per request.
#[derive(Debug, Clone)]
pub struct BackendClient {
    name: String,
    extension: Extension,
    addr: String,
    limits: Limits,
}

impl BackendClient {
    pub fn new(endpoint: BackendEndpoint, limits: Limits) -> Self {
        Self {
            name: endpoint.name,
            extension: endpoint.extension,
            addr: endpoint.connect_addr,
            limits,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extension(&self) -> &Extension {
        &self.extension
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn stalled(&self) -> ForwardError {
        ForwardError::Stalled {
            name: self.name.clone(),
            addr: self.addr.clone(),
            timeout: self.limits.backend_timeout,
        }
    }

    /// Wait at most `backend_timeout` for one answer from the backend.
    async fn answer<T, E, F>(&self, step: F) -> Result<T, ForwardError>
    where
        F: std::future::Future<Output = Result<T, E>>,
        ForwardError: From<E>,
    {
        match timeout(self.limits.backend_timeout, step).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(self.stalled()),
        }
    }

    pub async fn connect(&self) -> Result<TcpStream, ForwardError> {
        let connect_timeout = self.limits.connect_timeout;
        match timeout(connect_timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(ForwardError::Connect {
                name: self.name.clone(),
                addr: self.addr.clone(),
                source,
            }),
            Err(_) => Err(ForwardError::ConnectTimeout {
                name: self.name.clone(),
                addr: self.addr.clone(),
                timeout: connect_timeout,
            }),
        }
    }

    /// Connect and send `command`; the response is left on the stream.
    pub async fn open(&self, command: &Command) -> Result<TcpStream, ForwardError> {
        let mut stream = self.connect().await?;
        write_command(&mut stream, command).await?;
        tracing::debug!(backend = %self.name, %command, "forwarded");
        Ok(stream)
    }

    /// Send `command` and collect the text response, at most `limit` bytes.
    /// The whole response must arrive within `backend_timeout`.
    pub async fn request_text(&self, command: &Command, limit: usize) -> Result<String, ForwardError> {
        let mut stream = self.open(command).await?;
        self.answer(read_until_close(&mut stream, limit)).await
    }

    /// Read the size field of an envelope response on `stream`.
    pub async fn read_header(&self, stream: &mut TcpStream) -> Result<Header, ForwardError> {
        self.answer(envelope::read_header(stream)).await
    }

    /// Push the local file `source` to the backend as `<dest>/<file_name>`
    /// and return the backend's status text.
    pub async fn upload(
        &self,
        file_name: &str,
        dest: &VirtualPath,
        source: &Path,
    ) -> Result<String, ForwardError> {
        let command = Command::Upload {
            file_name: file_name.to_string(),
            dest: dest.clone(),
        };
        let mut stream = self.open(&command).await?;
        if let Err(reply) = self.answer(expect_ready(&mut stream)).await? {
            return Err(ForwardError::Refused {
                name: self.name.clone(),
                reply,
            });
        }
        envelope::send_file(&mut stream, source, self.limits.idle_timeout).await?;
        self.answer(read_reply(&mut stream)).await
    }
}
