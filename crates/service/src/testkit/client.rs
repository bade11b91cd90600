use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::protocol::envelope::{self, Header, SIZE_FIELD_LEN};
use common::protocol::DEFAULT_IDLE_TIMEOUT;
use common::protocol::{expect_ready, read_reply};

/// What a `downltar` request produced.
#[derive(Debug, PartialEq, Eq)]
pub enum TarResponse {
    Archive(Vec<u8>),
    /// size field was negative
    Failed,
    /// bare status text, no envelope
    Error(String),
}

/// Speaks the wire protocol to a router or backend, one connection per call.
#[derive(Debug, Clone)]
pub struct TestClient {
    addr: SocketAddr,
}

impl TestClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    async fn send(&self, line: &str) -> Result<TcpStream> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .with_context(|| format!("connecting to {}", self.addr))?;
        stream.write_all(line.as_bytes()).await?;
        stream.flush().await?;
        Ok(stream)
    }

    /// Send `line` verbatim and return every byte of the response.
    pub async fn raw(&self, line: &str) -> Result<Vec<u8>> {
        let mut stream = self.send(line).await?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        Ok(response)
    }

    pub async fn upload_bytes(&self, file_name: &str, data: &[u8], dest: &str) -> Result<String> {
        let mut stream = self.send(&format!("uploadf {} {}", file_name, dest)).await?;
        if let Err(text) = expect_ready(&mut stream).await? {
            return Ok(text);
        }
        envelope::write_header(&mut stream, Header::Size(data.len() as u64)).await?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(read_reply(&mut stream).await?)
    }

    pub async fn upload_file(&self, path: &Path, dest: &str) -> Result<String> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .context("upload source has no file name")?;
        let mut stream = self.send(&format!("uploadf {} {}", file_name, dest)).await?;
        if let Err(text) = expect_ready(&mut stream).await? {
            return Ok(text);
        }
        envelope::send_file(&mut stream, path, DEFAULT_IDLE_TIMEOUT).await?;
        Ok(read_reply(&mut stream).await?)
    }

    /// `None` when the store answered with the failure sentinel.
    pub async fn download(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let mut stream = self.send(&format!("downlf {}", path)).await?;
        match envelope::read_header(&mut stream).await? {
            Header::Failed => Ok(None),
            Header::Size(len) => {
                let mut body = vec![0u8; usize::try_from(len)?];
                stream.read_exact(&mut body).await?;
                Ok(Some(body))
            }
        }
    }

    pub async fn remove(&self, path: &str) -> Result<String> {
        let mut stream = self.send(&format!("removef {}", path)).await?;
        Ok(read_reply(&mut stream).await?)
    }

    pub async fn list(&self, path: &str) -> Result<String> {
        let response = self.raw(&format!("dispfnames {}", path)).await?;
        Ok(String::from_utf8(response)?)
    }

    pub async fn tar(&self, extension: &str) -> Result<TarResponse> {
        let response = self.raw(&format!("downltar {}", extension)).await?;
        if response.starts_with(b"ERROR") {
            return Ok(TarResponse::Error(
                String::from_utf8_lossy(&response).into_owned(),
            ));
        }

        anyhow::ensure!(
            response.len() >= SIZE_FIELD_LEN,
            "tar response of {} bytes has no size field",
            response.len()
        );
        let (size, body) = response.split_at(SIZE_FIELD_LEN);
        let raw = i64::from_le_bytes(size.try_into()?);
        match Header::from_raw(raw) {
            Header::Failed => Ok(TarResponse::Failed),
            Header::Size(len) => {
                anyhow::ensure!(
                    body.len() as u64 == len,
                    "tar body is {} bytes, size field says {}",
                    body.len(),
                    len
                );
                Ok(TarResponse::Archive(body.to_vec()))
            }
        }
    }
}
