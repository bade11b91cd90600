//! A backend store: owns one extension class under its own root and answers
//! the five verbs for it.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use common::archive::{ArchiveBuilder, TarArchiveBuilder};
use common::path::{MountToken, VirtualPath};
use common::protocol::{envelope, write_ready, write_reply, Command, Reply};
use common::store::LocalStore;

use crate::config::{BackendServiceConfig, Limits};
use crate::error::ServiceError;
use crate::local;
use crate::server::{accept_command, ConnectionHandler};

pub struct BackendService {
    store: LocalStore,
    mount: MountToken,
    limits: Limits,
    archiver: Arc<dyn ArchiveBuilder>,
}

impl BackendService {
    pub fn new(config: BackendServiceConfig) -> Self {
        Self {
            store: LocalStore::new(config.name, config.root, config.extension),
            mount: config.mount,
            limits: config.limits,
            archiver: Arc::new(TarArchiveBuilder::default()),
        }
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn ArchiveBuilder>) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Create the store root so the first request does not have to.
    pub async fn prepare(&self) -> Result<(), ServiceError> {
        self.store.ensure_root().await?;
        tracing::info!(
            store = self.store.name(),
            extension = %self.store.extension(),
            "serving {:?}",
            self.store.root()
        );
        Ok(())
    }

    fn label(&self) -> String {
        self.store.extension().label()
    }

    async fn upload(
        &self,
        stream: &mut TcpStream,
        file_name: &str,
        dest: &VirtualPath,
    ) -> Result<(), ServiceError> {
        write_ready(stream).await?;
        let idle = self.limits.idle_timeout;
        let reply = match local::receive_upload(stream, &self.store, dest, file_name, idle).await? {
            Ok(_) => Reply::Stored {
                label: self.label(),
                store: self.store.name().to_string(),
            },
            Err(reply) => reply,
        };
        write_reply(stream, &reply).await?;
        Ok(())
    }

    async fn download(&self, stream: &mut TcpStream, path: &VirtualPath) -> Result<(), ServiceError> {
        match self.store.find_file(path).await {
            Some(physical) => {
                local::send_file_or_failure(stream, &physical, self.limits.idle_timeout).await
            }
            None => {
                tracing::info!("{} not found", path);
                envelope::write_failure(stream).await?;
                Ok(())
            }
        }
    }

    async fn remove(&self, stream: &mut TcpStream, path: &VirtualPath) -> Result<(), ServiceError> {
        let removed = match self.store.remove(path).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(error = %e, "cannot remove {}", path);
                false
            }
        };
        let label = self.label();
        let store = self.store.name().to_string();
        let reply = if removed {
            Reply::Deleted { label, store }
        } else {
            Reply::NotFoundIn { label, store }
        };
        write_reply(stream, &reply).await?;
        Ok(())
    }

    async fn list(&self, stream: &mut TcpStream, dir: &VirtualPath) -> Result<(), ServiceError> {
        let entries = match self.store.list_native(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "cannot list {}", dir);
                Vec::new()
            }
        };
        let mut body = String::new();
        for entry in &entries {
            body.push_str(&entry.to_string());
            body.push('\n');
        }
        stream.write_all(body.as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConnectionHandler for BackendService {
    async fn handle(&self, mut stream: TcpStream, _peer: SocketAddr) -> Result<(), ServiceError> {
        let Some(command) = accept_command(&mut stream, &self.mount, self.limits.idle_timeout).await? else {
            return Ok(());
        };

        match &command {
            Command::Upload { file_name, dest } => self.upload(&mut stream, file_name, dest).await,
            Command::Download { path } => self.download(&mut stream, path).await,
            Command::Remove { path } => self.remove(&mut stream, path).await,
            // a router forwards its own `downltar <ext>` line; the argument
            // can only name this store's extension
            Command::Tar { .. } => {
                let idle = self.limits.idle_timeout;
                local::send_native_archive(&mut stream, &self.store, &self.archiver, idle).await
            }
            Command::List { path } => self.list(&mut stream, path).await,
        }
    }
}
