//! The client facing store.
//!
//! The router keeps files of its native extension under its own root and
//! forwards everything else to the backend its extension is assigned to.
//! Listings and archives are the only requests that touch more than one
//! store.

mod forward;
mod listing;

pub use forward::{BackendClient, ForwardError};
pub use listing::{AggregateListing, MAX_LISTING_LEN};

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use common::archive::{ArchiveBuilder, TarArchiveBuilder};
use common::path::{MountToken, VirtualPath};
use common::protocol::envelope::{self, Header};
use common::protocol::{write_ready, write_reply, Command, Reply, MAX_REPLY_LEN};
use common::routing::{BackendId, Extension, Placement, RouteError, StoreAssignment};
use common::store::LocalStore;

use crate::config::{Limits, RouterServiceConfig};
use crate::error::ServiceError;
use crate::local;
use crate::server::{accept_command, ConnectionHandler};

const STAGING_PREFIX: &str = ".extstore-staging-";
const NATIVE_LABEL: &str = "File";

pub struct RouterService {
    store: LocalStore,
    mount: MountToken,
    assignment: StoreAssignment,
    backends: Vec<BackendClient>,
    limits: Limits,
    archiver: Arc<dyn ArchiveBuilder>,
    listing_limit: usize,
}

impl RouterService {
    pub fn new(config: RouterServiceConfig) -> Result<Self, ServiceError> {
        let mut assignment = StoreAssignment::new(config.extension.clone());
        let mut backends = Vec::with_capacity(config.backends.len());
        for (idx, endpoint) in config.backends.into_iter().enumerate() {
            assignment.assign(endpoint.extension.clone(), BackendId(idx))?;
            backends.push(BackendClient::new(endpoint, config.limits));
        }

        Ok(Self {
            store: LocalStore::new(config.name, config.root, config.extension),
            mount: config.mount,
            assignment,
            backends,
            limits: config.limits,
            archiver: Arc::new(TarArchiveBuilder::default()),
            listing_limit: MAX_LISTING_LEN,
        })
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn ArchiveBuilder>) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn with_listing_limit(mut self, limit: usize) -> Self {
        self.listing_limit = limit;
        self
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn assignment(&self) -> &StoreAssignment {
        &self.assignment
    }

    pub fn backends(&self) -> &[BackendClient] {
        &self.backends
    }

    pub async fn prepare(&self) -> Result<(), ServiceError> {
        self.store.ensure_root().await?;
        for (extension, placement) in self.assignment.entries() {
            match placement {
                Placement::Native => {
                    tracing::info!(%extension, "native in {:?}", self.store.root())
                }
                Placement::Backend(id) => {
                    let backend = &self.backends[id.0];
                    tracing::info!(
                        %extension,
                        backend = backend.name(),
                        addr = backend.addr(),
                        "routed"
                    )
                }
            }
        }
        Ok(())
    }

    fn backend(&self, id: BackendId) -> &BackendClient {
        &self.backends[id.0]
    }

    /// Backend owning `extension`, if it is not stored here.
    fn backend_for(&self, extension: &Extension) -> Option<&BackendClient> {
        match self.assignment.resolve(extension)? {
            Placement::Native => None,
            Placement::Backend(id) => Some(self.backend(id)),
        }
    }

    async fn upload(
        &self,
        stream: &mut TcpStream,
        file_name: &str,
        dest: &VirtualPath,
    ) -> Result<(), ServiceError> {
        write_ready(stream).await?;

        let placement = match self.assignment.route_file_name(file_name) {
            Ok(placement) => placement,
            Err(e) => {
                tracing::info!(error = %e, "refusing upload of {}", file_name);
                local::drain_upload(stream, self.limits.idle_timeout).await?;
                let reply = match e {
                    RouteError::NoExtension => Reply::NoExtension,
                    RouteError::Unsupported(_) => Reply::UnsupportedType,
                };
                write_reply(stream, &reply).await?;
                return Ok(());
            }
        };

        match placement {
            Placement::Native => {
                let idle = self.limits.idle_timeout;
                let received =
                    local::receive_upload(stream, &self.store, dest, file_name, idle).await?;
                let reply = match received {
                    Ok(_) => Reply::Uploaded {
                        store: self.store.name().to_string(),
                    },
                    Err(reply) => reply,
                };
                write_reply(stream, &reply).await?;
            }
            Placement::Backend(id) => {
                let text = self
                    .forward_upload(stream, self.backend(id), file_name, dest)
                    .await?;
                stream.write_all(text.as_bytes()).await?;
                stream.flush().await?;
            }
        }
        Ok(())
    }

    /// Stage the body next to where it would land, push it to `backend` and
    /// return the text to relay. The staged copy is removed whatever the
    /// outcome.
    async fn forward_upload(
        &self,
        stream: &mut TcpStream,
        backend: &BackendClient,
        file_name: &str,
        dest: &VirtualPath,
    ) -> Result<String, ServiceError> {
        let idle = self.limits.idle_timeout;
        let dir = match self.store.materialize_dir(dest).await {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(error = %e, "cannot materialize staging dir for {}", dest);
                local::drain_upload(stream, idle).await?;
                return Ok(Reply::CreateDirFailed.to_string());
            }
        };
        let staged = match tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&dir)
        {
            Ok(staged) => staged,
            Err(e) => {
                tracing::warn!(error = %e, "cannot create staging file in {:?}", dir);
                local::drain_upload(stream, idle).await?;
                return Ok(Reply::CreateFileFailed.to_string());
            }
        };

        let text = match local::receive_body(stream, staged.path(), idle).await? {
            Err(reply) => reply.to_string(),
            Ok(len) => {
                tracing::debug!(len, backend = backend.name(), "forwarding {}", file_name);
                match backend.upload(file_name, dest, staged.path()).await {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "forwarding {} failed", file_name);
                        Reply::ForwardFailed.to_string()
                    }
                }
            }
        };

        if let Err(e) = staged.close() {
            tracing::warn!(error = %e, "cannot remove staged copy of {}", file_name);
        }
        Ok(text)
    }

    async fn download(
        &self,
        stream: &mut TcpStream,
        command: &Command,
        path: &VirtualPath,
    ) -> Result<(), ServiceError> {
        if let Some(physical) = self.store.find_file(path).await {
            return local::send_file_or_failure(stream, &physical, self.limits.idle_timeout).await;
        }

        let Some(backend) = path.extension().and_then(|ext| self.backend_for(&ext)) else {
            tracing::info!("{} not found", path);
            envelope::write_failure(stream).await?;
            return Ok(());
        };
        self.relay_envelope(stream, backend, command).await
    }

    async fn remove(
        &self,
        stream: &mut TcpStream,
        command: &Command,
        path: &VirtualPath,
    ) -> Result<(), ServiceError> {
        match self.store.remove(path).await {
            Ok(true) => {
                let reply = Reply::Deleted {
                    label: NATIVE_LABEL.to_string(),
                    store: self.store.name().to_string(),
                };
                write_reply(stream, &reply).await?;
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "local remove of {} failed", path),
        }

        let Some(backend) = path.extension().and_then(|ext| self.backend_for(&ext)) else {
            write_reply(stream, &Reply::FileNotFound).await?;
            return Ok(());
        };

        match backend.request_text(command, MAX_REPLY_LEN).await {
            Ok(text) => {
                stream.write_all(text.as_bytes()).await?;
                stream.flush().await?;
            }
            Err(e) => {
                tracing::warn!(error = %e, "remove of {} not forwarded", path);
                write_reply(stream, &Reply::ContactFailed).await?;
            }
        }
        Ok(())
    }

    async fn tar(
        &self,
        stream: &mut TcpStream,
        extension: Option<&str>,
    ) -> Result<(), ServiceError> {
        let placement = extension
            .and_then(|raw| Extension::parse(raw).ok())
            .and_then(|ext| Some((self.assignment.resolve(&ext)?, ext)));

        match placement {
            None => {
                write_reply(stream, &Reply::UnsupportedTarType).await?;
                Ok(())
            }
            Some((Placement::Native, _)) => {
                let idle = self.limits.idle_timeout;
                local::send_native_archive(stream, &self.store, &self.archiver, idle).await
            }
            Some((Placement::Backend(id), ext)) => {
                let command = Command::Tar {
                    extension: Some(ext.to_string()),
                };
                self.relay_envelope(stream, self.backend(id), &command).await
            }
        }
    }

    async fn list(
        &self,
        stream: &mut TcpStream,
        command: &Command,
        dir: &VirtualPath,
    ) -> Result<(), ServiceError> {
        let mut listing = AggregateListing::new(self.listing_limit);
        match self.store.list_native(dir).await {
            Ok(entries) => entries.iter().for_each(|entry| listing.push_path(entry)),
            Err(e) => tracing::warn!(error = %e, "cannot list {} locally", dir),
        }

        // queried together, appended in the configured order
        let responses = join_all(
            self.backends
                .iter()
                .map(|backend| backend.request_text(command, self.listing_limit)),
        )
        .await;
        for (backend, response) in self.backends.iter().zip(responses) {
            match response {
                Ok(text) => listing.append_raw(&text),
                Err(e) => {
                    tracing::warn!(error = %e, backend = backend.name(), "skipped in listing")
                }
            }
        }

        if listing.is_truncated() {
            tracing::warn!(limit = self.listing_limit, "listing of {} truncated", dir);
        }
        tracing::debug!(entries = listing.line_count(), "listing of {}", dir);
        stream.write_all(listing.as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Pass a backend's envelope response through to the client. If nothing
    /// has reached the client yet when the backend fails or stays silent past
    /// `backend_timeout`, the client gets the failure sentinel instead.
    async fn relay_envelope<W>(
        &self,
        downstream: &mut W,
        backend: &BackendClient,
        command: &Command,
    ) -> Result<(), ServiceError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut upstream = match backend.open(command).await {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(error = %e, "cannot forward {}", command);
                envelope::write_failure(downstream).await?;
                return Ok(());
            }
        };
        let header = match backend.read_header(&mut upstream).await {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    backend = backend.name(),
                    "no size field from backend"
                );
                envelope::write_failure(downstream).await?;
                return Ok(());
            }
        };

        envelope::write_header(downstream, header).await?;
        if let Header::Size(len) = header {
            envelope::copy_exact(&mut upstream, downstream, len, self.limits.idle_timeout).await?;
            tracing::debug!(len, backend = backend.name(), "relayed");
        } else {
            downstream.flush().await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConnectionHandler for RouterService {
    async fn handle(&self, mut stream: TcpStream, _peer: SocketAddr) -> Result<(), ServiceError> {
        let Some(command) = accept_command(&mut stream, &self.mount, self.limits.idle_timeout).await? else {
            return Ok(());
        };

        match &command {
            Command::Upload { file_name, dest } => self.upload(&mut stream, file_name, dest).await,
            Command::Download { path } => self.download(&mut stream, &command, path).await,
            Command::Remove { path } => self.remove(&mut stream, &command, path).await,
            Command::Tar { extension } => self.tar(&mut stream, extension.as_deref()).await,
            Command::List { path } => self.list(&mut stream, &command, path).await,
        }
    }
}
