use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use common::path::MountToken;
use common::routing::Extension;

use super::client::TestClient;
use crate::backend::BackendService;
use crate::config::{BackendEndpoint, BackendServiceConfig, Limits, RouterServiceConfig};
use crate::router::RouterService;
use crate::server::{serve, ConnectionHandler};

/// The router first, then the backends in fan-out order.
const TOPOLOGY: [(&str, &str); 4] = [("S1", ".c"), ("S2", ".pdf"), ("S3", ".txt"), ("S4", ".zip")];

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// One running store of a [`TestCluster`].
pub struct TestStore {
    pub name: String,
    pub extension: Extension,
    pub root: PathBuf,
    pub addr: SocketAddr,
    handle: Option<JoinHandle<()>>,
}

impl TestStore {
    async fn spawn<H>(
        name: &str,
        extension: Extension,
        root: PathBuf,
        handler: Arc<H>,
        limits: Limits,
        shutdown_rx: watch::Receiver<()>,
    ) -> Result<Self>
    where
        H: ConnectionHandler,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let store_name = name.to_string();
        let handle = tokio::spawn(async move {
            if let Err(e) = serve(listener, handler, limits, shutdown_rx).await {
                tracing::error!("test store {} failed: {}", store_name, e);
            }
        });

        Ok(Self {
            name: name.to_string(),
            extension,
            root,
            addr,
            handle: Some(handle),
        })
    }

    /// Physical location of a path relative to this store's root.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

/// A router and three backend stores on loopback, mirroring the default
/// deployment: `.c` native, `.pdf` on S2, `.txt` on S3, `.zip` on S4.
pub struct TestCluster {
    router: TestStore,
    backends: Vec<TestStore>,
    shutdown_tx: watch::Sender<()>,
    _dir: TempDir,
}

impl TestCluster {
    pub async fn start() -> Result<Self> {
        Self::start_with_limits(Limits {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(2),
            idle_timeout: Duration::from_secs(5),
            backend_timeout: Duration::from_secs(5),
        })
        .await
    }

    pub async fn start_with_limits(limits: Limits) -> Result<Self> {
        let dir = TempDir::new()?;
        let mount = MountToken::default();
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let mut backends = Vec::new();
        let mut endpoints = Vec::new();
        for (name, raw_ext) in &TOPOLOGY[1..] {
            let extension = Extension::parse(raw_ext)?;
            let root = dir.path().join(name);
            let service = BackendService::new(BackendServiceConfig {
                name: name.to_string(),
                extension: extension.clone(),
                root: root.clone(),
                mount: mount.clone(),
                limits,
            });
            service.prepare().await?;

            let store = TestStore::spawn(
                name,
                extension.clone(),
                root,
                Arc::new(service),
                limits,
                shutdown_rx.clone(),
            )
            .await?;
            endpoints.push(BackendEndpoint {
                name: name.to_string(),
                extension,
                connect_addr: store.addr.to_string(),
            });
            backends.push(store);
        }

        let (name, raw_ext) = TOPOLOGY[0];
        let extension = Extension::parse(raw_ext)?;
        let root = dir.path().join(name);
        let service = RouterService::new(RouterServiceConfig {
            name: name.to_string(),
            extension: extension.clone(),
            root: root.clone(),
            mount,
            backends: endpoints,
            limits,
        })?;
        service.prepare().await?;
        let router = TestStore::spawn(
            name,
            extension,
            root,
            Arc::new(service),
            limits,
            shutdown_rx,
        )
        .await?;

        tracing::debug!(router = %router.addr, "test cluster started");
        Ok(Self {
            router,
            backends,
            shutdown_tx,
            _dir: dir,
        })
    }

    pub fn client(&self) -> TestClient {
        TestClient::new(self.router.addr)
    }

    pub fn router(&self) -> &TestStore {
        &self.router
    }

    pub fn backends(&self) -> &[TestStore] {
        &self.backends
    }

    pub fn backend(&self, name: &str) -> Option<&TestStore> {
        self.backends.iter().find(|store| store.name == name)
    }

    /// Every store, router first.
    pub fn stores(&self) -> impl Iterator<Item = &TestStore> {
        std::iter::once(&self.router).chain(self.backends.iter())
    }

    /// Stop one backend's accept loop so it refuses connections.
    pub async fn stop_backend(&mut self, name: &str) -> Result<()> {
        let store = self
            .backends
            .iter_mut()
            .find(|store| store.name == name)
            .ok_or_else(|| anyhow::anyhow!("no backend named '{}'", name))?;
        store.stop().await;
        Ok(())
    }

    /// Replace one backend with a listener that accepts connections and then
    /// never reads or answers. The stalled store holds its sockets until the
    /// cluster shuts down.
    pub async fn stall_backend(&mut self, name: &str) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let store = self
            .backends
            .iter_mut()
            .find(|store| store.name == name)
            .ok_or_else(|| anyhow::anyhow!("no backend named '{}'", name))?;
        store.stop().await;

        let listener = TcpListener::bind(store.addr).await?;
        let store_name = store.name.clone();
        store.handle = Some(tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => held.push(stream),
                        Err(e) => tracing::warn!("stalled store {} accept failed: {}", store_name, e),
                    },
                    _ = shutdown_rx.changed() => break,
                }
            }
        }));
        Ok(())
    }

    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        for store in std::iter::once(&mut self.router).chain(self.backends.iter_mut()) {
            if let Some(handle) = store.handle.take() {
                if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
                    tracing::warn!("test store {} did not stop in time", store.name);
                }
            }
        }
    }
}
