pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use service::{serve, BackendService, ConnectionHandler, Limits, RouterService, ServiceError};

use crate::service_config::Role;
use crate::ServiceConfig;

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle for gracefully shutting down a running store.
pub struct ShutdownHandle {
    local_addr: SocketAddr,
    graceful_waiter: tokio::task::JoinHandle<()>,
    handles: Vec<tokio::task::JoinHandle<()>>,
    shutdown_tx: watch::Sender<()>,
}

impl ShutdownHandle {
    /// Address the accept loop actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Block until the service shuts down (via signal or explicit shutdown).
    pub async fn wait(self) {
        shutdown_and_join(self.graceful_waiter, self.handles).await;
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Initialize logging, panic handler, and build info reporting.
/// Returns guards that must be kept alive for the duration of the program.
fn init_logging(
    service_config: &ServiceConfig,
) -> Vec<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::fmt::format::FmtSpan;

    let mut guards = Vec::new();

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);

    let stdout_env_filter = EnvFilter::builder()
        .with_default_directive(service_config.log_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(stdout_env_filter);

    if let Some(log_dir) = &service_config.log_dir {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Failed to create log directory {:?}: {}",
                log_dir, e
            );
        }

        let file_name = format!("extstore-{}.log", service_config.name());
        let file_appender = tracing_appender::rolling::daily(log_dir, file_name);
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guards.push(file_guard);

        let file_env_filter = EnvFilter::builder()
            .with_default_directive(service_config.log_level.into())
            .from_env_lossy();

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(file_env_filter);

        tracing_subscriber::registry()
            .with(stdout_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry().with(stdout_layer).init();
    }

    utils::register_panic_logger();
    utils::report_build_info(service_config.name());

    guards
}

/// Wait for shutdown and join all handles with timeout.
async fn shutdown_and_join(
    graceful_waiter: tokio::task::JoinHandle<()>,
    handles: Vec<tokio::task::JoinHandle<()>>,
) {
    let _ = graceful_waiter.await;

    if timeout(FINAL_SHUTDOWN_TIMEOUT, join_all(handles))
        .await
        .is_err()
    {
        tracing::error!(
            "Failed to shut down within {} seconds",
            FINAL_SHUTDOWN_TIMEOUT.as_secs()
        );
        std::process::exit(4);
    }
}

fn spawn_server<H>(
    name: String,
    handler: H,
    listener: TcpListener,
    limits: Limits,
    shutdown_rx: watch::Receiver<()>,
) -> tokio::task::JoinHandle<()>
where
    H: ConnectionHandler,
{
    tokio::spawn(async move {
        if let Err(e) = serve(listener, Arc::new(handler), limits, shutdown_rx).await {
            tracing::error!(store = %name, "server error: {}", e);
        }
    })
}

/// Bind the listener, prepare the store root and spawn the accept loop.
///
/// The returned `ShutdownHandle` must be kept alive; dropping it does not stop the service.
pub async fn start_service(service_config: &ServiceConfig) -> Result<ShutdownHandle, ServiceError> {
    let listener = service::bind(&service_config.listen_addr).await?;
    let local_addr = listener.local_addr()?;
    let (graceful_waiter, shutdown_tx, shutdown_rx) = utils::graceful_shutdown_blocker()?;
    let name = service_config.name().to_string();

    let handle = match &service_config.role {
        Role::Router(config) => {
            let router = RouterService::new(config.clone())?;
            router.prepare().await?;
            spawn_server(name, router, listener, service_config.limits, shutdown_rx)
        }
        Role::Backend(config) => {
            let backend = BackendService::new(config.clone());
            backend.prepare().await?;
            spawn_server(name, backend, listener, service_config.limits, shutdown_rx)
        }
    };

    tracing::info!(
        store = service_config.name(),
        addr = %local_addr,
        "Running"
    );

    Ok(ShutdownHandle {
        local_addr,
        graceful_waiter,
        handles: vec![handle],
        shutdown_tx,
    })
}

/// Runs one store until a shutdown signal is received. Use for CLI binary usage.
pub async fn spawn_service(service_config: &ServiceConfig) -> Result<(), ServiceError> {
    let _guards = init_logging(service_config);
    let handle = match start_service(service_config).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("error starting store: {}", e);
            return Err(e);
        }
    };
    handle.wait().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use common::prelude::{Extension, MountToken};
    use service::testkit::TestClient;
    use service::BackendServiceConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_backend_role_serves_until_shutdown() {
        let temp = TempDir::new().unwrap();
        let config = ServiceConfig {
            role: Role::Backend(BackendServiceConfig {
                name: "S3".to_string(),
                extension: Extension::parse(".txt").unwrap(),
                root: temp.path().join("S3"),
                mount: MountToken::default(),
                limits: Limits::default(),
            }),
            listen_addr: "127.0.0.1:0".to_string(),
            limits: Limits::default(),
            log_level: tracing::Level::INFO,
            log_dir: None,
        };

        let handle = start_service(&config).await.unwrap();
        assert!(temp.path().join("S3").is_dir());

        let client = TestClient::new(handle.local_addr());
        let status = client
            .upload_bytes("notes.txt", b"hello", "~S1/docs")
            .await
            .unwrap();
        assert_eq!(status, "SUCCESS: TXT stored in S3");
        assert_eq!(client.list("~S1/docs").await.unwrap(), "~S1/docs/notes.txt\n");

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(10), handle.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let temp = TempDir::new().unwrap();
        let config = ServiceConfig {
            role: Role::Backend(BackendServiceConfig {
                name: "S2".to_string(),
                extension: Extension::parse(".pdf").unwrap(),
                root: temp.path().join("S2"),
                mount: MountToken::default(),
                limits: Limits::default(),
            }),
            listen_addr: taken.local_addr().unwrap().to_string(),
            limits: Limits::default(),
            log_level: tracing::Level::INFO,
            log_dir: None,
        };

        assert!(matches!(
            start_service(&config).await,
            Err(ServiceError::Bind { .. })
        ));
    }
}
