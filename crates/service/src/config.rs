use std::path::PathBuf;
use std::time::Duration;

use common::prelude::{Extension, MountToken};
use common::protocol::DEFAULT_IDLE_TIMEOUT;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3600);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(120);

/// Deadlines applied to every request.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Hard cap on one whole request, from accept to close. Kept well above
    /// any transfer that is still making progress.
    pub request_timeout: Duration,
    /// Upper bound on dialing a backend.
    pub connect_timeout: Duration,
    /// Upper bound on a single read or write that makes no progress.
    pub idle_timeout: Duration,
    /// Upper bound on waiting for a backend's answer: `READY`, a status
    /// reply, a listing or a size field.
    pub backend_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }
}

/// Where the router reaches one backend store.
#[derive(Debug, Clone)]
pub struct BackendEndpoint {
    pub name: String,
    pub extension: Extension,
    /// `host:port`, resolved on every dial
    pub connect_addr: String,
}

#[derive(Debug, Clone)]
pub struct BackendServiceConfig {
    pub name: String,
    pub extension: Extension,
    pub root: PathBuf,
    pub mount: MountToken,
    pub limits: Limits,
}

#[derive(Debug, Clone)]
pub struct RouterServiceConfig {
    pub name: String,
    /// extension the router keeps itself
    pub extension: Extension,
    pub root: PathBuf,
    pub mount: MountToken,
    /// Fan-out order for listings is the order of this list.
    pub backends: Vec<BackendEndpoint>,
    pub limits: Limits,
}
