use std::path::PathBuf;

use service::{BackendServiceConfig, Limits, RouterServiceConfig};

/// Which side of the protocol this process serves.
#[derive(Debug, Clone)]
pub enum Role {
    Router(RouterServiceConfig),
    Backend(BackendServiceConfig),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    /// address the accept loop binds, e.g. `0.0.0.0:4307`
    pub listen_addr: String,
    pub limits: Limits,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Store name of the role, used to tag logs.
    pub fn name(&self) -> &str {
        match &self.role {
            Role::Router(router) => &router.name,
            Role::Backend(backend) => &backend.name,
        }
    }
}
