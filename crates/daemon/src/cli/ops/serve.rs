use std::path::PathBuf;

use clap::Args;

use extstore_daemon::state::{AppConfig, StateError};

/// Overrides shared by the `router` and `backend` commands.
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Override the listen port (host part comes from config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the store root directory
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Override the configured log level (RUST_LOG still wins)
    #[arg(long)]
    pub log_level: Option<tracing::Level>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl ServeArgs {
    pub fn listen_addr(&self, configured: &str) -> String {
        match self.port {
            Some(port) => with_port(configured, port),
            None => configured.to_string(),
        }
    }

    pub fn log_level(&self, config: &AppConfig) -> Result<tracing::Level, StateError> {
        match self.log_level {
            Some(level) => Ok(level),
            None => config.log_level(),
        }
    }
}

fn with_port(addr: &str, port: u16) -> String {
    match addr.rsplit_once(':') {
        Some((host, _)) => format!("{}:{}", host, port),
        None => format!("{}:{}", addr, port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_override_keeps_host() {
        let args = ServeArgs {
            port: Some(5000),
            ..Default::default()
        };
        assert_eq!(args.listen_addr("0.0.0.0:4307"), "0.0.0.0:5000");
        assert_eq!(args.listen_addr("[::]:4307"), "[::]:5000");
        assert_eq!(ServeArgs::default().listen_addr("0.0.0.0:4307"), "0.0.0.0:4307");
    }

    #[test]
    fn test_log_level_falls_back_to_config() {
        let config = AppConfig::default();
        assert_eq!(
            ServeArgs::default().log_level(&config).unwrap(),
            tracing::Level::INFO
        );
        let args = ServeArgs {
            log_level: Some(tracing::Level::DEBUG),
            ..Default::default()
        };
        assert_eq!(args.log_level(&config).unwrap(), tracing::Level::DEBUG);
    }
}
