use clap::Args;

use common::routing::Extension;
use extstore_daemon::state::AppState;
use service::{BackendClient, BackendEndpoint};

#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Health check failed: {0}")]
    Failed(String),
}

struct Target {
    role: &'static str,
    name: String,
    extension: String,
    addr: String,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut lines = Vec::new();

        // 1. Check config directory
        lines.push("Config:".to_string());
        let state = match AppState::load(ctx.config_path.clone()) {
            Ok(state) => state,
            Err(e) => {
                lines.push(format!("  error: {}", e));
                return Ok(lines.join("\n"));
            }
        };
        let config = &state.config;
        lines.push(format!("  directory:    {}", state.config_dir.display()));
        lines.push("  config.toml:  OK".to_string());
        lines.push(format!("  mount_token:  {}", config.mount_token));

        // 2. Dial every store
        let mut targets = vec![Target {
            role: "router",
            name: config.router.name.clone(),
            extension: config.router.extension.clone(),
            addr: config.router.dial_addr(),
        }];
        targets.extend(config.backends.iter().map(|backend| Target {
            role: "backend",
            name: backend.name.clone(),
            extension: backend.extension.clone(),
            addr: backend.connect_addr.clone(),
        }));

        lines.push(String::new());
        lines.push("Stores:".to_string());
        let limits = config.limits();
        for target in targets {
            let extension = Extension::parse(&target.extension)
                .map_err(|e| HealthError::Failed(e.to_string()))?;
            let client = BackendClient::new(
                BackendEndpoint {
                    name: target.name.clone(),
                    extension,
                    connect_addr: target.addr.clone(),
                },
                limits,
            );
            let status = match client.connect().await {
                Ok(_) => "OK",
                Err(_) => "NOT REACHABLE",
            };
            lines.push(format!(
                "  {:<7} {} {:<5} {:<20} {}",
                target.role, target.name, target.extension, target.addr, status
            ));
        }

        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use extstore_daemon::state::AppConfig;
    use service::testkit::TestCluster;

    use crate::cli::op::{Op, OpContext};

    #[tokio::test]
    async fn test_reports_each_store() {
        let mut cluster = TestCluster::start().await.unwrap();
        cluster.stop_backend("S4").await.unwrap();

        let mut config = AppConfig::default();
        config.router.listen_addr = cluster.router().addr.to_string();
        config.connect_timeout_secs = 2;
        for backend in &mut config.backends {
            let store = cluster.backend(&backend.name).unwrap();
            backend.connect_addr = store.addr.to_string();
        }
        let temp = tempfile::TempDir::new().unwrap();
        AppState::init(Some(temp.path().to_path_buf()), Some(config)).unwrap();

        let output = Health
            .execute(&OpContext::new(Some(temp.path().to_path_buf())))
            .await
            .unwrap();
        let line = |name: &str| {
            output
                .lines()
                .find(|line| line.contains(&format!(" {} ", name)))
                .unwrap()
                .to_string()
        };
        assert!(line("S1").ends_with("OK"));
        assert!(line("S3").ends_with("OK"));
        assert!(line("S4").ends_with("NOT REACHABLE"));

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_uninitialized_config_is_reported() {
        let temp = tempfile::TempDir::new().unwrap();
        let output = Health
            .execute(&OpContext::new(Some(temp.path().join("missing"))))
            .await
            .unwrap();
        assert!(output.contains("not initialized"));
    }
}
