use std::path::PathBuf;

use clap::Args;

use extstore_daemon::state::{store_root, AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Mount token clients prefix their paths with
    #[arg(long)]
    pub mount_token: Option<String>,

    /// Parent directory for every store root (default: $HOME)
    #[arg(long)]
    pub stores_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateError(#[from] StateError),
}

impl Init {
    fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        if let Some(token) = &self.mount_token {
            config.mount_token = token.clone();
        }
        if let Some(dir) = &self.stores_dir {
            config.router.root = Some(dir.join(&config.router.name));
            for backend in &mut config.backends {
                backend.root = Some(dir.join(&backend.name));
            }
        }
        config
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::init(ctx.config_path.clone(), Some(self.config()))?;
        let config = &state.config;

        let mut lines = vec![
            format!("Initialized extstore at {}", state.config_dir.display()),
            format!("  config: {}", state.config_path.display()),
            format!("  mount:  {}", config.mount_token),
            String::new(),
        ];
        let router = &config.router;
        lines.push(format!(
            "router  {} {:<5} {:<15} {}",
            router.name,
            router.extension,
            router.listen_addr,
            store_root(&router.name, router.root.clone())?.display()
        ));
        for backend in &config.backends {
            lines.push(format!(
                "backend {} {:<5} {:<15} {}",
                backend.name,
                backend.extension,
                backend.listen_addr,
                store_root(&backend.name, backend.root.clone())?.display()
            ));
        }

        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cli::op::{Op, OpContext};

    #[tokio::test]
    async fn test_init_writes_config_once() {
        let temp = tempfile::TempDir::new().unwrap();
        let ctx = OpContext::new(Some(temp.path().join("cfg")));
        let op = Init {
            mount_token: None,
            stores_dir: Some(temp.path().join("stores")),
        };

        let output = op.execute(&ctx).await.unwrap();
        assert!(output.contains("backend S4 .zip"));

        let state = AppState::load(ctx.config_path.clone()).unwrap();
        assert_eq!(
            state.config.backend("S2").unwrap().root,
            Some(temp.path().join("stores").join("S2"))
        );

        assert!(matches!(
            op.execute(&ctx).await,
            Err(InitError::StateError(StateError::AlreadyInitialized))
        ));
    }

    #[tokio::test]
    async fn test_invalid_mount_token_writes_nothing() {
        let temp = tempfile::TempDir::new().unwrap();
        let ctx = OpContext::new(Some(temp.path().join("cfg")));
        let op = Init {
            mount_token: Some("no spaces allowed".to_string()),
            stores_dir: None,
        };

        assert!(op.execute(&ctx).await.is_err());
        assert!(!temp.path().join("cfg").exists());
    }
}
