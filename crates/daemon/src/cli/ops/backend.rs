use clap::Args;

use extstore_daemon::state::{AppState, StateError};
use extstore_daemon::{spawn_service, Role, ServiceConfig};

use super::serve::ServeArgs;

#[derive(Args, Debug, Clone)]
pub struct Backend {
    /// Name of the backend entry in config.toml, e.g. S2
    #[arg(long)]
    pub name: String,

    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),

    #[error("backend failed: {0}")]
    Service(#[from] service::ServiceError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Backend {
    type Error = BackendError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let config = &state.config;

        let entry = config
            .backend(&self.name)
            .ok_or_else(|| StateError::UnknownBackend(self.name.clone()))?;
        let backend = config.backend_service_config(&self.name, self.serve.root.clone())?;
        let service_config = ServiceConfig {
            role: Role::Backend(backend),
            listen_addr: self.serve.listen_addr(&entry.listen_addr),
            limits: config.limits(),
            log_level: self.serve.log_level(config)?,
            log_dir: self.serve.log_dir.clone(),
        };

        spawn_service(&service_config).await?;
        Ok(format!("backend {} stopped", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cli::op::{Op, OpContext};

    #[tokio::test]
    async fn test_unknown_backend_fails_before_binding() {
        let temp = tempfile::TempDir::new().unwrap();
        AppState::init(Some(temp.path().to_path_buf()), None).unwrap();

        let op = Backend {
            name: "S9".to_string(),
            serve: ServeArgs::default(),
        };
        let result = op
            .execute(&OpContext::new(Some(temp.path().to_path_buf())))
            .await;
        assert!(matches!(
            result,
            Err(BackendError::StateError(StateError::UnknownBackend(_)))
        ));
    }
}
