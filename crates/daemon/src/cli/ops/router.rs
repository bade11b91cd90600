use clap::Args;

use extstore_daemon::state::AppState;
use extstore_daemon::{spawn_service, Role, ServiceConfig};

use super::serve::ServeArgs;

#[derive(Args, Debug, Clone)]
pub struct Router {
    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("state error: {0}")]
    StateError(#[from] extstore_daemon::state::StateError),

    #[error("router failed: {0}")]
    Service(#[from] service::ServiceError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Router {
    type Error = RouterError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let config = &state.config;

        let router = config.router_service_config(self.serve.root.clone())?;
        let name = router.name.clone();
        let service_config = ServiceConfig {
            role: Role::Router(router),
            listen_addr: self.serve.listen_addr(&config.router.listen_addr),
            limits: config.limits(),
            log_level: self.serve.log_level(config)?,
            log_dir: self.serve.log_dir.clone(),
        };

        spawn_service(&service_config).await?;
        Ok(format!("router {} stopped", name))
    }
}
