pub mod process;
pub mod service_config;

// App state (configuration, paths)
pub mod state;

pub use process::{spawn_service, start_service, ShutdownHandle};
pub use service_config::{Config as ServiceConfig, Role};
pub use state::{AppConfig, AppState, BackendConfig, RouterConfig, StateError};
