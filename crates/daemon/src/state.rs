use std::collections::HashSet;
use std::time::Duration;
use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use common::path::{MountToken, PathError, DEFAULT_MOUNT_TOKEN};
use common::protocol::DEFAULT_IDLE_TIMEOUT;
use common::routing::{Extension, ExtensionError};
use service::config::{
    BackendEndpoint, BackendServiceConfig, Limits, RouterServiceConfig, DEFAULT_BACKEND_TIMEOUT,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};

pub const APP_NAME: &str = "extstore";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// The whole store topology, shared by every process of a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Symbolic root every client path starts with
    #[serde(default = "default_mount_token")]
    pub mount_token: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Longest pause allowed inside one transfer
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Longest wait for a backend to answer
    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,
    /// Default tracing level, `RUST_LOG` still wins
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub router: RouterConfig,
    /// Listing fan-out follows this order.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub name: String,
    pub listen_addr: String,
    /// Extension the router stores itself
    pub extension: String,
    /// Physical root, defaults to `$HOME/<name>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub extension: String,
    pub listen_addr: String,
    /// Address the router dials
    pub connect_addr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

fn default_mount_token() -> String {
    DEFAULT_MOUNT_TOKEN.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT.as_secs()
}

fn default_backend_timeout_secs() -> u64 {
    DEFAULT_BACKEND_TIMEOUT.as_secs()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RouterConfig {
    /// Address a local client dials to reach the router: a wildcard listen
    /// host becomes `localhost`.
    pub fn dial_addr(&self) -> String {
        match self.listen_addr.rsplit_once(':') {
            Some(("0.0.0.0" | "[::]" | "", port)) => format!("localhost:{}", port),
            _ => self.listen_addr.clone(),
        }
    }
}

impl BackendConfig {
    fn local(name: &str, extension: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            extension: extension.to_string(),
            listen_addr: format!("0.0.0.0:{}", port),
            connect_addr: format!("localhost:{}", port),
            root: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mount_token: default_mount_token(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            backend_timeout_secs: default_backend_timeout_secs(),
            log_level: default_log_level(),
            router: RouterConfig {
                name: "S1".to_string(),
                listen_addr: "0.0.0.0:4307".to_string(),
                extension: ".c".to_string(),
                root: None,
            },
            backends: vec![
                BackendConfig::local("S2", ".pdf", 4308),
                BackendConfig::local("S3", ".txt", 4309),
                BackendConfig::local("S4", ".zip", 4310),
            ],
        }
    }
}

impl AppConfig {
    /// Check everything a service needs before it binds.
    pub fn validate(&self) -> Result<(), StateError> {
        self.mount()?;
        self.log_level()?;

        let mut names = HashSet::new();
        let mut extensions = HashSet::new();
        let stores = std::iter::once((&self.router.name, &self.router.extension)).chain(
            self.backends
                .iter()
                .map(|backend| (&backend.name, &backend.extension)),
        );
        for (name, extension) in stores {
            if name.is_empty() || name.contains('/') {
                return Err(StateError::InvalidConfig(format!(
                    "invalid store name {:?}",
                    name
                )));
            }
            if !names.insert(name.as_str()) {
                return Err(StateError::InvalidConfig(format!(
                    "store name {} is used more than once",
                    name
                )));
            }
            let extension = Extension::parse(extension)?;
            if !extensions.insert(extension.clone()) {
                return Err(StateError::InvalidConfig(format!(
                    "extension {} is assigned more than once",
                    extension
                )));
            }
        }
        Ok(())
    }

    pub fn mount(&self) -> Result<MountToken, StateError> {
        Ok(MountToken::new(self.mount_token.clone())?)
    }

    pub fn log_level(&self) -> Result<tracing::Level, StateError> {
        self.log_level
            .parse()
            .map_err(|_| StateError::InvalidConfig(format!("invalid log level {:?}", self.log_level)))
    }

    pub fn limits(&self) -> Limits {
        Limits {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            backend_timeout: Duration::from_secs(self.backend_timeout_secs),
        }
    }

    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|backend| backend.name == name)
    }

    pub fn router_service_config(
        &self,
        root_override: Option<PathBuf>,
    ) -> Result<RouterServiceConfig, StateError> {
        let backends = self
            .backends
            .iter()
            .map(|backend| {
                Ok(BackendEndpoint {
                    name: backend.name.clone(),
                    extension: Extension::parse(&backend.extension)?,
                    connect_addr: backend.connect_addr.clone(),
                })
            })
            .collect::<Result<Vec<_>, StateError>>()?;

        Ok(RouterServiceConfig {
            name: self.router.name.clone(),
            extension: Extension::parse(&self.router.extension)?,
            root: store_root(&self.router.name, root_override.or(self.router.root.clone()))?,
            mount: self.mount()?,
            backends,
            limits: self.limits(),
        })
    }

    pub fn backend_service_config(
        &self,
        name: &str,
        root_override: Option<PathBuf>,
    ) -> Result<BackendServiceConfig, StateError> {
        let backend = self
            .backend(name)
            .ok_or_else(|| StateError::UnknownBackend(name.to_string()))?;
        Ok(BackendServiceConfig {
            name: backend.name.clone(),
            extension: Extension::parse(&backend.extension)?,
            root: store_root(&backend.name, root_override.or(backend.root.clone()))?,
            mount: self.mount()?,
            limits: self.limits(),
        })
    }
}

/// Physical root of a store: the configured one, or `$HOME/<name>`.
pub fn store_root(name: &str, configured: Option<PathBuf>) -> Result<PathBuf, StateError> {
    if let Some(root) = configured {
        return Ok(root);
    }
    let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
    Ok(home.join(name))
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the config directory (~/.extstore)
    pub config_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the config directory path (custom or default ~/.extstore)
    pub fn config_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Write a fresh config file
    pub fn init(custom_path: Option<PathBuf>, config: Option<AppConfig>) -> Result<Self, StateError> {
        let config_dir = Self::config_dir(custom_path)?;
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        let config = config.unwrap_or_default();
        config.validate()?;

        fs::create_dir_all(&config_dir)?;
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            config_dir,
            config_path,
            config,
        })
    }

    /// Load and validate the existing config
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let config_dir = Self::config_dir(custom_path)?;
        if !config_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;
        config.validate()?;

        Ok(Self {
            config_dir,
            config_path,
            config,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("extstore directory not initialized. Run 'extstore init' first")]
    NotInitialized,

    #[error("extstore directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("no backend named {0} in config")]
    UnknownBackend(String),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Extension(#[from] ExtensionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_four_store_deployment() {
        let config = AppConfig::default();
        config.validate().unwrap();

        assert_eq!(config.router.listen_addr, "0.0.0.0:4307");
        let ports: Vec<_> = config
            .backends
            .iter()
            .map(|b| (b.extension.as_str(), b.connect_addr.as_str()))
            .collect();
        assert_eq!(
            ports,
            vec![
                (".pdf", "localhost:4308"),
                (".txt", "localhost:4309"),
                (".zip", "localhost:4310"),
            ]
        );
    }

    #[test]
    fn test_router_dial_addr() {
        let mut router = AppConfig::default().router;
        assert_eq!(router.dial_addr(), "localhost:4307");
        router.listen_addr = "10.0.0.5:4307".to_string();
        assert_eq!(router.dial_addr(), "10.0.0.5:4307");
    }

    #[test]
    fn test_init_then_load() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("cfg");

        let state = AppState::init(Some(dir.clone()), None).unwrap();
        assert!(state.config_path.exists());
        assert!(matches!(
            AppState::init(Some(dir.clone()), None),
            Err(StateError::AlreadyInitialized)
        ));

        let loaded = AppState::load(Some(dir)).unwrap();
        assert_eq!(loaded.config.backends.len(), 3);
        assert_eq!(loaded.config.mount_token, "~S1");
    }

    #[test]
    fn test_load_uninitialized() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            AppState::load(Some(temp.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
        assert!(matches!(
            AppState::load(Some(temp.path().to_path_buf())),
            Err(StateError::MissingFile(_))
        ));
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [router]
            name = "S1"
            listen_addr = "127.0.0.1:9000"
            extension = ".c"
            root = "/srv/S1"
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert!(config.backends.is_empty());
        let limits = config.limits();
        assert_eq!(limits.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(limits.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        assert_eq!(limits.backend_timeout, DEFAULT_BACKEND_TIMEOUT);

        let router = config.router_service_config(None).unwrap();
        assert_eq!(router.root, PathBuf::from("/srv/S1"));
        let router = config
            .router_service_config(Some(PathBuf::from("/tmp/override")))
            .unwrap();
        assert_eq!(router.root, PathBuf::from("/tmp/override"));
    }

    #[test]
    fn test_duplicate_extension_rejected() {
        let mut config = AppConfig::default();
        config.backends[1].extension = ".pdf".to_string();
        assert!(matches!(
            config.validate(),
            Err(StateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_bad_values_rejected() {
        let mut config = AppConfig::default();
        config.backends[0].extension = "pdf".to_string();
        assert!(matches!(config.validate(), Err(StateError::Extension(_))));

        let mut config = AppConfig::default();
        config.mount_token = "~a b".to_string();
        assert!(matches!(config.validate(), Err(StateError::Path(_))));

        let mut config = AppConfig::default();
        config.log_level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(StateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_backend_service_config() {
        let config = AppConfig::default();
        let backend = config
            .backend_service_config("S3", Some(PathBuf::from("/srv/S3")))
            .unwrap();
        assert_eq!(backend.extension.as_str(), ".txt");
        assert_eq!(backend.root, PathBuf::from("/srv/S3"));
        assert!(matches!(
            config.backend_service_config("S9", None),
            Err(StateError::UnknownBackend(_))
        ));
    }
}
