use crate::error::Result;
use config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const ENV_PREFIX: &str = "MANGAGRAB";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Chapter folders are created directly under this directory.
    pub downloads_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub no_sandbox: bool,
    pub chrome_path: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: Option<String>,
    pub navigation_timeout_secs: u64,
    pub image_timeout_secs: u64,
}

impl Config {
    /// Layers defaults, the TOML file at `path` (if present) and `MANGAGRAB__*` environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut builder = config::Config::builder();

        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            builder = builder.add_source(File::from(path).required(false));
        } else {
            warn!(
                "Configuration file not found at {}, using defaults and environment overrides",
                path.display()
            );
        }

        // MANGAGRAB__SERVER__PORT -> server.port
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            downloads_root: PathBuf::from("./downloads"),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            no_sandbox: false,
            chrome_path: None,
            window_width: 1280,
            window_height: 800,
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36"
                    .to_string(),
            ),
            navigation_timeout_secs: 30,
            image_timeout_secs: 30,
        }
    }
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }
}
