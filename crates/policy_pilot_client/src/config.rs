//! Client config load/save for `~/.policy-pilot/config.yaml`.
//! Two sections: `api.*` for the HTTP endpoints, `server.*` for the
//! streaming chat endpoint.

use std::path::{Path, PathBuf};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_WS_PATH: &str = "/ws/chat";

/// API section: base URL for the upload and category endpoints.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ApiSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Server section: where the streaming chat WebSocket lives.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ServerSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_path: Option<String>,
}

/// Full client config.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub server: ServerSection,
}

impl Config {
    /// WebSocket URL for the chat session, with defaults filled in.
    pub fn ws_url(&self) -> String {
        let host = self.server.host.as_deref().unwrap_or(DEFAULT_HOST);
        let port = self.server.port.unwrap_or(DEFAULT_PORT);
        let path = self.server.ws_path.as_deref().unwrap_or(DEFAULT_WS_PATH);
        format!("ws://{}:{}{}", host, port, path)
    }

    /// Base URL for the HTTP API, with defaults filled in.
    pub fn api_base_url(&self) -> String {
        match self.api.base_url.as_deref() {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let host = self.server.host.as_deref().unwrap_or(DEFAULT_HOST);
                let port = self.server.port.unwrap_or(DEFAULT_PORT);
                format!("http://{}:{}", host, port)
            }
        }
    }
}

/// Returns the default config file path: `~/.policy-pilot/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    let home = home_dir()?;
    Some(home.join(".policy-pilot").join("config.yaml"))
}

#[cfg(unix)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(windows)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}

#[cfg(not(any(unix, windows)))]
fn home_dir() -> Option<PathBuf> {
    None
}

/// Load config from a YAML file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Save config to a YAML file. Creates the parent directory if missing.
pub fn save(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    Ok(std::fs::write(path, contents)?)
}

/// Config load/save error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
