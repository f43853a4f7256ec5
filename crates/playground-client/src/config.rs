use std::path::{Path, PathBuf};

use playground_protocol::ProviderConfig;
use serde::{Deserialize, Serialize};

use crate::poller::SessionDefaults;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_MODEL: &str = "gpt-5";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Relay base URL (e.g., http://127.0.0.1:3000)
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Model for new sessions
    pub model: Option<String>,
    pub system_message: Option<String>,
    /// Custom provider endpoint forwarded on session creation
    pub provider: Option<ProviderConfig>,
}

impl ClientConfig {
    /// Load config from file and environment variables.
    /// Environment variables take precedence over file config.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("PLAYGROUND_SERVER_URL") {
            self.server.url = Some(url);
        }
        if let Some(model) = lookup("PLAYGROUND_MODEL") {
            self.session.model = Some(model);
        }
    }

    pub fn config_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".agent-playground/client.toml")
    }

    pub fn server_url(&self) -> &str {
        self.server.url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    pub fn session_defaults(&self) -> SessionDefaults {
        SessionDefaults {
            model: self
                .session
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            system_message: self.session.system_message.clone(),
            provider: self.session.provider.clone(),
        }
    }
}
