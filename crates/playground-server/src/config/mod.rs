use std::env;
use std::path::PathBuf;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// How to reach the agent CLI
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AgentSettings {
    /// Path (or PATH-resolved name) of the agent binary. Unset means no agent.
    #[serde(default)]
    pub cli_path: Option<String>,
    /// Working directory for agent processes (default: current directory)
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Extra arguments placed before the per-session flags
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EventSettings {
    /// Events kept per session before the oldest are evicted
    #[serde(default = "default_retention")]
    pub retention: usize,
    /// Buffer between an agent process and its session log
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_retention() -> usize {
    1000
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub events: EventSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with defaults
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local configuration file (not tracked by git)
            .add_source(File::with_name("config/local").required(false))
            // Environment variables, e.g. PLAYGROUND_AGENT__CLI_PATH
            .add_source(
                Environment::with_prefix("PLAYGROUND")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("agent.args")
                    .try_parsing(true),
            );

        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }
}
