//! Seam between the relay and whatever produces agent events.
//!
//! A backend creates sessions; a session accepts prompts and pushes the
//! resulting [`RawEvent`]s into the channel it was created with. The relay
//! never looks inside the agent's own protocol.

mod command;

use std::sync::Arc;

use async_trait::async_trait;
use playground_protocol::{ProviderConfig, RawEvent};
use thiserror::Error;
use tokio::sync::mpsc;

pub use command::CommandAgent;

/// Channel an agent session publishes its events on
pub type EventSender = mpsc::Sender<RawEvent>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent unavailable: {0}")]
    Unavailable(String),

    #[error("failed to start agent: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("session {0} is already running a prompt")]
    Busy(String),

    #[error("agent io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("agent channel closed")]
    Closed,
}

/// Per-session options chosen by the caller
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    pub system_message: Option<String>,
    pub provider: Option<ProviderConfig>,
}

#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Open a new session that reports its events on `events`.
    async fn create_session(
        &self,
        config: &SessionConfig,
        events: EventSender,
    ) -> Result<Arc<dyn AgentSession>, AgentError>;
}

#[async_trait]
pub trait AgentSession: Send + Sync {
    fn session_id(&self) -> &str;

    /// Submit a prompt; returns the id assigned to the message.
    async fn send(&self, prompt: &str) -> Result<String, AgentError>;

    /// Stop any in-flight work and release the session.
    async fn destroy(&self) -> Result<(), AgentError>;
}
