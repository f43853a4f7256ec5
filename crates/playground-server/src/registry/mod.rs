mod log;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use playground_protocol::{RawEvent, SessionInfo};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::AbortHandle;

pub use log::EventLog;

use crate::agent::{AgentBackend, AgentSession, SessionConfig};
use crate::config::EventSettings;
use crate::error::{RelayError, Result};

/// One live session: agent handle, selected model and its event log.
pub struct SessionSlot {
    pub id: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    handle: Arc<dyn AgentSession>,
    log: Arc<Mutex<EventLog>>,
    forwarder: AbortHandle,
}

impl SessionSlot {
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            model: self.model.clone(),
        }
    }
}

/// Session store (in-memory).
///
/// Owns every session's agent handle and event log for as long as the
/// session lives. Sessions only share the map lock; each log has its own.
pub struct SessionRegistry {
    /// session_id -> SessionSlot
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
    backend: Option<Arc<dyn AgentBackend>>,
    retention: usize,
    channel_capacity: usize,
}

impl SessionRegistry {
    pub fn new(backend: Option<Arc<dyn AgentBackend>>, settings: &EventSettings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            backend,
            retention: settings.retention,
            channel_capacity: settings.channel_capacity.max(1),
        }
    }

    /// Whether an agent backend was initialized
    pub fn is_connected(&self) -> bool {
        self.backend.is_some()
    }

    /// Create a session and start collecting its events
    pub async fn create(&self, config: SessionConfig) -> Result<String> {
        let backend = self.backend.as_ref().ok_or(RelayError::AgentUnavailable)?;

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let handle = backend.create_session(&config, tx).await?;
        let session_id = handle.session_id().to_string();

        let log = Arc::new(Mutex::new(EventLog::new(self.retention)));
        let forwarder = tokio::spawn(forward_events(session_id.clone(), rx, log.clone()));

        let slot = SessionSlot {
            id: session_id.clone(),
            model: config.model.clone(),
            created_at: Utc::now(),
            handle,
            log,
            forwarder: forwarder.abort_handle(),
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.clone(), Arc::new(slot));
        tracing::info!(session_id = %session_id, model = %config.model, "session created");

        Ok(session_id)
    }

    pub async fn get(&self, session_id: &str) -> Result<Arc<SessionSlot>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))
    }

    /// Live sessions, oldest first
    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut slots: Vec<&Arc<SessionSlot>> = sessions.values().collect();
        slots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        slots.into_iter().map(|slot| slot.info()).collect()
    }

    /// Forward a prompt to the session's agent; returns the message id
    pub async fn send(&self, session_id: &str, prompt: &str) -> Result<String> {
        let slot = self.get(session_id).await?;
        let message_id = slot.handle.send(prompt).await?;
        tracing::debug!(session_id = %session_id, message_id = %message_id, "prompt forwarded");
        Ok(message_id)
    }

    /// Append an event directly to a session's log; returns the new length
    pub async fn append(&self, session_id: &str, event: RawEvent) -> Result<usize> {
        let slot = self.get(session_id).await?;
        let mut log = slot.log.lock().await;
        Ok(log.append(event))
    }

    /// Events at `[from, len)` together with the current log length
    pub async fn read(&self, session_id: &str, from: usize) -> Result<(Vec<RawEvent>, usize)> {
        let slot = self.get(session_id).await?;
        let log = slot.log.lock().await;
        Ok((log.read(from), log.len()))
    }

    /// Full retained history
    pub async fn history(&self, session_id: &str) -> Result<Vec<RawEvent>> {
        let slot = self.get(session_id).await?;
        let log = slot.log.lock().await;
        Ok(log.snapshot())
    }

    /// Destroy a session and purge its log
    pub async fn destroy(&self, session_id: &str) -> Result<()> {
        let slot = {
            let mut sessions = self.sessions.write().await;
            sessions
                .remove(session_id)
                .ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))?
        };

        slot.forwarder.abort();
        if let Err(e) = slot.handle.destroy().await {
            tracing::warn!(session_id = %session_id, error = %e, "agent session destroy failed");
        }
        tracing::info!(session_id = %session_id, "session destroyed");
        Ok(())
    }

    /// Best-effort teardown of every session (on shutdown)
    pub async fn destroy_all(&self) {
        let ids: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions.keys().cloned().collect()
        };
        for id in ids {
            if let Err(e) = self.destroy(&id).await {
                tracing::warn!(session_id = %id, error = %e, "failed to destroy session");
            }
        }
    }

    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }
}

/// Drain an agent's event channel into the session log, in arrival order.
async fn forward_events(
    session_id: String,
    mut rx: mpsc::Receiver<RawEvent>,
    log: Arc<Mutex<EventLog>>,
) {
    while let Some(event) = rx.recv().await {
        let mut log = log.lock().await;
        let before = log.evicted();
        log.append(event);
        if log.evicted() > before {
            tracing::debug!(
                session_id = %session_id,
                evicted = log.evicted(),
                "event log at capacity, evicted oldest event"
            );
        }
    }
    tracing::debug!(session_id = %session_id, "event stream closed");
}
