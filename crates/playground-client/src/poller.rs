use std::time::Duration;

use playground_protocol::{Change, Conversation, CreateSessionRequest, ProviderConfig, SessionInfo};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::RelayApi;
use crate::error::{ClientError, Result};
use crate::render::View;

const STATUS_INTERVAL: Duration = Duration::from_secs(5);
const EVENTS_INTERVAL: Duration = Duration::from_secs(1);

/// Connection and selection state of the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connected { active: Option<String> },
}

/// Something the view must reflect after a client operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewUpdate {
    /// The active conversation was replaced wholesale
    Reset,
    Change(Change),
}

/// User input forwarded into the client loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Create { model: Option<String> },
    Select(String),
    /// Destroy a session; `None` means the active one
    Destroy(Option<String>),
    ListSessions,
    Quit,
}

impl Command {
    /// Parse one line of user input; `None` for blank lines.
    ///
    /// Lines starting with `/` are commands, anything else is a prompt.
    pub fn parse(line: &str) -> Option<Result<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Ok(Command::Send(line.to_string())));
        };

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::to_string);
        let command = match name {
            "new" => Command::Create { model: arg },
            "sessions" => Command::ListSessions,
            "use" => match arg {
                Some(id) => Command::Select(id),
                None => {
                    return Some(Err(ClientError::Validation("usage: /use <session-id>".into())));
                }
            },
            "delete" => Command::Destroy(arg),
            "quit" | "exit" => Command::Quit,
            other => {
                return Some(Err(ClientError::Validation(format!("unknown command: /{}", other))));
            }
        };
        Some(Ok(command))
    }
}

/// Parameters applied to sessions created without explicit overrides
#[derive(Debug, Clone, Default)]
pub struct SessionDefaults {
    pub model: String,
    pub system_message: Option<String>,
    pub provider: Option<ProviderConfig>,
}

/// Polling client.
///
/// Keeps the list of known sessions, the active session's projected
/// conversation, and the cursor: how many of that session's raw events have
/// already been folded into the conversation. Every event read advances the
/// cursor by exactly the number of events returned.
pub struct PlaygroundClient<A> {
    api: A,
    connected: bool,
    /// Survives disconnection so polling resumes on reconnect
    active: Option<String>,
    sessions: Vec<SessionInfo>,
    conversation: Conversation,
    cursor: usize,
    defaults: SessionDefaults,
    updates: Vec<ViewUpdate>,
    status_interval: Duration,
    events_interval: Duration,
}

impl<A: RelayApi> PlaygroundClient<A> {
    pub fn new(api: A, defaults: SessionDefaults) -> Self {
        Self {
            api,
            connected: false,
            active: None,
            sessions: Vec::new(),
            conversation: Conversation::new(),
            cursor: 0,
            defaults,
            updates: Vec::new(),
            status_interval: STATUS_INTERVAL,
            events_interval: EVENTS_INTERVAL,
        }
    }

    pub fn with_intervals(mut self, status: Duration, events: Duration) -> Self {
        self.status_interval = status;
        self.events_interval = events;
        self
    }

    pub fn state(&self) -> ClientState {
        if self.connected {
            ClientState::Connected {
                active: self.active.clone(),
            }
        } else {
            ClientState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn active_session(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn sessions(&self) -> &[SessionInfo] {
        &self.sessions
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Pending view updates since the last drain
    pub fn drain_updates(&mut self) -> Vec<ViewUpdate> {
        std::mem::take(&mut self.updates)
    }

    /// Refresh connection state from the relay.
    ///
    /// On reconnecting, when the relay reports sessions and none are known
    /// locally, they are adopted and the first becomes active with an empty view at cursor 0;
    /// the next event poll folds its retained log. Returns the adopted
    /// session id, if any.
    pub async fn check_status(&mut self) -> Result<Option<String>> {
        let status = match self.api.status().await {
            Ok(status) => status,
            Err(e) => {
                if self.connected {
                    warn!(error = %e, "lost connection to relay");
                }
                self.connected = false;
                return Err(e);
            }
        };

        let reconnected = !self.connected;
        if reconnected {
            info!(agent = status.connected, "connected to relay");
        }
        self.connected = true;

        if reconnected && self.sessions.is_empty() && !status.sessions.is_empty() {
            self.sessions = status.sessions;
            let id = self.sessions[0].id.clone();
            info!(session_id = %id, count = self.sessions.len(), "adopted relay sessions");
            self.activate(id.clone(), Conversation::new(), 0);
            return Ok(Some(id));
        }
        Ok(None)
    }

    /// Create a session and make it active with an empty view
    pub async fn create_session(
        &mut self,
        model: Option<String>,
        system_message: Option<String>,
        provider: Option<ProviderConfig>,
    ) -> Result<String> {
        let model = model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.defaults.model.clone());
        let request = CreateSessionRequest {
            model: model.clone(),
            system_message: system_message.or_else(|| self.defaults.system_message.clone()),
            provider: provider.or_else(|| self.defaults.provider.clone()),
        };

        let session_id = self.api.create_session(&request).await?;
        info!(session_id = %session_id, model = %model, "session created");

        self.sessions.push(SessionInfo {
            id: session_id.clone(),
            model,
        });
        self.activate(session_id.clone(), Conversation::new(), 0);
        Ok(session_id)
    }

    /// Make a session active, hydrating its view from the full history
    pub async fn select_session(&mut self, session_id: &str) -> Result<()> {
        let history = self.api.messages(session_id).await?;
        let conversation = Conversation::from_events(&history.messages);
        let cursor = history.messages.len();
        debug!(
            session_id = %session_id,
            events = cursor,
            messages = conversation.len(),
            "session hydrated"
        );
        self.activate(session_id.to_string(), conversation, cursor);
        Ok(())
    }

    /// Fold the active session's unseen events; returns how many were read
    pub async fn poll_events(&mut self) -> Result<usize> {
        let session_id = self
            .active_session()
            .map(str::to_string)
            .ok_or(ClientError::NoActiveSession)?;

        let resp = self.api.events(&session_id, self.cursor).await?;
        if resp.events.is_empty() {
            return Ok(0);
        }

        let changes = self.conversation.apply_all(&resp.events);
        self.cursor += resp.events.len();
        debug!(
            session_id = %session_id,
            count = resp.events.len(),
            cursor = self.cursor,
            total = resp.total,
            "polled events"
        );
        self.updates.extend(
            changes
                .into_iter()
                .filter(|c| *c != Change::Ignored)
                .map(ViewUpdate::Change),
        );
        Ok(resp.events.len())
    }

    /// Send a prompt to the active session.
    ///
    /// The user message is shown immediately. On failure it stays, followed
    /// by an error message, and the error is returned.
    pub async fn send_message(&mut self, prompt: &str) -> Result<String> {
        let session_id = self
            .active_session()
            .map(str::to_string)
            .ok_or(ClientError::NoActiveSession)?;

        let index = self.conversation.push_local_user(prompt);
        self.updates.push(ViewUpdate::Change(Change::Appended(index)));

        match self.api.send(&session_id, prompt).await {
            Ok(message_id) => {
                debug!(session_id = %session_id, message_id = %message_id, "prompt sent");
                Ok(message_id)
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "failed to send prompt");
                let index = self
                    .conversation
                    .push_local_error(format!("Failed to send message: {}", e));
                self.updates.push(ViewUpdate::Change(Change::Appended(index)));
                Err(e)
            }
        }
    }

    /// Destroy a session on the relay and forget it locally
    pub async fn destroy_session(&mut self, session_id: &str) -> Result<()> {
        match self.api.delete_session(session_id).await {
            Ok(()) => {}
            Err(ClientError::NotFound) => {
                debug!(session_id = %session_id, "session already gone on relay");
            }
            Err(e) => return Err(e),
        }

        self.sessions.retain(|s| s.id != session_id);
        if self.active_session() == Some(session_id) {
            self.active = None;
            self.conversation = Conversation::new();
            self.cursor = 0;
            self.updates.push(ViewUpdate::Reset);
        }
        info!(session_id = %session_id, "session destroyed");
        Ok(())
    }

    /// Periodic status refresh; failures are logged and retried next tick
    pub async fn status_tick(&mut self) {
        if let Err(e) = self.check_status().await {
            debug!(error = %e, "status check failed");
        }
    }

    /// Periodic event poll; a vanished session is not an error
    pub async fn events_tick(&mut self) {
        if !self.connected || self.active.is_none() {
            return;
        }
        match self.poll_events().await {
            Ok(_) | Err(ClientError::NotFound) => {}
            Err(e) => warn!(error = %e, "event poll failed"),
        }
    }

    /// Drive the client until `Quit` or the command channel closes.
    pub async fn run<V: View>(mut self, mut commands: mpsc::Receiver<Command>, view: &mut V) {
        let mut status_timer = tokio::time::interval(self.status_interval);
        status_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_timer = tokio::time::interval(self.events_interval);
        events_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = status_timer.tick() => {
                    let was_connected = self.is_connected();
                    self.status_tick().await;
                    if was_connected != self.is_connected() {
                        view.status(self.is_connected());
                    }
                }
                _ = events_timer.tick() => {
                    self.events_tick().await;
                }
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if command == Command::Quit {
                        break;
                    }
                    self.handle_command(command, view).await;
                }
            }

            let updates = self.drain_updates();
            if !updates.is_empty() {
                view.render(&self.conversation, &updates);
            }
        }

        debug!("client loop stopped");
    }

    async fn handle_command<V: View>(&mut self, command: Command, view: &mut V) {
        let result = match command {
            // Send failures are already part of the conversation.
            Command::Send(prompt) => {
                let _ = self.send_message(&prompt).await;
                Ok(())
            }
            Command::Create { model } => self
                .create_session(model, None, None)
                .await
                .map(|id| view.notice(&format!("created session {}", id))),
            Command::Select(id) => self.select_session(&id).await,
            Command::Destroy(id) => match id.or_else(|| self.active_session().map(str::to_string)) {
                Some(id) => self.destroy_session(&id).await,
                None => Err(ClientError::NoActiveSession),
            },
            Command::ListSessions => {
                view.sessions(&self.sessions, self.active_session());
                Ok(())
            }
            Command::Quit => Ok(()),
        };

        if let Err(e) = result {
            view.notice(&e.to_string());
        }
    }

    fn activate(&mut self, session_id: String, conversation: Conversation, cursor: usize) {
        self.connected = true;
        self.active = Some(session_id);
        self.conversation = conversation;
        self.cursor = cursor;
        self.updates.clear();
        self.updates.push(ViewUpdate::Reset);
    }
}
