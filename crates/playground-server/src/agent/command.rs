use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use playground_protocol::{EventKind, RawEvent};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use super::{AgentBackend, AgentError, AgentSession, EventSender, SessionConfig};
use crate::config::AgentSettings;

const PROVIDER_API_KEY_ENV: &str = "PLAYGROUND_PROVIDER_API_KEY";

/// Agent backed by an external CLI.
///
/// Each prompt runs the CLI once: the prompt goes to stdin, and every stdout
/// line is parsed as one [`RawEvent`].
pub struct CommandAgent {
    program: PathBuf,
    args: Vec<String>,
    cwd: PathBuf,
}

impl CommandAgent {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: cwd.into(),
        }
    }

    pub fn from_settings(settings: &AgentSettings) -> Result<Self, AgentError> {
        let cli_path = settings
            .cli_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| AgentError::Unavailable("agent.cli_path is not configured".into()))?;

        // Bare names are resolved through PATH at spawn time.
        let program = PathBuf::from(cli_path);
        if program.components().count() > 1 && !program.exists() {
            return Err(AgentError::Unavailable(format!(
                "agent binary not found: {}",
                program.display()
            )));
        }

        let cwd = match &settings.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir()?,
        };
        if !cwd.is_dir() {
            return Err(AgentError::Unavailable(format!(
                "agent working directory does not exist: {}",
                cwd.display()
            )));
        }

        Ok(Self::new(program, settings.args.clone(), cwd))
    }
}

#[async_trait]
impl AgentBackend for CommandAgent {
    async fn create_session(
        &self,
        config: &SessionConfig,
        events: EventSender,
    ) -> Result<Arc<dyn AgentSession>, AgentError> {
        let session_id = Uuid::new_v4().to_string();
        tracing::debug!(
            session_id = %session_id,
            model = %config.model,
            program = %self.program.display(),
            "creating command session"
        );

        Ok(Arc::new(CommandSession {
            session_id,
            config: config.clone(),
            program: self.program.clone(),
            args: self.args.clone(),
            cwd: self.cwd.clone(),
            events,
            running: Arc::new(Mutex::new(None)),
        }))
    }
}

struct CommandSession {
    session_id: String,
    config: SessionConfig,
    program: PathBuf,
    args: Vec<String>,
    cwd: PathBuf,
    events: EventSender,
    /// Kill switch for the prompt currently running, if any
    running: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl CommandSession {
    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--session-id")
            .arg(&self.session_id)
            .arg("--model")
            .arg(&self.config.model)
            .current_dir(&self.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(system_message) = &self.config.system_message {
            command.arg("--system-message").arg(system_message);
        }
        if let Some(provider) = &self.config.provider {
            command.arg("--provider-url").arg(&provider.base_url);
            if let Some(kind) = &provider.kind {
                command.arg("--provider-type").arg(kind);
            }
            if let Some(api_key) = &provider.api_key {
                command.env(PROVIDER_API_KEY_ENV, api_key);
            }
        }
        command
    }
}

#[async_trait]
impl AgentSession for CommandSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn send(&self, prompt: &str) -> Result<String, AgentError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(AgentError::Busy(self.session_id.clone()));
        }

        let message_id = Uuid::new_v4().to_string();
        let mut child = self.command().spawn().map_err(|e| {
            tracing::error!(
                session_id = %self.session_id,
                program = %self.program.display(),
                error = %e,
                "failed to spawn agent process"
            );
            AgentError::Spawn(e)
        })?;
        tracing::info!(
            session_id = %self.session_id,
            message_id = %message_id,
            pid = child.id().unwrap_or(0),
            "agent process spawned"
        );

        let mut stdin = child.stdin.take().ok_or(AgentError::Closed)?;
        let stdout = child.stdout.take().ok_or(AgentError::Closed)?;

        if let Some(stderr) = child.stderr.take() {
            let session_id = self.session_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!(session_id = %session_id, line = %line, "agent stderr");
                }
            });
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        *running = Some(kill_tx);
        drop(running);

        // stdout must be drained while the prompt is written, or a chatty
        // agent blocks on a full pipe before it reads all of stdin.
        tokio::spawn(watch_prompt(
            self.session_id.clone(),
            child,
            stdout,
            kill_rx,
            self.events.clone(),
            self.running.clone(),
        ));

        stdin.write_all(prompt.as_bytes()).await?;
        stdin.shutdown().await?;
        drop(stdin);

        Ok(message_id)
    }

    async fn destroy(&self) -> Result<(), AgentError> {
        let mut running = self.running.lock().await;
        if let Some(kill_tx) = running.take() {
            tracing::debug!(session_id = %self.session_id, "killing in-flight prompt");
            let _ = kill_tx.send(());
        }
        Ok(())
    }
}

/// Forward stdout events until the process exits or is killed.
async fn watch_prompt(
    session_id: String,
    mut child: Child,
    stdout: ChildStdout,
    mut kill_rx: oneshot::Receiver<()>,
    events: EventSender,
    running: Arc<Mutex<Option<oneshot::Sender<()>>>>,
) {
    let mut lines = BufReader::new(stdout).lines();
    let mut killed = false;

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let Some(event) = parse_event_line(&session_id, &line) else {
                        continue;
                    };
                    if events.send(event).await.is_err() {
                        tracing::debug!(session_id = %session_id, "event channel closed");
                        killed = true;
                        let _ = child.kill().await;
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "failed to read agent stdout");
                    break;
                }
            },
            _ = &mut kill_rx => {
                killed = true;
                let _ = child.kill().await;
                break;
            }
        }
    }

    let status = child.wait().await;
    match status {
        Ok(s) if s.success() => {
            tracing::info!(session_id = %session_id, "agent process completed");
        }
        _ if killed => {
            tracing::info!(session_id = %session_id, "agent process terminated");
        }
        Ok(s) => {
            tracing::warn!(session_id = %session_id, status = %s, "agent process failed");
            let _ = events.send(exit_error(format!("agent exited with {}", s))).await;
        }
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "failed to wait for agent process");
            let _ = events.send(exit_error(e.to_string())).await;
        }
    }

    let mut running = running.lock().await;
    *running = None;
}

fn parse_event_line(session_id: &str, line: &str) -> Option<RawEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<RawEvent>(line) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, line = %line, "skipping non-event output");
            None
        }
    }
}

fn exit_error(message: String) -> RawEvent {
    RawEvent::new(EventKind::SESSION_ERROR, json!({ "message": message }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_line() {
        let event =
            parse_event_line("s1", r#"{"type":"assistant.message","data":{"content":"hi"}}"#)
                .unwrap();
        assert_eq!(event.kind, "assistant.message");
        assert!(parse_event_line("s1", "   ").is_none());
        assert!(parse_event_line("s1", "Loading model...").is_none());
    }

    #[test]
    fn test_parse_event_line_with_null_data() {
        let event = parse_event_line("s1", r#"{"type":"session.compaction_start","data":null}"#)
            .unwrap();
        assert_eq!(event.kind, "session.compaction_start");
        assert!(event.data.is_empty());
    }

    #[test]
    fn test_unconfigured_cli_is_unavailable() {
        let err = CommandAgent::from_settings(&AgentSettings::default()).err().unwrap();
        assert!(matches!(err, AgentError::Unavailable(_)));
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let settings = AgentSettings {
            cli_path: Some("/definitely/not/here/agent".into()),
            cwd: None,
            args: vec![],
        };
        assert!(matches!(
            CommandAgent::from_settings(&settings),
            Err(AgentError::Unavailable(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_agent_streams_events() {
        use std::os::unix::fs::PermissionsExt;
        use tokio::sync::mpsc;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("agent.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nread prompt\n\
             echo '{\"type\":\"user.message\",\"data\":{\"content\":\"'\"$prompt\"'\"}}'\n\
             echo 'not json'\n\
             echo '{\"type\":\"assistant.message\",\"data\":{\"content\":\"pong\"}}'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let agent = CommandAgent::new(&script, vec![], dir.path());
        let (tx, mut rx) = mpsc::channel(16);
        let session = agent
            .create_session(
                &SessionConfig {
                    model: "gpt-5".into(),
                    system_message: None,
                    provider: None,
                },
                tx,
            )
            .await
            .unwrap();

        session.send("ping\n").await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, "user.message");
        assert_eq!(first.str_field("content"), Some("ping"));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.str_field("content"), Some("pong"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_exit_reports_session_error() {
        use std::os::unix::fs::PermissionsExt;
        use tokio::sync::mpsc;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("agent.sh");
        std::fs::write(&script, "#!/bin/sh\ncat > /dev/null\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let agent = CommandAgent::new(&script, vec![], dir.path());
        let (tx, mut rx) = mpsc::channel(16);
        let session = agent
            .create_session(
                &SessionConfig {
                    model: "gpt-5".into(),
                    system_message: None,
                    provider: None,
                },
                tx,
            )
            .await
            .unwrap();

        session.send("hi").await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::SESSION_ERROR);
        assert!(event.str_field("message").unwrap().contains("exited"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_prompt_with_chatty_agent_does_not_stall() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;
        use tokio::sync::mpsc;
        use tokio::time::timeout;

        const LINES: usize = 5000;

        // Fills the stdout pipe before reading any of stdin.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("agent.sh");
        std::fs::write(
            &script,
            "#!/bin/sh
i=0
             while [ $i -lt 5000 ]; do
             echo '{\"type\":\"x.y\",\"data\":{}}'
             i=$((i+1))
             done
             cat > /dev/null
",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let agent = CommandAgent::new(&script, vec![], dir.path());
        let (tx, mut rx) = mpsc::channel(16);
        let session = agent
            .create_session(
                &SessionConfig {
                    model: "gpt-5".into(),
                    system_message: None,
                    provider: None,
                },
                tx,
            )
            .await
            .unwrap();

        let drained = tokio::spawn(async move {
            let mut count = 0;
            while count < LINES && rx.recv().await.is_some() {
                count += 1;
            }
            count
        });

        let prompt = "x".repeat(200 * 1024);
        timeout(Duration::from_secs(10), session.send(&prompt))
            .await
            .expect("send stalled")
            .unwrap();
        let count = timeout(Duration::from_secs(10), drained)
            .await
            .expect("events stalled")
            .unwrap();
        assert_eq!(count, LINES);
        timeout(Duration::from_secs(10), session.destroy())
            .await
            .expect("destroy stalled")
            .unwrap();
    }
}
