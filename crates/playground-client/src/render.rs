use std::io::Write;

use playground_protocol::{
    Change, Compaction, CompactionStatus, Conversation, DisplayMessage, SessionInfo, ToolCall,
    Usage, UsageFlavor,
};

use crate::poller::ViewUpdate;

/// Output side of the client loop
pub trait View {
    fn render(&mut self, conversation: &Conversation, updates: &[ViewUpdate]);

    fn notice(&mut self, message: &str);

    fn status(&mut self, connected: bool);

    fn sessions(&mut self, sessions: &[SessionInfo], active: Option<&str>);
}

/// Line-oriented view for a terminal
pub struct TerminalView<W> {
    out: W,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text).and_then(|_| self.out.flush()) {
            tracing::warn!(error = %e, "failed to write to terminal");
        }
    }
}

impl<W: Write> View for TerminalView<W> {
    fn render(&mut self, conversation: &Conversation, updates: &[ViewUpdate]) {
        let messages = conversation.messages();

        // A full reset supersedes everything before it in the batch.
        let start = updates
            .iter()
            .rposition(|u| *u == ViewUpdate::Reset)
            .map(|pos| {
                self.line("---");
                for message in messages {
                    self.line(&format_message(message));
                }
                pos + 1
            })
            .unwrap_or(0);

        for (index, appended) in collapse(&updates[start..]) {
            let Some(message) = messages.get(index) else {
                continue;
            };
            if appended {
                self.line(&format_message(message));
            } else if let Some(text) = format_update(message) {
                self.line(&text);
            }
        }
    }

    fn notice(&mut self, message: &str) {
        self.line(&format!("* {}", message));
    }

    fn status(&mut self, connected: bool) {
        if connected {
            self.line("* connected to relay");
        } else {
            self.line("* relay unreachable, retrying");
        }
    }

    fn sessions(&mut self, sessions: &[SessionInfo], active: Option<&str>) {
        if sessions.is_empty() {
            self.line("* no sessions");
            return;
        }
        for session in sessions {
            let marker = if Some(session.id.as_str()) == active { ">" } else { " " };
            self.line(&format!("{} {} ({})", marker, session.id, session.model));
        }
    }
}

/// Unique message indexes in first-seen order, flagged when the message was
/// appended within the batch (and so must be printed in full).
fn collapse(updates: &[ViewUpdate]) -> Vec<(usize, bool)> {
    let mut out: Vec<(usize, bool)> = Vec::new();
    for update in updates {
        let (index, appended) = match update {
            ViewUpdate::Change(Change::Appended(i)) => (*i, true),
            ViewUpdate::Change(Change::Updated(i)) => (*i, false),
            _ => continue,
        };
        match out.iter_mut().find(|(i, _)| *i == index) {
            Some(entry) => entry.1 |= appended,
            None => out.push((index, appended)),
        }
    }
    out
}

pub fn format_message(message: &DisplayMessage) -> String {
    match message {
        DisplayMessage::User { content } => format!("you> {}", content),
        DisplayMessage::Assistant { content } => format!("assistant> {}", content),
        DisplayMessage::Tool(tool) => format_tool(tool),
        DisplayMessage::Error { content, .. } => format!("error> {}", content),
        DisplayMessage::Usage(usage) => format_usage(usage),
        DisplayMessage::Compaction(compaction) => format_compaction(compaction),
    }
}

/// Text for an in-place update; `None` when nothing visible changed
fn format_update(message: &DisplayMessage) -> Option<String> {
    match message {
        // An optimistic message was confirmed by its echo.
        DisplayMessage::User { .. } => None,
        DisplayMessage::Assistant { content } => Some(format!("assistant~ {}", content)),
        other => Some(format_message(other)),
    }
}

fn format_tool(tool: &ToolCall) -> String {
    if !tool.completed {
        return format!("tool> {} running", tool.tool_name);
    }
    match (tool.success, &tool.error) {
        (Some(false), Some(error)) => format!("tool> {} failed: {}", tool.tool_name, error),
        (Some(false), None) => format!("tool> {} failed", tool.tool_name),
        _ => match &tool.result {
            Some(result) => format!("tool> {} done: {}", tool.tool_name, truncate(result, 200)),
            None => format!("tool> {} done", tool.tool_name),
        },
    }
}

fn format_usage(usage: &Usage) -> String {
    match usage.flavor() {
        UsageFlavor::Model => {
            let mut text = format!(
                "usage> {} in={} out={}",
                usage.model.as_deref().unwrap_or("model"),
                usage.input_tokens.unwrap_or(0),
                usage.output_tokens.unwrap_or(0)
            );
            if let Some(cost) = usage.cost {
                text.push_str(&format!(" cost={}", cost));
            }
            if let Some(ms) = usage.duration_ms {
                text.push_str(&format!(" {}ms", ms));
            }
            text
        }
        UsageFlavor::ContextWindow => format!(
            "context> {}/{} tokens, {} messages",
            usage.current_tokens.unwrap_or(0),
            usage.token_limit.unwrap_or(0),
            usage.messages_length.unwrap_or(0)
        ),
    }
}

fn format_compaction(compaction: &Compaction) -> String {
    match compaction.status {
        CompactionStatus::Started => "compaction> started".to_string(),
        CompactionStatus::Complete => match (compaction.success, &compaction.error) {
            (Some(false), Some(error)) => format!("compaction> failed: {}", error),
            _ => format!(
                "compaction> {} -> {} tokens, {} messages removed",
                compaction.pre_compaction_tokens.unwrap_or(0),
                compaction.post_compaction_tokens.unwrap_or(0),
                compaction.messages_removed.unwrap_or(0)
            ),
        },
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((pos, _)) => format!("{}...", &text[..pos]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playground_protocol::RawEvent;
    use serde_json::json;

    fn rendered(view: TerminalView<Vec<u8>>) -> String {
        String::from_utf8(view.into_inner()).unwrap()
    }

    #[test]
    fn test_streamed_reply_is_printed_once_per_batch() {
        let mut conversation = Conversation::new();
        let changes = conversation.apply_all(&[
            RawEvent::new("assistant.message_chunk", json!({ "content": "Hel" })),
            RawEvent::new("assistant.message_chunk", json!({ "content": "lo" })),
        ]);
        let updates: Vec<ViewUpdate> = changes.into_iter().map(ViewUpdate::Change).collect();

        let mut view = TerminalView::new(Vec::new());
        view.render(&conversation, &updates);
        assert_eq!(rendered(view), "assistant> Hello\n");
    }

    #[test]
    fn test_reset_reprints_conversation() {
        let conversation = Conversation::from_events(&[
            RawEvent::new("user.message", json!({ "content": "hi" })),
            RawEvent::new("assistant.message", json!({ "content": "hello there" })),
        ]);
        let mut view = TerminalView::new(Vec::new());
        view.render(&conversation, &[ViewUpdate::Reset]);
        assert_eq!(rendered(view), "---\nyou> hi\nassistant> hello there\n");
    }

    #[test]
    fn test_tool_lifecycle_lines() {
        let mut conversation = Conversation::new();
        conversation.apply(&RawEvent::new(
            "tool.execution_start",
            json!({ "toolCallId": "t1", "toolName": "grep" }),
        ));
        assert_eq!(format_message(&conversation.messages()[0]), "tool> grep running");

        conversation.apply(&RawEvent::new(
            "tool.execution_complete",
            json!({ "toolCallId": "t1", "success": false, "error": "no match" }),
        ));
        assert_eq!(
            format_message(&conversation.messages()[0]),
            "tool> grep failed: no match"
        );
    }

    #[test]
    fn test_confirmed_echo_prints_nothing() {
        let mut conversation = Conversation::new();
        conversation.push_local_user("hi");
        let change = conversation.apply(&RawEvent::new("user.message", json!({ "content": "hi" })));

        let mut view = TerminalView::new(Vec::new());
        view.render(&conversation, &[ViewUpdate::Change(change)]);
        assert_eq!(rendered(view), "");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
