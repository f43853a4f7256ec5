//! Projection of a raw agent event log into display messages.
//!
//! There is a single fold, [`Conversation::apply`]. Hydrating a session from
//! its full history and extending a live view with newly polled events both
//! run through it, so folding `[0, k)` and then `[k, n)` always lands on the
//! same messages as folding `[0, n)` in one go.

use std::collections::HashMap;

use crate::event::{EventKind, RawEvent};
use crate::message::{Compaction, DisplayMessage, ToolCall, Usage};

/// What a single event did to the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// A new message was pushed at this index
    Appended(usize),
    /// The message at this index was modified in place
    Updated(usize),
    /// The event had no visible effect
    Ignored,
}

/// Chunked assistant text in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Streaming {
    index: usize,
    /// Length of the content the message had before its first chunk
    prefix_len: usize,
}

/// Ordered display messages plus the indexes the fold needs to merge
/// later events into earlier messages.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<DisplayMessage>,
    /// call id -> indexes of uncompleted tool messages, oldest first
    open_tools: HashMap<String, Vec<usize>>,
    /// Assistant message currently being built from chunks
    streaming: Option<Streaming>,
    /// Optimistic user messages waiting for their `user.message` echo
    pending_user: Vec<usize>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full-history fold.
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a RawEvent>) -> Self {
        let mut conversation = Self::new();
        conversation.apply_all(events);
        conversation
    }

    /// Resume from previously projected messages.
    ///
    /// Uncompleted tool messages are re-indexed so later completions still
    /// find them. Streaming and optimistic-echo state is not recoverable from
    /// messages alone.
    pub fn from_messages(messages: Vec<DisplayMessage>) -> Self {
        let mut open_tools: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, message) in messages.iter().enumerate() {
            if let DisplayMessage::Tool(tool) = message {
                if !tool.completed {
                    open_tools
                        .entry(tool.tool_call_id.clone())
                        .or_default()
                        .push(index);
                }
            }
        }
        Self {
            messages,
            open_tools,
            streaming: None,
            pending_user: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<DisplayMessage> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a user message before the relay has echoed it back.
    pub fn push_local_user(&mut self, content: impl Into<String>) -> usize {
        let index = self.push(DisplayMessage::user(content));
        self.pending_user.push(index);
        index
    }

    /// Append a client-side error (e.g. a failed send).
    pub fn push_local_error(&mut self, content: impl Into<String>) -> usize {
        self.push(DisplayMessage::error(content))
    }

    pub fn apply_all<'a>(&mut self, events: impl IntoIterator<Item = &'a RawEvent>) -> Vec<Change> {
        events.into_iter().map(|event| self.apply(event)).collect()
    }

    pub fn apply(&mut self, event: &RawEvent) -> Change {
        match event.kind.as_str() {
            EventKind::USER_MESSAGE => self.on_user_message(event),
            EventKind::ASSISTANT_MESSAGE => self.on_assistant_message(event),
            EventKind::ASSISTANT_MESSAGE_CHUNK => self.on_assistant_chunk(event),
            EventKind::TOOL_EXECUTION_START => {
                let tool = ToolCall::from_start(event);
                let call_id = tool.tool_call_id.clone();
                let index = self.push(DisplayMessage::Tool(tool));
                self.open_tools.entry(call_id).or_default().push(index);
                Change::Appended(index)
            }
            EventKind::TOOL_EXECUTION_COMPLETE => self.on_tool_complete(event),
            EventKind::SESSION_ERROR => {
                Change::Appended(self.push(DisplayMessage::from_session_error(event)))
            }
            EventKind::ASSISTANT_USAGE => {
                Change::Appended(self.push(DisplayMessage::Usage(Usage::from_model_event(event))))
            }
            EventKind::SESSION_USAGE_INFO => Change::Appended(
                self.push(DisplayMessage::Usage(Usage::from_context_event(event))),
            ),
            EventKind::SESSION_COMPACTION_START => {
                Change::Appended(self.push(DisplayMessage::Compaction(Compaction::started())))
            }
            EventKind::SESSION_COMPACTION_COMPLETE => Change::Appended(self.push(
                DisplayMessage::Compaction(Compaction::from_complete_event(event)),
            )),
            _ => Change::Ignored,
        }
    }

    fn push(&mut self, message: DisplayMessage) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    fn last_index(&self) -> Option<usize> {
        self.messages.len().checked_sub(1)
    }

    fn on_user_message(&mut self, event: &RawEvent) -> Change {
        let content = event
            .str_field("content")
            .or_else(|| event.str_field("prompt"))
            .unwrap_or_default();

        let echoed = self
            .pending_user
            .iter()
            .position(|&index| self.messages[index].content() == Some(content));
        if let Some(position) = echoed {
            return Change::Updated(self.pending_user.remove(position));
        }

        Change::Appended(self.push(DisplayMessage::user(content)))
    }

    fn on_assistant_message(&mut self, event: &RawEvent) -> Change {
        let streaming = self.streaming.take();
        let content = event.str_field("content").unwrap_or_default();
        if content.trim().is_empty() {
            return Change::Ignored;
        }

        // The final message of a streamed turn replaces the accumulated chunks,
        // keeping whatever text the message held before streaming began.
        if let Some(Streaming { index, prefix_len }) =
            streaming.filter(|s| Some(s.index) == self.last_index())
        {
            if let DisplayMessage::Assistant { content: existing } = &mut self.messages[index] {
                existing.truncate(prefix_len);
                existing.push_str(content);
                return Change::Updated(index);
            }
        }

        Change::Appended(self.push(DisplayMessage::assistant(content)))
    }

    fn on_assistant_chunk(&mut self, event: &RawEvent) -> Change {
        let chunk = event
            .str_field("content")
            .or_else(|| event.str_field("deltaContent"))
            .unwrap_or_default();

        if let Some(index) = self.last_index() {
            if let DisplayMessage::Assistant { content } = &mut self.messages[index] {
                let prefix_len = match self.streaming {
                    Some(s) if s.index == index => s.prefix_len,
                    _ => content.len(),
                };
                content.push_str(chunk);
                self.streaming = Some(Streaming { index, prefix_len });
                return Change::Updated(index);
            }
        }

        let index = self.push(DisplayMessage::assistant(chunk));
        self.streaming = Some(Streaming {
            index,
            prefix_len: 0,
        });
        Change::Appended(index)
    }

    fn on_tool_complete(&mut self, event: &RawEvent) -> Change {
        let call_id = event.str_field("toolCallId").unwrap_or_default();
        let Some(open) = self.open_tools.get_mut(call_id) else {
            return Change::Ignored;
        };
        let Some(index) = open.pop() else {
            return Change::Ignored;
        };
        if open.is_empty() {
            self.open_tools.remove(call_id);
        }

        match &mut self.messages[index] {
            DisplayMessage::Tool(tool) => {
                tool.complete(event);
                Change::Updated(index)
            }
            _ => Change::Ignored,
        }
    }
}

/// Fold a complete event history into display messages.
pub fn project(events: &[RawEvent]) -> Vec<DisplayMessage> {
    Conversation::from_events(events).into_messages()
}

/// Fold newly observed events onto a previously projected conversation.
///
/// Passing the [`Conversation`] from the earlier fold carries its streaming
/// and optimistic-echo state, so the result always equals a full fold of
/// the whole history. A bare message list converts through
/// [`Conversation::from_messages`] and loses that state: a final
/// `assistant.message` arriving after the split is then appended instead of
/// replacing its streamed chunks.
pub fn project_incremental(
    new_events: &[RawEvent],
    prior: impl Into<Conversation>,
) -> Conversation {
    let mut conversation = prior.into();
    conversation.apply_all(new_events);
    conversation
}

impl From<Vec<DisplayMessage>> for Conversation {
    fn from(messages: Vec<DisplayMessage>) -> Self {
        Conversation::from_messages(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{CompactionStatus, UsageFlavor};
    use serde_json::json;

    fn ev(kind: &str, data: serde_json::Value) -> RawEvent {
        RawEvent::new(kind, data)
    }

    fn tool_start(id: &str, name: &str) -> RawEvent {
        ev(
            EventKind::TOOL_EXECUTION_START,
            json!({"toolCallId": id, "toolName": name, "arguments": {"path": "."}}),
        )
    }

    fn tool_complete(id: &str, result: &str) -> RawEvent {
        ev(
            EventKind::TOOL_EXECUTION_COMPLETE,
            json!({"toolCallId": id, "success": true, "result": {"content": result}}),
        )
    }

    fn sample_history() -> Vec<RawEvent> {
        vec![
            ev(EventKind::USER_MESSAGE, json!({"content": "list files"})),
            tool_start("a", "ls"),
            tool_start("b", "cat"),
            tool_complete("a", "src"),
            ev(EventKind::ASSISTANT_MESSAGE, json!({"content": "   "})),
            tool_complete("b", "fn main"),
            ev(EventKind::ASSISTANT_MESSAGE, json!({"content": "done"})),
            ev(EventKind::USER_MESSAGE, json!({"prompt": "again"})),
            tool_start("a", "ls"),
            tool_complete("zzz", "nothing"),
        ]
    }

    #[test]
    fn test_user_message_fallbacks() {
        let messages = project(&[
            ev(EventKind::USER_MESSAGE, json!({"content": "hi"})),
            ev(EventKind::USER_MESSAGE, json!({"prompt": "from prompt"})),
            ev(EventKind::USER_MESSAGE, json!({})),
        ]);
        assert_eq!(
            messages,
            vec![
                DisplayMessage::user("hi"),
                DisplayMessage::user("from prompt"),
                DisplayMessage::user(""),
            ]
        );
    }

    #[test]
    fn test_hydration_is_idempotent() {
        let history = sample_history();
        assert_eq!(project(&history), project(&history));
    }

    #[test]
    fn test_empty_assistant_message_is_suppressed() {
        let messages = project(&[
            ev(EventKind::ASSISTANT_MESSAGE, json!({"content": " \n\t "})),
            ev(EventKind::ASSISTANT_MESSAGE, json!({})),
        ]);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_tool_completion_links_by_call_id() {
        let messages = project(&sample_history());
        let tools: Vec<&ToolCall> = messages.iter().filter_map(DisplayMessage::as_tool).collect();
        assert_eq!(tools.len(), 3);
        assert!(tools[0].completed);
        assert_eq!(tools[0].result.as_deref(), Some("src"));
        assert!(tools[1].completed);
        assert_eq!(tools[1].result.as_deref(), Some("fn main"));
        // second "a" call never completed; "zzz" completion was dropped
        assert!(!tools[2].completed);
    }

    #[test]
    fn test_prefix_consistency_for_every_split() {
        let history = sample_history();
        let full = project(&history);
        for k in 0..=history.len() {
            let prefix = Conversation::from_events(&history[..k]);
            let merged = project_incremental(&history[k..], prefix);
            assert_eq!(merged.messages(), full.as_slice(), "split at {k}");
        }
    }

    #[test]
    fn test_incremental_split_inside_stream() {
        let history = vec![
            ev(EventKind::ASSISTANT_MESSAGE_CHUNK, json!({"content": "Hel"})),
            ev(EventKind::ASSISTANT_MESSAGE_CHUNK, json!({"content": "lo"})),
            ev(EventKind::ASSISTANT_MESSAGE, json!({"content": "Hello"})),
        ];
        let full = project(&history);
        assert_eq!(full, vec![DisplayMessage::assistant("Hello")]);
        for k in 0..=history.len() {
            let prefix = Conversation::from_events(&history[..k]);
            let merged = project_incremental(&history[k..], prefix);
            assert_eq!(merged.messages(), full.as_slice(), "split at {k}");
        }
    }

    #[test]
    fn test_prefix_consistency_with_carried_state() {
        let history = vec![
            ev(EventKind::USER_MESSAGE, json!({"content": "hi"})),
            ev(EventKind::ASSISTANT_MESSAGE_CHUNK, json!({"content": "Hel"})),
            ev(EventKind::ASSISTANT_MESSAGE_CHUNK, json!({"content": "lo"})),
            ev(EventKind::ASSISTANT_MESSAGE, json!({"content": "Hello!"})),
            ev(EventKind::ASSISTANT_USAGE, json!({"model": "gpt-5", "inputTokens": 3})),
            ev(EventKind::SESSION_COMPACTION_START, json!({})),
            ev(EventKind::SESSION_COMPACTION_COMPLETE, json!({"success": true})),
        ];
        let full = project(&history);
        for k in 0..=history.len() {
            let mut conversation = Conversation::from_events(&history[..k]);
            conversation.apply_all(&history[k..]);
            assert_eq!(conversation.messages(), full.as_slice(), "split at {k}");
        }
    }

    #[test]
    fn test_chunk_accumulation() {
        let messages = project_incremental(
            &[
                ev(EventKind::ASSISTANT_MESSAGE_CHUNK, json!({"content": "Hel"})),
                ev(EventKind::ASSISTANT_MESSAGE_CHUNK, json!({"content": "lo"})),
            ],
            Vec::new(),
        );
        assert_eq!(messages.messages(), &[DisplayMessage::assistant("Hello")]);
    }

    #[test]
    fn test_empty_chunk_still_starts_message() {
        let messages = project_incremental(
            &[ev(EventKind::ASSISTANT_MESSAGE_CHUNK, json!({"content": ""}))],
            vec![DisplayMessage::user("hi")],
        );
        assert_eq!(
            messages.into_messages(),
            vec![DisplayMessage::user("hi"), DisplayMessage::assistant("")]
        );
    }

    #[test]
    fn test_chunk_extends_prior_assistant_message() {
        let messages = project_incremental(
            &[ev(EventKind::ASSISTANT_MESSAGE_CHUNK, json!({"content": " more"}))],
            vec![DisplayMessage::assistant("some")],
        );
        assert_eq!(messages.messages(), &[DisplayMessage::assistant("some more")]);
    }

    #[test]
    fn test_streaming_after_finished_reply_keeps_it() {
        let messages = project(&[
            ev(EventKind::ASSISTANT_MESSAGE, json!({"content": "First answer."})),
            ev(EventKind::ASSISTANT_MESSAGE_CHUNK, json!({"content": " Sec"})),
            ev(EventKind::ASSISTANT_MESSAGE_CHUNK, json!({"content": "ond"})),
            ev(EventKind::ASSISTANT_MESSAGE, json!({"content": " Second"})),
        ]);
        assert_eq!(messages, vec![DisplayMessage::assistant("First answer. Second")]);
    }

    #[test]
    fn test_final_message_replaces_streamed_chunks() {
        let mut conversation = Conversation::new();
        conversation.apply(&ev(EventKind::ASSISTANT_MESSAGE_CHUNK, json!({"content": "Hel"})));
        conversation.apply(&ev(EventKind::ASSISTANT_MESSAGE_CHUNK, json!({"content": "lo"})));
        let change =
            conversation.apply(&ev(EventKind::ASSISTANT_MESSAGE, json!({"content": "Hello"})));
        assert_eq!(change, Change::Updated(0));
        assert_eq!(conversation.messages(), &[DisplayMessage::assistant("Hello")]);

        // a later turn appends normally
        conversation.apply(&ev(EventKind::ASSISTANT_MESSAGE, json!({"content": "Again"})));
        assert_eq!(conversation.len(), 2);
    }

    #[test]
    fn test_unmatched_completion_is_dropped() {
        let prior = project(&[tool_start("a", "ls")]);
        let merged = project_incremental(&[tool_complete("b", "x")], prior.clone());
        assert_eq!(merged.into_messages(), prior);

        let mut conversation = Conversation::new();
        assert_eq!(conversation.apply(&tool_complete("b", "x")), Change::Ignored);
        assert!(conversation.is_empty());
    }

    #[test]
    fn test_completion_after_resume_finds_open_tool() {
        let prior = project(&[
            tool_start("a", "ls"),
            ev(EventKind::ASSISTANT_MESSAGE, json!({"content": "working"})),
        ]);
        let merged = project_incremental(&[tool_complete("a", "ok")], prior).into_messages();
        let tool = merged[0].as_tool().unwrap();
        assert!(tool.completed);
        assert_eq!(tool.result.as_deref(), Some("ok"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_completed_tool_is_not_completed_twice() {
        let messages = project(&[
            tool_start("a", "ls"),
            tool_complete("a", "first"),
            tool_complete("a", "second"),
        ]);
        assert_eq!(messages[0].as_tool().unwrap().result.as_deref(), Some("first"));
    }

    #[test]
    fn test_duplicate_call_ids_complete_newest_first() {
        let messages = project(&[
            tool_start("a", "one"),
            tool_start("a", "two"),
            tool_complete("a", "r1"),
            tool_complete("a", "r2"),
        ]);
        assert_eq!(messages[1].as_tool().unwrap().result.as_deref(), Some("r1"));
        assert_eq!(messages[0].as_tool().unwrap().result.as_deref(), Some("r2"));
    }

    #[test]
    fn test_telemetry_is_projected_in_history() {
        let messages = project(&[
            ev(EventKind::SESSION_ERROR, json!({"message": "rate limited"})),
            ev(EventKind::ASSISTANT_USAGE, json!({"model": "gpt-5", "outputTokens": 9})),
            ev(EventKind::SESSION_USAGE_INFO, json!({"tokenLimit": 1000, "currentTokens": 10})),
            ev(EventKind::SESSION_COMPACTION_START, json!({})),
            ev(
                EventKind::SESSION_COMPACTION_COMPLETE,
                json!({"success": true, "tokensRemoved": 500}),
            ),
            ev("session.idle", json!({})),
        ]);
        let kinds: Vec<&str> = messages.iter().map(DisplayMessage::kind).collect();
        assert_eq!(
            kinds,
            vec!["error", "usage", "usage", "compaction", "compaction"]
        );
        match (&messages[1], &messages[2]) {
            (DisplayMessage::Usage(model), DisplayMessage::Usage(window)) => {
                assert_eq!(model.flavor(), UsageFlavor::Model);
                assert_eq!(window.flavor(), UsageFlavor::ContextWindow);
            }
            other => panic!("unexpected messages: {other:?}"),
        }
        match &messages[4] {
            DisplayMessage::Compaction(c) => {
                assert_eq!(c.status, CompactionStatus::Complete);
                assert_eq!(c.tokens_removed, Some(500));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_optimistic_user_message_is_confirmed_not_duplicated() {
        let mut conversation = Conversation::new();
        let local = conversation.push_local_user("hi");
        let change = conversation.apply(&ev(EventKind::USER_MESSAGE, json!({"content": "hi"})));
        assert_eq!(change, Change::Updated(local));
        assert_eq!(conversation.messages(), &[DisplayMessage::user("hi")]);

        // a second echo of the same text is a new message
        let change = conversation.apply(&ev(EventKind::USER_MESSAGE, json!({"content": "hi"})));
        assert_eq!(change, Change::Appended(1));
    }
}
