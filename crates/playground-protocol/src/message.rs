use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{as_u64, RawEvent};

const DEFAULT_ERROR_TEXT: &str = "An error occurred";

/// One entry of the rendered conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayMessage {
    User {
        content: String,
    },
    Assistant {
        content: String,
    },
    Tool(ToolCall),
    Error {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    Usage(Usage),
    Compaction(Compaction),
}

impl DisplayMessage {
    pub fn user(content: impl Into<String>) -> Self {
        DisplayMessage::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        DisplayMessage::Assistant {
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        DisplayMessage::Error {
            content: content.into(),
            details: None,
        }
    }

    /// Build an error message from a `session.error` event.
    pub fn from_session_error(event: &RawEvent) -> Self {
        let content = event
            .str_field("message")
            .or_else(|| event.str_field("error"))
            .unwrap_or(DEFAULT_ERROR_TEXT)
            .to_string();
        DisplayMessage::Error {
            content,
            details: event.get("details").cloned(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DisplayMessage::User { .. } => "user",
            DisplayMessage::Assistant { .. } => "assistant",
            DisplayMessage::Tool(_) => "tool",
            DisplayMessage::Error { .. } => "error",
            DisplayMessage::Usage(_) => "usage",
            DisplayMessage::Compaction(_) => "compaction",
        }
    }

    /// Text content for user, assistant and error messages.
    pub fn content(&self) -> Option<&str> {
        match self {
            DisplayMessage::User { content }
            | DisplayMessage::Assistant { content }
            | DisplayMessage::Error { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn as_tool(&self) -> Option<&ToolCall> {
        match self {
            DisplayMessage::Tool(tool) => Some(tool),
            _ => None,
        }
    }
}

// ============================================================================
// Tool calls
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCall {
    /// Open tool call from a `tool.execution_start` event.
    pub fn from_start(event: &RawEvent) -> Self {
        Self {
            tool_call_id: event.str_field("toolCallId").unwrap_or_default().to_string(),
            tool_name: event.str_field("toolName").unwrap_or_default().to_string(),
            arguments: event.get("arguments").cloned(),
            completed: false,
            success: None,
            result: None,
            error: None,
        }
    }

    /// Overwrite the completion fields from a `tool.execution_complete` event.
    pub fn complete(&mut self, event: &RawEvent) {
        self.completed = true;
        self.success = event.bool_field("success");
        self.result = event.get("result").map(|result| match result.get("content") {
            Some(content) if !content.is_null() => value_text(content),
            _ => value_text(result),
        });
        self.error = event.get("error").map(|error| match error.get("message") {
            Some(message) if !message.is_null() => value_text(message),
            _ => value_text(error),
        });
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Usage telemetry
// ============================================================================

/// Which of the two usage shapes a `Usage` message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageFlavor {
    /// Per-call model usage (`assistant.usage`)
    Model,
    /// Context window state (`session.usage_info`)
    ContextWindow,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages_length: Option<u64>,
}

impl Usage {
    pub fn from_model_event(event: &RawEvent) -> Self {
        Self {
            model: event.str_field("model").map(str::to_string),
            input_tokens: event.u64_field("inputTokens"),
            output_tokens: event.u64_field("outputTokens"),
            cache_read_tokens: event.u64_field("cacheReadTokens"),
            cache_write_tokens: event.u64_field("cacheWriteTokens"),
            cost: event.f64_field("cost"),
            duration_ms: event.u64_field("duration"),
            ..Default::default()
        }
    }

    pub fn from_context_event(event: &RawEvent) -> Self {
        Self {
            token_limit: event.u64_field("tokenLimit"),
            current_tokens: event.u64_field("currentTokens"),
            messages_length: event.u64_field("messagesLength"),
            ..Default::default()
        }
    }

    pub fn flavor(&self) -> UsageFlavor {
        if self.token_limit.is_some() || self.current_tokens.is_some() {
            UsageFlavor::ContextWindow
        } else {
            UsageFlavor::Model
        }
    }
}

// ============================================================================
// Compaction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactionStatus {
    Started,
    Complete,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compaction {
    pub status: CompactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_compaction_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_compaction_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_compaction_messages_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages_removed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_removed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction_tokens_used: Option<CompactionTokens>,
}

impl Compaction {
    pub fn started() -> Self {
        Self {
            status: CompactionStatus::Started,
            success: None,
            error: None,
            pre_compaction_tokens: None,
            post_compaction_tokens: None,
            pre_compaction_messages_length: None,
            messages_removed: None,
            tokens_removed: None,
            summary: None,
            compaction_tokens_used: None,
        }
    }

    pub fn from_complete_event(event: &RawEvent) -> Self {
        let compaction_tokens_used = event.get("compactionTokensUsed").map(|tokens| {
            let field = |key: &str| tokens.get(key).and_then(as_u64);
            CompactionTokens {
                input: field("input"),
                output: field("output"),
                cached_input: field("cachedInput"),
            }
        });

        Self {
            status: CompactionStatus::Complete,
            success: event.bool_field("success"),
            error: event.str_field("error").map(str::to_string),
            pre_compaction_tokens: event.u64_field("preCompactionTokens"),
            post_compaction_tokens: event.u64_field("postCompactionTokens"),
            pre_compaction_messages_length: event.u64_field("preCompactionMessagesLength"),
            messages_removed: event.u64_field("messagesRemoved"),
            tokens_removed: event.u64_field("tokensRemoved"),
            summary: event.str_field("summaryContent").map(str::to_string),
            compaction_tokens_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_message_wire_shape() {
        let start = RawEvent::new(
            "tool.execution_start",
            json!({"toolCallId": "c1", "toolName": "bash", "arguments": {"cmd": "ls"}}),
        );
        let value = serde_json::to_value(DisplayMessage::Tool(ToolCall::from_start(&start))).unwrap();
        assert_eq!(value["type"], "tool");
        assert_eq!(value["toolCallId"], "c1");
        assert_eq!(value["completed"], false);
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_tool_completion_prefers_nested_fields() {
        let mut tool = ToolCall::from_start(&RawEvent::new(
            "tool.execution_start",
            json!({"toolCallId": "c1", "toolName": "bash"}),
        ));
        tool.complete(&RawEvent::new(
            "tool.execution_complete",
            json!({
                "toolCallId": "c1",
                "success": false,
                "result": {"content": "partial"},
                "error": {"message": "exit 1", "code": 1}
            }),
        ));
        assert!(tool.completed);
        assert_eq!(tool.success, Some(false));
        assert_eq!(tool.result.as_deref(), Some("partial"));
        assert_eq!(tool.error.as_deref(), Some("exit 1"));
    }

    #[test]
    fn test_tool_completion_raw_result() {
        let mut tool = ToolCall::from_start(&RawEvent::new(
            "tool.execution_start",
            json!({"toolCallId": "c1", "toolName": "read"}),
        ));
        tool.complete(&RawEvent::new(
            "tool.execution_complete",
            json!({"toolCallId": "c1", "success": true, "result": "file body"}),
        ));
        assert_eq!(tool.result.as_deref(), Some("file body"));
        assert_eq!(tool.error, None);
    }

    #[test]
    fn test_session_error_fallbacks() {
        let msg = DisplayMessage::from_session_error(&RawEvent::new(
            "session.error",
            json!({"error": "boom", "details": {"code": 7}}),
        ));
        assert_eq!(msg.content(), Some("boom"));
        assert!(matches!(msg, DisplayMessage::Error { details: Some(_), .. }));

        let msg = DisplayMessage::from_session_error(&RawEvent::new("session.error", json!({})));
        assert_eq!(msg.content(), Some("An error occurred"));
    }

    #[test]
    fn test_usage_flavors() {
        let model = Usage::from_model_event(&RawEvent::new(
            "assistant.usage",
            json!({"model": "gpt-5", "inputTokens": 10, "outputTokens": 4, "cost": 0.5}),
        ));
        assert_eq!(model.flavor(), UsageFlavor::Model);
        assert_eq!(model.model.as_deref(), Some("gpt-5"));

        let window = Usage::from_context_event(&RawEvent::new(
            "session.usage_info",
            json!({"tokenLimit": 128000, "currentTokens": 2048, "messagesLength": 6}),
        ));
        assert_eq!(window.flavor(), UsageFlavor::ContextWindow);
        assert_eq!(window.model, None);
    }

    #[test]
    fn test_compaction_complete_fields() {
        let compaction = Compaction::from_complete_event(&RawEvent::new(
            "session.compaction_complete",
            json!({
                "success": true,
                "preCompactionTokens": 9000,
                "postCompactionTokens": 1200,
                "messagesRemoved": 14,
                "summaryContent": "earlier turns",
                "compactionTokensUsed": {"input": 800, "output": 120}
            }),
        ));
        assert_eq!(compaction.status, CompactionStatus::Complete);
        assert_eq!(compaction.tokens_removed, None);
        assert_eq!(compaction.summary.as_deref(), Some("earlier turns"));
        assert_eq!(
            compaction.compaction_tokens_used,
            Some(CompactionTokens {
                input: Some(800),
                output: Some(120),
                cached_input: None
            })
        );
    }
}
