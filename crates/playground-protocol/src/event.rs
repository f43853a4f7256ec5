use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Raw event emitted by the agent, stored verbatim in the session event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Dotted event kind, e.g. "assistant.message", "tool.execution_start"
    #[serde(rename = "type")]
    pub kind: String,

    /// Event-specific payload; `null` or absent reads as empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Map<String, Value>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl RawEvent {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key).filter(|v| !v.is_null())
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn u64_field(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(as_u64)
    }

    pub fn f64_field(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }
}

/// Token counts sometimes arrive as floats; truncate those.
pub(crate) fn as_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

/// Known event kinds emitted by the agent.
pub struct EventKind;

impl EventKind {
    // ========================================================================
    // Conversation
    // ========================================================================
    pub const USER_MESSAGE: &'static str = "user.message";
    pub const ASSISTANT_MESSAGE: &'static str = "assistant.message";
    pub const ASSISTANT_MESSAGE_CHUNK: &'static str = "assistant.message_chunk";

    // ========================================================================
    // Tools
    // ========================================================================
    pub const TOOL_EXECUTION_START: &'static str = "tool.execution_start";
    pub const TOOL_EXECUTION_COMPLETE: &'static str = "tool.execution_complete";

    // ========================================================================
    // Session telemetry
    // ========================================================================
    pub const SESSION_ERROR: &'static str = "session.error";
    pub const ASSISTANT_USAGE: &'static str = "assistant.usage";
    pub const SESSION_USAGE_INFO: &'static str = "session.usage_info";
    pub const SESSION_COMPACTION_START: &'static str = "session.compaction_start";
    pub const SESSION_COMPACTION_COMPLETE: &'static str = "session.compaction_complete";
}
