use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A model's request to run one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Key under which arguments that failed to parse as JSON keep their raw text
pub const RAW_ARGUMENTS_KEY: &str = "__raw";

impl ToolCall {
    /// Wrap argument text the model sent that is not valid JSON.
    pub fn unparsed_arguments(raw: impl Into<String>) -> Value {
        json!({ RAW_ARGUMENTS_KEY: raw.into() })
    }

    /// The raw argument text, if it could not be parsed.
    pub fn raw_arguments(&self) -> Option<&str> {
        match &self.arguments {
            Value::Object(map) if map.len() == 1 => map.get(RAW_ARGUMENTS_KEY).and_then(Value::as_str),
            _ => None,
        }
    }
}

/// One entry of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    Human {
        content: String,
    },
    Ai {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Message::Human {
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Message::Ai {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn ai_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Ai {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Message::ToolResult {
            call_id: call_id.into(),
            content: content.into(),
            is_error,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::Human { content }
            | Message::Ai { content, .. }
            | Message::ToolResult { content, .. } => content,
        }
    }

    /// Tool calls carried by an AI message; empty for every other kind.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Ai { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn is_ai(&self) -> bool {
        matches!(self, Message::Ai { .. })
    }
}
