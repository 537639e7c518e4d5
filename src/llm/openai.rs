use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RagagentError};
use crate::llm::{ChatModel, Message, ToolCall, ToolDefinition};
use crate::retry::{with_retry, ApiError};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded arguments object
    #[serde(default)]
    arguments: String,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        match message {
            Message::System { content } => WireMessage {
                role: "system",
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            Message::Human { content } => WireMessage {
                role: "user",
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            Message::Ai { content, tool_calls } => WireMessage {
                role: "assistant",
                content: (!content.is_empty() || tool_calls.is_empty()).then(|| content.clone()),
                tool_calls: (!tool_calls.is_empty())
                    .then(|| tool_calls.iter().map(WireToolCall::from).collect()),
                tool_call_id: None,
            },
            Message::ToolResult { call_id, content, .. } => WireMessage {
                role: "tool",
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: Some(call_id.clone()),
            },
        }
    }
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        let arguments = match (&call.arguments, call.raw_arguments()) {
            (_, Some(raw)) => raw.to_string(),
            (Value::Null, None) => "{}".to_string(),
            (other, None) => other.to_string(),
        };
        WireToolCall {
            id: call.id.clone(),
            kind: function_type(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments,
            },
        }
    }
}

impl From<WireToolCall> for ToolCall {
    fn from(call: WireToolCall) -> Self {
        // Models occasionally emit arguments that are not valid JSON. Keep the raw
        // text apart so the registry reports it instead of running the tool.
        let arguments = match serde_json::from_str(&call.function.arguments) {
            Ok(value) => value,
            Err(_) if call.function.arguments.trim().is_empty() => Value::Null,
            Err(_) => ToolCall::unparsed_arguments(call.function.arguments),
        };
        ToolCall {
            id: call.id,
            name: call.function.name,
            arguments,
        }
    }
}

/// OpenAI chat-completions client with function calling
pub struct OpenAIChat {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_retries: usize,
}

impl OpenAIChat {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        temperature: f32,
        max_retries: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagagentError::Llm(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature,
            max_retries,
        })
    }

    async fn request(&self, body: &ChatRequest<'_>) -> std::result::Result<Message, ApiError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(ApiError::from_status(status, &body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ApiError::fatal(format!("Failed to parse response: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::fatal("Response contained no choices"))?;

        Ok(Message::ai_with_calls(
            choice.message.content.unwrap_or_default(),
            choice.message.tool_calls.into_iter().map(ToolCall::from).collect(),
        ))
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<Message> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: tools
                .iter()
                .map(|function| WireTool {
                    kind: "function",
                    function,
                })
                .collect(),
        };

        with_retry("chat completion", self.max_retries, Duration::from_millis(500), || {
            self.request(&body)
        })
        .await
        .map_err(|e| RagagentError::Llm(e.message))
    }
}
