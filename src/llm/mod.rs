pub mod message;
pub mod openai;

pub use message::{Message, ToolCall, RAW_ARGUMENTS_KEY};
pub use openai::OpenAIChat;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Function description handed to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object
    pub parameters: Value,
}

/// Language model service: one completion per call.
///
/// The returned message is always `Message::Ai`.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model(&self) -> &str;

    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<Message>;
}
