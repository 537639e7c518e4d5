//! Tool-augmented agent loop.
//!
//! Alternates between an `Agent` node (one model call) and a `Tools` node (run
//! every tool call of the last AI message) until the model answers without
//! tool calls or the turn cap is reached.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, RagagentError};
use crate::llm::{ChatModel, Message};
use crate::tools::ToolRegistry;

pub const SYSTEM_PROMPT: &str = "You must ALWAYS use 'retrieve_documents' first before answering any user question.\n\
If no relevant documents are found, decide whether to use 'web_search' or general reasoning.\n\
Clearly state when information comes from internal docs vs external search.";

pub const GIVE_UP_MESSAGE: &str =
    "I could not complete this request within the allowed number of steps.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Agent,
    Tools,
    End,
}

/// Where to go after an Agent turn: `Tools` while the last AI message carries
/// tool calls, otherwise `End`.
pub fn next_node(messages: &[Message]) -> Node {
    match messages.last() {
        Some(last) if last.is_ai() && !last.tool_calls().is_empty() => Node::Tools,
        _ => Node::End,
    }
}

/// A prior turn as sent by chat clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Convert client history plus the new utterance into messages.
/// Role `"user"` is human; anything else is treated as the assistant.
pub fn history_from_turns(turns: &[ChatTurn], message: &str) -> Vec<Message> {
    turns
        .iter()
        .map(|t| match t.role.as_str() {
            "user" => Message::human(&t.content),
            _ => Message::ai(&t.content),
        })
        .chain(std::iter::once(Message::human(message)))
        .collect()
}

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub answer: String,
    /// Conversation after the run, without the system instruction
    pub messages: Vec<Message>,
    /// Model calls made
    pub turns: usize,
    pub hit_turn_cap: bool,
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    max_turns: usize,
    call_timeout: Duration,
}

impl Agent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        max_turns: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            model,
            tools,
            max_turns: max_turns.max(1),
            call_timeout,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer one chat request.
    pub async fn chat(
        &self,
        turns: &[ChatTurn],
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome> {
        self.run(history_from_turns(turns, message), cancel).await
    }

    /// Drive the state machine from `history` until it halts.
    ///
    /// Model failures, timeouts and cancellation fail the whole run. Tool
    /// failures do not: the registry turns them into tool results.
    pub async fn run(&self, history: Vec<Message>, cancel: &CancellationToken) -> Result<AgentOutcome> {
        let definitions = self.tools.definitions();
        let mut conversation = Vec::with_capacity(history.len() + 1);
        conversation.push(Message::system(SYSTEM_PROMPT));
        conversation.extend(history);

        let mut turns = 0;
        let mut hit_turn_cap = false;
        let mut node = Node::Agent;

        loop {
            node = match node {
                Node::Agent => {
                    if turns >= self.max_turns {
                        log::warn!("Agent stopped after {} turns without a final answer", turns);
                        conversation.push(Message::ai(GIVE_UP_MESSAGE));
                        hit_turn_cap = true;
                        Node::End
                    } else {
                        turns += 1;
                        let reply = self.call_model(&conversation, &definitions, cancel).await?;
                        if !reply.is_ai() {
                            return Err(RagagentError::Llm(
                                "model returned a non-AI message".to_string(),
                            ));
                        }
                        conversation.push(reply);
                        next_node(&conversation)
                    }
                }
                Node::Tools => {
                    let calls = conversation
                        .last()
                        .map(|m| m.tool_calls().to_vec())
                        .unwrap_or_default();
                    for call in &calls {
                        let result = tokio::select! {
                            _ = cancel.cancelled() => return Err(RagagentError::Cancelled),
                            result = self.tools.invoke(call) => result,
                        };
                        conversation.push(result);
                    }
                    Node::Agent
                }
                Node::End => break,
            };
        }

        conversation.remove(0);
        let answer = conversation
            .last()
            .map(|m| m.content().to_string())
            .unwrap_or_default();
        Ok(AgentOutcome {
            answer,
            messages: conversation,
            turns,
            hit_turn_cap,
        })
    }

    async fn call_model(
        &self,
        conversation: &[Message],
        definitions: &[crate::llm::ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<Message> {
        let start = std::time::Instant::now();
        let reply = tokio::select! {
            _ = cancel.cancelled() => return Err(RagagentError::Cancelled),
            reply = tokio::time::timeout(self.call_timeout, self.model.chat(conversation, definitions)) => {
                reply.map_err(|_| {
                    RagagentError::Timeout(format!("model call exceeded {:?}", self.call_timeout))
                })??
            }
        };
        log::debug!("Model {} replied in {:?}", self.model.model(), start.elapsed());
        Ok(reply)
    }
}
