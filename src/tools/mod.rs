//! Tools the agent can call, and the registry that dispatches them.

pub mod retrieve;
pub mod web_search;

pub use retrieve::{RetrieveDocumentsTool, NO_DOCUMENTS_FOUND};
pub use web_search::{SearchHit, SearchProvider, SearchResults, TavilySearch, WebSearchTool, NO_RESULTS_FOUND};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Result, RagagentError};
use crate::llm::{Message, ToolCall, ToolDefinition, RAW_ARGUMENTS_KEY};

/// A named request → text function the model may invoke
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the arguments object
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, arguments: &Value) -> Result<String>;
}

/// Fixed, ordered set of tools looked up by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool at the end of the registry. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(RagagentError::InvalidInput(format!(
                "Tool '{}' is already registered",
                name
            )));
        }
        self.by_name.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Result<Self> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn Tool>> {
        self.by_name
            .get(name)
            .map(|&idx| &self.tools[idx])
            .ok_or_else(|| RagagentError::ToolNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run one tool call. Never fails: lookup and execution errors become the
    /// text of an error `ToolResult` carrying the call's id.
    pub async fn invoke(&self, call: &ToolCall) -> Message {
        let outcome = match self.get(&call.name) {
            Ok(_) if call.raw_arguments().is_some() => Err(RagagentError::InvalidInput(format!(
                "arguments for '{}' are not valid JSON",
                call.name
            ))),
            Ok(tool) => {
                log::debug!("Invoking tool {} ({})", call.name, call.id);
                tool.call(&call.arguments).await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(text) => Message::tool_result(&call.id, text, false),
            Err(e) => {
                log::warn!("Tool call {} ({}) failed: {}", call.name, call.id, e);
                Message::tool_result(&call.id, format!("Error: {}", e), true)
            }
        }
    }
}

/// Pull the query string out of a tool call's arguments.
///
/// Accepts a bare string, `{"query": ..}`, `{"__arg1": ..}`, or failing those
/// the first string-valued field of an object. A string that opens like a JSON
/// object but does not parse is malformed arguments, not a query.
pub fn query_argument(arguments: &Value) -> Result<String> {
    let query = match arguments {
        Value::String(s) if looks_like_broken_json(s) => {
            return Err(RagagentError::InvalidInput(
                "arguments are not valid JSON".to_string(),
            ))
        }
        Value::Object(map) if map.contains_key(RAW_ARGUMENTS_KEY) => {
            return Err(RagagentError::InvalidInput(
                "arguments are not valid JSON".to_string(),
            ))
        }
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map
            .get("query")
            .or_else(|| map.get("__arg1"))
            .and_then(Value::as_str)
            .or_else(|| map.values().find_map(Value::as_str)),
        _ => None,
    };
    match query.map(str::trim) {
        Some(q) if !q.is_empty() => Ok(q.to_string()),
        _ => Err(RagagentError::InvalidInput(
            "expected a non-empty 'query' string argument".to_string(),
        )),
    }
}

fn looks_like_broken_json(s: &str) -> bool {
    let trimmed = s.trim_start();
    trimmed.starts_with('{') && serde_json::from_str::<Value>(trimmed).is_err()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the query"
        }

        async fn call(&self, arguments: &Value) -> Result<String> {
            query_argument(arguments)
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        async fn call(&self, _arguments: &Value) -> Result<String> {
            Err(RagagentError::Search("provider down".to_string()))
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
            .with(Arc::new(Echo))
            .unwrap()
            .with(Arc::new(Broken))
            .unwrap()
    }

    fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    #[test]
    fn test_query_argument_shapes() {
        assert_eq!(query_argument(&json!("plain")).unwrap(), "plain");
        assert_eq!(query_argument(&json!({"query": "q"})).unwrap(), "q");
        assert_eq!(query_argument(&json!({"__arg1": "legacy"})).unwrap(), "legacy");
        assert_eq!(query_argument(&json!({"text": "other"})).unwrap(), "other");
        assert!(query_argument(&json!({"query": "  "})).is_err());
        assert!(query_argument(&json!(42)).is_err());
        assert!(query_argument(&Value::Null).is_err());
    }

    #[test]
    fn test_query_argument_rejects_malformed_json() {
        assert!(matches!(
            query_argument(&json!("{\"query\": \"rust")),
            Err(RagagentError::InvalidInput(_))
        ));
        assert!(query_argument(&ToolCall::unparsed_arguments("{\"query\": \"rust")).is_err());
        // brackets in an ordinary query are fine
        assert_eq!(query_argument(&json!("[draft] release notes")).unwrap(), "[draft] release notes");
    }

    #[tokio::test]
    async fn test_invoke_reports_unparseable_arguments() {
        let truncated = call("c9", "echo", ToolCall::unparsed_arguments("{\"query\": \"rust"));
        let result = registry().invoke(&truncated).await;
        match result {
            Message::ToolResult { call_id, content, is_error } => {
                assert_eq!(call_id, "c9");
                assert!(is_error);
                assert_eq!(content, "Error: Invalid input: arguments for 'echo' are not valid JSON");
            }
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_keeps_order_and_rejects_duplicates() {
        let mut registry = registry();
        assert_eq!(registry.names(), vec!["echo", "broken"]);
        assert!(registry.register(Arc::new(Echo)).is_err());
        assert_eq!(registry.len(), 2);

        let defs = registry.definitions();
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].parameters["required"], json!(["query"]));
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let result = registry().invoke(&call("c1", "echo", json!({"query": "hi"}))).await;
        assert_eq!(result, Message::tool_result("c1", "hi", false));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_result() {
        let result = registry().invoke(&call("c2", "tavily_web_search", json!("x"))).await;
        assert_eq!(
            result,
            Message::tool_result("c2", "Error: No tool named 'tavily_web_search'", true)
        );
    }

    #[tokio::test]
    async fn test_tool_failure_becomes_error_result() {
        let result = registry().invoke(&call("c3", "broken", json!("x"))).await;
        match result {
            Message::ToolResult { call_id, content, is_error } => {
                assert_eq!(call_id, "c3");
                assert!(is_error);
                assert!(content.starts_with("Error: "));
                assert!(content.contains("provider down"));
            }
            other => panic!("expected tool result, got {:?}", other),
        }
    }
}
