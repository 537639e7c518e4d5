use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{query_argument, Tool};
use crate::error::Result;
use crate::retriever::Retriever;

pub const NO_DOCUMENTS_FOUND: &str = "No relevant documents found.";

/// `retrieve_documents`: nearest chunks from the active index, blank-line separated
pub struct RetrieveDocumentsTool {
    retriever: Arc<Retriever>,
}

impl RetrieveDocumentsTool {
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for RetrieveDocumentsTool {
    fn name(&self) -> &str {
        "retrieve_documents"
    }

    fn description(&self) -> &str {
        "Retrieve document chunks relevant to a query."
    }

    async fn call(&self, arguments: &Value) -> Result<String> {
        let query = query_argument(arguments)?;
        let chunks = self.retriever.retrieve(&query).await?;
        if chunks.is_empty() {
            return Ok(NO_DOCUMENTS_FOUND.to_string());
        }
        Ok(chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
