use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{query_argument, Tool};
use crate::error::{Result, RagagentError};
use crate::retry::{with_retry, ApiError};

pub const NO_RESULTS_FOUND: &str = "No results found.";
const NOT_CONFIGURED: &str = "Web search is not configured.";
const TAVILY_URL: &str = "https://api.tavily.com/search";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "content")]
    pub snippet: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default, rename = "results")]
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    /// The provider's short answer if it gave one, else a bulleted list of hits.
    pub fn summarize(&self) -> String {
        if let Some(answer) = self.answer.as_deref().map(str::trim) {
            if !answer.is_empty() {
                return answer.to_string();
            }
        }
        if self.hits.is_empty() {
            return NO_RESULTS_FOUND.to_string();
        }
        self.hits
            .iter()
            .map(|h| format!("- {}: {}", h.title, h.snippet))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// External web search service
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResults>;
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    include_answer: bool,
    max_results: usize,
}

/// Tavily search API client
pub struct TavilySearch {
    client: Client,
    api_key: String,
    endpoint: String,
    max_results: usize,
    include_answer: bool,
    max_retries: usize,
}

impl TavilySearch {
    pub fn new(api_key: String, max_results: usize, include_answer: bool) -> Result<Self> {
        Self::with_endpoint(api_key, TAVILY_URL.to_string(), max_results, include_answer)
    }

    pub fn with_endpoint(
        api_key: String,
        endpoint: String,
        max_results: usize,
        include_answer: bool,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagagentError::Search(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            endpoint,
            max_results: max_results.max(1),
            include_answer,
            max_retries: 2,
        })
    }

    async fn request(&self, query: &str) -> std::result::Result<SearchResults, ApiError> {
        let body = TavilyRequest {
            api_key: &self.api_key,
            query,
            include_answer: self.include_answer,
            max_results: self.max_results,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
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

        response
            .json()
            .await
            .map_err(|e| ApiError::fatal(format!("Failed to parse search response: {}", e)))
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str) -> Result<SearchResults> {
        with_retry("web search", self.max_retries, Duration::from_millis(500), || {
            self.request(query)
        })
        .await
        .map_err(|e| RagagentError::Search(e.message))
    }
}

/// `web_search`: delegates to the configured provider
pub struct WebSearchTool {
    provider: Option<Arc<dyn SearchProvider>>,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// Tool that stays registered but answers that search is unavailable.
    pub fn unconfigured() -> Self {
        Self { provider: None }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for up-to-date information."
    }

    async fn call(&self, arguments: &Value) -> Result<String> {
        let query = query_argument(arguments)?;
        let Some(provider) = &self.provider else {
            return Ok(NOT_CONFIGURED.to_string());
        };
        let results = provider.search(&query).await?;
        log::debug!("Web search returned {} hits", results.hits.len());
        Ok(results.summarize())
    }
}
