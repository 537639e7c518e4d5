//! End-to-end behavior of the folder → index → agent pipeline with fake
//! embedding, chat and search backends.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ragagent::agent::{Agent, GIVE_UP_MESSAGE};
use ragagent::embeddings::Embedder;
use ragagent::llm::{ChatModel, Message, ToolCall, ToolDefinition};
use ragagent::tools::{SearchProvider, SearchResults, ToolRegistry, NO_DOCUMENTS_FOUND};
use ragagent::{AppContext, Config, RagagentError, RebuildMode, Result, Services};
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const DIMENSIONS: usize = 64;

/// Hashed bag of words, so texts sharing words score close together.
struct BagOfWords {
    embedded: AtomicUsize,
    fail: AtomicBool,
}

impl BagOfWords {
    fn new() -> Self {
        Self {
            embedded: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    fn embedded(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMENSIONS];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let mut h: u64 = 0xcbf29ce484222325;
            for b in word.to_lowercase().bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            v[(h % DIMENSIONS as u64) as usize] += 1.0;
        }
        // never all zeros
        v[0] += 0.01;
        v
    }
}

#[async_trait]
impl Embedder for BagOfWords {
    fn model(&self) -> &str {
        "bag-of-words"
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagagentError::Embedding("embedding backend down".to_string()));
        }
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Retrieves first, falls back to web search on an empty result, then
/// answers naming where the information came from.
struct Researcher;

#[async_trait]
impl ChatModel for Researcher {
    fn model(&self) -> &str {
        "researcher"
    }

    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<Message> {
        let question = messages
            .iter()
            .rev()
            .find(|m| matches!(m, Message::Human { .. }))
            .map(|m| m.content().to_string())
            .unwrap_or_default();

        match messages.last() {
            Some(Message::Human { .. }) => Ok(Message::ai_with_calls(
                "",
                vec![call("c1", "retrieve_documents", json!({ "query": question }))],
            )),
            Some(Message::ToolResult { content, .. }) if content == NO_DOCUMENTS_FOUND => {
                assert!(tools.iter().any(|t| t.name == "web_search"));
                Ok(Message::ai_with_calls(
                    "",
                    vec![call("c2", "web_search", json!({ "query": question }))],
                ))
            }
            Some(Message::ToolResult { call_id, content, .. }) if call_id == "c2" => {
                Ok(Message::ai(format!("From external search: {}", content)))
            }
            Some(Message::ToolResult { content, .. }) => {
                Ok(Message::ai(format!("From internal docs: {}", content)))
            }
            _ => Err(RagagentError::Llm("unexpected conversation".to_string())),
        }
    }
}

/// Never stops asking for tools.
struct Looping;

#[async_trait]
impl ChatModel for Looping {
    fn model(&self) -> &str {
        "looping"
    }

    async fn chat(&self, messages: &[Message], _tools: &[ToolDefinition]) -> Result<Message> {
        Ok(Message::ai_with_calls(
            "",
            vec![
                call(&format!("a{}", messages.len()), "retrieve_documents", json!("anything")),
                call(&format!("b{}", messages.len()), "web_search", json!("anything")),
            ],
        ))
    }
}

struct CannedSearch;

#[async_trait]
impl SearchProvider for CannedSearch {
    async fn search(&self, query: &str) -> Result<SearchResults> {
        Ok(SearchResults {
            answer: Some(format!("The web says {} is popular", query)),
            hits: Vec::new(),
        })
    }
}

fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

fn config(temp: &Path, stale_chunks: &str) -> Config {
    let toml = format!(
        r#"
[ragagent]
watch_folder = "{folder}"
index_dir = "{index}"

[embeddings]
provider = "openai"
model = "bag-of-words"
api_key_env = "UNUSED_EMBEDDINGS_KEY"

[chat]
model = "fake"
api_key_env = "UNUSED_CHAT_KEY"
max_turns = 3

[chunking]
stale_chunks = "{stale_chunks}"

[rebuild]
debounce_ms = 20
"#,
        folder = temp.join("docs").display(),
        index = temp.join("index").display(),
    );
    Config::from_toml(&toml).unwrap()
}

struct Harness {
    temp: TempDir,
    embedder: Arc<BagOfWords>,
    ctx: AppContext,
}

impl Harness {
    async fn new(chat: Arc<dyn ChatModel>, stale_chunks: &str) -> Self {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("docs")).unwrap();
        let embedder = Arc::new(BagOfWords::new());
        let services = Services {
            embedder: embedder.clone(),
            chat,
            search: Some(Arc::new(CannedSearch)),
        };
        let ctx = AppContext::with_services(config(temp.path(), stale_chunks), services)
            .await
            .unwrap();
        Self { temp, embedder, ctx }
    }

    fn write(&self, name: &str, content: &str) {
        std::fs::write(self.temp.path().join("docs").join(name), content).unwrap();
    }

    async fn ledger_json(&self) -> String {
        self.ctx
            .rebuilder
            .store()
            .load_ledger()
            .await
            .unwrap()
            .to_canonical_json()
            .unwrap()
    }

    fn chunk_texts(&self) -> Vec<String> {
        let index = self.ctx.guard.current_index().unwrap();
        let mut texts: Vec<String> = index.chunks().map(|c| c.text.clone()).collect();
        texts.sort();
        texts
    }
}

#[tokio::test]
async fn test_empty_folder_builds_valid_empty_index() {
    let h = Harness::new(Arc::new(Researcher), "keep").await;

    let report = h.ctx.rebuild.request("test").wait().await.unwrap();
    assert_eq!(report.files_scanned, 0);
    assert_eq!(h.ledger_json().await, "{}");
    assert!(h.ctx.guard.current_index().unwrap().is_empty());

    let result = h
        .ctx
        .agent
        .tools()
        .invoke(&call("q", "retrieve_documents", json!({ "query": "anything" })))
        .await;
    assert_eq!(result.content(), NO_DOCUMENTS_FOUND);
    // empty index answers without embedding
    assert_eq!(h.embedder.embedded(), 0);

    h.ctx.shutdown().await;
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let h = Harness::new(Arc::new(Researcher), "keep").await;
    h.write("a.txt", "hello world");

    let first = h.ctx.rebuilder.rebuild().await.unwrap();
    let ledger_after_first = h.ledger_json().await;
    let chunks_after_first = h.chunk_texts();
    assert_eq!(chunks_after_first, vec!["hello world".to_string()]);
    assert!(ledger_after_first.contains("a.txt"));

    let second = h.ctx.rebuilder.rebuild().await.unwrap();
    assert_eq!(second.mode, RebuildMode::Unchanged);
    assert_eq!(second.chunks_embedded, 0);
    assert!(second.generation > first.generation);
    assert_eq!(h.ledger_json().await, ledger_after_first);
    assert_eq!(h.chunk_texts(), chunks_after_first);

    h.ctx.shutdown().await;
}

#[tokio::test]
async fn test_only_changed_file_is_reembedded() {
    let h = Harness::new(Arc::new(Researcher), "keep").await;
    h.write("a.txt", "hello world");
    h.write("b.txt", "unrelated notes about gardening");
    h.write("c.md", "# Cooking\n\nBake at two hundred degrees.");

    h.ctx.rebuilder.rebuild().await.unwrap();
    let before = h.embedder.embedded();
    let ledger_before = h.ctx.rebuilder.store().load_ledger().await.unwrap();

    h.write("a.txt", "goodbye world");
    let report = h.ctx.rebuilder.rebuild().await.unwrap();

    assert_eq!(report.mode, RebuildMode::Incremental);
    assert_eq!(report.files_changed, 1);
    assert_eq!(report.chunks_embedded, 1);
    assert_eq!(h.embedder.embedded() - before, 1);

    let ledger_after = h.ctx.rebuilder.store().load_ledger().await.unwrap();
    assert_ne!(ledger_after.get("a.txt"), ledger_before.get("a.txt"));
    assert_eq!(ledger_after.get("b.txt"), ledger_before.get("b.txt"));
    assert_eq!(ledger_after.get("c.md"), ledger_before.get("c.md"));

    // the keep policy leaves the superseded chunk in place
    let texts = h.chunk_texts();
    assert!(texts.contains(&"hello world".to_string()));
    assert!(texts.contains(&"goodbye world".to_string()));

    h.ctx.shutdown().await;
}

#[tokio::test]
async fn test_purge_policy_drops_superseded_chunks() {
    let h = Harness::new(Arc::new(Researcher), "purge").await;
    h.write("a.txt", "hello world");
    h.ctx.rebuilder.rebuild().await.unwrap();

    h.write("a.txt", "goodbye world");
    let report = h.ctx.rebuilder.rebuild().await.unwrap();
    assert_eq!(report.chunks_purged, 1);
    assert_eq!(h.chunk_texts(), vec!["goodbye world".to_string()]);

    h.ctx.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_mixed_generations() {
    let h = Harness::new(Arc::new(Researcher), "purge").await;
    h.write("a.txt", "version 0 alpha");
    h.write("b.txt", "version 0 beta");
    h.ctx.rebuilder.rebuild().await.unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let guard = h.ctx.guard.clone();
        let done = done.clone();
        readers.push(tokio::spawn(async move {
            let mut observed = 0usize;
            while !done.load(Ordering::SeqCst) {
                let snapshot = guard.current().unwrap();
                let versions: HashSet<String> = snapshot
                    .index
                    .chunks()
                    .map(|c| c.text.split_whitespace().nth(1).unwrap_or_default().to_string())
                    .collect();
                assert_eq!(versions.len(), 1, "mixed generation {}: {:?}", snapshot.generation, versions);
                assert_eq!(snapshot.index.len(), 2);
                observed += 1;
                tokio::task::yield_now().await;
            }
            observed
        }));
    }

    for version in 1..6 {
        h.write("a.txt", &format!("version {} alpha", version));
        h.write("b.txt", &format!("version {} beta", version));
        h.ctx.rebuilder.rebuild().await.unwrap();
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
    h.ctx.shutdown().await;
}

#[tokio::test]
async fn test_embedding_failure_keeps_previous_generation() {
    let h = Harness::new(Arc::new(Researcher), "keep").await;
    h.write("a.txt", "hello world");
    let first = h.ctx.rebuilder.rebuild().await.unwrap();
    let ledger_before = h.ledger_json().await;

    h.write("a.txt", "goodbye world");
    h.embedder.fail.store(true, Ordering::SeqCst);
    let err = h.ctx.rebuild.request("test").wait().await.unwrap_err();
    assert!(matches!(err, RagagentError::RebuildFailed(_)));

    assert_eq!(h.ctx.guard.generation(), Some(first.generation));
    assert_eq!(h.ledger_json().await, ledger_before);
    assert_eq!(h.chunk_texts(), vec!["hello world".to_string()]);

    // the next pass still sees the change
    h.embedder.fail.store(false, Ordering::SeqCst);
    let retry = h.ctx.rebuilder.rebuild().await.unwrap();
    assert_eq!(retry.files_changed, 1);
    assert!(h.chunk_texts().contains(&"goodbye world".to_string()));

    h.ctx.shutdown().await;
}

#[tokio::test]
async fn test_chat_answers_from_internal_documents() {
    let h = Harness::new(Arc::new(Researcher), "keep").await;
    h.write("a.txt", "hello world");
    h.ctx.initialize().await;

    let cancel = CancellationToken::new();
    let outcome = h.ctx.agent.chat(&[], "What is in a.txt?", &cancel).await.unwrap();

    assert_eq!(outcome.answer, "From internal docs: hello world");
    assert!(!outcome.hit_turn_cap);
    assert_eq!(outcome.turns, 2);
    assert!(matches!(outcome.messages[0], Message::Human { .. }));
    assert_eq!(outcome.messages[1].tool_calls()[0].name, "retrieve_documents");
    assert!(outcome.messages.iter().all(|m| !matches!(m, Message::System { .. })));

    h.ctx.shutdown().await;
}

#[tokio::test]
async fn test_empty_retrieval_leads_to_registered_tool() {
    let h = Harness::new(Arc::new(Researcher), "keep").await;
    h.ctx.initialize().await;

    let cancel = CancellationToken::new();
    let outcome = h.ctx.agent.chat(&[], "rust", &cancel).await.unwrap();

    let retrieval = &outcome.messages[2];
    assert_eq!(retrieval.content(), NO_DOCUMENTS_FOUND);
    let next_calls = outcome.messages[3].tool_calls();
    assert_eq!(next_calls.len(), 1);
    assert!(h.ctx.agent.tools().contains(&next_calls[0].name));
    assert_eq!(next_calls[0].name, "web_search");
    assert_eq!(outcome.answer, "From external search: The web says rust is popular");

    h.ctx.shutdown().await;
}

#[tokio::test]
async fn test_every_tool_call_gets_one_result_in_order() {
    let h = Harness::new(Arc::new(Looping), "keep").await;
    h.ctx.initialize().await;

    let cancel = CancellationToken::new();
    let outcome = h.ctx.agent.chat(&[], "loop forever", &cancel).await.unwrap();

    assert!(outcome.hit_turn_cap);
    assert_eq!(outcome.turns, 3);
    assert_eq!(outcome.answer, GIVE_UP_MESSAGE);

    for (i, message) in outcome.messages.iter().enumerate() {
        let calls = message.tool_calls();
        if calls.is_empty() {
            continue;
        }
        let results: Vec<&str> = outcome.messages[i + 1..i + 1 + calls.len()]
            .iter()
            .map(|m| match m {
                Message::ToolResult { call_id, .. } => call_id.as_str(),
                other => panic!("expected tool result, got {:?}", other),
            })
            .collect();
        let ids: Vec<&str> = calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(results, ids);
    }

    h.ctx.shutdown().await;
}

#[tokio::test]
async fn test_agent_halts_on_first_answer() {
    let tools = Arc::new(ToolRegistry::new());
    let agent = Agent::new(Arc::new(Researcher), tools, 5, Duration::from_secs(5));
    let cancel = CancellationToken::new();

    // the fake answers as soon as it sees a tool result
    let history = vec![
        Message::human("hi"),
        Message::ai_with_calls("", vec![call("c0", "retrieve_documents", json!("hi"))]),
        Message::tool_result("c0", "greeting text", false),
    ];
    let outcome = agent.run(history, &cancel).await.unwrap();

    assert_eq!(outcome.turns, 1);
    assert_eq!(outcome.answer, "From internal docs: greeting text");
    assert!(outcome.messages.last().unwrap().tool_calls().is_empty());
}

#[tokio::test]
async fn test_uploaded_file_is_indexed_by_worker() {
    let h = Harness::new(Arc::new(Researcher), "keep").await;
    h.ctx.initialize().await;
    assert!(h.ctx.guard.current_index().unwrap().is_empty());

    h.write("new.md", "# Release notes\n\nVersion two ships on Friday.");
    let report = h.ctx.rebuild.request("upload").wait().await.unwrap();

    assert_eq!(report.files_changed, 1);
    assert_eq!(h.ctx.guard.generation(), Some(report.generation));
    assert!(!h.ctx.guard.current_index().unwrap().is_empty());

    h.ctx.shutdown().await;
}
