//! Shared test doubles for the engine's four capabilities.
//!
//! The driver and LLM mocks share their state behind an `Arc`, so a test can
//! keep a handle for inspection after moving a clone into the engine.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use epigraph::driver::{GraphDriver, QueryResult, Record};
use epigraph::embedder::{EmbedderClient, Embedding};
use epigraph::errors::{EpigraphError, LlmError, Result};
use epigraph::llm_client::{LlmClient, RerankerClient};

// ── MockDriver ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct DriverState {
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
    routes: Mutex<Vec<(String, QueryResult)>>,
    failing: Mutex<Vec<String>>,
}

/// Driver double: records every call and answers by query-substring routes.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<DriverState>,
}

impl MockDriver {
    /// Answer queries containing `needle` with `result`. First match wins;
    /// unmatched queries return an empty result.
    pub fn route(&self, needle: &str, result: QueryResult) {
        self.state
            .routes
            .lock()
            .unwrap()
            .push((needle.to_string(), result));
    }

    /// Fail queries containing `needle` with a driver error.
    pub fn fail_matching(&self, needle: &str) {
        self.state.failing.lock().unwrap().push(needle.to_string());
    }

    /// Everything executed so far, in order.
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Calls whose query text contains `needle`, in order.
    pub fn calls_matching(&self, needle: &str) -> Vec<(String, Map<String, Value>)> {
        self.calls()
            .into_iter()
            .filter(|(query, _)| query.contains(needle))
            .collect()
    }
}

impl GraphDriver for MockDriver {
    async fn execute(&self, query: &str, params: Map<String, Value>) -> Result<QueryResult> {
        self.state
            .calls
            .lock()
            .unwrap()
            .push((query.to_string(), params));

        for needle in self.state.failing.lock().unwrap().iter() {
            if query.contains(needle.as_str()) {
                return Err(EpigraphError::Driver(format!("mock failure for {needle}")));
            }
        }

        let routes = self.state.routes.lock().unwrap();
        for (needle, result) in routes.iter() {
            if query.contains(needle.as_str()) {
                return Ok(result.clone());
            }
        }
        Ok(QueryResult::default())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Build a result row from (column, value) pairs.
pub fn record(pairs: &[(&str, Value)]) -> Record {
    let mut values = Map::new();
    for (key, value) in pairs {
        values.insert((*key).to_string(), value.clone());
    }
    Record::new(values)
}

/// Build a whole result from rows of (column, value) pairs.
pub fn result(rows: &[&[(&str, Value)]]) -> QueryResult {
    QueryResult {
        records: rows.iter().map(|pairs| record(pairs)).collect(),
    }
}

// ── MockLlm ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct LlmState {
    queue: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

/// LLM double: pops queued responses in order; an exhausted queue fails, and
/// a queued [`MockLlm::ERROR`] makes that one call fail.
#[derive(Clone, Default)]
pub struct MockLlm {
    state: Arc<LlmState>,
}

impl MockLlm {
    /// Sentinel queue entry that makes the corresponding call return an error.
    pub const ERROR: &'static str = "<mock-llm-error>";

    pub fn with_responses(responses: &[&str]) -> Self {
        let llm = Self::default();
        for response in responses {
            llm.enqueue(response);
        }
        llm
    }

    pub fn enqueue(&self, response: &str) {
        self.state
            .queue
            .lock()
            .unwrap()
            .push_back(response.to_string());
    }

    pub fn prompts(&self) -> Vec<String> {
        self.state.prompts.lock().unwrap().clone()
    }
}

impl LlmClient for MockLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.state.prompts.lock().unwrap().push(prompt.to_string());
        let response = self
            .state
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(EpigraphError::Llm(LlmError::EmptyResponse))?;
        if response == Self::ERROR {
            return Err(EpigraphError::Llm(LlmError::EmptyResponse));
        }
        Ok(response)
    }
}

// ── MockEmbedder / MockReranker ───────────────────────────────────────────────

/// Embedder double returning one fixed vector.
#[derive(Clone)]
pub struct MockEmbedder {
    pub vector: Embedding,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self {
            vector: vec![0.1, 0.2, 0.3],
        }
    }
}

impl EmbedderClient for MockEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding> {
        Ok(self.vector.clone())
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        Ok(vec![self.vector.clone(); texts.len()])
    }

    fn dim(&self) -> usize {
        self.vector.len()
    }
}

/// Reranker double returning fixed indices (or an error when none are set).
#[derive(Clone, Default)]
pub struct MockReranker {
    pub indices: Option<Vec<usize>>,
}

impl RerankerClient for MockReranker {
    async fn rank(&self, _query: &str, _docs: &[String]) -> Result<Vec<usize>> {
        self.indices
            .clone()
            .ok_or_else(|| EpigraphError::Search("mock reranker failure".to_string()))
    }
}

/// A deterministic uuid generator: "uuid-1", "uuid-2", …
pub fn sequential_uuids() -> impl Fn() -> String + Send + Sync + 'static {
    let counter = Mutex::new(0_u64);
    move || {
        let mut counter = counter.lock().unwrap();
        *counter += 1;
        format!("uuid-{counter}")
    }
}
