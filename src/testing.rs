//! In-crate test doubles for the driver and model capabilities.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::driver::{GraphDriver, QueryResult};
use crate::errors::{EpigraphError, LlmError, Result};
use crate::llm_client::LlmClient;

/// Driver double: records every call and answers by query-substring routes.
#[derive(Default)]
pub struct MockDriver {
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
    routes: Mutex<Vec<(String, QueryResult)>>,
    failing: Mutex<Vec<String>>,
}

impl MockDriver {
    /// Answer queries containing `needle` with `result`. First match wins;
    /// unmatched queries return an empty result.
    pub fn route(&self, needle: &str, result: QueryResult) {
        self.routes
            .lock()
            .unwrap()
            .push((needle.to_string(), result));
    }

    /// Fail queries containing `needle` with a driver error.
    pub fn fail_matching(&self, needle: &str) {
        self.failing.lock().unwrap().push(needle.to_string());
    }

    /// Everything executed so far, in order.
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl GraphDriver for MockDriver {
    async fn execute(&self, query: &str, params: Map<String, Value>) -> Result<QueryResult> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), params));

        for needle in self.failing.lock().unwrap().iter() {
            if query.contains(needle.as_str()) {
                return Err(EpigraphError::Driver(format!("mock failure for {needle}")));
            }
        }

        let routes = self.routes.lock().unwrap();
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

/// LLM double: pops queued responses in order, then repeats a fallback.
///
/// Queueing [`MockLlm::ERROR`] makes that call fail, for scripting partial
/// failures. An exhausted queue with no fallback also fails.
#[derive(Default)]
pub struct MockLlm {
    queue: Mutex<VecDeque<String>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    /// Sentinel queue entry that makes the corresponding call return an error.
    pub const ERROR: &'static str = "<mock-llm-error>";

    pub fn with_responses(responses: &[&str]) -> Self {
        Self {
            queue: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            fallback: String::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(fallback: &str) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts seen so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl LlmClient for MockLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(response) = self.queue.lock().unwrap().pop_front() {
            if response == Self::ERROR {
                return Err(EpigraphError::Llm(LlmError::EmptyResponse));
            }
            return Ok(response);
        }
        if self.fallback.is_empty() {
            return Err(EpigraphError::Llm(LlmError::EmptyResponse));
        }
        Ok(self.fallback.clone())
    }
}

