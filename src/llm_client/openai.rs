//! OpenAI LLM client implementation.
//!
//! Uses `async-openai` for API calls, `moka` for response caching, and
//! `backoff` for exponential-backoff retry on rate limits / transient errors.

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use moka::future::Cache;
use serde_json::json;
use tracing::{debug, warn};

use crate::errors::{EpigraphError, LlmError, Result};

use super::LlmClient;

// ── Cache configuration ───────────────────────────────────────────────────────

/// Configuration for the in-process response cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries held in memory.
    pub max_capacity: u64,
    /// How long each entry lives before eviction.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 1_000,
            ttl: Duration::from_secs(3_600), // 1 hour
        }
    }
}

// ── Backoff configuration ─────────────────────────────────────────────────────

/// Configuration for exponential-backoff retry.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial delay before the first retry.
    pub initial_interval: Duration,
    /// Maximum delay between retries.
    pub max_interval: Duration,
    /// Maximum total time to keep retrying before giving up.
    pub max_elapsed_time: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Duration::from_secs(300),
        }
    }
}

// ── Client struct ─────────────────────────────────────────────────────────────

/// OpenAI LLM client implementing [`LlmClient`].
pub struct OpenAiClient {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    backoff_config: BackoffConfig,
    /// Keyed by `md5(model + temperature + max_tokens + prompt)` → response text.
    cache: Cache<String, String>,
}

impl OpenAiClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `api_key` – OpenAI secret key.
    /// * `model`   – Model name (e.g. `"gpt-4o"`).
    /// * `cache_config` – Cache capacity and TTL.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        cache_config: CacheConfig,
    ) -> Self {
        let config = async_openai::config::OpenAIConfig::new().with_api_key(api_key);
        let client = async_openai::Client::with_config(config);

        let cache = Cache::builder()
            .max_capacity(cache_config.max_capacity)
            .time_to_live(cache_config.ttl)
            .build();

        Self {
            client,
            model: model.into(),
            temperature: 0.0,
            max_tokens: 8_192,
            backoff_config: BackoffConfig::default(),
            cache,
        }
    }

    /// Override the sampling temperature (default `0.0`).
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the max output token limit (default `8192`).
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Override the retry backoff configuration (default: 500 ms initial, 60 s max, 5 min total).
    pub fn with_backoff_config(mut self, backoff_config: BackoffConfig) -> Self {
        self.backoff_config = backoff_config;
        self
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Compute an MD5 cache key from model, temperature, max_tokens, and prompt.
    ///
    /// Including `temperature` and `max_tokens` prevents cache collisions between
    /// requests that share the same prompt but differ in sampling parameters.
    fn cache_key(&self, prompt: &str) -> String {
        use md5::{Digest, Md5};
        let mut h = Md5::new();
        h.update(self.model.as_bytes());
        h.update(self.temperature.to_bits().to_le_bytes());
        h.update(self.max_tokens.to_le_bytes());
        h.update(prompt.as_bytes());
        format!("{:x}", h.finalize())
    }

    /// Call the chat completions endpoint with exponential-backoff retry.
    ///
    /// Retries on [`LlmError::RateLimit`] (HTTP 429) and transient 5xx errors.
    async fn call_with_retry(&self, request: serde_json::Value) -> Result<serde_json::Value> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.backoff_config.initial_interval)
            .with_max_interval(self.backoff_config.max_interval)
            .with_max_elapsed_time(Some(self.backoff_config.max_elapsed_time))
            .build();

        backoff::future::retry(backoff, || async {
            let outcome: std::result::Result<serde_json::Value, async_openai::error::OpenAIError> =
                self.client.chat().create_byot(request.clone()).await;

            match outcome {
                Ok(response) => Ok(response),
                Err(e) => {
                    let llm_err = map_openai_error(e);
                    match &llm_err {
                        LlmError::RateLimit => {
                            warn!("OpenAI rate limit hit — retrying with backoff");
                            Err(backoff::Error::transient(llm_err))
                        }
                        LlmError::Api { status, .. } if *status >= 500 => {
                            warn!("OpenAI transient server error ({}) — retrying", status);
                            Err(backoff::Error::transient(llm_err))
                        }
                        _ => Err(backoff::Error::permanent(llm_err)),
                    }
                }
            }
        })
        .await
        .map_err(EpigraphError::Llm)
    }

    /// Extract the assistant message text from a chat-completions response.
    fn extract_content(response: &serde_json::Value) -> Result<String> {
        response["choices"][0]["message"]["content"]
            .as_str()
            .map(ToOwned::to_owned)
            .ok_or(EpigraphError::Llm(LlmError::EmptyResponse))
    }
}

// ── LlmClient implementation ──────────────────────────────────────────────────

impl LlmClient for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let key = self.cache_key(prompt);

        if let Some(cached) = self.cache.get(&key).await {
            debug!("LLM cache hit");
            return Ok(cached);
        }

        let max_tokens_key = max_tokens_param(&self.model);
        let mut request = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
        });
        request[max_tokens_key] = json!(self.max_tokens);

        let response = self.call_with_retry(request).await?;
        let content = Self::extract_content(&response)?;

        self.cache.insert(key, content.clone()).await;

        Ok(content)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Return the correct token-limit parameter name for the given model.
///
/// OpenAI deprecated `"max_tokens"` for newer models (gpt-4o, gpt-4-turbo,
/// o1, o3 and later families); those models expect `"max_completion_tokens"`.
/// The old field may be silently ignored, causing unbounded output.
fn max_tokens_param(model: &str) -> &'static str {
    if model.contains("gpt-4o")
        || model.contains("gpt-4-turbo")
        || model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
    {
        "max_completion_tokens"
    } else {
        "max_tokens"
    }
}

/// Map an [`async_openai::error::OpenAIError`] to our [`LlmError`] domain type.
///
/// `async_openai::error::ApiError` does not carry an HTTP status field.
/// Instead, we infer the error class from the `code` field for known values.
/// Server errors (5xx) are wrapped by async-openai as `ApiError` with both
/// `code` and `r#type` set to `None`, so we assign them `status = 500` to
/// allow the caller's retry logic to detect them.
fn map_openai_error(err: async_openai::error::OpenAIError) -> LlmError {
    use async_openai::error::OpenAIError;

    match err {
        OpenAIError::ApiError(api_err) => match api_err.code.as_deref() {
            Some("invalid_api_key") => LlmError::Authentication,
            Some("rate_limit_exceeded") => LlmError::RateLimit,
            _ => {
                // async-openai formats 5xx errors as ApiError with code=None and
                // type=None. Assign status=500 so callers can treat them as transient.
                // TODO: revisit once async-openai exposes HTTP status on ApiError
                // directly — an API error with a genuinely unknown code/type would
                // also land here and be misclassified as a transient 5xx.
                let status = if api_err.code.is_none() && api_err.r#type.is_none() {
                    500
                } else {
                    0
                };
                LlmError::Api { status, message: api_err.message }
            }
        },
        OpenAIError::Reqwest(e) => LlmError::Api {
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            message: e.to_string(),
        },
        other => LlmError::Api {
            status: 0,
            message: other.to_string(),
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
