//! OpenAI embedding client.
//!
//! Entity names, facts, community names, and search queries are embedded with
//! the same client, and the resulting vectors are compared against each other
//! inside the store's cosine-ranking query. That comparison silently degrades
//! if vectors of different lengths ever mix, so this client can pin an output
//! dimension through the API's `dimensions` parameter and rejects responses
//! that do not honor it.

use async_openai::{
    config::OpenAIConfig, error::OpenAIError, types::CreateEmbeddingRequestArgs, Client,
};
use backoff::ExponentialBackoffBuilder;
use tracing::warn;

use crate::embedder::{Embedding, EmbedderClient};
use crate::errors::{EpigraphError, Result};
use crate::llm_client::openai::BackoffConfig;

/// The embeddings endpoint accepts at most this many inputs per request.
const MAX_INPUTS_PER_REQUEST: usize = 2048;

/// Native output size of a model when no dimension override is configured.
fn native_dim(model: &str) -> usize {
    if model == "text-embedding-3-large" {
        3072
    } else {
        1536
    }
}

/// Whether a failed call is worth retrying.
///
/// Same policy as the chat client: rate limits and transient server errors
/// retry, everything else is permanent. async-openai surfaces 5xx responses
/// as an `ApiError` with neither `code` nor `type` set, so that shape counts
/// as transient too.
fn is_transient(err: &OpenAIError) -> bool {
    match err {
        OpenAIError::ApiError(api) => {
            api.code.as_deref() == Some("rate_limit_exceeded")
                || (api.code.is_none() && api.r#type.is_none())
        }
        OpenAIError::Reqwest(e) => e.is_timeout() || e.is_connect(),
        _ => false,
    }
}

/// OpenAI embedding client implementing [`EmbedderClient`].
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    /// Output dimension requested from the API. `None` uses the model's
    /// native size.
    dimensions: Option<u32>,
    backoff_config: BackoffConfig,
}

impl OpenAiEmbedder {
    /// Create a client for the default OpenAI endpoint.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_config(OpenAIConfig::new().with_api_key(api_key.into()), model)
    }

    /// Create a client from an explicit endpoint configuration (alternate
    /// base URL, organization, …).
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
            dimensions: None,
            backoff_config: BackoffConfig::default(),
        }
    }

    /// Request `dimensions`-sized vectors from the API and reject responses
    /// of any other length. Only the text-embedding-3 family supports this.
    pub fn with_dimensions(mut self, dimensions: u32) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Override the retry backoff configuration.
    pub fn with_backoff_config(mut self, backoff_config: BackoffConfig) -> Self {
        self.backoff_config = backoff_config;
        self
    }

    /// One embeddings call for up to [`MAX_INPUTS_PER_REQUEST`] texts, with
    /// retry, returning vectors in input order.
    async fn embed_chunk(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.backoff_config.initial_interval)
            .with_max_interval(self.backoff_config.max_interval)
            .with_max_elapsed_time(Some(self.backoff_config.max_elapsed_time))
            .build();

        let input: Vec<String> = texts.iter().map(|s| (*s).to_owned()).collect();

        let response = backoff::future::retry(backoff, || async {
            let mut builder = CreateEmbeddingRequestArgs::default();
            builder.model(self.model.as_str()).input(input.clone());
            if let Some(dimensions) = self.dimensions {
                builder.dimensions(dimensions);
            }
            let request = builder
                .build()
                .map_err(|e| backoff::Error::permanent(EpigraphError::Embedder(e.to_string())))?;

            self.client.embeddings().create(request).await.map_err(|e| {
                if is_transient(&e) {
                    warn!(error = %e, "transient embeddings failure, retrying");
                    backoff::Error::transient(EpigraphError::Embedder(e.to_string()))
                } else {
                    backoff::Error::permanent(EpigraphError::Embedder(e.to_string()))
                }
            })
        })
        .await?;

        if response.data.len() != texts.len() {
            return Err(EpigraphError::Embedder(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        // The API tags each item with its input index; return input order
        // regardless of response order.
        let mut data = response.data;
        data.sort_by_key(|item| item.index);

        let mut embeddings = Vec::with_capacity(data.len());
        for item in data {
            let vector: Embedding = item.embedding.into_iter().map(|x| x as f32).collect();
            if let Some(dimensions) = self.dimensions {
                if vector.len() != dimensions as usize {
                    return Err(EpigraphError::Embedder(format!(
                        "requested {dimensions}-dimensional embeddings, got {}",
                        vector.len()
                    )));
                }
            }
            embeddings.push(vector);
        }

        Ok(embeddings)
    }
}

impl EmbedderClient for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut embeddings = self.embed_chunk(&[text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| EpigraphError::Embedder("embedding API returned no data".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut result = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_INPUTS_PER_REQUEST) {
            result.extend(self.embed_chunk(chunk).await?);
        }
        Ok(result)
    }

    fn dim(&self) -> usize {
        self.dimensions
            .map(|d| d as usize)
            .unwrap_or_else(|| native_dim(&self.model))
    }
}
