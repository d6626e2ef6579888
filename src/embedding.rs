//! Embedding provider implementations.
//!
//! Concrete backends for [`EmbeddingProvider`]:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: `POST {url}/embeddings` on the OpenAI API or any
//!   OpenAI-compatible server (AnythingLLM, vLLM, LiteLLM).
//! - **[`OllamaProvider`]**: `POST {url}/api/embed` on a local Ollama instance.
//!
//! # Retry Strategy
//!
//! Both HTTP providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bilingual_search_core::embedding::{EmbeddingProvider, ProviderHealth};

use crate::config::EmbeddingConfig;

const OPENAI_URL: &str = "https://api.openai.com/v1";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Create the provider named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// A provider that always fails. Semantic search degrades to its fallback.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled")
    }
    async fn health_check(&self) -> ProviderHealth {
        ProviderHealth {
            available: false,
            latency_ms: 0,
            error: Some("embedding provider is disabled".to_string()),
        }
    }
}

// ============ Shared HTTP plumbing ============

struct HttpSettings {
    client: reqwest::Client,
    url: String,
    max_retries: u32,
}

impl HttpSettings {
    fn new(config: &EmbeddingConfig, default_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| default_url.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client,
            url,
            max_retries: config.max_retries,
        })
    }

    /// POST `body` to `endpoint`, retrying transient failures.
    async fn post_json(
        &self,
        label: &str,
        endpoint: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(provider = label, attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(format!("{}{}", self.url, endpoint))
                .header("Content-Type", "application/json")
                .json(body);
            if let Some(key) = bearer {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                        continue;
                    }

                    bail!("{} API error {}: {}", label, status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow!(
                        "{} connection error (is it reachable at {}?): {}",
                        label,
                        self.url,
                        e
                    ));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", label)))
    }

    /// GET `endpoint` once and time it.
    async fn probe(&self, endpoint: &str, bearer: Option<&str>) -> ProviderHealth {
        let started = Instant::now();
        let mut request = self.client.get(format!("{}{}", self.url, endpoint));
        if let Some(key) = bearer {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        let result = request.send().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) if response.status().is_success() => ProviderHealth {
                available: true,
                latency_ms,
                error: None,
            },
            Ok(response) => ProviderHealth {
                available: false,
                latency_ms,
                error: Some(format!("HTTP {}", response.status())),
            },
            Err(e) => ProviderHealth {
                available: false,
                latency_ms,
                error: Some(e.to_string()),
            },
        }
    }
}

fn parse_vector(value: &serde_json::Value, what: &str) -> Result<Vec<f32>> {
    let array = value
        .as_array()
        .ok_or_else(|| anyhow!("Invalid {} response: embedding is not an array", what))?;
    Ok(array
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

fn check_dims(vector: Vec<f32>, expected: usize, model: &str) -> Result<Vec<f32>> {
    if vector.len() != expected {
        bail!(
            "model {} returned {} dimensions, expected {}",
            model,
            vector.len(),
            expected
        );
    }
    Ok(vector)
}

fn required(config: &EmbeddingConfig, provider: &str) -> Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow!("embedding.model required for {} provider", provider))?;
    let dims = config
        .dims
        .ok_or_else(|| anyhow!("embedding.dims required for {} provider", provider))?;
    Ok((model, dims))
}

// ============ OpenAI Provider ============

/// Embedding provider for the OpenAI embeddings API and compatible servers.
///
/// The bearer token is read from the environment variable named by
/// `embedding.api_key_env`. It is mandatory only for the default OpenAI URL.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: Option<String>,
    http: HttpSettings,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required(config, "OpenAI")?;
        let http = HttpSettings::new(config, OPENAI_URL)?;
        let api_key = std::env::var(&config.api_key_env).ok();

        if api_key.is_none() && http.url == OPENAI_URL {
            bail!("{} environment variable not set", config.api_key_env);
        }

        Ok(Self {
            model,
            dims,
            api_key,
            http,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let json = self
            .http
            .post_json("OpenAI", "/embeddings", self.api_key.as_deref(), &body)
            .await?;

        let embedding = json
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .and_then(|item| item.get("embedding"))
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data[0].embedding"))?;

        check_dims(parse_vector(embedding, "OpenAI")?, self.dims, &self.model)
    }

    async fn health_check(&self) -> ProviderHealth {
        self.http.probe("/models", self.api_key.as_deref()).await
    }
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Requires Ollama to be running with an embedding model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    http: HttpSettings,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required(config, "Ollama")?;
        let http = HttpSettings::new(config, OLLAMA_URL)?;
        Ok(Self { model, dims, http })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let json = self.http.post_json("Ollama", "/api/embed", None, &body).await?;

        let embedding = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .and_then(|e| e.first())
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

        check_dims(parse_vector(embedding, "Ollama")?, self.dims, &self.model)
    }

    async fn health_check(&self) -> ProviderHealth {
        self.http.probe("/api/tags", None).await
    }
}
