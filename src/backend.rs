//! Text-generation backends.
//!
//! Defines the [`TextGenerator`] trait — the narrow `invoke(context) -> text`
//! capability the generation engine depends on — and its implementations:
//! - **[`DisabledGenerator`]** — always fails; used when no backend is configured.
//! - **[`OpenAiGenerator`]** — calls an OpenAI-compatible `/v1/chat/completions` endpoint.
//! - **[`OllamaGenerator`]** — calls a local Ollama instance's `/api/generate` endpoint.
//!
//! # Failure Mapping
//!
//! Backends make exactly one request per call and never retry:
//! - client-side timeout → [`PipelineError::GenerationTimeout`]
//! - connection failure, HTTP error status, or unusable body →
//!   [`PipelineError::GenerationBackend`]

use anyhow::bail;
use async_trait::async_trait;
use std::sync::Arc;

use suitegen_core::error::{PipelineError, Result};
use suitegen_core::prompt::PromptContext;

use crate::config::GenerationConfig;

/// Maximum number of response-body characters quoted in an error message.
const ERROR_BODY_LIMIT: usize = 200;

/// The external text-generation capability.
///
/// Implementations are swapped for deterministic stubs in tests.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier reported by `/health` (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Run one generation for `context` and return the raw answer text.
    async fn invoke(&self, context: &PromptContext) -> Result<String>;

    /// Whether a real backend sits behind this generator.
    fn is_enabled(&self) -> bool {
        true
    }
}

// ============ Disabled ============

/// A generator that always fails.
///
/// Used when `generation.provider = "disabled"`; digesting, listing and
/// downloading still work without a backend.
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn invoke(&self, _context: &PromptContext) -> Result<String> {
        Err(PipelineError::GenerationBackend(
            "generation provider is disabled; set [generation] provider in config".to_string(),
        ))
    }
}

// ============ Shared HTTP helpers ============

fn http_client(config: &GenerationConfig) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(config.timeout())
        .build()?)
}

fn map_send_error(backend: &str, err: reqwest::Error) -> PipelineError {
    if err.is_timeout() {
        PipelineError::GenerationTimeout(format!("{} did not respond in time", backend))
    } else if err.is_connect() {
        PipelineError::GenerationBackend(format!("could not connect to {}", backend))
    } else {
        PipelineError::GenerationBackend(format!("{} request failed: {}", backend, err))
    }
}

async fn error_status(backend: &str, response: reqwest::Response) -> PipelineError {
    let status = response.status();
    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(ERROR_BODY_LIMIT)
        .collect();
    PipelineError::GenerationBackend(format!("{} API error {}: {}", backend, status, body))
}

async fn read_json(backend: &str, response: reqwest::Response) -> Result<serde_json::Value> {
    response
        .json()
        .await
        .map_err(|e| map_send_error(backend, e))
}

// ============ OpenAI-compatible ============

/// Generator using an OpenAI-compatible chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable. `generation.url`
/// points it at any compatible server (default `https://api.openai.com`).
pub struct OpenAiGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;

        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) => key,
            Err(_) => bail!("OPENAI_API_KEY environment variable not set"),
        };

        Ok(Self {
            client: http_client(config)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            model,
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, context: &PromptContext) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": context.system },
                { "role": "user", "content": context.prompt },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error("OpenAI", e))?;

        if !response.status().is_success() {
            return Err(error_status("OpenAI", response).await);
        }

        let json = read_json("OpenAI", response).await?;
        parse_openai_response(&json)
    }
}

/// Extracts `choices[0].message.content`.
fn parse_openai_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            PipelineError::GenerationBackend(
                "Invalid OpenAI response: missing choices[0].message.content".to_string(),
            )
        })
}

// ============ Ollama ============

/// Generator using a local Ollama instance.
///
/// Calls `POST /api/generate` with streaming disabled on the configured
/// URL (default: `http://localhost:11434`).
pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;

        Ok(Self {
            client: http_client(config)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, context: &PromptContext) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "system": context.system,
            "prompt": context.prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error("Ollama", e))?;

        if !response.status().is_success() {
            return Err(error_status("Ollama", response).await);
        }

        let json = read_json("Ollama", response).await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            PipelineError::GenerationBackend(
                "Invalid Ollama response: missing response field".to_string(),
            )
        })
}

/// Create the [`TextGenerator`] selected by `generation.provider`.
///
/// | Config Value | Generator |
/// |-------------|-----------|
/// | `"disabled"` | [`DisabledGenerator`] |
/// | `"openai"` | [`OpenAiGenerator`] |
/// | `"ollama"` | [`OllamaGenerator`] |
pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Arc<dyn TextGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAiGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
