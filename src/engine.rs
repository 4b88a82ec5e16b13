//! Generation engine.
//!
//! Turns a [`SpecDigest`] (plus prior source and feedback, for refinement)
//! into test-suite source text. The engine assembles the prompt context,
//! makes exactly one [`TextGenerator::invoke`] call, and post-processes the
//! answer. Backend failures propagate unchanged; retrying is the caller's
//! decision.

use std::sync::Arc;
use std::time::Duration;

use suitegen_core::error::{PipelineError, Result};
use suitegen_core::models::SpecDigest;
use suitegen_core::prompt::{self, PromptContext};

use crate::backend::TextGenerator;

pub struct GenerationEngine {
    generator: Arc<dyn TextGenerator>,
    timeout: Option<Duration>,
}

impl GenerationEngine {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            timeout: None,
        }
    }

    /// Bound every backend call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    /// Generate a first test suite for `digest`.
    pub async fn generate(&self, digest: &SpecDigest) -> Result<String> {
        self.run(prompt::generation_context(digest)).await
    }

    /// Refine `prior_source` according to `feedback`.
    pub async fn regenerate(
        &self,
        digest: &SpecDigest,
        prior_source: &str,
        feedback: &str,
    ) -> Result<String> {
        self.run(prompt::regeneration_context(digest, prior_source, feedback))
            .await
    }

    /// Whether generation can work at all (false for the disabled backend).
    pub fn backend_enabled(&self) -> bool {
        self.generator.is_enabled()
    }

    /// Send a tiny fixed prompt and require any answer within the timeout.
    pub async fn check_backend(&self) -> Result<()> {
        self.invoke(&prompt::health_context()).await.map(|_| ())
    }

    async fn invoke(&self, context: &PromptContext) -> Result<String> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.generator.invoke(context))
                .await
                .map_err(|_| {
                    PipelineError::GenerationTimeout(format!("no answer within {:?}", limit))
                })?,
            None => self.generator.invoke(context).await,
        }
    }

    async fn run(&self, context: PromptContext) -> Result<String> {
        tracing::debug!(
            model = self.generator.model_name(),
            prompt_sha256 = %context.fingerprint(),
            prompt_chars = context.prompt.len(),
            "invoking text generator"
        );

        let raw = self.invoke(&context).await?;

        let source = prompt::extract_code_block(&raw);
        if source.trim().is_empty() {
            return Err(PipelineError::GenerationBackend(
                "Test generation failed or returned empty result".to_string(),
            ));
        }
        Ok(source)
    }
}
