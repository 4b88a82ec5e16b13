//! Session controller: the generate / regenerate pipelines.
//!
//! Each call runs one sequential pipeline:
//!
//! ```text
//! Idle → Digesting → Generating → Storing → Done
//!            │            │           │
//!            └────────────┴───────────┴──→ Failed
//! ```
//!
//! Storing is the last step and the only one with a durable side effect,
//! so a failure (or a dropped request future) before it leaves the store
//! untouched. The controller holds no "current artifact" pointer; callers
//! pass the key they want to refine or download on every call.

use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use suitegen_core::digest::{self, DigestPolicy};
use suitegen_core::error::{PipelineError, Result};
use suitegen_core::models::{
    ApiDescription, Artifact, ArtifactSummary, GenerationResult, Provenance, SpecFormat,
};
use suitegen_core::store::ArtifactStore;

use crate::backend::TextGenerator;
use crate::config::Config;
use crate::engine::GenerationEngine;
use crate::sqlite_store::SqliteArtifactStore;
use crate::{db, migrate};

/// Pipeline stage of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Digesting,
    Generating,
    Storing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Digesting => "digesting",
            Stage::Generating => "generating",
            Stage::Storing => "storing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Stage tracker for one pipeline run; logs every transition.
struct Run {
    op: &'static str,
    stage: Stage,
}

impl Run {
    fn start(op: &'static str) -> Self {
        Self {
            op,
            stage: Stage::Idle,
        }
    }

    fn enter(&mut self, next: Stage) {
        tracing::debug!(op = self.op, from = %self.stage, to = %next, "pipeline transition");
        self.stage = next;
    }

    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::warn!(
                op = self.op,
                stage = %self.stage,
                code = e.code(),
                error = %e,
                "pipeline failed"
            );
            self.stage = Stage::Failed;
        }
        result
    }
}

/// Upload accepted by `generate`, validated before digesting.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Original filename of the upload; its extension declares the format.
    pub filename: Option<String>,
    /// Explicit format, overriding the extension.
    pub format: Option<SpecFormat>,
    pub content: Vec<u8>,
}

impl GenerateRequest {
    /// Validate the upload and turn it into an [`ApiDescription`].
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for an empty filename, an extension other than
    ///   `json`/`yaml`/`yml`, or empty content. A filename without any
    ///   extension is accepted and its format sniffed.
    /// - `MalformedSpec` for content that is not UTF-8.
    pub fn into_description(self) -> Result<ApiDescription> {
        let declared = match (&self.format, &self.filename) {
            (Some(format), _) => Some(*format),
            (None, Some(name)) if name.trim().is_empty() => {
                return Err(PipelineError::InvalidRequest("No file selected".to_string()))
            }
            // No extension at all leaves the format to sniffing.
            (None, Some(name)) if !name.contains('.') => None,
            (None, Some(name)) => Some(SpecFormat::from_filename(name).ok_or_else(|| {
                PipelineError::InvalidRequest(
                    "Invalid file type. Please upload JSON, YAML, or YML files.".to_string(),
                )
            })?),
            (None, None) => None,
        };

        if self.content.is_empty() {
            return Err(PipelineError::InvalidRequest("No file uploaded".to_string()));
        }

        let content = String::from_utf8(self.content).map_err(|_| {
            PipelineError::MalformedSpec("description is not valid UTF-8".to_string())
        })?;

        Ok(match declared {
            Some(format) => ApiDescription::new(content, format),
            None => ApiDescription::inferred(content),
        })
    }
}

/// Body of a regenerate request: `{ "filename": <key>, "suggestions": <feedback> }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegenerateRequest {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub suggestions: String,
}

impl RegenerateRequest {
    pub fn new(filename: impl Into<String>, suggestions: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            suggestions: suggestions.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.filename.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "Missing filename".to_string(),
            ));
        }
        if self.suggestions.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "Missing suggestions".to_string(),
            ));
        }
        Ok(())
    }
}

/// Orchestrates digesting, generation and storage.
pub struct SessionController {
    store: Arc<dyn ArtifactStore>,
    engine: GenerationEngine,
    policy: DigestPolicy,
}

impl SessionController {
    pub fn new(store: Arc<dyn ArtifactStore>, engine: GenerationEngine, policy: DigestPolicy) -> Self {
        Self {
            store,
            engine,
            policy,
        }
    }

    /// Open the configured SQLite store (creating the schema if needed)
    /// and wire it to `generator` with the configured timeout and policy.
    pub async fn from_config(
        config: &Config,
        generator: Arc<dyn TextGenerator>,
    ) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        let store = Arc::new(SqliteArtifactStore::new(pool));
        let engine = GenerationEngine::new(generator).with_timeout(config.generation.timeout());
        Ok(Self::new(store, engine, config.digest.policy()))
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn engine(&self) -> &GenerationEngine {
        &self.engine
    }

    /// Generate a first test suite from an uploaded description.
    pub async fn handle_generate(&self, description: ApiDescription) -> Result<GenerationResult> {
        let mut run = Run::start("generate");

        run.enter(Stage::Digesting);
        let digest = run.check(digest::digest(&description, self.policy))?;
        drop(description);
        tracing::debug!(
            title = digest.title(),
            endpoints = digest.endpoint_count(),
            digest_sha256 = %digest.fingerprint(),
            "digested API description"
        );

        run.enter(Stage::Generating);
        let source = run.check(self.engine.generate(&digest).await)?;

        run.enter(Stage::Storing);
        let provenance = Provenance::initial(digest);
        let key = run.check(self.store.put(&source, &provenance).await)?;

        run.enter(Stage::Done);
        tracing::info!(
            key = %key,
            title = provenance.digest.title(),
            endpoints = provenance.digest.endpoint_count(),
            "generated test suite"
        );

        Ok(GenerationResult {
            key,
            api_title: provenance.digest.title().to_string(),
            endpoints_count: provenance.digest.endpoint_count(),
            source_text: source,
            parent_key: None,
            feedback: None,
        })
    }

    /// Refine a stored artifact with free-text feedback.
    ///
    /// The digest comes from the prior artifact's provenance; the original
    /// upload is never re-read. The refined suite is stored under a new key
    /// whose `parent_key` is the prior key.
    pub async fn handle_regenerate(&self, request: RegenerateRequest) -> Result<GenerationResult> {
        let mut run = Run::start("regenerate");

        run.check(request.validate())?;
        let exists = run.check(self.store.exists(&request.filename).await)?;
        if !exists {
            return run.check(Err(PipelineError::NotFound(request.filename)));
        }
        let prior = run.check(self.store.get(&request.filename).await)?;

        run.enter(Stage::Digesting);
        let digest = prior.provenance.digest.clone();

        run.enter(Stage::Generating);
        let source = run.check(
            self.engine
                .regenerate(&digest, &prior.source_text, &request.suggestions)
                .await,
        )?;

        run.enter(Stage::Storing);
        let provenance = Provenance::refined(digest, request.suggestions, prior.key);
        let key = run.check(self.store.put(&source, &provenance).await)?;

        run.enter(Stage::Done);
        tracing::info!(
            key = %key,
            parent = provenance.parent_key.as_deref().unwrap_or_default(),
            title = provenance.digest.title(),
            "regenerated test suite"
        );

        Ok(GenerationResult {
            key,
            api_title: provenance.digest.title().to_string(),
            endpoints_count: provenance.digest.endpoint_count(),
            source_text: source,
            parent_key: provenance.parent_key,
            feedback: provenance.feedback,
        })
    }

    /// Fetch an artifact for download.
    pub async fn handle_download(&self, key: &str) -> Result<Artifact> {
        self.store.get(key).await
    }

    /// Summaries from `key` back to its root artifact, newest first.
    pub async fn lineage(&self, key: &str) -> Result<Vec<ArtifactSummary>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(key.to_string());

        while let Some(current) = next {
            if !seen.insert(current.clone()) {
                break;
            }
            let artifact = self.store.get(&current).await?;
            next = artifact.provenance.parent_key.clone();
            chain.push(artifact.summary());
        }
        Ok(chain)
    }
}

/// Caller-level retry policy wrapping a whole pipeline invocation.
///
/// Only retryable failures (backend timeouts and errors) are retried.
/// Each attempt that reaches Storing produces its own artifact.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Exponential backoff: base, 2×base, 4×base … capped at 32×base.
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }

    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        attempt,
                        retries = self.retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying pipeline"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_extension_declares_format() {
        let req = GenerateRequest {
            filename: Some("pets.yml".into()),
            format: None,
            content: b"{\"openapi\": \"3.0.0\"}".to_vec(),
        };
        assert_eq!(req.into_description().unwrap().format, SpecFormat::Yaml);
    }

    #[test]
    fn explicit_format_wins() {
        let req = GenerateRequest {
            filename: Some("pets.txt".into()),
            format: Some(SpecFormat::Json),
            content: b"{}".to_vec(),
        };
        assert_eq!(req.into_description().unwrap().format, SpecFormat::Json);
    }

    #[test]
    fn raw_body_is_sniffed() {
        let req = GenerateRequest {
            content: b"  {}".to_vec(),
            ..Default::default()
        };
        assert_eq!(req.into_description().unwrap().format, SpecFormat::Json);
    }

    #[test]
    fn extensionless_filename_is_sniffed() {
        let yaml = GenerateRequest {
            filename: Some("petstore".into()),
            content: b"openapi: 3.0.0\npaths: {}\n".to_vec(),
            ..Default::default()
        };
        assert_eq!(yaml.into_description().unwrap().format, SpecFormat::Yaml);

        let json = GenerateRequest {
            filename: Some("spec".into()),
            content: b"{\"paths\": {}}".to_vec(),
            ..Default::default()
        };
        assert_eq!(json.into_description().unwrap().format, SpecFormat::Json);
    }

    #[test]
    fn bad_uploads_rejected() {
        let missing = GenerateRequest::default().into_description().unwrap_err();
        assert_eq!(missing.code(), "invalid_request");

        let unnamed = GenerateRequest {
            filename: Some(" ".into()),
            content: b"{}".to_vec(),
            ..Default::default()
        };
        assert_eq!(unnamed.into_description().unwrap_err().code(), "invalid_request");

        let wrong_type = GenerateRequest {
            filename: Some("pets.xml".into()),
            content: b"<x/>".to_vec(),
            ..Default::default()
        };
        assert_eq!(wrong_type.into_description().unwrap_err().code(), "invalid_request");

        let binary = GenerateRequest {
            filename: Some("pets.json".into()),
            content: vec![0xff, 0xfe, 0x00],
            ..Default::default()
        };
        assert_eq!(binary.into_description().unwrap_err().code(), "malformed_spec");
    }

    #[test]
    fn regenerate_request_requires_both_fields() {
        assert!(RegenerateRequest::new("k", "").validate().is_err());
        assert!(RegenerateRequest::new("k", " \n\t").validate().is_err());
        assert!(RegenerateRequest::new("", "more tests").validate().is_err());
        assert!(RegenerateRequest::new("k", "more tests").validate().is_ok());
    }

    #[test]
    fn regenerate_request_missing_fields_default_empty() {
        let req: RegenerateRequest = serde_json::from_str(r#"{"filename": "k"}"#).unwrap();
        assert_eq!(req.suggestions, "");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10);
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(9), Duration::from_secs(32));
    }

    #[tokio::test]
    async fn retry_stops_on_non_retryable() {
        let policy = RetryPolicy {
            retries: 3,
            base_delay: Duration::from_millis(1),
        };
        let mut calls = 0;
        let result: Result<()> = policy
            .run(|| {
                calls += 1;
                async { Err(PipelineError::EmptySpec) }
            })
            .await;
        assert_eq!(result.unwrap_err(), PipelineError::EmptySpec);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retry_recovers_from_backend_errors() {
        let policy = RetryPolicy {
            retries: 3,
            base_delay: Duration::from_millis(1),
        };
        let mut calls = 0;
        let result = policy
            .run(|| {
                calls += 1;
                let n = calls;
                async move {
                    if n < 3 {
                        Err(PipelineError::GenerationBackend("503".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
    }
}
