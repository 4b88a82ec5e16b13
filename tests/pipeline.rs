//! Pipeline tests for the session controller.
//!
//! Drive generate / regenerate through the real controller, engine and
//! in-memory store with deterministic stub generators in place of a model.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use suitegen::backend::TextGenerator;
use suitegen::controller::{RegenerateRequest, SessionController};
use suitegen::engine::GenerationEngine;
use suitegen_core::digest::DigestPolicy;
use suitegen_core::error::{PipelineError, Result};
use suitegen_core::models::{ApiDescription, SpecFormat};
use suitegen_core::prompt::PromptContext;
use suitegen_core::store::memory::InMemoryStore;
use suitegen_core::store::ArtifactStore;

// ─── Stub generators ────────────────────────────────────────────────

/// Answers every call with a fixed text and records the contexts it saw.
struct FixedGenerator {
    reply: String,
    calls: AtomicUsize,
    seen: Mutex<Vec<PromptContext>>,
}

impl FixedGenerator {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TextGenerator for FixedGenerator {
    fn model_name(&self) -> &str {
        "fixed"
    }

    async fn invoke(&self, context: &PromptContext) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(context.clone());
        Ok(self.reply.clone())
    }
}

/// Fails every call with the given error.
struct FailingGenerator(PipelineError);

#[async_trait]
impl TextGenerator for FailingGenerator {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn invoke(&self, _context: &PromptContext) -> Result<String> {
        Err(self.0.clone())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

const THREE_ENDPOINTS: &str = r#"{
  "openapi": "3.0.0",
  "info": { "title": "Pet Store API", "version": "1.0.0" },
  "paths": {
    "/pets": {
      "get": { "summary": "List pets", "responses": { "200": {} } },
      "post": { "summary": "Create pet", "responses": { "201": {} } }
    },
    "/pets/{petId}": {
      "get": { "summary": "Show pet", "responses": { "200": {}, "404": {} } }
    }
  }
}"#;

fn petstore() -> ApiDescription {
    ApiDescription::new(THREE_ENDPOINTS, SpecFormat::Json)
}

fn controller(
    store: Arc<InMemoryStore>,
    generator: Arc<dyn TextGenerator>,
) -> SessionController {
    SessionController::new(store, GenerationEngine::new(generator), DigestPolicy::strict())
}

async fn key_set(store: &InMemoryStore) -> HashSet<String> {
    store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.key)
        .collect()
}

// ─── Generate ───────────────────────────────────────────────────────

#[tokio::test]
async fn generate_stores_a_fresh_artifact() {
    let store = Arc::new(InMemoryStore::new());
    let ctl = controller(store.clone(), FixedGenerator::new("class PetStoreApiTest {}"));

    let result = ctl.handle_generate(petstore()).await.unwrap();

    assert_eq!(result.endpoints_count, 3);
    assert_eq!(result.api_title, "Pet Store API");
    assert_eq!(result.source_text, "class PetStoreApiTest {}");
    assert_eq!(result.parent_key, None);

    let stored = store.get(&result.key).await.unwrap();
    assert_eq!(stored.source_text, result.source_text);
    assert_eq!(stored.provenance.digest.endpoint_count(), 3);
    assert_eq!(stored.provenance.feedback, None);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn retried_generate_adds_an_independent_artifact() {
    let store = Arc::new(InMemoryStore::new());
    let ctl = controller(store.clone(), FixedGenerator::new("class T {}"));

    let first = ctl.handle_generate(petstore()).await.unwrap();
    let second = ctl.handle_generate(petstore()).await.unwrap();

    assert_ne!(first.key, second.key);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn malformed_description_fails_before_generation() {
    let store = Arc::new(InMemoryStore::new());
    let generator = FixedGenerator::new("unused");
    let ctl = controller(store.clone(), generator.clone());

    let err = ctl
        .handle_generate(ApiDescription::new("{ not json", SpecFormat::Json))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::MalformedSpec(_)));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn empty_description_rejected_by_strict_policy() {
    let store = Arc::new(InMemoryStore::new());
    let ctl = controller(store.clone(), FixedGenerator::new("unused"));

    let err = ctl
        .handle_generate(ApiDescription::new(r#"{"paths": {}}"#, SpecFormat::Json))
        .await
        .unwrap_err();

    assert_eq!(err, PipelineError::EmptySpec);
    assert!(store.is_empty());
}

#[tokio::test]
async fn generation_failure_leaves_store_unchanged() {
    let store = Arc::new(InMemoryStore::new());
    let seed = controller(store.clone(), FixedGenerator::new("class Seed {}"));
    let seeded = seed.handle_generate(petstore()).await.unwrap();
    let before = key_set(&store).await;

    for failure in [
        PipelineError::GenerationTimeout("30s".into()),
        PipelineError::GenerationBackend("503".into()),
    ] {
        let ctl = controller(store.clone(), Arc::new(FailingGenerator(failure.clone())));

        let err = ctl.handle_generate(petstore()).await.unwrap_err();
        assert_eq!(err, failure);

        let err = ctl
            .handle_regenerate(RegenerateRequest::new(seeded.key.clone(), "more"))
            .await
            .unwrap_err();
        assert_eq!(err, failure);

        assert_eq!(key_set(&store).await, before);
    }
}

// ─── Regenerate ─────────────────────────────────────────────────────

#[tokio::test]
async fn regenerate_unknown_key_is_not_found() {
    let store = Arc::new(InMemoryStore::new());
    let generator = FixedGenerator::new("unused");
    let ctl = controller(store.clone(), generator.clone());

    let err = ctl
        .handle_regenerate(RegenerateRequest::new("no-such-key", "fix status codes"))
        .await
        .unwrap_err();

    assert_eq!(err, PipelineError::NotFound("no-such-key".to_string()));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn regenerate_with_empty_feedback_is_invalid() {
    let store = Arc::new(InMemoryStore::new());
    let ctl = controller(store.clone(), FixedGenerator::new("class T {}"));
    let first = ctl.handle_generate(petstore()).await.unwrap();

    for feedback in ["", "   \n"] {
        let err = ctl
            .handle_regenerate(RegenerateRequest::new(first.key.clone(), feedback))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
    }
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn regenerate_extends_the_chain() {
    let store = Arc::new(InMemoryStore::new());
    let initial = controller(store.clone(), FixedGenerator::new("class Original {}"));
    let first = initial.handle_generate(petstore()).await.unwrap();

    let updater = FixedGenerator::new("// updated");
    let ctl = controller(store.clone(), updater.clone());
    let result = ctl
        .handle_regenerate(RegenerateRequest::new(first.key.clone(), "add auth header test"))
        .await
        .unwrap();

    assert_ne!(result.key, first.key);
    assert_eq!(result.parent_key.as_deref(), Some(first.key.as_str()));
    assert_eq!(result.endpoints_count, 3);

    let stored = store.get(&result.key).await.unwrap();
    assert_eq!(stored.source_text, "// updated");
    assert_eq!(stored.provenance.parent_key.as_deref(), Some(first.key.as_str()));
    assert_eq!(stored.provenance.feedback.as_deref(), Some("add auth header test"));
    assert_eq!(stored.provenance.digest, store.get(&first.key).await.unwrap().provenance.digest);

    // The prior artifact is untouched.
    assert_eq!(
        store.get(&first.key).await.unwrap().source_text,
        "class Original {}"
    );

    // Prior text and feedback reached the backend verbatim.
    let seen = updater.seen.lock().unwrap();
    assert!(seen[0].prompt.contains("class Original {}"));
    assert!(seen[0].prompt.contains("add auth header test"));
}

#[tokio::test]
async fn feedback_is_not_trimmed() {
    let store = Arc::new(InMemoryStore::new());
    let ctl = controller(store.clone(), FixedGenerator::new("class T {}"));
    let first = ctl.handle_generate(petstore()).await.unwrap();

    let feedback = "  cover 404 for /pets/{petId}\n";
    let result = ctl
        .handle_regenerate(RegenerateRequest::new(first.key, feedback))
        .await
        .unwrap();

    assert_eq!(result.feedback.as_deref(), Some(feedback));
}

#[tokio::test]
async fn lineage_walks_back_to_the_root() {
    let store = Arc::new(InMemoryStore::new());
    let ctl = controller(store.clone(), FixedGenerator::new("class T {}"));

    let a = ctl.handle_generate(petstore()).await.unwrap();
    let b = ctl
        .handle_regenerate(RegenerateRequest::new(a.key.clone(), "one"))
        .await
        .unwrap();
    let c = ctl
        .handle_regenerate(RegenerateRequest::new(b.key.clone(), "two"))
        .await
        .unwrap();

    let chain: Vec<String> = ctl
        .lineage(&c.key)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.key)
        .collect();
    assert_eq!(chain, vec![c.key, b.key, a.key]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_regenerations_get_distinct_keys() {
    let store = Arc::new(InMemoryStore::new());
    let ctl = Arc::new(controller(store.clone(), FixedGenerator::new("class T {}")));
    let root = ctl.handle_generate(petstore()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let ctl = ctl.clone();
        let key = root.key.clone();
        handles.push(tokio::spawn(async move {
            ctl.handle_regenerate(RegenerateRequest::new(key, format!("variant {}", i)))
                .await
                .unwrap()
        }));
    }

    let mut keys = HashSet::new();
    for h in handles {
        let result = h.await.unwrap();
        assert_eq!(result.parent_key.as_deref(), Some(root.key.as_str()));
        keys.insert(result.key);
    }
    assert_eq!(keys.len(), 16);
    assert_eq!(store.len(), 17);
}
