//! Artifact storage abstraction.
//!
//! The [`ArtifactStore`] trait is the key-addressed blob store that holds
//! generated test suites. It is append-only: every `put` allocates a fresh
//! key and nothing in the trait overwrites or deletes an artifact.
//!
//! Implementations must be `Send + Sync` and must allocate keys atomically,
//! so concurrent `put` calls never hand out the same key.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Artifact, ArtifactSummary, Provenance};

/// Allocates a new opaque artifact key.
///
/// Keys are random v4 UUIDs and never derived from user input.
pub fn new_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Append-only storage for generated artifacts.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`put`](ArtifactStore::put) | Store source text under a fresh key |
/// | [`get`](ArtifactStore::get) | Fetch an artifact by key |
/// | [`exists`](ArtifactStore::exists) | Check whether a key is stored |
/// | [`list`](ArtifactStore::list) | List artifacts in creation order |
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `source_text` and return its newly allocated key.
    ///
    /// Fails with `NotFound` if `provenance.parent_key` names an artifact
    /// that is not stored.
    async fn put(&self, source_text: &str, provenance: &Provenance) -> Result<String>;

    /// Fetch the artifact stored under `key`, or fail with `NotFound`.
    async fn get(&self, key: &str) -> Result<Artifact>;

    /// Whether an artifact is stored under `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Summaries of all stored artifacts, oldest first.
    async fn list(&self) -> Result<Vec<ArtifactSummary>>;
}
