//! In-memory [`ArtifactStore`] implementation for tests and embedding.
//!
//! Uses a `HashMap` plus an insertion-order `Vec` behind one
//! `std::sync::RwLock`. Key allocation and insertion happen under the
//! same write guard, which is what makes `put` atomic.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{PipelineError, Result};
use crate::models::{Artifact, ArtifactSummary, Provenance};

use super::{new_key, ArtifactStore};

#[derive(Default)]
struct Inner {
    artifacts: HashMap<String, Artifact>,
    order: Vec<String>,
}

/// In-memory artifact store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts.
    ///
    /// Test and diagnostic helper only: a poisoned lock reads as empty here,
    /// while the [`ArtifactStore`] methods report it as a storage error.
    pub fn len(&self) -> usize {
        self.inner.read().map(|g| g.order.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> PipelineError {
    PipelineError::Storage("artifact store lock poisoned".to_string())
}

#[async_trait]
impl ArtifactStore for InMemoryStore {
    async fn put(&self, source_text: &str, provenance: &Provenance) -> Result<String> {
        let mut inner = self.inner.write().map_err(poisoned)?;

        if let Some(parent) = &provenance.parent_key {
            if !inner.artifacts.contains_key(parent) {
                return Err(PipelineError::NotFound(parent.clone()));
            }
        }

        let mut key = new_key();
        while inner.artifacts.contains_key(&key) {
            key = new_key();
        }

        inner.artifacts.insert(
            key.clone(),
            Artifact {
                key: key.clone(),
                source_text: source_text.to_string(),
                provenance: provenance.clone(),
                created_at: Utc::now(),
            },
        );
        inner.order.push(key.clone());
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Artifact> {
        let inner = self.inner.read().map_err(poisoned)?;
        inner
            .artifacts
            .get(key)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.artifacts.contains_key(key))
    }

    async fn list(&self) -> Result<Vec<ArtifactSummary>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .order
            .iter()
            .filter_map(|k| inner.artifacts.get(k))
            .map(Artifact::summary)
            .collect())
    }
}
