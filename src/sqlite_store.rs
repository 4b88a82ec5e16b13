//! SQLite-backed [`ArtifactStore`] implementation.
//!
//! Each artifact is one row of the `artifacts` table. The row's `key`
//! column is `UNIQUE`, so key allocation is settled by the database: a
//! colliding insert fails and is retried with a fresh key instead of
//! overwriting. No statement in this module updates or deletes a row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use suitegen_core::error::{PipelineError, Result};
use suitegen_core::models::{Artifact, ArtifactSummary, Provenance, SpecDigest};
use suitegen_core::store::{new_key, ArtifactStore};

/// Collision retries before `put` gives up. A v4 collision is not expected
/// to happen even once.
const MAX_KEY_ATTEMPTS: usize = 3;

/// SQLite implementation of the [`ArtifactStore`] trait.
pub struct SqliteArtifactStore {
    pool: SqlitePool,
}

impl SqliteArtifactStore {
    /// Wrap a pool whose schema has been created by
    /// [`migrate_pool`](crate::migrate::migrate_pool).
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// User-facing text for every database fault; details go to the log only.
pub const STORAGE_UNAVAILABLE: &str = "artifact storage is unavailable";

fn storage(err: impl std::fmt::Display) -> PipelineError {
    tracing::error!(error = %err, "artifact storage failure");
    PipelineError::Storage(STORAGE_UNAVAILABLE.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn row_to_artifact(row: &SqliteRow) -> Result<Artifact> {
    let digest_json: String = row.try_get("digest_json").map_err(storage)?;
    let digest: SpecDigest = serde_json::from_str(&digest_json).map_err(storage)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(storage)?;

    Ok(Artifact {
        key: row.try_get("key").map_err(storage)?,
        source_text: row.try_get("source_text").map_err(storage)?,
        provenance: Provenance {
            digest,
            feedback: row.try_get("feedback").map_err(storage)?,
            parent_key: row.try_get("parent_key").map_err(storage)?,
        },
        created_at,
    })
}

#[async_trait]
impl ArtifactStore for SqliteArtifactStore {
    async fn put(&self, source_text: &str, provenance: &Provenance) -> Result<String> {
        let digest_json = serde_json::to_string(&provenance.digest).map_err(storage)?;

        if let Some(parent) = &provenance.parent_key {
            if !self.exists(parent).await? {
                return Err(PipelineError::NotFound(parent.clone()));
            }
        }

        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = new_key();
            let inserted = sqlx::query(
                r#"
                INSERT INTO artifacts (key, source_text, api_title, digest_json,
                                       feedback, parent_key, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&key)
            .bind(source_text)
            .bind(provenance.digest.title())
            .bind(&digest_json)
            .bind(provenance.feedback.as_deref())
            .bind(provenance.parent_key.as_deref())
            .bind(Utc::now())
            .execute(&self.pool)
            .await;

            match inserted {
                Ok(_) => return Ok(key),
                Err(e) if is_unique_violation(&e) => {
                    tracing::warn!(key = %key, "artifact key collision, allocating another");
                    continue;
                }
                Err(e) => return Err(storage(e)),
            }
        }

        Err(storage("could not allocate a unique artifact key"))
    }

    async fn get(&self, key: &str) -> Result<Artifact> {
        let row = sqlx::query(
            r#"
            SELECT key, source_text, digest_json, feedback, parent_key, created_at
            FROM artifacts WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        match row {
            Some(row) => row_to_artifact(&row),
            None => Err(PipelineError::NotFound(key.to_string())),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let found: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM artifacts WHERE key = ?")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(found)
    }

    async fn list(&self) -> Result<Vec<ArtifactSummary>> {
        let rows = sqlx::query(
            "SELECT key, api_title, parent_key, created_at FROM artifacts ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter()
            .map(|row| {
                Ok(ArtifactSummary {
                    key: row.try_get("key").map_err(storage)?,
                    api_title: row.try_get("api_title").map_err(storage)?,
                    parent_key: row.try_get("parent_key").map_err(storage)?,
                    created_at: row.try_get("created_at").map_err(storage)?,
                })
            })
            .collect()
    }
}
