use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema in the configured database. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an open pool. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Artifacts are append-only; `seq` keeps creation order stable even
    // when two rows share a timestamp.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifacts (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL UNIQUE,
            source_text TEXT NOT NULL,
            api_title TEXT NOT NULL,
            digest_json TEXT NOT NULL,
            feedback TEXT,
            parent_key TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (parent_key) REFERENCES artifacts(key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artifacts_parent_key ON artifacts(parent_key)")
        .execute(pool)
        .await?;

    Ok(())
}
