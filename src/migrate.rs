use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = migrate_pool(&pool).await;
    pool.close().await;
    result
}

/// Create the schema on an already-open pool. Safe to run repeatedly.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Raw columns are written by ingestion; the nullable scored columns
    // are filled at most once by the enrichment pipeline.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY,
            barcode TEXT UNIQUE,
            name TEXT NOT NULL,
            brand_name TEXT,
            brand_owner TEXT,
            ingredients TEXT NOT NULL DEFAULT '',
            nutrients TEXT NOT NULL DEFAULT '',
            category TEXT,
            processed_score INTEGER,
            processed_score_explanation TEXT,
            nutrition_score INTEGER,
            nutrition_score_explanation TEXT,
            health_issues TEXT,
            purchase_url TEXT,
            url_checked_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='products_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query("CREATE VIRTUAL TABLE products_fts USING fts5(name, brand, category)")
            .execute(pool)
            .await?;
    }

    // Keep the index in step with the descriptive columns only; scored
    // column updates must not touch it.
    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS products_fts_insert AFTER INSERT ON products BEGIN
            INSERT INTO products_fts (rowid, name, brand, category)
            VALUES (new.id, new.name, COALESCE(new.brand_name, new.brand_owner, ''), COALESCE(new.category, ''));
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS products_fts_delete AFTER DELETE ON products BEGIN
            DELETE FROM products_fts WHERE rowid = old.id;
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS products_fts_update
        AFTER UPDATE OF name, brand_name, brand_owner, category ON products BEGIN
            DELETE FROM products_fts WHERE rowid = old.id;
            INSERT INTO products_fts (rowid, name, brand, category)
            VALUES (new.id, new.name, COALESCE(new.brand_name, new.brand_owner, ''), COALESCE(new.category, ''));
        END
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
