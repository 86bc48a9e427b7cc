//! Bulk product ingestion from JSON Lines.
//!
//! Each non-blank line is one [`NewProduct`] object. The whole file is
//! parsed first and then written in one batch; a malformed line or a failed
//! write leaves the store as it was.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::models::NewProduct;
use crate::store::{ProductStore, SqliteProductStore};

/// Parse JSON Lines product records, reporting the 1-based line of any
/// malformed entry.
pub fn parse_products(content: &str) -> Result<Vec<NewProduct>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<NewProduct>(line)
                .with_context(|| format!("line {}: invalid product record", i + 1))
        })
        .collect()
}

/// Upsert every product in `path`; returns how many were written.
pub async fn import_file(store: &dyn ProductStore, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    let products = parse_products(&content)?;

    let count = store.upsert_products(&products).await?;

    info!(count, path = %path.display(), "import complete");
    Ok(count)
}

/// CLI entry point for `ic import`.
pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let store = SqliteProductStore::connect(config).await?;
    let result = import_file(&store, path).await;
    store.close().await;

    let count = result?;
    println!("import {}", path.display());
    println!("  imported products: {}", count);
    println!("ok");
    Ok(())
}
