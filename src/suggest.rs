//! Autocomplete suggestions.
//!
//! A read-only prefix search over product names, brands, and categories.
//! No enrichment happens here.

use anyhow::Result;
use tracing::warn;

use crate::config::{Config, SuggestConfig};
use crate::models::Suggestion;
use crate::store::{normalize_terms, ProductStore, SqliteProductStore};

/// Suggest up to `config.limit` products for a partial query.
///
/// Queries shorter than `config.min_query_len` return nothing without
/// touching the store. Store errors are logged and yield an empty list.
pub async fn suggest(store: &dyn ProductStore, config: &SuggestConfig, query: &str) -> Vec<Suggestion> {
    let query = query.trim();
    if query.chars().count() < config.min_query_len {
        return Vec::new();
    }

    match store.suggest(&normalize_terms(query), config.limit).await {
        Ok(suggestions) => suggestions,
        Err(e) => {
            warn!(query, error = %e, "autocomplete lookup failed");
            Vec::new()
        }
    }
}

/// CLI entry point for `ic suggest`; prints suggestions as JSON.
pub async fn run_suggest(config: &Config, query: &str) -> Result<()> {
    let store = SqliteProductStore::connect(config).await?;
    let suggestions = suggest(&store, &config.suggest, query).await;
    store.close().await;

    println!("{}", serde_json::to_string_pretty(&suggestions)?);
    Ok(())
}
