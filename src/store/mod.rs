//! Storage abstraction for products.
//!
//! The [`ProductStore`] trait covers every store operation the resolution
//! router, enrichment pipeline, autocomplete, and import need, so the
//! pipeline can run against SQLite in production and an in-memory store in
//! tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{HealthIssues, NewProduct, Product, PurchaseUrl, Score, Suggestion};

pub use memory::InMemoryStore;
pub use sqlite::SqliteProductStore;

/// Store-query condition derived from the caller's identifier kind.
///
/// Values are always bound as query parameters, never spliced into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Exact match on the product identifier.
    Id(i64),
    /// Exact match on the barcode.
    Barcode(String),
    /// Relevance-ranked full-text match on the given lowercase terms.
    FullText(Vec<String>),
}

impl Predicate {
    /// Case-normalize and tokenize a free-text query.
    pub fn full_text(query: &str) -> Self {
        Predicate::FullText(normalize_terms(query))
    }
}

pub fn normalize_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect()
}

/// Columns computed by one enrichment pass, to be written back together.
///
/// Only `Some` fields are written; `purchase_url` is never `Unattempted`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedUpdate {
    pub processed: Option<Score>,
    pub nutrition: Option<Score>,
    pub health_issues: Option<HealthIssues>,
    pub purchase_url: Option<PurchaseUrl>,
}

impl DerivedUpdate {
    pub fn is_empty(&self) -> bool {
        self.processed.is_none()
            && self.nutrition.is_none()
            && self.health_issues.is_none()
            && self.purchase_url.is_none()
    }

    /// Field names covered by this update, in a fixed order.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.processed.is_some() {
            fields.push("processed_score");
        }
        if self.nutrition.is_some() {
            fields.push("nutrition_score");
        }
        if self.health_issues.is_some() {
            fields.push("health_issues");
        }
        if self.purchase_url.is_some() {
            fields.push("url");
        }
        fields
    }
}

/// Abstract product store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find`](ProductStore::find) | First row matching a predicate |
/// | [`suggest`](ProductStore::suggest) | Top-N full-text matches for autocomplete |
/// | [`update_derived`](ProductStore::update_derived) | Partial write of derived columns |
/// | [`upsert_product`](ProductStore::upsert_product) | Insert or refresh raw columns |
/// | [`upsert_products`](ProductStore::upsert_products) | All-or-nothing batch of upserts |
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Return the first (for full text: most relevant) product matching
    /// `predicate`, or `None`.
    async fn find(&self, predicate: &Predicate) -> Result<Option<Product>>;

    /// Return up to `limit` suggestions for the given terms; the last term
    /// matches as a prefix.
    async fn suggest(&self, terms: &[String], limit: i64) -> Result<Vec<Suggestion>>;

    /// Write exactly the columns present in `update` for product `id`.
    async fn update_derived(&self, id: i64, update: &DerivedUpdate) -> Result<()>;

    /// Insert a product or refresh its raw columns, leaving derived columns
    /// as they are.
    async fn upsert_product(&self, product: &NewProduct) -> Result<()>;

    /// Upsert every product, or none of them if any write fails.
    async fn upsert_products(&self, products: &[NewProduct]) -> Result<usize>;
}
