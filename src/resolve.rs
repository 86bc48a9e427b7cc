//! Product resolution by identifier, barcode, or free-text query.
//!
//! Maps a [`ProductRequest`] to a store [`Predicate`], loads the first
//! matching row, and hands it to the [`Enricher`]. Used by both the
//! `ic lookup` CLI command and `POST /v1/search-products`.

use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::enrich::{Enricher, EnrichmentResult};
use crate::error::LookupError;
use crate::oracle::{self, ScoringOracle};
use crate::store::{Predicate, ProductStore, SqliteProductStore};

/// Inbound lookup request. Exactly one field must be set.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ProductRequest {
    #[serde(default, alias = "fdc_id")]
    pub identifier: Option<i64>,
    #[serde(default, alias = "gtin_upc")]
    pub barcode: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

impl ProductRequest {
    pub fn by_id(id: i64) -> Self {
        Self {
            identifier: Some(id),
            ..Default::default()
        }
    }

    pub fn by_barcode(barcode: impl Into<String>) -> Self {
        Self {
            barcode: Some(barcode.into()),
            ..Default::default()
        }
    }

    pub fn by_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    /// Validate the request and build its store predicate.
    pub fn predicate(&self) -> Result<Predicate, LookupError> {
        let set = [
            self.identifier.is_some(),
            self.barcode.is_some(),
            self.query.is_some(),
        ]
        .iter()
        .filter(|s| **s)
        .count();

        match set {
            0 => {
                return Err(LookupError::InvalidRequest(
                    "one of identifier, barcode, or query is required".into(),
                ))
            }
            1 => {}
            _ => {
                return Err(LookupError::InvalidRequest(
                    "only one of identifier, barcode, or query may be set".into(),
                ))
            }
        }

        if let Some(id) = self.identifier {
            if id <= 0 {
                return Err(LookupError::InvalidRequest(format!(
                    "identifier must be positive, got {}",
                    id
                )));
            }
            return Ok(Predicate::Id(id));
        }

        if let Some(barcode) = &self.barcode {
            let barcode = barcode.trim();
            if barcode.is_empty() {
                return Err(LookupError::InvalidRequest("barcode must not be empty".into()));
            }
            return Ok(Predicate::Barcode(barcode.to_string()));
        }

        let query = self.query.as_deref().unwrap_or_default();
        if query.trim().is_empty() {
            return Err(LookupError::InvalidRequest("query must not be empty".into()));
        }
        Ok(Predicate::full_text(query))
    }
}

/// Resolves requests to enriched products.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn ProductStore>,
    enricher: Enricher,
}

impl Resolver {
    pub fn new(
        store: Arc<dyn ProductStore>,
        oracle: Arc<dyn ScoringOracle>,
        call_timeout: Duration,
    ) -> Self {
        let enricher = Enricher::new(store.clone(), oracle, call_timeout);
        Self { store, enricher }
    }

    /// Find the product named by `request` and fill its missing fields.
    ///
    /// Invalid requests are rejected before the store is touched.
    pub async fn resolve(&self, request: &ProductRequest) -> Result<EnrichmentResult, LookupError> {
        let predicate = request.predicate()?;
        debug!(?predicate, "resolving product");

        let product = self
            .store
            .find(&predicate)
            .await?
            .ok_or(LookupError::NotFound)?;

        Ok(self.enricher.enrich(product).await)
    }
}

/// CLI entry point for `ic lookup`; prints the resolved product as JSON.
pub async fn run_lookup(config: &Config, request: ProductRequest) -> Result<()> {
    let store = Arc::new(SqliteProductStore::connect(config).await?);
    let oracle = oracle::create_oracle(&config.oracle)?;
    let resolver = Resolver::new(store.clone(), oracle, config.oracle.call_timeout());

    let outcome = resolver.resolve(&request).await;
    store.close().await;

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result.response())?);
            Ok(())
        }
        Err(LookupError::Store(e)) => Err(e),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
