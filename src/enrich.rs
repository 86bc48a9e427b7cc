//! Fill-on-read enrichment pipeline.
//!
//! Given a stored product, [`Enricher::enrich`] works out which derived
//! fields are still missing, asks the oracle for exactly those (concurrently,
//! each under its own timeout), writes back whatever was computed in a single
//! partial update, and returns the merged product.
//!
//! ```text
//!   stored row ──▶ pending set ──▶ oracle fan-out (0–4 calls, joined)
//!                                        │
//!        merged result ◀── merge ◀───────┘
//!              │
//!              └──▶ best-effort partial UPDATE (only computed columns)
//! ```
//!
//! Failures never escape: an oracle error leaves that one field empty and a
//! failed write only costs durability. Fields already stored are adopted
//! as-is and never recomputed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::models::{Product, ProductResponse, PurchaseUrl};
use crate::oracle::{OracleError, ScoringOracle};
use crate::store::{DerivedUpdate, ProductStore};

/// One of the four lazily computed product attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedField {
    ProcessedScore,
    NutritionScore,
    HealthIssues,
    PurchaseUrl,
}

impl DerivedField {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivedField::ProcessedScore => "processed_score",
            DerivedField::NutritionScore => "nutrition_score",
            DerivedField::HealthIssues => "health_issues",
            DerivedField::PurchaseUrl => "url",
        }
    }
}

/// What happened to the write-back of computed fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Nothing was computed, so nothing was written.
    Skipped,
    Persisted,
    /// The update failed; the computed values exist only in this result.
    Failed,
}

/// Outcome of one enrichment pass.
#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    /// Stored fields merged with the ones computed during this pass.
    pub product: Product,
    /// Fields computed during this pass.
    pub computed: Vec<DerivedField>,
    /// Fields whose oracle call failed and remain empty.
    pub failed: Vec<(DerivedField, OracleError)>,
    pub write: WriteOutcome,
}

impl EnrichmentResult {
    pub fn response(&self) -> ProductResponse {
        ProductResponse::from(&self.product)
    }
}

/// Runs the enrichment pipeline against a store and an oracle.
#[derive(Clone)]
pub struct Enricher {
    store: Arc<dyn ProductStore>,
    oracle: Arc<dyn ScoringOracle>,
    call_timeout: Duration,
}

impl Enricher {
    pub fn new(
        store: Arc<dyn ProductStore>,
        oracle: Arc<dyn ScoringOracle>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            oracle,
            call_timeout,
        }
    }

    /// Fill the missing derived fields of `product`.
    ///
    /// Always returns a result for a found row; never fails.
    pub async fn enrich(&self, product: Product) -> EnrichmentResult {
        let id = product.id;
        let pending_processed = product.processed.is_none();
        let pending_nutrition = product.nutrition.is_none();
        let pending_health = product.health_issues.is_none();
        let pending_url = product.purchase_url.is_unattempted();

        if !(pending_processed || pending_nutrition || pending_health || pending_url) {
            debug!(product_id = id, "all derived fields present");
            return EnrichmentResult {
                product,
                computed: Vec::new(),
                failed: Vec::new(),
                write: WriteOutcome::Skipped,
            };
        }

        debug!(
            product_id = id,
            processed = pending_processed,
            nutrition = pending_nutrition,
            health = pending_health,
            url = pending_url,
            oracle = self.oracle.name(),
            "enriching product"
        );

        let brand = product.brand();

        // Each call reads only the loaded row, so they run side by side;
        // the join waits for every attempted call before merging.
        let (processed, nutrition, health, url) = tokio::join!(
            self.attempt(pending_processed, self.oracle.score_processing(&product.ingredients)),
            self.attempt(pending_nutrition, self.oracle.score_nutrition(&product.nutrients)),
            self.attempt(pending_health, self.oracle.find_health_issues(&product.ingredients)),
            self.attempt(pending_url, async {
                match self.oracle.find_purchase_url(&product.name, brand).await? {
                    PurchaseUrl::Unattempted => Err(OracleError::Validation(
                        "purchase lookup reported no attempt".into(),
                    )),
                    answered => Ok(answered),
                }
            }),
        );

        let mut merged = product;
        let mut update = DerivedUpdate::default();
        let mut outcome = Outcomes::new(id);

        if let Some(score) = outcome.record(DerivedField::ProcessedScore, processed) {
            merged.processed = Some(score.clone());
            update.processed = Some(score);
        }
        if let Some(score) = outcome.record(DerivedField::NutritionScore, nutrition) {
            merged.nutrition = Some(score.clone());
            update.nutrition = Some(score);
        }
        if let Some(issues) = outcome.record(DerivedField::HealthIssues, health) {
            merged.health_issues = Some(issues.clone());
            update.health_issues = Some(issues);
        }
        if let Some(url) = outcome.record(DerivedField::PurchaseUrl, url) {
            merged.purchase_url = url.clone();
            update.purchase_url = Some(url);
        }

        let write = if update.is_empty() {
            WriteOutcome::Skipped
        } else {
            match self.store.update_derived(id, &update).await {
                Ok(()) => {
                    info!(product_id = id, fields = ?update.fields(), "stored derived fields");
                    WriteOutcome::Persisted
                }
                Err(e) => {
                    warn!(
                        product_id = id,
                        fields = ?update.fields(),
                        error = %e,
                        "failed to store derived fields; returning unsaved values"
                    );
                    WriteOutcome::Failed
                }
            }
        };

        EnrichmentResult {
            product: merged,
            computed: outcome.computed,
            failed: outcome.failed,
            write,
        }
    }

    /// Run `call` under the per-call timeout if `pending`; `None` otherwise.
    async fn attempt<T, F>(&self, pending: bool, call: F) -> Option<Result<T, OracleError>>
    where
        F: Future<Output = Result<T, OracleError>>,
    {
        if !pending {
            return None;
        }
        Some(match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout),
        })
    }
}

/// Per-pass bookkeeping of computed and failed fields.
struct Outcomes {
    product_id: i64,
    computed: Vec<DerivedField>,
    failed: Vec<(DerivedField, OracleError)>,
}

impl Outcomes {
    fn new(product_id: i64) -> Self {
        Self {
            product_id,
            computed: Vec::new(),
            failed: Vec::new(),
        }
    }

    fn record<T>(&mut self, field: DerivedField, outcome: Option<Result<T, OracleError>>) -> Option<T> {
        match outcome? {
            Ok(value) => {
                self.computed.push(field);
                Some(value)
            }
            Err(e) => {
                warn!(
                    product_id = self.product_id,
                    field = field.as_str(),
                    error = %e,
                    "oracle call failed; field left empty"
                );
                self.failed.push((field, e));
                None
            }
        }
    }
}
