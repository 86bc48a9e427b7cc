//! Scoring oracle abstraction and implementations.
//!
//! Defines the [`ScoringOracle`] trait, one method per derived field, and
//! the concrete backends:
//! - **[`DisabledOracle`]**: every call fails with [`OracleError::Unavailable`].
//! - **[`HeuristicOracle`]**: processing score from [`heuristic_score`]; no other fields.
//! - **[`LlmOracle`]**: OpenAI-compatible chat completions with schema-checked replies.
//!
//! # Provider Selection
//!
//! Use [`create_oracle`] to instantiate the backend named in `[oracle]`:
//!
//! ```rust,no_run
//! # use informed_choice::config::OracleConfig;
//! # use informed_choice::oracle::create_oracle;
//! let config = OracleConfig::default(); // provider = "disabled"
//! let oracle = create_oracle(&config).unwrap();
//! assert_eq!(oracle.name(), "disabled");
//! ```
//!
//! # Failure Model
//!
//! Every call returns either a validated payload or an [`OracleError`]. The
//! enrichment pipeline treats all error variants the same way: the field
//! stays unresolved for this request.

pub mod llm;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::OracleConfig;
use crate::heuristic::heuristic_score;
use crate::models::{split_ingredients, HealthIssues, PurchaseUrl, Score};

pub use llm::LlmOracle;

/// Why a single oracle call produced no usable value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle call timed out")]
    Timeout,
    /// The reply could not be parsed into the expected shape.
    #[error("malformed oracle reply: {0}")]
    Malformed(String),
    /// The reply parsed but violated a value constraint.
    #[error("oracle reply failed validation: {0}")]
    Validation(String),
    #[error("oracle transport error: {0}")]
    Transport(String),
    /// The backend does not provide this field.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

/// External assessment capability, one independent call per derived field.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    /// Backend identifier used in logs (e.g. `"openai:gpt-4o-mini"`).
    fn name(&self) -> &str;

    /// Rate how processed a product is from its raw ingredient text.
    async fn score_processing(&self, ingredients: &str) -> Result<Score, OracleError>;

    /// Rate nutritional value from raw nutrition-facts text.
    async fn score_nutrition(&self, nutrients: &str) -> Result<Score, OracleError>;

    /// List evidence-backed health concerns per ingredient.
    async fn find_health_issues(&self, ingredients: &str) -> Result<HealthIssues, OracleError>;

    /// Look up where to buy the product. Returns [`PurchaseUrl::Found`] or
    /// [`PurchaseUrl::NotFound`], never `Unattempted`.
    async fn find_purchase_url(
        &self,
        name: &str,
        brand: Option<&str>,
    ) -> Result<PurchaseUrl, OracleError>;
}

/// Build the oracle named by `config.provider`.
pub fn create_oracle(config: &OracleConfig) -> Result<Arc<dyn ScoringOracle>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledOracle)),
        "heuristic" => Ok(Arc::new(HeuristicOracle)),
        "openai" => Ok(Arc::new(LlmOracle::new(config)?)),
        other => bail!("Unknown oracle provider: {}", other),
    }
}

/// Query text for a purchase lookup: brand qualifier only when present.
pub fn purchase_query(name: &str, brand: Option<&str>) -> String {
    match brand.map(str::trim).filter(|b| !b.is_empty()) {
        Some(brand) => format!("{} by {}", name.trim(), brand),
        None => name.trim().to_string(),
    }
}

/// Interpret a free-text purchase lookup answer.
///
/// An empty answer or the "No URL found" sentinel means the lookup ran and
/// found nothing. Anything else must be an absolute http(s) URL with a host.
pub fn normalize_purchase_url(raw: &str) -> Result<PurchaseUrl, OracleError> {
    let cleaned = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .trim_end_matches('.')
        .trim();

    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("no url found") {
        return Ok(PurchaseUrl::NotFound);
    }

    let parsed = reqwest::Url::parse(cleaned)
        .map_err(|e| OracleError::Validation(format!("not a URL ({}): {}", e, cleaned)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(OracleError::Validation(format!(
            "unsupported URL scheme: {}",
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(OracleError::Validation(format!("URL has no host: {}", cleaned)));
    }
    Ok(PurchaseUrl::Found(parsed.to_string()))
}

// ============ Disabled Oracle ============

/// Oracle used when `oracle.provider = "disabled"`.
pub struct DisabledOracle;

#[async_trait]
impl ScoringOracle for DisabledOracle {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn score_processing(&self, _ingredients: &str) -> Result<Score, OracleError> {
        Err(OracleError::Unavailable("oracle is disabled".into()))
    }

    async fn score_nutrition(&self, _nutrients: &str) -> Result<Score, OracleError> {
        Err(OracleError::Unavailable("oracle is disabled".into()))
    }

    async fn find_health_issues(&self, _ingredients: &str) -> Result<HealthIssues, OracleError> {
        Err(OracleError::Unavailable("oracle is disabled".into()))
    }

    async fn find_purchase_url(
        &self,
        _name: &str,
        _brand: Option<&str>,
    ) -> Result<PurchaseUrl, OracleError> {
        Err(OracleError::Unavailable("oracle is disabled".into()))
    }
}

// ============ Heuristic Oracle ============

/// Cost-free oracle: scores processing with the keyword heuristic and
/// provides nothing else.
pub struct HeuristicOracle;

#[async_trait]
impl ScoringOracle for HeuristicOracle {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn score_processing(&self, ingredients: &str) -> Result<Score, OracleError> {
        let (score, explanation) = heuristic_score(&split_ingredients(ingredients));
        Score::new(score as i64, explanation).map_err(|e| OracleError::Validation(e.to_string()))
    }

    async fn score_nutrition(&self, _nutrients: &str) -> Result<Score, OracleError> {
        Err(OracleError::Unavailable(
            "heuristic oracle does not score nutrition".into(),
        ))
    }

    async fn find_health_issues(&self, _ingredients: &str) -> Result<HealthIssues, OracleError> {
        Err(OracleError::Unavailable(
            "heuristic oracle does not assess health issues".into(),
        ))
    }

    async fn find_purchase_url(
        &self,
        _name: &str,
        _brand: Option<&str>,
    ) -> Result<PurchaseUrl, OracleError> {
        Err(OracleError::Unavailable(
            "heuristic oracle does not look up URLs".into(),
        ))
    }
}
