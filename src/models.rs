//! Core data models used throughout InformedChoice.
//!
//! These types represent stored products, the derived assessments attached
//! to them, and the shapes returned to callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A product row as loaded from the store.
///
/// The four derived fields (`processed`, `nutrition`, `health_issues`,
/// `purchase_url`) start out empty and are filled at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub barcode: Option<String>,
    pub name: String,
    pub brand_name: Option<String>,
    pub brand_owner: Option<String>,
    /// Raw ingredient listing, comma or semicolon separated.
    pub ingredients: String,
    /// Raw nutrition-facts text.
    pub nutrients: String,
    pub category: Option<String>,
    pub processed: Option<Score>,
    pub nutrition: Option<Score>,
    pub health_issues: Option<HealthIssues>,
    pub purchase_url: PurchaseUrl,
}

impl Product {
    /// Display brand: the brand name, falling back to the brand owner.
    pub fn brand(&self) -> Option<&str> {
        non_empty(self.brand_name.as_deref()).or_else(|| non_empty(self.brand_owner.as_deref()))
    }

    pub fn ingredient_list(&self) -> Vec<String> {
        split_ingredients(&self.ingredients)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Split a raw ingredient listing on `,` or `;`, trimming each token and
/// dropping empty ones.
pub fn split_ingredients(raw: &str) -> Vec<String> {
    raw.trim()
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// A 1–5 assessment with its explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Score {
    value: u8,
    explanation: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoreError {
    #[error("score {0} is outside 1..=5")]
    OutOfRange(i64),
    #[error("score explanation is empty")]
    EmptyExplanation,
}

impl Score {
    pub fn new(value: i64, explanation: &str) -> Result<Self, ScoreError> {
        if !(1..=5).contains(&value) {
            return Err(ScoreError::OutOfRange(value));
        }
        let explanation = explanation.trim();
        if explanation.is_empty() {
            return Err(ScoreError::EmptyExplanation);
        }
        Ok(Self {
            value: value as u8,
            explanation: explanation.to_string(),
        })
    }

    /// Rebuild a score read back from storage without re-validating it.
    pub(crate) fn restore(value: i64, explanation: String) -> Self {
        Self {
            value: value.clamp(1, 5) as u8,
            explanation,
        }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }
}

/// Structured health findings, keyed by ingredient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HealthIssues {
    pub potential_health_issues: Vec<IngredientHealthIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientHealthIssue {
    pub ingredient: String,
    pub issues: Vec<HealthIssueDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthIssueDetail {
    pub issue: String,
    pub evidence: String,
    /// Sub-components of the ingredient the issue applies to.
    #[serde(default)]
    pub specific_components: Vec<String>,
}

/// Purchase link lookup state.
///
/// `NotFound` is terminal: a lookup that found nothing is not retried.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PurchaseUrl {
    #[default]
    Unattempted,
    NotFound,
    Found(String),
}

impl PurchaseUrl {
    pub fn url(&self) -> Option<&str> {
        match self {
            PurchaseUrl::Found(url) => Some(url),
            _ => None,
        }
    }

    pub fn is_unattempted(&self) -> bool {
        matches!(self, PurchaseUrl::Unattempted)
    }
}

/// Consolidated product record returned to callers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProductResponse {
    pub id: i64,
    pub name: String,
    pub brand: Option<String>,
    pub ingredients: Vec<String>,
    pub category: Option<String>,
    pub processed_score: Option<u8>,
    pub processed_score_explanation: Option<String>,
    pub nutrition_score: Option<u8>,
    pub nutrition_score_explanation: Option<String>,
    pub health_issues: Option<HealthIssues>,
    pub url: Option<String>,
}

impl From<&Product> for ProductResponse {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            brand: p.brand().map(str::to_string),
            ingredients: p.ingredient_list(),
            category: p.category.clone(),
            processed_score: p.processed.as_ref().map(Score::value),
            processed_score_explanation: p.processed.as_ref().map(|s| s.explanation().to_string()),
            nutrition_score: p.nutrition.as_ref().map(Score::value),
            nutrition_score_explanation: p.nutrition.as_ref().map(|s| s.explanation().to_string()),
            health_issues: p.health_issues.clone(),
            url: p.purchase_url.url().map(str::to_string),
        }
    }
}

/// Raw product as delivered by ingestion. Derived fields are never part of it.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NewProduct {
    pub id: i64,
    #[serde(default)]
    pub barcode: Option<String>,
    pub name: String,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub brand_owner: Option<String>,
    #[serde(default)]
    pub ingredients: String,
    #[serde(default)]
    pub nutrients: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl From<NewProduct> for Product {
    fn from(p: NewProduct) -> Self {
        Self {
            id: p.id,
            barcode: p.barcode,
            name: p.name,
            brand_name: p.brand_name,
            brand_owner: p.brand_owner,
            ingredients: p.ingredients,
            nutrients: p.nutrients,
            category: p.category,
            processed: None,
            nutrition: None,
            health_issues: None,
            purchase_url: PurchaseUrl::Unattempted,
        }
    }
}

/// Autocomplete entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Suggestion {
    pub id: i64,
    pub name: String,
    pub brand: Option<String>,
    pub category: String,
}
