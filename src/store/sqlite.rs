//! SQLite-backed [`ProductStore`] implementation.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::{debug, warn};

use crate::config::Config;
use crate::db;
use crate::models::{HealthIssues, NewProduct, Product, PurchaseUrl, Score, Suggestion};

use super::{DerivedUpdate, Predicate, ProductStore};

const PRODUCT_COLUMNS: &str = "p.id, p.barcode, p.name, p.brand_name, p.brand_owner, \
    p.ingredients, p.nutrients, p.category, p.processed_score, p.processed_score_explanation, \
    p.nutrition_score, p.nutrition_score_explanation, p.health_issues, p.purchase_url, \
    p.url_checked_at";

/// SQLite implementation of the [`ProductStore`] trait.
///
/// Wraps a [`SqlitePool`]; each operation checks a connection out of the
/// pool and returns it when the statement completes or fails.
pub struct SqliteProductStore {
    pool: SqlitePool,
}

impl SqliteProductStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the pool configured in `[db]`.
    pub async fn connect(config: &Config) -> Result<Self> {
        Ok(Self::new(db::connect(config).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Render lowercase terms as an FTS5 expression of quoted strings joined by
/// implicit AND. Returns `None` when there is nothing to match.
pub(crate) fn fts_expression(terms: &[String], prefix_last: bool) -> Option<String> {
    let quoted: Vec<String> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();

    if quoted.is_empty() {
        return None;
    }

    let mut expr = quoted.join(" ");
    if prefix_last {
        expr.push('*');
    }
    Some(expr)
}

/// Decode a product row. A column whose stored type does not match its
/// schema is an error, not a panic.
fn row_to_product(row: &SqliteRow) -> Result<Product> {
    let id: i64 = row.try_get("id")?;

    let processed = stored_score(
        row.try_get("processed_score")?,
        row.try_get("processed_score_explanation")?,
    );
    let nutrition = stored_score(
        row.try_get("nutrition_score")?,
        row.try_get("nutrition_score_explanation")?,
    );

    let health_json: Option<String> = row.try_get("health_issues")?;
    let health_issues = health_json.and_then(|json| {
        match serde_json::from_str::<HealthIssues>(&json) {
            Ok(issues) => Some(issues),
            Err(e) => {
                warn!(product_id = id, error = %e, "stored health_issues is not valid JSON; treating as missing");
                None
            }
        }
    });

    let url: Option<String> = row.try_get("purchase_url")?;
    let checked_at: Option<i64> = row.try_get("url_checked_at")?;
    let purchase_url = match (checked_at, url) {
        (_, Some(url)) => PurchaseUrl::Found(url),
        (Some(_), None) => PurchaseUrl::NotFound,
        (None, None) => PurchaseUrl::Unattempted,
    };

    Ok(Product {
        id,
        barcode: row.try_get("barcode")?,
        name: row.try_get("name")?,
        brand_name: row.try_get("brand_name")?,
        brand_owner: row.try_get("brand_owner")?,
        ingredients: row.try_get("ingredients")?,
        nutrients: row.try_get("nutrients")?,
        category: row.try_get("category")?,
        processed,
        nutrition,
        health_issues,
        purchase_url,
    })
}

fn row_to_suggestion(row: &SqliteRow) -> Result<Suggestion> {
    let brand_name: Option<String> = row.try_get("brand_name")?;
    let brand_owner: Option<String> = row.try_get("brand_owner")?;
    let category: Option<String> = row.try_get("category")?;
    Ok(Suggestion {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        brand: brand_name
            .filter(|b| !b.trim().is_empty())
            .or(brand_owner.filter(|b| !b.trim().is_empty())),
        category: category.unwrap_or_default(),
    })
}

/// Insert a product or refresh its raw columns only.
fn upsert_query(product: &NewProduct) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    sqlx::query(
        r#"
        INSERT INTO products (id, barcode, name, brand_name, brand_owner,
                              ingredients, nutrients, category)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            barcode = excluded.barcode,
            name = excluded.name,
            brand_name = excluded.brand_name,
            brand_owner = excluded.brand_owner,
            ingredients = excluded.ingredients,
            nutrients = excluded.nutrients,
            category = excluded.category
        "#,
    )
    .bind(product.id)
    .bind(&product.barcode)
    .bind(&product.name)
    .bind(&product.brand_name)
    .bind(&product.brand_owner)
    .bind(&product.ingredients)
    .bind(&product.nutrients)
    .bind(&product.category)
}

// A non-null score column is authoritative even if its explanation is
// missing; only the pipeline writes these columns.
fn stored_score(value: Option<i64>, explanation: Option<String>) -> Option<Score> {
    value.map(|v| Score::restore(v, explanation.unwrap_or_default()))
}

#[async_trait]
impl ProductStore for SqliteProductStore {
    async fn find(&self, predicate: &Predicate) -> Result<Option<Product>> {
        let row = match predicate {
            Predicate::Id(id) => {
                sqlx::query(&format!(
                    "SELECT {} FROM products p WHERE p.id = ?",
                    PRODUCT_COLUMNS
                ))
                .bind(*id)
                .fetch_optional(&self.pool)
                .await?
            }
            Predicate::Barcode(barcode) => {
                sqlx::query(&format!(
                    "SELECT {} FROM products p WHERE p.barcode = ?",
                    PRODUCT_COLUMNS
                ))
                .bind(barcode)
                .fetch_optional(&self.pool)
                .await?
            }
            Predicate::FullText(terms) => {
                let Some(expr) = fts_expression(terms, false) else {
                    return Ok(None);
                };
                sqlx::query(&format!(
                    "SELECT {} FROM products_fts JOIN products p ON p.id = products_fts.rowid \
                     WHERE products_fts MATCH ? ORDER BY bm25(products_fts) LIMIT 1",
                    PRODUCT_COLUMNS
                ))
                .bind(expr)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.as_ref().map(row_to_product).transpose()
    }

    async fn suggest(&self, terms: &[String], limit: i64) -> Result<Vec<Suggestion>> {
        let Some(expr) = fts_expression(terms, true) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            "SELECT p.id, p.name, p.brand_name, p.brand_owner, p.category \
             FROM products_fts JOIN products p ON p.id = products_fts.rowid \
             WHERE products_fts MATCH ? ORDER BY bm25(products_fts) LIMIT ?",
        )
        .bind(expr)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_suggestion).collect()
    }

    async fn update_derived(&self, id: i64, update: &DerivedUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let health_json = update
            .health_issues
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let checked_at = chrono::Utc::now().timestamp();

        let mut sets: Vec<&str> = Vec::new();
        if update.processed.is_some() {
            sets.push("processed_score = ?");
            sets.push("processed_score_explanation = ?");
        }
        if update.nutrition.is_some() {
            sets.push("nutrition_score = ?");
            sets.push("nutrition_score_explanation = ?");
        }
        if health_json.is_some() {
            sets.push("health_issues = ?");
        }
        if update.purchase_url.is_some() {
            sets.push("purchase_url = ?");
            sets.push("url_checked_at = ?");
        }

        // Column names come from the fixed list above; every value is bound.
        let sql = format!("UPDATE products SET {} WHERE id = ?", sets.join(", "));
        let mut query = sqlx::query(&sql);
        if let Some(score) = &update.processed {
            query = query.bind(score.value() as i64).bind(score.explanation());
        }
        if let Some(score) = &update.nutrition {
            query = query.bind(score.value() as i64).bind(score.explanation());
        }
        if let Some(json) = &health_json {
            query = query.bind(json);
        }
        if let Some(url) = &update.purchase_url {
            query = query.bind(url.url()).bind(checked_at);
        }
        query = query.bind(id);

        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            bail!("product {} no longer exists", id);
        }

        debug!(product_id = id, fields = ?update.fields(), "derived columns written");
        Ok(())
    }

    async fn upsert_product(&self, product: &NewProduct) -> Result<()> {
        upsert_query(product).execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert_products(&self, products: &[NewProduct]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for product in products {
            upsert_query(product)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to store product {}", product.id))?;
        }
        tx.commit().await?;
        Ok(products.len())
    }
}
