//! In-memory [`ProductStore`] implementation for tests and demos.
//!
//! Uses a `BTreeMap` behind `std::sync::RwLock`. Full-text matching
//! requires every term to equal a word of the name, brand, or category
//! (the last term may be a prefix for suggestions), ranked by how many
//! fields matched. Every store access and applied
//! update is recorded so callers can assert on traffic.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{NewProduct, Product, Suggestion};

use super::{DerivedUpdate, Predicate, ProductStore};

/// In-memory store for testing.
#[derive(Default)]
pub struct InMemoryStore {
    products: RwLock<BTreeMap<i64, Product>>,
    updates: Mutex<Vec<(i64, DerivedUpdate)>>,
    reads: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a product row as-is, derived fields included.
    pub fn insert(&self, product: Product) {
        self.products.write().unwrap().insert(product.id, product);
    }

    pub fn get(&self, id: i64) -> Option<Product> {
        self.products.read().unwrap().get(&id).cloned()
    }

    /// Every successful `update_derived` call, in order.
    pub fn updates(&self) -> Vec<(i64, DerivedUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    /// Number of `find` and `suggest` calls served.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Make subsequent `update_derived` calls fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

fn match_rank(product: &Product, terms: &[String], prefix_last: bool) -> Option<usize> {
    let fields = [
        product.name.to_lowercase(),
        product.brand().unwrap_or_default().to_lowercase(),
        product.category.clone().unwrap_or_default().to_lowercase(),
    ];
    let mut rank = 0;
    for (i, term) in terms.iter().enumerate() {
        let is_prefix = prefix_last && i + 1 == terms.len();
        let hits = fields
            .iter()
            .filter(|f| {
                f.split(|c: char| !c.is_alphanumeric())
                    .any(|word| if is_prefix { word.starts_with(term.as_str()) } else { word == term })
            })
            .count();
        if hits == 0 {
            return None;
        }
        rank += hits;
    }
    Some(rank)
}

impl InMemoryStore {
    fn ranked(&self, terms: &[String], prefix_last: bool) -> Vec<Product> {
        let terms: Vec<String> = terms.iter().filter(|t| !t.is_empty()).cloned().collect();
        if terms.is_empty() {
            return Vec::new();
        }
        let products = self.products.read().unwrap();
        let mut hits: Vec<(usize, &Product)> = products
            .values()
            .filter_map(|p| match_rank(p, &terms, prefix_last).map(|r| (r, p)))
            .collect();
        // Stable sort keeps id order among equal ranks.
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        hits.into_iter().map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn find(&self, predicate: &Predicate) -> Result<Option<Product>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let found = match predicate {
            Predicate::Id(id) => self.get(*id),
            Predicate::Barcode(barcode) => self
                .products
                .read()
                .unwrap()
                .values()
                .find(|p| p.barcode.as_deref() == Some(barcode.as_str()))
                .cloned(),
            Predicate::FullText(terms) => self.ranked(terms, false).into_iter().next(),
        };
        Ok(found)
    }

    async fn suggest(&self, terms: &[String], limit: i64) -> Result<Vec<Suggestion>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .ranked(terms, true)
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|p| Suggestion {
                id: p.id,
                brand: p.brand().map(str::to_string),
                name: p.name,
                category: p.category.unwrap_or_default(),
            })
            .collect())
    }

    async fn update_derived(&self, id: i64, update: &DerivedUpdate) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("simulated write failure for product {}", id);
        }
        if update.is_empty() {
            return Ok(());
        }

        let mut products = self.products.write().unwrap();
        let Some(product) = products.get_mut(&id) else {
            bail!("product {} no longer exists", id);
        };
        if let Some(score) = &update.processed {
            product.processed = Some(score.clone());
        }
        if let Some(score) = &update.nutrition {
            product.nutrition = Some(score.clone());
        }
        if let Some(issues) = &update.health_issues {
            product.health_issues = Some(issues.clone());
        }
        if let Some(url) = &update.purchase_url {
            product.purchase_url = url.clone();
        }
        self.updates.lock().unwrap().push((id, update.clone()));
        Ok(())
    }

    async fn upsert_product(&self, product: &NewProduct) -> Result<()> {
        let mut products = self.products.write().unwrap();
        match products.get_mut(&product.id) {
            Some(existing) => {
                existing.barcode = product.barcode.clone();
                existing.name = product.name.clone();
                existing.brand_name = product.brand_name.clone();
                existing.brand_owner = product.brand_owner.clone();
                existing.ingredients = product.ingredients.clone();
                existing.nutrients = product.nutrients.clone();
                existing.category = product.category.clone();
            }
            None => {
                products.insert(product.id, product.clone().into());
            }
        }
        Ok(())
    }

    async fn upsert_products(&self, products: &[NewProduct]) -> Result<usize> {
        for product in products {
            self.upsert_product(product).await?;
        }
        Ok(products.len())
    }
}
