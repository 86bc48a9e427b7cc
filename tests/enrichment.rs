use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use informed_choice::config::{Config, DbConfig, OracleConfig, ServerConfig, SuggestConfig};
use informed_choice::enrich::{DerivedField, WriteOutcome};
use informed_choice::error::LookupError;
use informed_choice::import::import_file;
use informed_choice::migrate::migrate_pool;
use informed_choice::models::{
    HealthIssueDetail, HealthIssues, IngredientHealthIssue, NewProduct, Product, PurchaseUrl,
    Score,
};
use informed_choice::oracle::{OracleError, ScoringOracle};
use informed_choice::resolve::{ProductRequest, Resolver};
use informed_choice::store::{
    DerivedUpdate, InMemoryStore, Predicate, ProductStore, SqliteProductStore,
};
use informed_choice::suggest::suggest;

// ============ Test oracle ============

/// Oracle that counts calls per field, records the text it was given, and
/// can be told to fail health lookups.
struct CountingOracle {
    processing: AtomicUsize,
    nutrition: AtomicUsize,
    health: AtomicUsize,
    url: AtomicUsize,
    fail_health: AtomicBool,
    url_answer: PurchaseUrl,
    /// Arguments per call: ingredient text, nutrient text, (name, brand).
    seen_ingredients: Mutex<Vec<String>>,
    seen_nutrients: Mutex<Vec<String>>,
    seen_purchase: Mutex<Vec<(String, Option<String>)>>,
}

impl CountingOracle {
    fn new() -> Self {
        Self::with_url(PurchaseUrl::Found("https://shop.example.com/p/42".into()))
    }

    fn with_url(url_answer: PurchaseUrl) -> Self {
        Self {
            processing: AtomicUsize::new(0),
            nutrition: AtomicUsize::new(0),
            health: AtomicUsize::new(0),
            url: AtomicUsize::new(0),
            fail_health: AtomicBool::new(false),
            url_answer,
            seen_ingredients: Mutex::new(Vec::new()),
            seen_nutrients: Mutex::new(Vec::new()),
            seen_purchase: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> [usize; 4] {
        [
            self.processing.load(Ordering::SeqCst),
            self.nutrition.load(Ordering::SeqCst),
            self.health.load(Ordering::SeqCst),
            self.url.load(Ordering::SeqCst),
        ]
    }

    fn total_calls(&self) -> usize {
        self.calls().iter().sum()
    }
}

fn sugar_finding() -> HealthIssues {
    HealthIssues {
        potential_health_issues: vec![IngredientHealthIssue {
            ingredient: "sugar".into(),
            issues: vec![HealthIssueDetail {
                issue: "dental caries".into(),
                evidence: "WHO guideline on free sugars intake".into(),
                specific_components: vec!["sucrose".into()],
            }],
        }],
    }
}

#[async_trait]
impl ScoringOracle for CountingOracle {
    fn name(&self) -> &str {
        "counting"
    }

    async fn score_processing(&self, ingredients: &str) -> Result<Score, OracleError> {
        self.processing.fetch_add(1, Ordering::SeqCst);
        self.seen_ingredients.lock().unwrap().push(ingredients.to_string());
        Ok(Score::new(3, "a few processed ingredients").unwrap())
    }

    async fn score_nutrition(&self, nutrients: &str) -> Result<Score, OracleError> {
        self.nutrition.fetch_add(1, Ordering::SeqCst);
        self.seen_nutrients.lock().unwrap().push(nutrients.to_string());
        Ok(Score::new(2, "high in added sugar").unwrap())
    }

    async fn find_health_issues(&self, ingredients: &str) -> Result<HealthIssues, OracleError> {
        self.health.fetch_add(1, Ordering::SeqCst);
        self.seen_ingredients.lock().unwrap().push(ingredients.to_string());
        if self.fail_health.load(Ordering::SeqCst) {
            return Err(OracleError::Malformed("unexpected reply".into()));
        }
        Ok(sugar_finding())
    }

    async fn find_purchase_url(
        &self,
        name: &str,
        brand: Option<&str>,
    ) -> Result<PurchaseUrl, OracleError> {
        self.url.fetch_add(1, Ordering::SeqCst);
        self.seen_purchase
            .lock()
            .unwrap()
            .push((name.to_string(), brand.map(str::to_string)));
        Ok(self.url_answer.clone())
    }
}

// ============ Fixtures ============

fn cocoa_drink() -> NewProduct {
    NewProduct {
        id: 42,
        barcode: Some("0049000000443".into()),
        name: "Chocolate Milk Drink".into(),
        brand_name: None,
        brand_owner: Some("Dairy Farms Co.".into()),
        ingredients: "milk, sugar, cocoa".into(),
        nutrients: "Energy - 190KCAL, Sugars - 24G, Protein - 8G".into(),
        category: Some("Milk".into()),
    }
}

fn peanut_butter() -> NewProduct {
    NewProduct {
        id: 7,
        barcode: Some("0051500255162".into()),
        name: "Creamy Peanut Butter".into(),
        brand_name: Some("Jif".into()),
        brand_owner: None,
        ingredients: "roasted peanuts, sugar, molasses, salt".into(),
        nutrients: "Energy - 590KCAL".into(),
        category: Some("Nut & Seed Butters".into()),
    }
}

fn fully_assessed(raw: NewProduct) -> Product {
    let mut product: Product = raw.into();
    product.processed = Some(Score::new(2, "stored").unwrap());
    product.nutrition = Some(Score::new(4, "stored").unwrap());
    product.health_issues = Some(HealthIssues::default());
    product.purchase_url = PurchaseUrl::NotFound;
    product
}

fn test_config(root: &Path) -> Config {
    Config {
        db: DbConfig {
            path: root.join("data/ic.sqlite"),
            max_connections: 2,
        },
        oracle: OracleConfig::default(),
        server: ServerConfig {
            bind: "127.0.0.1:0".into(),
        },
        suggest: SuggestConfig::default(),
    }
}

async fn sqlite_store(tmp: &TempDir, products: &[NewProduct]) -> Arc<SqliteProductStore> {
    let store = SqliteProductStore::connect(&test_config(tmp.path())).await.unwrap();
    migrate_pool(store.pool()).await.unwrap();
    for product in products {
        store.upsert_product(product).await.unwrap();
    }
    Arc::new(store)
}

fn resolver(store: Arc<dyn ProductStore>, oracle: Arc<CountingOracle>) -> Resolver {
    Resolver::new(store, oracle, Duration::from_secs(5))
}

// ============ In-memory store ============

#[tokio::test]
async fn test_fully_assessed_product_makes_no_calls_and_no_writes() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(fully_assessed(cocoa_drink()));
    let oracle = Arc::new(CountingOracle::new());

    let result = resolver(store.clone(), oracle.clone())
        .resolve(&ProductRequest::by_id(42))
        .await
        .unwrap();

    assert_eq!(oracle.total_calls(), 0);
    assert!(store.updates().is_empty());
    assert_eq!(result.write, WriteOutcome::Skipped);

    let response = result.response();
    assert_eq!(response.processed_score, Some(2));
    assert_eq!(response.nutrition_score, Some(4));
    assert_eq!(response.url, None);
}

#[tokio::test]
async fn test_single_missing_field_makes_one_call_and_one_column_write() {
    let store = Arc::new(InMemoryStore::new());
    let mut product = fully_assessed(cocoa_drink());
    product.nutrition = None;
    store.insert(product);
    let oracle = Arc::new(CountingOracle::new());

    let result = resolver(store.clone(), oracle.clone())
        .resolve(&ProductRequest::by_id(42))
        .await
        .unwrap();

    assert_eq!(oracle.calls(), [0, 1, 0, 0]);
    assert_eq!(result.computed, vec![DerivedField::NutritionScore]);
    // Stored values are adopted unchanged.
    assert_eq!(result.product.processed.as_ref().unwrap().explanation(), "stored");

    let updates = store.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, 42);
    assert_eq!(updates[0].1.fields(), vec!["nutrition_score"]);
}

#[tokio::test]
async fn test_new_product_is_fully_assessed_once() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(cocoa_drink().into());
    let oracle = Arc::new(CountingOracle::new());
    let resolver = resolver(store.clone(), oracle.clone());

    let first = resolver.resolve(&ProductRequest::by_id(42)).await.unwrap();
    assert_eq!(oracle.calls(), [1, 1, 1, 1]);
    assert_eq!(first.write, WriteOutcome::Persisted);

    let response = first.response();
    assert_eq!(response.ingredients, vec!["milk", "sugar", "cocoa"]);
    assert_eq!(response.brand.as_deref(), Some("Dairy Farms Co."));
    assert_eq!(response.processed_score, Some(3));
    assert_eq!(response.nutrition_score, Some(2));
    assert_eq!(response.url.as_deref(), Some("https://shop.example.com/p/42"));
    assert_eq!(
        response.health_issues.unwrap().potential_health_issues[0].ingredient,
        "sugar"
    );

    let second = resolver.resolve(&ProductRequest::by_id(42)).await.unwrap();
    assert_eq!(oracle.total_calls(), 4);
    assert_eq!(second.write, WriteOutcome::Skipped);
    assert_eq!(second.response(), first.response());
    assert_eq!(store.updates().len(), 1);
}

#[tokio::test]
async fn test_failed_field_stays_empty_and_is_retried_next_time() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(cocoa_drink().into());
    let oracle = Arc::new(CountingOracle::new());
    oracle.fail_health.store(true, Ordering::SeqCst);
    let resolver = resolver(store.clone(), oracle.clone());

    let first = resolver.resolve(&ProductRequest::by_id(42)).await.unwrap();
    assert!(first.product.health_issues.is_none());
    assert_eq!(first.product.processed.as_ref().unwrap().value(), 3);
    assert_eq!(first.failed.len(), 1);
    assert_eq!(first.failed[0].0, DerivedField::HealthIssues);
    assert_eq!(
        store.updates()[0].1.fields(),
        vec!["processed_score", "nutrition_score", "url"]
    );

    oracle.fail_health.store(false, Ordering::SeqCst);
    let second = resolver.resolve(&ProductRequest::by_id(42)).await.unwrap();
    assert_eq!(oracle.calls(), [1, 1, 2, 1]);
    assert_eq!(second.computed, vec![DerivedField::HealthIssues]);
    assert_eq!(store.updates()[1].1.fields(), vec!["health_issues"]);
}

#[tokio::test]
async fn test_failed_write_still_returns_computed_values() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(cocoa_drink().into());
    store.fail_writes(true);
    let oracle = Arc::new(CountingOracle::new());
    let resolver = resolver(store.clone(), oracle.clone());

    let result = resolver.resolve(&ProductRequest::by_id(42)).await.unwrap();
    assert_eq!(result.write, WriteOutcome::Failed);
    assert_eq!(result.response().processed_score, Some(3));
    assert!(store.get(42).unwrap().processed.is_none());

    // Nothing was persisted, so the next request computes again.
    store.fail_writes(false);
    resolver.resolve(&ProductRequest::by_id(42)).await.unwrap();
    assert_eq!(oracle.calls(), [2, 2, 2, 2]);
}

#[tokio::test]
async fn test_invalid_request_never_reaches_store() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(cocoa_drink().into());
    let oracle = Arc::new(CountingOracle::new());
    let resolver = resolver(store.clone(), oracle.clone());

    for request in [ProductRequest::default(), ProductRequest::by_query("   ")] {
        let err = resolver.resolve(&request).await.unwrap_err();
        assert!(matches!(err, LookupError::InvalidRequest(_)), "{:?}", err);
    }
    assert_eq!(store.reads(), 0);
    assert_eq!(oracle.total_calls(), 0);
}

#[tokio::test]
async fn test_unknown_barcode_is_not_found() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(cocoa_drink().into());
    let oracle = Arc::new(CountingOracle::new());

    let err = resolver(store.clone(), oracle.clone())
        .resolve(&ProductRequest::by_barcode("000000"))
        .await
        .unwrap_err();

    assert!(matches!(err, LookupError::NotFound));
    assert_eq!(store.reads(), 1);
    assert_eq!(oracle.total_calls(), 0);
}

#[tokio::test]
async fn test_oracle_receives_raw_text() {
    let store = Arc::new(InMemoryStore::new());
    let raw_ingredients = "  Milk; SUGAR, cocoa (processed with alkali),, ";
    let raw_nutrients = "Energy - 190KCAL\nSugars - 24G";
    store.insert(
        NewProduct {
            id: 5,
            barcode: None,
            name: "Cocoa Milk".into(),
            brand_name: Some("   ".into()),
            brand_owner: None,
            ingredients: raw_ingredients.into(),
            nutrients: raw_nutrients.into(),
            category: None,
        }
        .into(),
    );
    let oracle = Arc::new(CountingOracle::new());

    resolver(store.clone(), oracle.clone())
        .resolve(&ProductRequest::by_id(5))
        .await
        .unwrap();

    assert_eq!(
        *oracle.seen_ingredients.lock().unwrap(),
        vec![raw_ingredients.to_string(), raw_ingredients.to_string()]
    );
    assert_eq!(*oracle.seen_nutrients.lock().unwrap(), vec![raw_nutrients.to_string()]);
    // A blank brand is no brand.
    assert_eq!(
        *oracle.seen_purchase.lock().unwrap(),
        vec![("Cocoa Milk".to_string(), None)]
    );
}

#[tokio::test]
async fn test_short_autocomplete_query_skips_store() {
    let store = InMemoryStore::new();
    store.insert(peanut_butter().into());
    let config = SuggestConfig::default();

    assert!(suggest(&store, &config, "p").await.is_empty());
    assert_eq!(store.reads(), 0);

    let hits = suggest(&store, &config, "creamy pea").await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].brand.as_deref(), Some("Jif"));
}

// ============ SQLite store ============

#[tokio::test]
async fn test_sqlite_assessments_persist_across_reads() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp, &[cocoa_drink()]).await;
    let oracle = Arc::new(CountingOracle::new());
    let resolver = resolver(store.clone(), oracle.clone());

    let first = resolver
        .resolve(&ProductRequest::by_barcode("0049000000443"))
        .await
        .unwrap();
    assert_eq!(first.write, WriteOutcome::Persisted);

    let stored = store.find(&Predicate::Id(42)).await.unwrap().unwrap();
    assert_eq!(stored.processed.as_ref().map(Score::value), Some(3));
    assert_eq!(stored.nutrition.as_ref().map(Score::value), Some(2));
    assert_eq!(stored.health_issues, Some(sugar_finding()));
    assert_eq!(
        stored.purchase_url,
        PurchaseUrl::Found("https://shop.example.com/p/42".into())
    );

    let second = resolver.resolve(&ProductRequest::by_id(42)).await.unwrap();
    assert_eq!(oracle.total_calls(), 4);
    assert_eq!(second.response(), first.response());
}

#[tokio::test]
async fn test_sqlite_only_missing_processed_score_is_filled() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp, &[cocoa_drink()]).await;
    store
        .update_derived(
            42,
            &DerivedUpdate {
                processed: None,
                nutrition: Some(Score::new(4, "stored").unwrap()),
                health_issues: Some(HealthIssues::default()),
                purchase_url: Some(PurchaseUrl::NotFound),
            },
        )
        .await
        .unwrap();
    let oracle = Arc::new(CountingOracle::new());

    let result = resolver(store.clone(), oracle.clone())
        .resolve(&ProductRequest::by_id(42))
        .await
        .unwrap();

    assert_eq!(oracle.calls(), [1, 0, 0, 0]);
    assert_eq!(
        *oracle.seen_ingredients.lock().unwrap(),
        vec!["milk, sugar, cocoa".to_string()]
    );
    assert_eq!(result.computed, vec![DerivedField::ProcessedScore]);

    let response = result.response();
    assert_eq!(response.ingredients, vec!["milk", "sugar", "cocoa"]);
    assert_eq!(response.processed_score, Some(3));
    assert_eq!(response.nutrition_score, Some(4));

    let stored = store.find(&Predicate::Id(42)).await.unwrap().unwrap();
    assert_eq!(stored.processed.as_ref().map(Score::value), Some(3));
    assert_eq!(
        stored.processed.as_ref().map(Score::explanation),
        Some("a few processed ingredients")
    );
    assert_eq!(stored.nutrition.as_ref().map(Score::explanation), Some("stored"));
    assert_eq!(stored.purchase_url, PurchaseUrl::NotFound);
}

#[tokio::test]
async fn test_sqlite_url_not_found_is_not_retried() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp, &[cocoa_drink()]).await;
    let oracle = Arc::new(CountingOracle::with_url(PurchaseUrl::NotFound));
    let resolver = resolver(store.clone(), oracle.clone());

    let first = resolver.resolve(&ProductRequest::by_id(42)).await.unwrap();
    assert_eq!(first.response().url, None);
    assert!(first.computed.contains(&DerivedField::PurchaseUrl));

    let stored = store.find(&Predicate::Id(42)).await.unwrap().unwrap();
    assert_eq!(stored.purchase_url, PurchaseUrl::NotFound);

    resolver.resolve(&ProductRequest::by_id(42)).await.unwrap();
    assert_eq!(oracle.calls()[3], 1);
}

#[tokio::test]
async fn test_sqlite_full_text_picks_best_match() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp, &[cocoa_drink(), peanut_butter()]).await;
    let oracle = Arc::new(CountingOracle::new());

    let result = resolver(store.clone(), oracle.clone())
        .resolve(&ProductRequest::by_query("Peanut BUTTER"))
        .await
        .unwrap();
    assert_eq!(result.product.id, 7);

    let err = resolver(store.clone(), oracle.clone())
        .resolve(&ProductRequest::by_query("kombucha"))
        .await
        .unwrap_err();
    assert!(matches!(err, LookupError::NotFound));
}

#[tokio::test]
async fn test_sqlite_suggest_matches_prefix() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp, &[cocoa_drink(), peanut_butter()]).await;

    let hits = suggest(store.as_ref(), &SuggestConfig::default(), "pean").await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 7);
    assert_eq!(hits[0].name, "Creamy Peanut Butter");
    assert_eq!(hits[0].category, "Nut & Seed Butters");

    let by_brand = suggest(store.as_ref(), &SuggestConfig::default(), "dairy fa").await;
    assert_eq!(by_brand.len(), 1);
    assert_eq!(by_brand[0].id, 42);
}

#[tokio::test]
async fn test_sqlite_reimport_keeps_assessments() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp, &[cocoa_drink()]).await;
    let oracle = Arc::new(CountingOracle::new());
    resolver(store.clone(), oracle.clone())
        .resolve(&ProductRequest::by_id(42))
        .await
        .unwrap();

    let jsonl = tmp.path().join("products.jsonl");
    std::fs::write(
        &jsonl,
        "{\"id\": 42, \"name\": \"Chocolate Milk Drink, Reduced Fat\", \"ingredients\": \"milk, sugar, cocoa\"}\n\
         {\"id\": 7, \"name\": \"Creamy Peanut Butter\", \"brand_name\": \"Jif\"}\n",
    )
    .unwrap();
    assert_eq!(import_file(store.as_ref(), &jsonl).await.unwrap(), 2);

    let stored = store.find(&Predicate::Id(42)).await.unwrap().unwrap();
    assert_eq!(stored.name, "Chocolate Milk Drink, Reduced Fat");
    assert_eq!(stored.processed.as_ref().map(Score::value), Some(3));

    let renamed = store
        .find(&Predicate::full_text("reduced fat"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renamed.id, 42);
}

#[tokio::test]
async fn test_sqlite_corrupt_row_is_store_error() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp, &[cocoa_drink()]).await;
    sqlx::query("UPDATE products SET processed_score = 'very high' WHERE id = 42")
        .execute(store.pool())
        .await
        .unwrap();
    let oracle = Arc::new(CountingOracle::new());

    assert!(store.find(&Predicate::Id(42)).await.is_err());

    let err = resolver(store.clone(), oracle.clone())
        .resolve(&ProductRequest::by_id(42))
        .await
        .unwrap_err();
    assert!(matches!(err, LookupError::Store(_)), "{:?}", err);
    assert_eq!(oracle.total_calls(), 0);
}

#[tokio::test]
async fn test_sqlite_failed_import_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp, &[]).await;

    // Second row reuses the first row's barcode.
    let jsonl = tmp.path().join("clash.jsonl");
    std::fs::write(
        &jsonl,
        "{\"id\": 1, \"barcode\": \"0001\", \"name\": \"Spring Water\"}\n\
         {\"id\": 2, \"barcode\": \"0001\", \"name\": \"Sparkling Water\"}\n",
    )
    .unwrap();

    let err = import_file(store.as_ref(), &jsonl).await.unwrap_err();
    assert!(format!("{:#}", err).contains("product 2"), "{:#}", err);
    assert!(store.find(&Predicate::Id(1)).await.unwrap().is_none());
}
