//! HTTP API server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/v1/search-products` | Resolve and enrich one product |
//! | `GET`  | `/v1/autocomplete?q=` | Up to N name suggestions |
//! | `GET`  | `/health` | Health check (version and server time) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser and mobile
//! development clients can call the API directly.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::{Config, SuggestConfig};
use crate::error::LookupError;
use crate::models::{ProductResponse, Suggestion};
use crate::oracle;
use crate::resolve::{ProductRequest, Resolver};
use crate::store::{ProductStore, SqliteProductStore};
use crate::suggest::suggest;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    resolver: Resolver,
    store: Arc<dyn ProductStore>,
    suggest: Arc<SuggestConfig>,
}

impl AppState {
    pub fn new(resolver: Resolver, store: Arc<dyn ProductStore>, suggest: SuggestConfig) -> Self {
        Self {
            resolver,
            store,
            suggest: Arc::new(suggest),
        }
    }
}

/// Build the API router over `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/search-products", post(handle_search_products))
        .route("/v1/autocomplete", get(handle_autocomplete))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = Arc::new(SqliteProductStore::connect(config).await?);
    let oracle = oracle::create_oracle(&config.oracle)?;
    info!(oracle = oracle.name(), "scoring oracle ready");

    let resolver = Resolver::new(store.clone(), oracle, config.oracle.call_timeout());
    let app = router(AppState::new(resolver, store.clone(), config.suggest.clone()));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("listening on http://{}", config.server.bind);
    let served = axum::serve(listener, app).await;

    store.close().await;
    served?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<LookupError> for AppError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::InvalidRequest(message) => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "bad_request",
                message,
            },
            LookupError::NotFound => AppError {
                status: StatusCode::NOT_FOUND,
                code: "not_found",
                message: "No products found.".to_string(),
            },
            LookupError::Store(e) => {
                error!(error = %e, "product lookup failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: "An internal server error occurred.".to_string(),
                }
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: rejection.body_text(),
        }
    }
}

// ============ POST /v1/search-products ============

/// A body that is not a well-typed request object is an invalid request.
async fn handle_search_products(
    State(state): State<AppState>,
    payload: Result<Json<ProductRequest>, JsonRejection>,
) -> Result<Json<ProductResponse>, AppError> {
    let Json(request) = payload?;
    let result = state.resolver.resolve(&request).await?;
    Ok(Json(result.response()))
}

// ============ GET /v1/autocomplete ============

#[derive(Deserialize)]
struct AutocompleteParams {
    #[serde(default)]
    q: String,
}

/// Always answers 200; short queries and lookup failures give `[]`.
async fn handle_autocomplete(
    State(state): State<AppState>,
    Query(params): Query<AutocompleteParams>,
) -> Json<Vec<Suggestion>> {
    Json(suggest(state.store.as_ref(), &state.suggest, &params.q).await)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    /// RFC 3339 server time.
    timestamp: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
