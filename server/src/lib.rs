use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tabsearch_core::persist::IndexPaths;
use tabsearch_core::{DocId, SearchEngine, SearchHit};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Page size used when the request does not give one.
pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 1000;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}
fn default_limit() -> usize { DEFAULT_LIMIT }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_ms: f64,
    pub took_s: f64,
    pub total_hits: usize,
    pub offset: usize,
    pub limit: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
}

/// Open the index under `index_dir` and build the router around it.
pub fn build_app(index_dir: String) -> Result<Router> {
    let engine = SearchEngine::open(&IndexPaths::new(&index_dir))?;
    Ok(build_router(Arc::new(engine)))
}

pub fn build_router(engine: Arc<SearchEngine>) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(AppState { engine })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Index reads are positioned file reads, so engine calls run on the
/// blocking pool.
pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let limit = params.limit.min(MAX_LIMIT);
    let engine = state.engine.clone();
    let (q, offset) = (params.q.clone(), params.offset);
    let page = tokio::task::spawn_blocking(move || engine.search(&q, offset, limit))
        .await
        .map_err(join_error)?
        .map_err(internal_error)?;
    tracing::debug!(query = %params.q, total_hits = page.total_hits, "search");
    Ok(Json(SearchResponse {
        query: params.q,
        took_ms: page.took.as_secs_f64() * 1000.0,
        took_s: page.took.as_secs_f64(),
        total_hits: page.total_hits,
        offset: page.offset,
        limit,
        results: page.hits,
    }))
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
) -> Result<Json<SearchHit>, (StatusCode, Json<serde_json::Value>)> {
    let engine = state.engine.clone();
    let found = tokio::task::spawn_blocking(move || engine.try_get_document(doc_id))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))))?;
    match found {
        Ok(Some(meta)) => Ok(Json(SearchHit { doc_id, url: meta.url, title: meta.title })),
        Ok(None) => Err((StatusCode::NOT_FOUND, Json(json!({ "error": "not found", "doc_id": doc_id })))),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() })))),
    }
}

fn join_error(e: tokio::task::JoinError) -> (StatusCode, String) {
    tracing::error!(error = %e, "search task failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn internal_error(e: tabsearch_core::IndexError) -> (StatusCode, String) {
    tracing::error!(error = %e, "query failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
