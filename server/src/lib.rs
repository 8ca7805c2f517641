use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use redsift_core::paginate::{page, page_window, total_pages, PageLink};
use redsift_core::ranker::rank;
use redsift_core::snippet::{render_plain, snippet, SnippetToken};
use redsift_core::tokenizer::query_terms;
use redsift_core::{DocId, Error, IndexStore, Term};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Results per page when a request gives no `size`.
pub const DEFAULT_PAGE_SIZE: usize = 25;
/// Upper bound on `size`, whatever the request asks for.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_page")]
    pub page: usize,
    pub size: Option<usize>,
}
fn default_page() -> usize { 1 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub page: usize,
    pub total_pages: usize,
    pub pages: Vec<PageLink>,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub highlights: Vec<SnippetToken>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<IndexStore>,
    pub page_size: usize,
}

/// Core errors as HTTP responses. Out-of-range pages and unknown documents
/// are not-found; anything else is a server fault.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self { ApiError(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            Error::PageOutOfRange { .. } | Error::UnknownDocument(_) => StatusCode::NOT_FOUND,
            Error::InvalidPageSize => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Opens the index at `index_dir` and serves it with the default page size.
pub fn build_app(index_dir: String) -> Result<Router> {
    let store = IndexStore::open(&index_dir)?;
    Ok(router(Arc::new(store), DEFAULT_PAGE_SIZE))
}

/// Routes over an already opened store.
pub fn router(store: Arc<IndexStore>, page_size: usize) -> Router {
    let app_state = AppState { store, page_size: page_size.clamp(1, MAX_PAGE_SIZE) };

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
        .route("/stats", get(stats_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let terms = query_terms(&params.q);
    let size = params.size.unwrap_or(state.page_size).min(MAX_PAGE_SIZE);
    let ranked = rank(&terms, &state.store)?;
    let total_hits = ranked.len();

    // No hits is an empty first page, not a missing one.
    if total_hits == 0 && params.page <= 1 {
        return Ok(Json(SearchResponse {
            query: params.q,
            took_s: start.elapsed().as_secs_f64(),
            total_hits,
            page: 1,
            total_pages: 0,
            pages: vec![],
            results: vec![],
        }));
    }

    let hits = page(&ranked, params.page, size)?;
    let pages = page_window(params.page, size, total_hits)?;
    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let entry = state.store.entry(hit.doc_id)?;
        let highlights = snippet(&terms, &entry.terms)?;
        results.push(SearchHit {
            doc_id: hit.doc_id,
            score: hit.score,
            title: entry.title,
            url: entry.url,
            snippet: render_plain(&highlights),
            highlights,
        });
    }

    Ok(Json(SearchResponse {
        query: params.q,
        took_s: start.elapsed().as_secs_f64(),
        total_hits,
        page: params.page,
        total_pages: total_pages(total_hits, size),
        pages,
        results,
    }))
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let entry = state.store.entry(doc_id)?;
    let text: Vec<&str> = entry.terms.iter().map(Term::surface).collect();
    Ok(Json(serde_json::json!({
        "doc_id": doc_id,
        "title": entry.title,
        "url": entry.url,
        "score": entry.score,
        "text": text.join(" "),
    })))
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.store.stats();
    let meta = state.store.meta();
    Json(serde_json::json!({
        "num_docs": stats.total_doc_count,
        "average_doc_length": stats.average_doc_length,
        "num_terms": meta.num_terms,
        "created_at": meta.created_at,
        "page_size": state.page_size,
    }))
}
