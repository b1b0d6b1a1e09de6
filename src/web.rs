use crate::semantic::{SearchHit, SemanticSearchError, SemanticSearchService};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    service: Arc<SemanticSearchService>,
}

pub fn router(service: Arc<SemanticSearchService>) -> Router {
    let shared_state = Arc::new(SharedState { service });

    Router::new()
        .route("/health", get(health))
        .route("/search", post(search))
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

async fn start_app(service: Arc<SemanticSearchService>, bind: &str) -> anyhow::Result<()> {
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    log::info!("listening on {bind}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(service: Arc<SemanticSearchService>, bind: &str) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(service, bind).await })
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Search(#[from] SemanticSearchError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Debug)]
struct HttpError(ApiError);

// Tell axum how to convert `ApiError` into a response.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            ApiError::BadRequest(_) => {
                log::debug!("{self:?}");
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": self.0.to_string()})),
                )
            }
            ApiError::Search(_) => {
                log::error!("{self:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": self.0.to_string()})),
                )
            }
        }
        .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<ApiError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
    nearest_neighbor_index_available: bool,
}

async fn health(State(state): State<Arc<SharedState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.service.model_loaded(),
        nearest_neighbor_index_available: state.service.index_available(),
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,

    /// Maximum number of entities; the configured default when absent
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub count: usize,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, HttpError> {
    let Json(payload) = payload?;

    log::debug!("payload: {payload:?}");

    let query = payload.query.as_deref().unwrap_or_default().trim().to_string();
    if query.is_empty() {
        return Err(ApiError::BadRequest("Query parameter is required".to_string()).into());
    }

    let service = state.service.clone();
    tokio::task::block_in_place(move || {
        let results = service.search(&query, payload.top_k)?;
        Ok(Json(SearchResponse {
            count: results.len(),
            query,
            results,
        }))
    })
}
