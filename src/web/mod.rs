// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! JSON decision API for the operator front-end

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::WebConfig;
use crate::db::LogStats;
use crate::models::{DecisionRecord, PendingDecision, PlacementFailure};
use crate::pipeline::{Pipeline, Placement};
use crate::AblageError;

/// Shared application state
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

type ApiResult<T> = std::result::Result<Json<T>, AblageError>;

impl IntoResponse for AblageError {
    fn into_response(self) -> Response {
        let status = match &self {
            AblageError::NotFound(_) => StatusCode::NOT_FOUND,
            AblageError::InvalidChoice { .. } => StatusCode::BAD_REQUEST,
            AblageError::AlreadyResolved(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if !self.is_operator_error() {
            error!("Request failed: {}", self);
        }
        let body = ErrorBody {
            kind: error_kind(&self),
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub error: String,
}

fn error_kind(err: &AblageError) -> String {
    match err {
        AblageError::NotFound(_) => "not_found",
        AblageError::InvalidChoice { .. } => "invalid_choice",
        AblageError::AlreadyResolved(_) => "already_resolved",
        AblageError::PlacementFailed { .. } => "placement_failed",
        _ => "internal",
    }
    .to_string()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/pending", get(api_pending))
        .route("/api/resolve", post(api_resolve))
        .route("/api/failures", get(api_failures))
        .route("/api/failures/retry", post(api_retry))
        .route("/api/decisions", get(api_decisions))
        .route("/api/categories", get(api_categories))
        .route("/api/status", get(api_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn api_pending(State(state): State<Arc<AppState>>) -> ApiResult<Vec<PendingDecision>> {
    Ok(Json(state.pipeline.store().list_pending()?))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub item: PathBuf,
    pub folder: String,
}

async fn api_resolve(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Placement> {
    let placement = state
        .pipeline
        .resolve_and_place(&request.item, &request.folder)
        .await?;
    Ok(Json(placement))
}

async fn api_failures(State(state): State<Arc<AppState>>) -> ApiResult<Vec<PlacementFailure>> {
    Ok(Json(state.pipeline.store().placement_failures()?))
}

#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    pub item: PathBuf,
}

async fn api_retry(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RetryRequest>,
) -> ApiResult<Placement> {
    Ok(Json(state.pipeline.retry_placement(&request.item).await?))
}

#[derive(Deserialize)]
struct DecisionsQuery {
    limit: Option<usize>,
}

async fn api_decisions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DecisionsQuery>,
) -> ApiResult<Vec<DecisionRecord>> {
    let limit = query.limit.unwrap_or(50);
    Ok(Json(state.pipeline.store().recent_decisions(limit)?))
}

async fn api_categories(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(
        state
            .pipeline
            .store()
            .categories()
            .iter()
            .map(String::from)
            .collect(),
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub inbox: PathBuf,
    pub pending: usize,
    pub placement_failures: usize,
    pub log: LogStats,
}

async fn api_status(State(state): State<Arc<AppState>>) -> ApiResult<StatusResponse> {
    let stats = state.pipeline.store().stats()?;
    Ok(Json(StatusResponse {
        inbox: state.pipeline.inbox().to_path_buf(),
        pending: stats.pending,
        placement_failures: stats.placement_failures,
        log: stats.log,
    }))
}

/// Serve the API until `shutdown` resolves
pub async fn start_server<F>(config: &WebConfig, pipeline: Arc<Pipeline>, shutdown: F) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = Arc::new(AppState { pipeline });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Decision API available at http://{}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AblageError::Config(format!("Server error: {}", e)))?;

    Ok(())
}
