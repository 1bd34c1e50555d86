//!
//! src/api.rs
//!
//! On-demand http trigger for the pipeline plus read-only views over
//! the stored tracks
//!

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing::warn;

use crate::errors::EtlError;
use crate::persistent::Persistent;
use crate::pipeline::EtlService;
use crate::stats::{TrackStats, summarize};
use crate::types::{NormalizedTrack, StoredTrack};

const DEFAULT_LIST_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EtlService>,
    pub db: Arc<Persistent>,
    pub shutdown: CancellationToken
}

/// Error body is `{"detail": "<error text>"}`
pub struct ApiError(EtlError);

impl From<EtlError> for ApiError {
    fn from(e: EtlError) -> Self { ApiError(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            EtlError::Invalid(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct EtlResponse {
    pub success: bool,
    pub data: Vec<NormalizedTrack>
}

#[derive(Debug, Deserialize)]
pub struct EtlQuery {
    pub limit: Option<u32>
}

#[derive(Debug, Deserialize)]
pub struct TracksQuery {
    pub genre: Option<String>,
    pub limit: Option<i64>
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub genre: Option<String>
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": env!("CARGO_PKG_NAME") }))
}

/// GET /api/etl/:category?limit=
async fn trigger_etl(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(query): Query<EtlQuery>
) -> Result<Json<EtlResponse>, ApiError> {
    let params = state.service.params(&category, query.limit)?;
    let cancel = state.shutdown.child_token();
    let outcome = state.service.run(&params, &cancel).await?;
    Ok(Json(EtlResponse { success: true, data: outcome.tracks }))
}

/// GET /api/tracks?genre=&limit=
async fn list_tracks(
    State(state): State<AppState>,
    Query(query): Query<TracksQuery>
) -> Result<Json<Vec<StoredTrack>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit < 1 {
        return Err(EtlError::Invalid(format!("limit must be positive, got {limit}")).into());
    }
    let rows = state.db.list_tracks(query.genre.as_deref(), limit).await?;
    Ok(Json(rows))
}

/// GET /api/stats?genre=
async fn track_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>
) -> Result<Json<TrackStats>, ApiError> {
    let rows = state.db.list_tracks(query.genre.as_deref(), i64::MAX).await?;
    Ok(Json(summarize(&rows)))
}

fn cors(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins.iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(origin = %o, error = %e, "api.cors.invalid_origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/etl/:category", get(trigger_etl))
        .route("/api/tracks", get(list_tracks))
        .route("/api/stats", get(track_stats))
        .layer(cors(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
